use stash_core::alert::UserAction;
use stash_core::auth::{AuthError, AuthSession, SessionFeed, SignUpOutcome};

use crate::auth::{auth_service_for_profile, clear_stored_session};
use crate::cli::AuthCommands;
use crate::config_profiles::resolve_client_config;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let (profile_name, config) = resolve_client_config(global_profile).map_err(CliError::Config)?;
    let service = || {
        auth_service_for_profile(&profile_name, &config, SessionFeed::new()).map_err(|error| {
            CliError::Config(format!(
                "{error}. Run `stash config init --profile {profile_name}` or set SUPABASE_URL and SUPABASE_ANON_KEY."
            ))
        })
    };

    match command {
        AuthCommands::Login { email, password } => {
            let session = service()?
                .sign_in(&email, &password)
                .await
                .map_err(|error| auth_failure(UserAction::SignIn, error))?;
            println!(
                "Signed in profile '{profile_name}' as {}",
                email_label(&session)
            );
        }
        AuthCommands::Signup { email, password } => {
            let outcome = service()?
                .sign_up(&email, &password)
                .await
                .map_err(|error| auth_failure(UserAction::SignUp, error))?;
            match outcome {
                SignUpOutcome::SignedIn(session) => println!(
                    "Account created; profile '{profile_name}' signed in as {}",
                    email_label(&session)
                ),
                SignUpOutcome::ConfirmationRequired => println!(
                    "Account created. Confirm your email, then run `stash auth login`."
                ),
            }
        }
        AuthCommands::Status => {
            let session = service()?
                .restore_session()
                .await
                .map_err(|error| auth_failure(UserAction::Load, error))?;
            if let Some(session) = session {
                println!(
                    "Profile '{}' is signed in as {} (user_id={}, expires_at={})",
                    profile_name,
                    email_label(&session),
                    session.user_id(),
                    session.expires_at
                );
            } else {
                println!("Profile '{profile_name}' is not signed in.");
            }
        }
        AuthCommands::Logout => {
            if let Ok(service) = service() {
                // A session that cannot be restored is already gone locally.
                if let Err(error) = service.restore_session().await {
                    tracing::warn!("Stored session could not be restored: {}", error);
                }
                service
                    .sign_out()
                    .await
                    .map_err(|error| auth_failure(UserAction::SignOut, error))?;
            }
            clear_stored_session(&profile_name)
                .map_err(|error| auth_failure(UserAction::SignOut, error))?;
            println!("Signed out profile '{profile_name}'");
        }
    }
    Ok(())
}

fn auth_failure(action: UserAction, error: AuthError) -> CliError {
    CliError::action(action, error.into())
}

fn email_label(session: &AuthSession) -> &str {
    session.user.email.as_deref().unwrap_or("(no email)")
}
