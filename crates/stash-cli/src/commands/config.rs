use stash_core::config::ClientConfig;

use crate::cli::ConfigCommands;
use crate::config_profiles::{
    default_config_path, resolve_client_config, CliProfile, CliProfilesConfig,
};
use crate::error::CliError;

/// Explicit `config init` flag values.
#[derive(Debug, Default)]
pub struct ProfileInput {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_upload_preset: Option<String>,
    pub cloudinary_base_url: Option<String>,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            supabase_url,
            supabase_anon_key,
            cloudinary_cloud_name,
            cloudinary_upload_preset,
            cloudinary_base_url,
            no_activate,
        } => run_config_init(
            global_profile,
            ProfileInput {
                supabase_url,
                supabase_anon_key,
                cloudinary_cloud_name,
                cloudinary_upload_preset,
                cloudinary_base_url,
            },
            no_activate,
        ),
        ConfigCommands::Show => run_config_show(global_profile),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    input: ProfileInput,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();

    let profile = merge_profile(input, ClientConfig::from_env(), &existing)?;
    let missing = missing_fields(&profile);
    *config.profile_mut_or_default(&profile_name) = profile;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );
    if missing.is_empty() {
        println!(
            "Profile '{profile_name}' is ready. Run `stash auth login --email <email> --password <password>`."
        );
    } else {
        println!("Profile '{}' is missing: {}", profile_name, missing.join(", "));
    }

    Ok(())
}

/// Explicit flags win over the environment, which wins over stored values.
pub fn merge_profile(
    input: ProfileInput,
    env: ClientConfig,
    existing: &CliProfile,
) -> Result<CliProfile, CliError> {
    let explicit = ClientConfig {
        supabase_url: input.supabase_url,
        supabase_anon_key: input.supabase_anon_key,
        cloudinary_cloud_name: input.cloudinary_cloud_name,
        cloudinary_upload_preset: input.cloudinary_upload_preset,
        cloudinary_base_url: input.cloudinary_base_url,
        ..ClientConfig::default()
    };
    let merged = explicit
        .merged_with(env)
        .merged_with(existing.to_client_config());
    merged.validate()?;
    Ok(CliProfile::from_client_config(merged))
}

pub fn missing_fields(profile: &CliProfile) -> Vec<&'static str> {
    [
        ("supabase_url", &profile.supabase_url),
        ("supabase_anon_key", &profile.supabase_anon_key),
        ("cloudinary_cloud_name", &profile.cloudinary_cloud_name),
        ("cloudinary_upload_preset", &profile.cloudinary_upload_preset),
    ]
    .into_iter()
    .filter(|(_, value)| value.is_none())
    .map(|(field, _)| field)
    .collect()
}

fn run_config_show(global_profile: Option<&str>) -> Result<(), CliError> {
    let (profile_name, config) = resolve_client_config(global_profile).map_err(CliError::Config)?;
    let path = default_config_path().map_err(CliError::Config)?;

    println!("config_file: {}", path.display());
    println!("profile: {profile_name}");
    for line in render_config(&config) {
        println!("{line}");
    }
    Ok(())
}

pub fn render_config(config: &ClientConfig) -> Vec<String> {
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "(unset)".to_string());
    vec![
        format!("supabase_url: {}", show(&config.supabase_url)),
        format!(
            "supabase_anon_key: {}",
            config
                .supabase_anon_key
                .as_deref()
                .map_or_else(|| "(unset)".to_string(), redact)
        ),
        format!("cloudinary_cloud_name: {}", show(&config.cloudinary_cloud_name)),
        format!(
            "cloudinary_upload_preset: {}",
            show(&config.cloudinary_upload_preset)
        ),
        format!("cloudinary_base_url: {}", show(&config.cloudinary_base_url)),
        format!("tasks_collection: {}", config.tasks_collection()),
        format!("media_collection: {}", config.media_collection()),
    ]
}

fn redact(value: &str) -> String {
    let visible = value.chars().take(6).collect::<String>();
    format!("{visible}...")
}
