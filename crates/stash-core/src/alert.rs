//! User-facing notifications for the outcome of a single action.

use std::fmt;

use crate::error::{Error, ErrorKind};

const GENERIC_MESSAGE: &str = "An unknown error occurred";
const NETWORK_MESSAGE: &str = "Network request failed. Check your connection.";
const PERMISSION_TITLE: &str = "Permission Denied";

/// The user action an alert reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    SignIn,
    SignUp,
    SignOut,
    Load,
    Add,
    Update,
    Delete,
    Pick,
    Upload,
}

impl UserAction {
    const fn failure_title(self) -> &'static str {
        match self {
            Self::SignIn => "Sign In Failed",
            Self::SignUp => "Sign Up Failed",
            Self::SignOut => "Sign Out Failed",
            Self::Load => "Load Failed",
            Self::Add => "Add Failed",
            Self::Update => "Update Failed",
            Self::Delete => "Delete Failed",
            Self::Pick => "Pick Failed",
            Self::Upload => "Upload Failed",
        }
    }
}

/// A terminal notification: shown once, never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new("Success", message)
    }

    /// Converts the failure of `action` into what the user sees.
    pub fn for_error(action: UserAction, error: &Error) -> Self {
        let title = match error.kind() {
            ErrorKind::PermissionDenied => PERMISSION_TITLE,
            _ => action.failure_title(),
        };
        Self::new(title, user_message(error))
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

fn user_message(error: &Error) -> String {
    match error {
        Error::Auth(error) => error.to_string(),
        Error::PermissionDenied(message)
        | Error::Store(message)
        | Error::Media(message)
        | Error::InvalidInput(message)
        | Error::Config(message) => message.clone(),
        Error::Http(_) => NETWORK_MESSAGE.to_string(),
        Error::NotSignedIn => "No user logged in".to_string(),
        Error::NotFound(id) => format!("No item matches {id}"),
        Error::Busy(_) => "Please wait for the current action to finish.".to_string(),
        Error::InvalidRecord(_) => "The server returned data this app cannot read.".to_string(),
        Error::Serialization(_) | Error::Io(_) => GENERIC_MESSAGE.to_string(),
    }
}
