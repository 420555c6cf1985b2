use std::io;

use stash_core::alert::{Alert, UserAction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// A user action failed; rendered as that action's alert.
    #[error("{source}")]
    Action {
        action: UserAction,
        #[source]
        source: stash_core::Error,
    },
    #[error(transparent)]
    Core(#[from] stash_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("ID cannot be empty")]
    EmptyId,
    #[error("No item matches id/prefix: {0}")]
    NotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Nothing selected: {0} is not a readable file")]
    NothingSelected(String),
    #[error("{0}")]
    Alert(Alert),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CliError {
    pub const fn action(action: UserAction, source: stash_core::Error) -> Self {
        Self::Action { action, source }
    }

    /// Returns a closure for `map_err` that tags core errors with `action`.
    pub fn during(action: UserAction) -> impl Fn(stash_core::Error) -> Self {
        move |source| Self::action(action, source)
    }

    /// What the user sees for this failure.
    pub fn alert(&self) -> Alert {
        match self {
            Self::Action { action, source } => Alert::for_error(*action, source),
            Self::Alert(alert) => alert.clone(),
            other => Alert::new("Error", other.to_string()),
        }
    }
}
