//! Task model

use serde::{Deserialize, Serialize};

use super::Record;
use crate::error::{Error, Result};
use crate::util::unix_millis_now;

/// A todo item owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identifier (empty until created)
    #[serde(default)]
    pub id: String,
    /// Free-text description
    pub task: String,
    /// Completion flag
    #[serde(default)]
    pub completed: bool,
    /// Owning user identifier
    pub user_id: String,
    /// Creation timestamp (Unix ms)
    #[serde(default)]
    pub created_at: i64,
}

impl Task {
    /// Build an unsaved task. Whitespace-only text is rejected.
    pub fn draft(owner_id: impl Into<String>, text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("Task cannot be empty".to_string()));
        }

        Ok(Self {
            id: String::new(),
            task: text.to_string(),
            completed: false,
            user_id: owner_id.into(),
            created_at: unix_millis_now(),
        })
    }
}

impl Record for Task {
    const COLLECTION: &'static str = "todos";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn timestamp(&self) -> i64 {
        self.created_at
    }
}
