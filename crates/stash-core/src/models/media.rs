//! Media index model

use serde::{Deserialize, Serialize};

use super::Record;
use crate::error::{Error, Result};
use crate::util::{is_http_url, unix_millis_now};

/// Index entry pointing at a binary held by the remote media service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Store-assigned identifier (empty until created).
    #[serde(default)]
    pub id: String,
    /// Remote media URL.
    pub url: String,
    /// Owning user identifier.
    pub user_id: String,
    /// Upload timestamp (Unix ms).
    pub uploaded_at: i64,
    /// Original file name.
    pub filename: String,
}

impl MediaItem {
    /// Build an unsaved index entry for an already-uploaded binary.
    ///
    /// The upload timestamp is taken now.
    pub fn draft(
        owner_id: impl Into<String>,
        url: impl Into<String>,
        filename: impl Into<String>,
    ) -> Result<Self> {
        let url = url.into().trim().to_string();
        if !is_http_url(&url) {
            return Err(Error::InvalidInput(format!(
                "Media URL must include http:// or https://: {url}"
            )));
        }
        let filename = filename.into().trim().to_string();
        if filename.is_empty() {
            return Err(Error::InvalidInput(
                "Media filename cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            id: String::new(),
            url,
            user_id: owner_id.into(),
            uploaded_at: unix_millis_now(),
            filename,
        })
    }
}

impl Record for MediaItem {
    const COLLECTION: &'static str = "user_media";

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
        self.uploaded_at
    }
}
