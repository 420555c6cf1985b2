//! Client configuration.
//!
//! Provides a `ClientConfig` struct used by every interface to discover the
//! Supabase auth/database project and the Cloudinary upload account.

use serde::{Deserialize, Serialize};

use crate::auth::{resolve_optional_supabase_config, AuthError};
use crate::error::{Error, Result};
use crate::media::CloudinaryClient;
use crate::models::{MediaItem, Record, Task};
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_CLOUDINARY_CLOUD_NAME: &str = "CLOUDINARY_CLOUD_NAME";
pub const ENV_CLOUDINARY_UPLOAD_PRESET: &str = "CLOUDINARY_UPLOAD_PRESET";
pub const ENV_CLOUDINARY_BASE_URL: &str = "CLOUDINARY_BASE_URL";

/// Public endpoints and keys needed to reach the hosted services.
///
/// The anon key and the unsigned upload preset are safe to ship. Secret
/// credentials must never be stored here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default)]
    pub cloudinary_cloud_name: Option<String>,
    #[serde(default)]
    pub cloudinary_upload_preset: Option<String>,
    #[serde(default)]
    pub cloudinary_base_url: Option<String>,
    #[serde(default)]
    pub tasks_collection: Option<String>,
    #[serde(default)]
    pub media_collection: Option<String>,
}

impl ClientConfig {
    /// Reads the service settings from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            supabase_url: normalize_text_option(lookup(ENV_SUPABASE_URL)),
            supabase_anon_key: normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY)),
            cloudinary_cloud_name: normalize_text_option(lookup(ENV_CLOUDINARY_CLOUD_NAME)),
            cloudinary_upload_preset: normalize_text_option(lookup(ENV_CLOUDINARY_UPLOAD_PRESET)),
            cloudinary_base_url: normalize_text_option(lookup(ENV_CLOUDINARY_BASE_URL)),
            tasks_collection: None,
            media_collection: None,
        }
    }

    /// Fills every unset value from `fallback`. Values already set win.
    #[must_use]
    pub fn merged_with(self, fallback: Self) -> Self {
        fn pick(primary: Option<String>, fallback: Option<String>) -> Option<String> {
            normalize_text_option(primary).or_else(|| normalize_text_option(fallback))
        }

        Self {
            supabase_url: pick(self.supabase_url, fallback.supabase_url),
            supabase_anon_key: pick(self.supabase_anon_key, fallback.supabase_anon_key),
            cloudinary_cloud_name: pick(self.cloudinary_cloud_name, fallback.cloudinary_cloud_name),
            cloudinary_upload_preset: pick(
                self.cloudinary_upload_preset,
                fallback.cloudinary_upload_preset,
            ),
            cloudinary_base_url: pick(self.cloudinary_base_url, fallback.cloudinary_base_url),
            tasks_collection: pick(self.tasks_collection, fallback.tasks_collection),
            media_collection: pick(self.media_collection, fallback.media_collection),
        }
    }

    /// Checks that every URL that is set uses http(s).
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("supabase_url", &self.supabase_url),
            ("cloudinary_base_url", &self.cloudinary_base_url),
        ] {
            if let Some(value) = normalize_text_option(value.clone()) {
                if !is_http_url(&value) {
                    return Err(Error::Config(format!(
                        "{field} must include http:// or https://"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Supabase project URL and anon key; both or neither must be set.
    pub fn supabase(&self) -> Result<(String, String)> {
        resolve_optional_supabase_config(self.supabase_url.clone(), self.supabase_anon_key.clone())?
            .ok_or(Error::Auth(AuthError::NotConfigured))
    }

    pub fn cloudinary_client(&self) -> Result<CloudinaryClient> {
        let cloud_name = normalize_text_option(self.cloudinary_cloud_name.clone()).ok_or_else(|| {
            Error::Config(format!("{ENV_CLOUDINARY_CLOUD_NAME} is not configured"))
        })?;
        let upload_preset = normalize_text_option(self.cloudinary_upload_preset.clone())
            .ok_or_else(|| {
                Error::Config(format!("{ENV_CLOUDINARY_UPLOAD_PRESET} is not configured"))
            })?;
        CloudinaryClient::new(self.cloudinary_base_url.clone(), cloud_name, upload_preset)
    }

    pub fn tasks_collection(&self) -> String {
        normalize_text_option(self.tasks_collection.clone())
            .unwrap_or_else(|| Task::COLLECTION.to_string())
    }

    pub fn media_collection(&self) -> String {
        normalize_text_option(self.media_collection.clone())
            .unwrap_or_else(|| MediaItem::COLLECTION.to_string())
    }
}
