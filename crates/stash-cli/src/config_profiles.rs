//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stash_core::config::ClientConfig;
use stash_core::util::normalize_text_option;

const CONFIG_FILE_NAME: &str = "cli-config.json";
pub const PROFILE_ENV_VAR: &str = "STASH_PROFILE";
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
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
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|dir| dir.join("stash").join(CONFIG_FILE_NAME))
        .ok_or_else(|| "Failed to resolve CLI config directory".to_string())
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// `--profile`, then `STASH_PROFILE`, then the active profile, then `default`.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        self.resolve_profile_name_with_env(
            explicit,
            std::env::var(PROFILE_ENV_VAR).ok().as_deref(),
        )
    }

    fn resolve_profile_name_with_env(&self, explicit: Option<&str>, env: Option<&str>) -> String {
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(env))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            supabase_url: normalize_text_option(self.supabase_url.clone()),
            supabase_anon_key: normalize_text_option(self.supabase_anon_key.clone()),
            cloudinary_cloud_name: normalize_text_option(self.cloudinary_cloud_name.clone()),
            cloudinary_upload_preset: normalize_text_option(self.cloudinary_upload_preset.clone()),
            cloudinary_base_url: normalize_text_option(self.cloudinary_base_url.clone()),
            ..ClientConfig::default()
        }
    }

    pub fn from_client_config(config: ClientConfig) -> Self {
        Self {
            supabase_url: config.supabase_url,
            supabase_anon_key: config.supabase_anon_key,
            cloudinary_cloud_name: config.cloudinary_cloud_name,
            cloudinary_upload_preset: config.cloudinary_upload_preset,
            cloudinary_base_url: config.cloudinary_base_url,
        }
    }

    fn normalize(&mut self) {
        *self = Self::from_client_config(self.to_client_config());
    }
}

/// The profile name plus its effective configuration. Environment variables
/// override stored profile values.
pub fn resolve_client_config(explicit_profile: Option<&str>) -> Result<(String, ClientConfig), String> {
    let config = CliProfilesConfig::load()?;
    let profile_name = config.resolve_profile_name(explicit_profile);
    let stored = config
        .profile(&profile_name)
        .map(CliProfile::to_client_config)
        .unwrap_or_default();
    let effective = ClientConfig::from_env().merged_with(stored);
    effective.validate().map_err(|error| error.to_string())?;
    Ok((profile_name, effective))
}
