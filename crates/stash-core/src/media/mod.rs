//! Remote media endpoint client.
//!
//! Uploads picked files as multipart form posts to a Cloudinary-style
//! unsigned upload endpoint. The endpoint does no per-user authorization;
//! the destination folder only namespaces a user's files.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::{Client, Request};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url, normalize_text_option, unix_millis_now};

pub const DEFAULT_CLOUDINARY_BASE_URL: &str = "https://api.cloudinary.com";

/// MIME type used when the extension is not in the table.
pub const FALLBACK_MIME_TYPE: &str = "image/jpeg";

/// Fixed extension-to-MIME table. Unlisted extensions upload as
/// [`FALLBACK_MIME_TYPE`].
pub fn mime_type_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "mp4" | "mov" | "avi" => "video/mp4",
        "mp3" | "wav" | "m4a" => "audio/mp3",
        _ => FALLBACK_MIME_TYPE,
    }
}

pub fn mime_type_for(path: &Path) -> &'static str {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map_or(FALLBACK_MIME_TYPE, mime_type_for_extension)
}

/// Unique name for the uploaded part: `<unix_ms>_<random>.<ext>`.
pub fn upload_file_name(extension: Option<&str>) -> String {
    let random = Uuid::now_v7().simple().to_string();
    let suffix = &random[random.len() - 12..];
    match extension.filter(|extension| !extension.is_empty()) {
        Some(extension) => format!("{}_{suffix}.{extension}", unix_millis_now()),
        None => format!("{}_{suffix}", unix_millis_now()),
    }
}

/// One multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    /// Destination folder; the owner's user id.
    pub folder: String,
}

/// Endpoint reply for an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub secure_url: String,
}

/// Remote media storage boundary.
#[async_trait]
pub trait MediaEndpoint: Send + Sync {
    /// Returns only after the binary is durably accepted and its URL known.
    async fn upload(&self, request: UploadRequest) -> Result<UploadedMedia>;
}

/// Unsigned-preset uploads to Cloudinary's `auto/upload` endpoint.
#[derive(Debug, Clone)]
pub struct CloudinaryClient {
    endpoint: String,
    upload_preset: String,
    client: Client,
}

impl CloudinaryClient {
    pub fn new(
        base_url: Option<String>,
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(
            normalize_text_option(base_url)
                .as_deref()
                .unwrap_or(DEFAULT_CLOUDINARY_BASE_URL),
        )?;
        let cloud_name = normalize_text_option(Some(cloud_name.into()))
            .ok_or_else(|| Error::Config("Cloudinary cloud name must not be empty".to_string()))?;
        let upload_preset = normalize_text_option(Some(upload_preset.into())).ok_or_else(|| {
            Error::Config("Cloudinary upload preset must not be empty".to_string())
        })?;
        let client = Client::builder()
            .build()
            .map_err(|error| Error::Config(format!("Failed to construct HTTP client: {error}")))?;

        Ok(Self {
            endpoint: format!(
                "{base_url}/v1_1/{}/auto/upload",
                urlencoding::encode(&cloud_name)
            ),
            upload_preset,
            client,
        })
    }

    /// Returns the upload endpoint this client posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_upload_request(&self, request: UploadRequest) -> Result<Request> {
        let file_part = multipart::Part::bytes(request.bytes)
            .file_name(request.file_name)
            .mime_str(&request.mime_type)?;

        let form = multipart::Form::new()
            .part("file", file_part)
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", request.folder);

        Ok(self.client.post(&self.endpoint).multipart(form).build()?)
    }
}

#[async_trait]
impl MediaEndpoint for CloudinaryClient {
    async fn upload(&self, request: UploadRequest) -> Result<UploadedMedia> {
        tracing::info!(
            "Uploading {} ({}, {} bytes) to folder {}",
            request.file_name,
            request.mime_type,
            request.bytes.len(),
            request.folder
        );
        let request = self.build_upload_request(request)?;
        let response = self.client.execute(request).await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let payload = serde_json::from_str::<CloudinaryResponse>(&body).ok();

        if !status.is_success() {
            let reason = payload
                .and_then(|payload| payload.error)
                .and_then(|error| error.message)
                .unwrap_or_else(|| status.as_u16().to_string());
            return Err(Error::Media(format!("Upload failed: {}", compact_text(&reason))));
        }

        let secure_url = payload
            .and_then(|payload| payload.secure_url)
            .and_then(|url| normalize_text_option(Some(url)))
            .filter(|url| is_http_url(url))
            .ok_or_else(|| {
                Error::Media("Upload failed: response did not include a secure_url".to_string())
            })?;
        tracing::debug!("Upload accepted at {}", secure_url);
        Ok(UploadedMedia { secure_url })
    }
}

#[derive(Debug, Deserialize)]
struct CloudinaryResponse {
    secure_url: Option<String>,
    error: Option<CloudinaryError>,
}

#[derive(Debug, Deserialize)]
struct CloudinaryError {
    message: Option<String>,
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let base = raw.trim().trim_end_matches('/').to_string();
    if base.is_empty() {
        return Err(Error::Config("Media base URL must not be empty".to_string()));
    }
    if !is_http_url(&base) {
        return Err(Error::Config(
            "Media base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(base)
}
