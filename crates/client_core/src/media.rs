use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use shared::error::{ApiError, ApiResult, ErrorCode};
use tracing::{info, warn};

pub const DEFAULT_UPLOAD_PRESET: &str = "RANGKUL";

#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Third-party image hosting; returns the public URL of the stored file.
#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload(&self, upload: PhotoUpload, folder: &str) -> ApiResult<String>;
}

/// Used when no upload endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct MissingMediaHost;

#[async_trait]
impl MediaHost for MissingMediaHost {
    async fn upload(&self, _upload: PhotoUpload, _folder: &str) -> ApiResult<String> {
        Err(ApiError::new(
            ErrorCode::Unavailable,
            "Photo uploads are not configured",
        ))
    }
}

/// Unsigned multipart upload to a hosted image service.
#[derive(Debug, Clone)]
pub struct HttpMediaHost {
    http: Client,
    upload_url: String,
    upload_preset: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<UploadFailure>,
}

#[derive(Debug, Deserialize)]
struct UploadFailure {
    message: String,
}

impl HttpMediaHost {
    pub fn new(upload_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            upload_url: upload_url.into(),
            upload_preset: DEFAULT_UPLOAD_PRESET.to_string(),
        }
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.upload_preset = preset.into();
        self
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }
}

#[async_trait]
impl MediaHost for HttpMediaHost {
    async fn upload(&self, upload: PhotoUpload, folder: &str) -> ApiResult<String> {
        let size = upload.bytes.len();
        let file = multipart::Part::bytes(upload.bytes)
            .file_name(upload.filename.clone())
            .mime_str(&upload.mime_type)
            .map_err(|err| ApiError::validation(format!("Invalid file type: {err}")))?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", folder.to_string());

        let response = self
            .http
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(unavailable)?;
        let status = response.status();
        let body: UploadResponse = response.json().await.map_err(unavailable)?;

        if let Some(failure) = body.error {
            warn!(%status, message = %failure.message, "photo upload rejected");
            return Err(ApiError::new(ErrorCode::Unavailable, failure.message));
        }
        if !status.is_success() {
            return Err(ApiError::new(
                ErrorCode::Unavailable,
                format!("Upload failed with status {status}"),
            ));
        }
        let url = body
            .secure_url
            .ok_or_else(|| ApiError::internal("Upload response did not include a URL"))?;
        info!(filename = %upload.filename, size, folder, "photo uploaded");
        Ok(url)
    }
}

fn unavailable(err: reqwest::Error) -> ApiError {
    ApiError::new(ErrorCode::Unavailable, format!("Upload failed: {err}"))
}

#[cfg(test)]
#[path = "tests/media_tests.rs"]
mod tests;
