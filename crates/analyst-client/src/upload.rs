//! Dataset upload: send the CSV for a session to the backend.
//!
//! The backend only accepts CSV files up to 20 MiB; both limits are checked locally
//! first so an obviously bad file never leaves the machine.

use crate::backend::Backend;
use crate::error::{rejection_reason, ClientError, ClientResult};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

pub const UPLOAD_PATH: &str = "/api/upload-csv";

/// What the backend reported about a stored upload. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default, alias = "fileName")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct UploadClient {
    backend: Backend,
    max_bytes: u64,
}

impl UploadClient {
    pub fn new(backend: Backend) -> Self {
        let max_bytes = backend.config().max_upload_bytes;
        Self { backend, max_bytes }
    }

    /// Upload a CSV file from disk.
    pub async fn upload_csv(
        &self,
        path: impl AsRef<Path>,
        session_id: &str,
    ) -> ClientResult<UploadReceipt> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClientError::InvalidUpload(format!("{} has no file name", path.display())))?;
        validate_csv_name(file_name)?;

        let size = tokio::fs::metadata(path).await?.len();
        self.check_size(size)?;

        let bytes = tokio::fs::read(path).await?;
        self.upload_bytes(file_name, bytes, session_id).await
    }

    /// Upload CSV content already in memory under `file_name`.
    pub async fn upload_bytes(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        session_id: &str,
    ) -> ClientResult<UploadReceipt> {
        validate_csv_name(file_name)?;
        self.check_size(bytes.len() as u64)?;

        info!("uploading {} ({} bytes) for session {}", file_name, bytes.len(), session_id);
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let form = Form::new().part("file", part);

        let response = self
            .backend
            .http()
            .post(self.backend.endpoint(UPLOAD_PATH))
            .query(&[("session_id", session_id)])
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                reason: rejection_reason(&body, "Upload failed"),
            });
        }

        let mut receipt: UploadReceipt = if body.trim().is_empty() {
            UploadReceipt::default()
        } else {
            serde_json::from_str(&body)?
        };
        if receipt.session_id.is_none() {
            receipt.session_id = Some(session_id.to_string());
        }
        Ok(receipt)
    }

    fn check_size(&self, size: u64) -> ClientResult<()> {
        if size > self.max_bytes {
            return Err(ClientError::InvalidUpload(format!(
                "file is {} bytes; maximum is {} bytes",
                size, self.max_bytes
            )));
        }
        Ok(())
    }
}

fn validate_csv_name(file_name: &str) -> ClientResult<()> {
    if file_name.to_lowercase().ends_with(".csv") {
        Ok(())
    } else {
        Err(ClientError::InvalidUpload(format!(
            "only CSV files are allowed, got {}",
            file_name
        )))
    }
}
