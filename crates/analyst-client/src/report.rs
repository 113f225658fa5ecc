//! Report request: ask the backend to build and email the analysis report.

use crate::backend::Backend;
use crate::error::{rejection_reason, ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const REPORT_PATH: &str = "/api/report";

#[derive(Debug, Serialize)]
struct ReportRequest<'a> {
    session_id: &'a str,
    email: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReportAck {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "url")]
    pub report_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReportClient {
    backend: Backend,
}

impl ReportClient {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub async fn request_report(&self, session_id: &str, email: &str) -> ClientResult<ReportAck> {
        let email = validate_email(email)?;
        info!("requesting report for session {}", session_id);

        let response = self
            .backend
            .http()
            .post(self.backend.endpoint(REPORT_PATH))
            .json(&ReportRequest { session_id, email })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                reason: rejection_reason(&body, "Report failed"),
            });
        }
        if body.trim().is_empty() {
            return Ok(ReportAck::default());
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn validate_email(email: &str) -> ClientResult<&str> {
    let trimmed = email.trim();
    if trimmed.is_empty() || !trimmed.contains('@') {
        return Err(ClientError::InvalidEmail(email.to_string()));
    }
    Ok(trimmed)
}
