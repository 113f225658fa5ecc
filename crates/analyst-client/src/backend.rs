//! Shared handle to the analysis backend: base URL plus configured HTTP clients.

use crate::error::{ClientError, ClientResult};
use analyst_core::AnalystConfig;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cheap to clone; the underlying `reqwest::Client`s are reference counted.
#[derive(Debug, Clone)]
pub struct Backend {
    config: AnalystConfig,
    http: reqwest::Client,
    streaming: reqwest::Client,
}

impl Backend {
    /// Build clients from configuration.
    ///
    /// Request/response calls get the configured total timeout. Event streams are
    /// long-lived, so their client only bounds the connect phase.
    pub fn new(config: AnalystConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout())
            .build()
            .map_err(ClientError::Http)?;
        let streaming = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(ClientError::Http)?;
        Ok(Self {
            config,
            http,
            streaming,
        })
    }

    /// Build from [`AnalystConfig::load`]: config file, `ANALYST__*`, then legacy `BACKEND_URL`.
    pub fn load() -> ClientResult<Self> {
        Self::new(AnalystConfig::load()?)
    }

    pub fn config(&self) -> &AnalystConfig {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn streaming(&self) -> &reqwest::Client {
        &self.streaming
    }

    pub fn endpoint(&self, path: &str) -> String {
        self.config.endpoint(path)
    }
}
