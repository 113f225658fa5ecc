//! Client configuration.
//!
//! Precedence (lowest to highest): built-in defaults → TOML file (`ANALYST_CONFIG`,
//! default `config/analyst.toml`, optional) → `ANALYST__*` environment variables.

use crate::error::CoreResult;
use crate::transcript::ParsePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:7860";

/// 20 MiB, the backend's upload ceiling.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

const DEFAULT_CONFIG_PATH: &str = "config/analyst.toml";

const LEGACY_BACKEND_VARS: [&str; 2] = ["BACKEND_URL", "NEXT_PUBLIC_BACKEND_URL"];

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_ice_gathering_timeout_ms() -> u64 {
    2000
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_transcript_path() -> String {
    "/api/transcript-events".to_string()
}

fn default_progress_path() -> String {
    "/api/enrichment-events".to_string()
}

fn default_true() -> bool {
    true
}

/// Configuration shared by every collaborator.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | ANALYST__BACKEND_URL | http://localhost:7860 | Analysis backend base URL. `BACKEND_URL`, then `NEXT_PUBLIC_BACKEND_URL`, apply when it is unset. |
/// | ANALYST__REQUEST_TIMEOUT_SECS | 30 | Timeout for request/response calls (not event streams). |
/// | ANALYST__ICE_GATHERING_TIMEOUT_MS | 2000 | Upper bound on waiting for ICE gathering before sending the offer. |
/// | ANALYST__MAX_UPLOAD_BYTES | 20 MiB | Local size check before uploading a dataset. |
/// | ANALYST__TRANSCRIPT_PATH | /api/transcript-events | Transcript event stream path. |
/// | ANALYST__PROGRESS_PATH | /api/enrichment-events | Enrichment progress event stream path. |
/// | ANALYST__DEDUPE_CONSECUTIVE | false | Drop repeated transcript lines. |
/// | ANALYST__ACCEPT_IMAGES | true | Keep `image:` transcript lines. |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalystConfig {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_ice_gathering_timeout_ms")]
    pub ice_gathering_timeout_ms: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_transcript_path")]
    pub transcript_path: String,
    #[serde(default = "default_progress_path")]
    pub progress_path: String,
    #[serde(default)]
    pub dedupe_consecutive: bool,
    #[serde(default = "default_true")]
    pub accept_images: bool,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
            ice_gathering_timeout_ms: default_ice_gathering_timeout_ms(),
            max_upload_bytes: default_max_upload_bytes(),
            transcript_path: default_transcript_path(),
            progress_path: default_progress_path(),
            dedupe_consecutive: false,
            accept_images: true,
        }
    }
}

impl AnalystConfig {
    /// Load from `ANALYST_CONFIG` (or `config/analyst.toml`) and `ANALYST__*` variables.
    pub fn load() -> CoreResult<Self> {
        let path = std::env::var("ANALYST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load with an explicit file. A missing file is not an error.
    pub fn load_from(path: &Path) -> CoreResult<Self> {
        let builder = config::Config::builder();
        let builder = if path.exists() {
            debug!("loading configuration from {}", path.display());
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("ANALYST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: Self = built.try_deserialize()?;
        loaded.apply_legacy_backend_url(|name| std::env::var(name).ok());
        Ok(loaded)
    }

    /// Honour the variables the web front ends used, `BACKEND_URL` then
    /// `NEXT_PUBLIC_BACKEND_URL`, unless `ANALYST__BACKEND_URL` is set.
    fn apply_legacy_backend_url(&mut self, var: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| {
            var(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if lookup("ANALYST__BACKEND_URL").is_some() {
            return;
        }
        if let Some(url) = LEGACY_BACKEND_VARS.iter().find_map(|&name| lookup(name)) {
            debug!("backend URL taken from legacy environment variable");
            self.backend_url = url;
        }
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }

    /// Absolute URL for a backend path (`/api/...`).
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.backend_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ice_gathering_timeout(&self) -> Duration {
        Duration::from_millis(self.ice_gathering_timeout_ms)
    }

    pub fn parse_policy(&self) -> ParsePolicy {
        ParsePolicy {
            dedupe_consecutive: self.dedupe_consecutive,
            accept_images: self.accept_images,
        }
    }

    pub fn to_toml(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_path(&self, path: &Path) -> CoreResult<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }
}
