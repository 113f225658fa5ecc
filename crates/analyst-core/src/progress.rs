//! Background enrichment progress.
//!
//! The backend enriches the uploaded dataset row by row and reports on a second event
//! stream with messages like `Enriched row 12/40. View: https://...`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ENRICHED_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Enriched row (\d+)(?:/(\d+))?(?:\. View: (https?://\S+))?")
        .expect("enrichment pattern is a valid regex")
});

/// Running enrichment state. Fields only move forward with the messages that carry them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentProgress {
    pub current: u64,
    pub total: u64,
    /// Link to the live sheet, once announced.
    pub sheet_url: Option<String>,
}

impl EnrichmentProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known row count (e.g. from the upload step).
    pub fn with_total(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Apply one stream message. Returns false when the message is not a progress report.
    pub fn observe(&mut self, message: &str) -> bool {
        let Some(caps) = ENRICHED_ROW.captures(message) else {
            return false;
        };
        let Some(current) = caps.get(1).and_then(|m| m.as_str().parse().ok()) else {
            return false;
        };
        self.current = current;
        if let Some(total) = caps.get(2).and_then(|m| m.as_str().parse().ok()) {
            self.total = total;
        }
        if let Some(url) = caps.get(3) {
            self.sheet_url = Some(url.as_str().to_string());
        }
        true
    }

    /// Completion percentage, clamped to 100. Zero while the total is unknown.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f64 / self.total as f64 * 100.0).min(100.0)
    }

    pub fn is_started(&self) -> bool {
        self.current > 0
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.current >= self.total
    }
}
