//! Owned transcript state: the raw-line buffer plus the sequences derived from it.

use super::render::{render, RenderUnit};
use super::segment::{parse_with, ParsePolicy, Segment};
use tracing::trace;

/// Append-only line buffer that re-derives segments and rendering units on every line.
///
/// One interpreter per stream. A reconnect must start from [`TranscriptInterpreter::new`]
/// (or [`clear`](Self::clear)) so two logical sessions are never conflated.
#[derive(Debug, Clone, Default)]
pub struct TranscriptInterpreter {
    policy: ParsePolicy,
    lines: Vec<String>,
    segments: Vec<Segment>,
    units: Vec<RenderUnit>,
}

impl TranscriptInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ParsePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Append one raw line and re-derive. Empty or whitespace-only lines are ignored.
    ///
    /// Returns whether the line entered the buffer. An accepted line may still be dropped
    /// by parsing if it carries no role tag.
    pub fn ingest(&mut self, line: &str) -> bool {
        if line.trim().is_empty() {
            return false;
        }
        self.lines.push(line.to_owned());
        self.rederive();
        trace!(
            lines = self.lines.len(),
            segments = self.segments.len(),
            units = self.units.len(),
            "transcript re-derived"
        );
        true
    }

    /// Ingest every line of a multi-line event payload, in order. Returns the accepted count.
    pub fn ingest_message(&mut self, message: &str) -> usize {
        message
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| self.ingest(line))
            .count()
    }

    fn rederive(&mut self) {
        self.segments = parse_with(&self.lines, self.policy);
        self.units = render(&self.segments);
    }

    pub fn policy(&self) -> ParsePolicy {
        self.policy
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn units(&self) -> &[RenderUnit] {
        &self.units
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Drop all state, keeping the policy.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.segments.clear();
        self.units.clear();
    }
}
