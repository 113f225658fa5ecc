//! # analyst-core
//!
//! Framework-independent logic behind the voice analyst client:
//!
//! - [`transcript`]: the transcript stream interpreter. Raw `<role>:<content>` lines go in,
//!   ordered segments and display-ready rendering units come out.
//! - [`progress`]: background enrichment progress parsed from its own event stream.
//! - [`config`]: layered configuration (defaults, TOML file, `ANALYST__*` environment).
//!
//! Nothing in this crate performs I/O on its own except configuration loading; the
//! network collaborators live in `analyst-client`.

pub mod config;
pub mod error;
pub mod progress;
pub mod transcript;

pub use self::config::{AnalystConfig, DEFAULT_BACKEND_URL, DEFAULT_MAX_UPLOAD_BYTES};
pub use error::{CoreError, CoreResult};
pub use progress::EnrichmentProgress;
pub use transcript::{
    expand_escaped_newlines, parse, parse_with, render, Alignment, ChatBubble, CodeResult,
    ImageCard, ParsePolicy, RenderUnit, ResultBlock, Role, Segment, TaggedLine,
    TranscriptInterpreter,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
