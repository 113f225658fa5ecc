//! Transcript stream interpreter.
//!
//! The backend pushes one `<role>:<content>` line per event. This module turns the
//! accumulated lines into a structured conversation in two pure steps:
//!
//! ```text
//!   raw lines ──decode──▶ TaggedLine ──parse──▶ Segment ──render──▶ RenderUnit
//!                 (drop malformed)      (merge speakers)    (pair code + data)
//! ```
//!
//! [`TranscriptInterpreter`] owns the raw-line buffer and re-derives both sequences
//! after every accepted line.

mod interpreter;
mod render;
mod role;
mod segment;

pub use interpreter::TranscriptInterpreter;
pub use render::{
    expand_escaped_newlines, render, Alignment, ChatBubble, CodeResult, ImageCard, RenderUnit,
    ResultBlock,
};
pub use role::{Role, TaggedLine};
pub use segment::{parse, parse_with, ParsePolicy, Segment};
