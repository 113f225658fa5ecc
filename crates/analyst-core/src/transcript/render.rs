//! Rendering units: display-ready groupings of one or two segments.

use super::role::Role;
use super::segment::Segment;
use crate::error::CoreResult;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Horizontal placement of a chat bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Right,
}

/// A user or assistant utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBubble {
    pub role: Role,
    pub text: String,
}

impl ChatBubble {
    /// User bubbles sit on the right, assistant bubbles on the left.
    pub fn alignment(&self) -> Alignment {
        match self.role {
            Role::User => Alignment::Right,
            _ => Alignment::Left,
        }
    }
}

/// Executed code and the output it produced. `result` is empty when no output followed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeResult {
    pub code: String,
    pub result: String,
}

impl CodeResult {
    pub fn has_result(&self) -> bool {
        !self.result.is_empty()
    }
}

/// Output that was not directly preceded by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBlock {
    pub output: String,
}

/// An inline image. The payload is kept exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCard {
    pub payload: String,
}

impl ImageCard {
    /// Decode the base64 payload into bitmap bytes.
    pub fn decode(&self) -> CoreResult<Vec<u8>> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(self.payload.trim())?;
        Ok(bytes)
    }

    /// Decoded size estimated from the payload length.
    pub fn approx_bytes(&self) -> usize {
        let trimmed = self.payload.trim().trim_end_matches('=');
        trimmed.len() * 3 / 4
    }
}

/// A display-ready node of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderUnit {
    Bubble(ChatBubble),
    CodeResult(CodeResult),
    Result(ResultBlock),
    Image(ImageCard),
}

/// Expand literal `\n` escape sequences (backslash + `n`) into line breaks.
pub fn expand_escaped_newlines(text: &str) -> String {
    text.replace("\\n", "\n")
}

/// Build rendering units from segments.
///
/// Left-to-right scan with one segment of lookahead: a `code` segment swallows an
/// immediately following `data` segment as its result. Every segment is visited exactly
/// once. Escaped newlines in code and output are expanded here, not during parsing.
pub fn render(segments: &[Segment]) -> Vec<RenderUnit> {
    let mut units = Vec::with_capacity(segments.len());
    let mut index = 0;

    while let Some(segment) = segments.get(index) {
        let unit = match segment.role {
            Role::Code => {
                let paired = segments
                    .get(index + 1)
                    .filter(|next| next.role == Role::Data);
                if paired.is_some() {
                    index += 1;
                }
                RenderUnit::CodeResult(CodeResult {
                    code: expand_escaped_newlines(&segment.content),
                    result: paired
                        .map(|data| expand_escaped_newlines(&data.content))
                        .unwrap_or_default(),
                })
            }
            Role::Data => RenderUnit::Result(ResultBlock {
                output: expand_escaped_newlines(&segment.content),
            }),
            Role::Image => RenderUnit::Image(ImageCard {
                payload: segment.content.clone(),
            }),
            Role::User | Role::Assistant => RenderUnit::Bubble(ChatBubble {
                role: segment.role,
                text: segment.content.clone(),
            }),
        };
        units.push(unit);
        index += 1;
    }

    units
}

fn write_indented(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for line in text.lines() {
        writeln!(f, "    {}", line)?;
    }
    Ok(())
}

impl fmt::Display for RenderUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderUnit::Bubble(bubble) => match bubble.alignment() {
                Alignment::Right => write!(f, "{:>60}", format!("{} ◂ you", bubble.text)),
                Alignment::Left => write!(f, "analyst ▸ {}", bubble.text),
            },
            RenderUnit::CodeResult(block) => {
                writeln!(f, "┌ code")?;
                write_indented(f, &block.code)?;
                if block.has_result() {
                    writeln!(f, "├ result")?;
                    write_indented(f, &block.result)?;
                }
                write!(f, "└")
            }
            RenderUnit::Result(block) => {
                writeln!(f, "┌ result")?;
                write_indented(f, &block.output)?;
                write!(f, "└")
            }
            RenderUnit::Image(image) => {
                write!(f, "[image, ~{} bytes]", image.approx_bytes())
            }
        }
    }
}
