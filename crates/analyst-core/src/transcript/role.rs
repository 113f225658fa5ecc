//! Role tags and the `<role>:<content>` decode step.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `<role>:` prefix, at most one separating whitespace character, then the payload.
static TAGGED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(user|assistant|data|code|image):\s?(.*)$")
        .expect("tagged line pattern is a valid regex")
});

/// Who (or what) produced a transcript line. Determines rendering and pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Output of executed code.
    Data,
    /// Code the agent executed.
    Code,
    /// Base64-encoded bitmap (e.g. a chart).
    Image,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::User, Role::Assistant, Role::Data, Role::Code, Role::Image];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Data => "data",
            Role::Code => "code",
            Role::Image => "image",
        }
    }

    /// Case-insensitive lookup of a role tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(tag))
    }

    /// Conversational roles. Consecutive lines of the same speaker merge into one segment.
    pub fn is_speaker(self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw line split into its role and opaque payload. Borrows from the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedLine<'a> {
    pub role: Role,
    pub content: &'a str,
}

impl<'a> TaggedLine<'a> {
    /// Decode one raw line. Returns `None` for anything without a recognised role tag.
    pub fn decode(line: &'a str) -> Option<Self> {
        let caps = TAGGED_LINE.captures(line)?;
        let role = Role::from_tag(caps.get(1)?.as_str())?;
        let content = caps.get(2).map_or("", |m| m.as_str());
        Some(Self { role, content })
    }
}
