//! Segments: role-tagged units of transcript content, in arrival order.

use super::role::{Role, TaggedLine};
use serde::{Deserialize, Serialize};

/// One parsed unit of conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub role: Role,
    /// Accumulated payload. Speaker segments may span several lines; the rest are one line each.
    pub content: String,
}

impl Segment {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Switches for the parsing variants that existed across product iterations.
///
/// The default is the feature-complete behaviour: no de-duplication, images accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsePolicy {
    /// Drop a line identical to the previously accepted line.
    #[serde(default)]
    pub dedupe_consecutive: bool,
    /// When false, `image:` lines are treated as unrecognised and dropped.
    #[serde(default = "default_true")]
    pub accept_images: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ParsePolicy {
    fn default() -> Self {
        Self {
            dedupe_consecutive: false,
            accept_images: true,
        }
    }
}

/// Parse raw lines into segments with the default policy.
pub fn parse<S: AsRef<str>>(lines: &[S]) -> Vec<Segment> {
    parse_with(lines, ParsePolicy::default())
}

/// Parse raw lines into segments.
///
/// Unrecognised lines are dropped. A line whose role matches the last segment's role is
/// appended to it (no delimiter) when that role is `user` or `assistant`; every other
/// line starts a new segment. Output order is input order.
pub fn parse_with<S: AsRef<str>>(lines: &[S], policy: ParsePolicy) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut previous: Option<&str> = None;

    for line in lines {
        let line = line.as_ref();
        if policy.dedupe_consecutive && previous == Some(line) {
            continue;
        }
        let Some(tagged) = TaggedLine::decode(line) else {
            continue;
        };
        if tagged.role == Role::Image && !policy.accept_images {
            continue;
        }
        previous = Some(line);

        match segments.last_mut() {
            Some(last) if last.role == tagged.role && tagged.role.is_speaker() => {
                last.content.push_str(tagged.content);
            }
            _ => segments.push(Segment::new(tagged.role, tagged.content)),
        }
    }

    segments
}
