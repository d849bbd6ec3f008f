use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Point {
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Topic {
    pub title: String,
    pub points: Vec<Point>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Segment {
    pub section: String,
    pub topics: Vec<Topic>,
    /// Target length in minutes.
    pub duration: u32,
    /// Filenames of source documents this segment draws on.
    pub references: Vec<String>,
}

/// Structured outline. Segment order is the processing order and the merge order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StructuredOutline {
    pub title: String,
    #[schemars(length(min = 1))]
    pub segments: Vec<Segment>,
}

impl StructuredOutline {
    /// First reference that is not one of `valid`, with its segment index.
    pub fn find_foreign_reference(&self, valid: &[String]) -> Option<(usize, &str)> {
        self.segments.iter().enumerate().find_map(|(idx, seg)| {
            seg.references
                .iter()
                .find(|r| !valid.contains(r))
                .map(|r| (idx, r.as_str()))
        })
    }
}

/// Stable identifier for a segment, derived from its position in the outline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey(pub usize);

impl SegmentKey {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment_transcript_{}", self.0)
    }
}

/// Expanded section text for one segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentArtifact {
    pub key: SegmentKey,
    pub text: String,
}

/// Dialogue for one segment, waiting to be merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogueFragment {
    pub key: SegmentKey,
    pub section: String,
    pub dialogue: String,
}
