use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Speaker tag. Closed set: at most two voices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Speaker {
    #[serde(rename = "speaker-1")]
    One,
    #[serde(rename = "speaker-2")]
    Two,
}

impl Speaker {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::One => "speaker-1",
            Self::Two => "speaker-2",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DialogueLine {
    pub text: String,
    pub speaker: Speaker,
}

/// The final artifact of a job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Transcript {
    /// Free-form reasoning the backend produced while structuring.
    pub scratchpad: String,
    #[schemars(length(min = 1))]
    pub dialogue: Vec<DialogueLine>,
}

impl Transcript {
    /// Distinct speakers in order of first appearance.
    pub fn speakers(&self) -> Vec<Speaker> {
        let mut seen = Vec::new();
        for line in &self.dialogue {
            if !seen.contains(&line.speaker) {
                seen.push(line.speaker);
            }
        }
        seen
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transcript {
        Transcript {
            scratchpad: "plan: open with revenue".into(),
            dialogue: vec![
                DialogueLine { text: "Welcome back.".into(), speaker: Speaker::One },
                DialogueLine { text: "Revenue grew 12%, café sales 🚀".into(), speaker: Speaker::Two },
                DialogueLine { text: "Indeed.".into(), speaker: Speaker::One },
            ],
        }
    }

    #[test]
    fn bytes_roundtrip_preserves_order_and_tags() {
        let transcript = sample();
        let bytes = transcript.to_bytes().unwrap();
        let parsed = Transcript::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, transcript);
        let tags: Vec<&str> = parsed.dialogue.iter().map(|l| l.speaker.tag()).collect();
        assert_eq!(tags, vec!["speaker-1", "speaker-2", "speaker-1"]);
    }

    #[test]
    fn speaker_serialization() {
        assert_eq!(serde_json::to_string(&Speaker::One).unwrap(), r#""speaker-1""#);
        assert_eq!(serde_json::to_string(&Speaker::Two).unwrap(), r#""speaker-2""#);
        assert!(serde_json::from_str::<Speaker>(r#""speaker-3""#).is_err());
    }

    #[test]
    fn distinct_speakers() {
        assert_eq!(sample().speakers(), vec![Speaker::One, Speaker::Two]);
        let empty = Transcript { scratchpad: String::new(), dialogue: vec![] };
        assert!(empty.speakers().is_empty());
    }
}
