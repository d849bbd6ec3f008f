//! Structured-output contracts: the schemas sent to the backend and the checks a
//! structured response passes before it becomes a typed value.
//!
//! Order is fixed: normalize text fields, validate against the schema, deserialize,
//! then run the semantic checks the schema cannot express on its own.

use schemars::schema_for;
use serde_json::{json, Value};

use parley_core::outline::StructuredOutline;
use parley_core::schema;
use parley_core::transcript::{Speaker, Transcript};

use crate::error::PipelineError;

/// Free-text fields of an outline response; `*` walks every array element.
const OUTLINE_TEXT: &[&[&str]] = &[
    &["title"],
    &["segments", "*", "section"],
    &["segments", "*", "topics", "*", "title"],
    &["segments", "*", "topics", "*", "points", "*", "description"],
];

const TRANSCRIPT_TEXT: &[&[&str]] = &[&["scratchpad"], &["dialogue", "*", "text"]];

/// Outline schema derived from [`StructuredOutline`], with `references` restricted
/// to `valid_filenames`.
pub fn outline_schema(valid_filenames: &[String]) -> Result<Value, PipelineError> {
    let mut schema = schema_for!(StructuredOutline).to_value();
    *slot(&mut schema, "/$defs/Segment/properties/references/items")? =
        json!({ "type": "string", "enum": valid_filenames });
    Ok(schema)
}

/// Transcript schema derived from [`Transcript`]. With `single_speaker` only
/// `speaker-1` is a legal tag.
pub fn transcript_schema(single_speaker: bool) -> Result<Value, PipelineError> {
    let mut schema = schema_for!(Transcript).to_value();
    if single_speaker {
        *slot(&mut schema, "/$defs/Speaker/enum")? = json!([Speaker::One.tag()]);
    }
    Ok(schema)
}

fn slot<'a>(schema: &'a mut Value, pointer: &str) -> Result<&'a mut Value, PipelineError> {
    schema
        .pointer_mut(pointer)
        .ok_or_else(|| PipelineError::Internal(format!("derived schema has no {pointer}")))
}

/// Check a structured outline response and turn it into a typed outline.
pub fn parse_outline(
    step: &str,
    mut value: Value,
    valid_filenames: &[String],
) -> Result<StructuredOutline, PipelineError> {
    unescape_fields(&mut value, OUTLINE_TEXT);

    let schema = outline_schema(valid_filenames)?;
    schema::validate(&schema, &value).map_err(|v| PipelineError::schema(step, v))?;

    let outline: StructuredOutline =
        serde_json::from_value(value).map_err(|e| PipelineError::schema(step, e))?;

    if let Some((idx, reference)) = outline.find_foreign_reference(valid_filenames) {
        return Err(PipelineError::schema(
            step,
            format!("segment {idx} references unknown document '{reference}'"),
        ));
    }
    Ok(outline)
}

/// Normalize, check and type a structured transcript response.
pub fn parse_transcript(
    step: &str,
    mut value: Value,
    single_speaker: bool,
) -> Result<Transcript, PipelineError> {
    normalize_transcript(&mut value);

    let schema = transcript_schema(single_speaker)?;
    schema::validate(&schema, &value).map_err(|v| PipelineError::schema(step, v))?;

    let transcript: Transcript =
        serde_json::from_value(value).map_err(|e| PipelineError::schema(step, e))?;

    if single_speaker && transcript.speakers().iter().any(|s| *s != Speaker::One) {
        return Err(PipelineError::schema(step, "monologue transcript has a second speaker"));
    }
    Ok(transcript)
}

/// Decode escape sequences left literally in the transcript's text fields.
pub fn normalize_transcript(value: &mut Value) {
    unescape_fields(value, TRANSCRIPT_TEXT);
}

fn unescape_fields(value: &mut Value, fields: &[&[&str]]) {
    for path in fields {
        unescape_at(value, path);
    }
}

fn unescape_at(value: &mut Value, path: &[&str]) {
    match path.split_first() {
        None => {
            if let Value::String(text) = value {
                if text.contains('\\') {
                    *text = unescape_unicode(text);
                }
            }
        }
        Some((&"*", rest)) => {
            if let Some(items) = value.as_array_mut() {
                for item in items {
                    unescape_at(item, rest);
                }
            }
        }
        Some((key, rest)) => {
            if let Some(child) = value.get_mut(*key) {
                unescape_at(child, rest);
            }
        }
    }
}

/// Decode literal `\uXXXX` (including surrogate pairs), `\UXXXXXXXX`, `\xXX` and the
/// common single-character escapes. Unknown or truncated escapes are kept verbatim.
/// Characters outside ASCII pass through untouched.
pub fn unescape_unicode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(&next) = chars.peek() else {
            out.push('\\');
            break;
        };

        let simple = match next {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            '\\' => Some('\\'),
            '"' => Some('"'),
            '\'' => Some('\''),
            _ => None,
        };
        if let Some(decoded) = simple {
            chars.next();
            out.push(decoded);
            continue;
        }

        let width = match next {
            'u' => 4,
            'U' => 8,
            'x' => 2,
            _ => {
                out.push('\\');
                continue;
            }
        };

        let mut ahead = chars.clone();
        ahead.next();
        let Some(code) = read_hex(&mut ahead, width) else {
            out.push('\\');
            continue;
        };

        if next == 'u' && (0xD800..0xDC00).contains(&code) {
            // High surrogate: only meaningful with a following `\uDC00..\uDFFF`.
            let mut pair = ahead.clone();
            let low = match (pair.next(), pair.next()) {
                (Some('\\'), Some('u')) => read_hex(&mut pair, 4),
                _ => None,
            };
            match low {
                Some(low) if (0xDC00..0xE000).contains(&low) => {
                    let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                    out.push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
                    chars = pair;
                }
                _ => {
                    out.push(char::REPLACEMENT_CHARACTER);
                    chars = ahead;
                }
            }
            continue;
        }

        out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
        chars = ahead;
    }
    out
}

fn read_hex<I: Iterator<Item = char>>(chars: &mut I, width: usize) -> Option<u32> {
    let mut code = 0u32;
    for _ in 0..width {
        let digit = chars.next()?.to_digit(16)?;
        code = (code << 4) | digit;
    }
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::outline::{Point, Segment, Topic};

    fn files() -> Vec<String> {
        vec!["q3.pdf".to_string(), "market.pdf".to_string()]
    }

    fn outline_value(refs: &[&str]) -> Value {
        json!({
            "title": "Quarterly review",
            "segments": [{
                "section": "Intro",
                "topics": [{ "title": "Headline", "points": [{ "description": "Revenue up" }] }],
                "duration": 3,
                "references": refs
            }]
        })
    }

    #[test]
    fn outline_schema_carries_filename_enum() {
        let schema = outline_schema(&files()).unwrap();
        assert_eq!(
            schema["$defs"]["Segment"]["properties"]["references"]["items"]["enum"],
            json!(["q3.pdf", "market.pdf"])
        );
        assert_eq!(schema["properties"]["segments"]["minItems"], 1);
    }

    #[test]
    fn derived_outline_schema_accepts_serialized_outline() {
        let outline = StructuredOutline {
            title: "Quarterly review".into(),
            segments: vec![Segment {
                section: "Intro".into(),
                topics: vec![Topic {
                    title: "Headline".into(),
                    points: vec![Point { description: "Revenue up".into() }],
                }],
                duration: 3,
                references: vec!["market.pdf".into()],
            }],
        };
        let value = serde_json::to_value(&outline).unwrap();
        let schema = outline_schema(&files()).unwrap();
        assert!(schema::validate(&schema, &value).is_ok());

        let mut extra = value.clone();
        extra["segments"][0]["mood"] = json!("upbeat");
        assert!(schema::validate(&schema, &extra).is_err());
    }

    #[test]
    fn transcript_schema_speaker_set() {
        let two = transcript_schema(false).unwrap();
        assert_eq!(two["$defs"]["Speaker"]["enum"], json!(["speaker-1", "speaker-2"]));
        let one = transcript_schema(true).unwrap();
        assert_eq!(one["$defs"]["Speaker"]["enum"], json!(["speaker-1"]));

        let sample = Transcript {
            scratchpad: String::new(),
            dialogue: vec![parley_core::transcript::DialogueLine {
                text: "Revenue grew 12%.".into(),
                speaker: Speaker::Two,
            }],
        };
        let value = serde_json::to_value(&sample).unwrap();
        assert!(schema::validate(&two, &value).is_ok());
        assert!(schema::validate(&one, &value).is_err());
    }

    #[test]
    fn outline_free_text_is_unescaped() {
        let mut value = outline_value(&["q3.pdf"]);
        value["title"] = json!("Caf\\u00e9 review");
        value["segments"][0]["section"] = json!("Caf\\u00e9 sales");
        value["segments"][0]["topics"][0]["title"] = json!("Na\\u00efve plan");
        value["segments"][0]["topics"][0]["points"][0]["description"] = json!("up \\ud83d\\ude80");

        let outline = parse_outline("outline", value, &files()).unwrap();
        assert_eq!(outline.title, "Café review");
        let segment = &outline.segments[0];
        assert_eq!(segment.section, "Café sales");
        assert_eq!(segment.topics[0].title, "Naïve plan");
        assert_eq!(segment.topics[0].points[0].description, "up 🚀");
        assert_eq!(segment.references, vec!["q3.pdf"]);
    }

    #[test]
    fn valid_outline_parses() {
        let outline = parse_outline("outline", outline_value(&["q3.pdf"]), &files()).unwrap();
        assert_eq!(outline.segments.len(), 1);
        assert_eq!(outline.segments[0].references, vec!["q3.pdf"]);
        assert_eq!(outline.segments[0].topics[0].points[0].description, "Revenue up");
    }

    #[test]
    fn outline_with_unknown_reference_is_rejected() {
        let err = parse_outline("outline", outline_value(&["q3.pdf", "ghost.pdf"]), &files())
            .unwrap_err();
        match err {
            PipelineError::SchemaViolation { step, detail } => {
                assert_eq!(step, "outline");
                assert!(detail.starts_with("/segments/0/references/1"), "{detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn outline_missing_field_is_rejected() {
        let mut value = outline_value(&[]);
        value["segments"][0].as_object_mut().unwrap().remove("duration");
        assert!(matches!(
            parse_outline("outline", value, &files()),
            Err(PipelineError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn outline_needs_a_segment() {
        let value = json!({ "title": "Empty", "segments": [] });
        assert!(parse_outline("outline", value, &files()).is_err());
    }

    #[test]
    fn dialogue_transcript_parses_and_normalizes() {
        let value = json!({
            "scratchpad": "open with caf\\u00e9",
            "dialogue": [
                { "text": "Caf\\u00e9 talk\\nnext", "speaker": "speaker-1" },
                { "text": "Sounds good", "speaker": "speaker-2" }
            ]
        });
        let transcript = parse_transcript("final", value, false).unwrap();
        assert_eq!(transcript.dialogue[0].text, "Café talk\nnext");
        assert_eq!(transcript.scratchpad, "open with café");
        assert_eq!(transcript.speakers(), vec![Speaker::One, Speaker::Two]);
    }

    #[test]
    fn monologue_rejects_second_speaker() {
        let value = json!({
            "scratchpad": "",
            "dialogue": [
                { "text": "Revenue grew 12%.", "speaker": "speaker-1" },
                { "text": "Interesting!", "speaker": "speaker-2" }
            ]
        });
        assert!(matches!(
            parse_transcript("final", value, true),
            Err(PipelineError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn unknown_speaker_tag_is_rejected() {
        let value = json!({
            "scratchpad": "",
            "dialogue": [{ "text": "hi", "speaker": "speaker-3" }]
        });
        assert!(parse_transcript("final", value, false).is_err());
    }

    #[test]
    fn unescape_handles_escapes() {
        assert_eq!(unescape_unicode("plain"), "plain");
        assert_eq!(unescape_unicode("a\\u00e9b"), "aéb");
        assert_eq!(unescape_unicode("\\ud83d\\ude00"), "😀");
        assert_eq!(unescape_unicode("\\U0001F600"), "😀");
        assert_eq!(unescape_unicode("\\x41"), "A");
        assert_eq!(unescape_unicode("say \\\"hi\\\"\\t!"), "say \"hi\"\t!");
        assert_eq!(unescape_unicode("back\\\\slash"), "back\\slash");
    }

    #[test]
    fn unescape_keeps_malformed_sequences() {
        assert_eq!(unescape_unicode("\\u12"), "\\u12");
        assert_eq!(unescape_unicode("\\q"), "\\q");
        assert_eq!(unescape_unicode("trailing\\"), "trailing\\");
        assert_eq!(unescape_unicode("\\ud83d alone"), "\u{FFFD} alone");
    }

    #[test]
    fn unescape_preserves_non_ascii() {
        assert_eq!(unescape_unicode("déjà vu \\u00e0"), "déjà vu à");
    }
}
