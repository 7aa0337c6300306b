//! Validation of provider-extracted patterns.

use serde_json::Value;

use super::error::{PatternError, PatternResult};
use super::pattern::PatternPayload;
use crate::escalation::provider::ExtractedPattern;

/// Longest phrase accepted in any payload field.
pub const MAX_PHRASE_CHARS: usize = 200;

fn invalid(reason: impl Into<String>) -> PatternError {
    PatternError::InvalidPattern(reason.into())
}

fn check_phrase(field: &str, value: &str) -> PatternResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(format!("{field} is empty")));
    }
    if trimmed.chars().count() > MAX_PHRASE_CHARS {
        return Err(invalid(format!("{field} exceeds {MAX_PHRASE_CHARS} chars")));
    }
    Ok(())
}

/// Decode the untyped payload into the typed form for its kind.
pub fn parse_extracted(extracted: &ExtractedPattern) -> PatternResult<PatternPayload> {
    let Value::Object(fields) = &extracted.payload else {
        return Err(invalid("payload is not an object"));
    };
    let mut tagged = fields.clone();
    tagged.insert("kind".to_string(), Value::String(extracted.kind.to_string()));
    let payload: PatternPayload = serde_json::from_value(Value::Object(tagged))
        .map_err(|e| invalid(format!("malformed {} payload: {}", extracted.kind, e)))?;
    validate(&payload, extracted.confidence)?;
    Ok(payload)
}

pub fn validate(payload: &PatternPayload, confidence: f64) -> PatternResult<()> {
    if !(0.0..=1.0).contains(&confidence) {
        // NaN fails the range check too.
        return Err(invalid(format!("confidence {confidence} outside [0, 1]")));
    }
    match payload {
        PatternPayload::Keyword { scenario_id, phrase }
        | PatternPayload::NegativeKeyword { scenario_id, phrase } => {
            check_phrase("scenario_id", scenario_id.as_str())?;
            check_phrase("phrase", phrase)
        }
        PatternPayload::Synonym { variant, canonical } => {
            check_phrase("variant", variant)?;
            check_phrase("canonical", canonical)?;
            if variant.trim().eq_ignore_ascii_case(canonical.trim()) {
                return Err(invalid("synonym variant equals canonical"));
            }
            Ok(())
        }
        PatternPayload::Filler { word } => check_phrase("word", word),
        PatternPayload::NewScenario { triggers, reply, .. } => {
            if triggers.iter().all(|t| t.trim().is_empty()) {
                return Err(invalid("new scenario has no triggers"));
            }
            for t in triggers {
                check_phrase("trigger", t)?;
            }
            check_phrase("reply", reply)
        }
    }
}
