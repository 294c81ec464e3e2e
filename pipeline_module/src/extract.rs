//! Pulls one structured candidate out of a model's free-form answer.
//!
//! Models wrap their JSON in commentary, code fences, or nothing at all.
//! Isolation is a fixed three-tier search (json-tagged fence, any fence,
//! whole output) with a single parse attempt on whichever substring wins.

use serde_json::Value;

use crate::errors::ExtractError;
use crate::types::ExtractionCandidate;

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Parse the model output into a candidate. Fails with
/// [`ExtractError::MalformedResponse`] when no JSON object can be isolated
/// or the required task/title field is missing; callers treat that as "no
/// candidate extracted", never as fatal.
pub fn parse_candidate(model_output: &str) -> Result<ExtractionCandidate, ExtractError> {
    let payload = isolate_json_payload(model_output);
    let value: Value = serde_json::from_str(payload)
        .map_err(|err| ExtractError::MalformedResponse(err.to_string()))?;

    let task_text = required_field(&value, "task")
        .or_else(|| required_field(&value, "title"))
        .ok_or_else(|| {
            ExtractError::MalformedResponse("missing required task/title field".to_string())
        })?;

    // The instructions ask for "date" (chat/manual kinds) or "event_date"
    // (email kind); accept either. The "none" sentinel is kept verbatim
    // for the date resolver.
    let raw_date_text =
        required_field(&value, "date").or_else(|| required_field(&value, "event_date"));

    Ok(ExtractionCandidate {
        task_text,
        raw_date_text,
        location: optional_field(&value, "location"),
        details: optional_field(&value, "details"),
        is_time_sensitive: flag_field(&value, "is_time_sensitive"),
        source_message_id: None,
    })
}

fn isolate_json_payload(output: &str) -> &str {
    if let Some(block) = fenced_block(output, JSON_FENCE) {
        return block;
    }
    if let Some(block) = fenced_block(output, FENCE) {
        return block;
    }
    output.trim()
}

fn fenced_block<'a>(output: &'a str, fence: &str) -> Option<&'a str> {
    let start = output.find(fence)? + fence.len();
    let rest = &output[start..];
    let end = rest.find(FENCE)?;
    Some(rest[..end].trim())
}

fn required_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Like [`required_field`] but treats the "none"/"null" sentinels as
/// absent, since the model emits them for optional fields.
fn optional_field(value: &Value, key: &str) -> Option<String> {
    required_field(value, key)
        .filter(|text| !text.eq_ignore_ascii_case("none") && !text.eq_ignore_ascii_case("null"))
}

fn flag_field(value: &Value, key: &str) -> bool {
    match value.get(key) {
        Some(Value::Bool(flag)) => *flag,
        // Models occasionally answer the yes/no question literally.
        Some(Value::String(text)) => {
            matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "yes")
        }
        _ => false,
    }
}
