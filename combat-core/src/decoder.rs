//! Structured output decoder.
//!
//! Oracles are asked for a JSON object but send back whatever they like:
//! fenced blocks, chatty prose around the object, single quotes, Python
//! literals, trailing commas. `decode` tries progressively more forgiving
//! strategies and never panics.

use crate::intent::{self, ActionIntent, ValidationError};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// A decoded, not yet validated, record.
pub type Record = Map<String, Value>;

/// Upper bound on repeated passes of an overlapping repair.
const MAX_REPAIR_PASSES: usize = 8;

/// Repairs, cheapest first. Each stage is tried on every candidate before
/// the next one runs.
const REPAIR_STAGES: [fn(&str) -> String; 3] = [strip_trailing_commas, normalize_quotes, repair];

lazy_static! {
    static ref SINGLE_QUOTED: Regex =
        Regex::new(r#"([{,:\[]\s*)'((?:[^'\\]|\\.)*)'(\s*[:,}\]])"#).expect("valid regex");
    static ref TRAILING_COMMA: Regex = Regex::new(r",\s*([}\]])").expect("valid regex");
    static ref UNQUOTED_KEY: Regex =
        Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_\-]*)\s*:").expect("valid regex");
    static ref LOOSE_TOKEN: Regex =
        Regex::new(r"([:\[,]\s*)(None|undefined|NULL|Null|True|False)\b").expect("valid regex");
    static ref UNQUOTED_VALUE: Regex =
        Regex::new(r#"(:\s*)([A-Za-z_][^,}\]\n"]*?)(\s*(?:[,}\]\n]|$))"#).expect("valid regex");
    static ref KEY_VALUE: Regex = Regex::new(
        r#"["']?([A-Za-z_][A-Za-z0-9_ ]*?)["']?\s*[:=]\s*("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|[^,\n}]+)"#
    )
    .expect("valid regex");
}

/// Every strategy failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not decode oracle output: {error}")]
pub struct DecodeFailure {
    pub error: String,
    pub raw_text: String,
}

/// Decode or validation failure for a full intent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error(transparent)]
    Decode(#[from] DecodeFailure),
    #[error("invalid intent: {0}")]
    Invalid(#[from] ValidationError),
}

/// Decode raw oracle text into a JSON object.
pub fn decode(raw: &str) -> Result<Record, DecodeFailure> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(DecodeFailure {
            error: "empty response".to_string(),
            raw_text: raw.to_string(),
        });
    }

    let mut candidates = vec![text];
    candidates.extend(fenced_block(text, true));
    candidates.extend(fenced_block(text, false));
    candidates.extend(brace_span(text));

    let mut last_error = String::from("no JSON object found");
    for candidate in &candidates {
        match parse_object(candidate) {
            Ok(record) => return Ok(record),
            Err(e) => last_error = e,
        }
    }

    // Narrowest first, so prose around an object is never repaired into it.
    let narrow_first: Vec<&str> = candidates
        .iter()
        .skip(1)
        .chain(candidates.first())
        .copied()
        .collect();
    for stage in REPAIR_STAGES {
        for candidate in &narrow_first {
            let repaired = stage(candidate);
            if repaired == *candidate {
                continue;
            }
            if let Ok(record) = parse_object(&repaired) {
                tracing::debug!(repaired = %repaired, "decoded oracle output after repairs");
                return Ok(record);
            }
        }
    }

    let record = extract_pairs(text);
    if !record.is_empty() {
        tracing::debug!(fields = record.len(), "decoded oracle output by key/value extraction");
        return Ok(record);
    }

    Err(DecodeFailure {
        error: last_error,
        raw_text: raw.to_string(),
    })
}

/// Decode and validate, reporting why a fallback would be needed.
pub fn try_decode_intent(raw: &str) -> Result<ActionIntent, IntentError> {
    let record = decode(raw)?;
    Ok(intent::validate(&record)?)
}

/// Decode and validate, degrading to the neutral intent on any failure.
pub fn decode_intent(raw: &str) -> ActionIntent {
    match try_decode_intent(raw) {
        Ok(intent) => intent,
        Err(e) => {
            tracing::warn!(error = %e, "falling back to neutral intent");
            ActionIntent::neutral()
        }
    }
}

fn parse_object(text: &str) -> Result<Record, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(_) => Err("response is JSON but not an object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Contents of the first fenced block, optionally only a ```json one.
fn fenced_block(text: &str, labeled: bool) -> Option<&str> {
    let content_start = if labeled {
        text.to_ascii_lowercase().find("```json")? + "```json".len()
    } else {
        let start = text.find("```")? + 3;
        // Skip an info string such as ```javascript.
        let after = &text[start..];
        let line_end = after.find('\n').map(|i| i + 1).unwrap_or(0);
        if after[..line_end].trim().starts_with('{') {
            start
        } else {
            start + line_end
        }
    };
    let end = text[content_start..].find("```")?;
    Some(text[content_start..content_start + end].trim())
}

/// Everything from the first `{` to the last `}`.
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

// ============================================================================
// Repairs
// ============================================================================

fn strip_trailing_commas(candidate: &str) -> String {
    outside_strings(candidate, |t| TRAILING_COMMA.replace_all(t, "$1").into_owned())
}

/// Curly quotes and single-quoted strings become plain JSON strings.
fn normalize_quotes(candidate: &str) -> String {
    let text = candidate
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let text = until_stable(&text, |t| {
        outside_strings(t, |segment| {
            SINGLE_QUOTED
                .replace_all(segment, |caps: &Captures| {
                    format!("{}\"{}\"{}", &caps[1], caps[2].replace('"', "\\\""), &caps[3])
                })
                .into_owned()
        })
    });
    strip_trailing_commas(&text)
}

/// Everything: quotes, loose literals, bare keys and values, separators.
fn repair(candidate: &str) -> String {
    let mut text = normalize_quotes(candidate);
    if !text.trim_start().starts_with('{') {
        text = format!("{{{}}}", text.trim());
    }

    text = until_stable(&text, |t| {
        outside_strings(t, |segment| {
            LOOSE_TOKEN
                .replace_all(segment, |caps: &Captures| {
                    let token = match &caps[2] {
                        "True" => "true",
                        "False" => "false",
                        _ => "null",
                    };
                    format!("{}{}", &caps[1], token)
                })
                .into_owned()
        })
    });
    text = outside_strings(&text, |segment| {
        UNQUOTED_KEY.replace_all(segment, "$1\"$2\":").into_owned()
    });
    text = outside_strings(&text, |segment| {
        UNQUOTED_VALUE
            .replace_all(segment, |caps: &Captures| {
                let value = caps[2].trim();
                if matches!(value, "true" | "false" | "null") {
                    caps[0].to_string()
                } else {
                    format!("{}\"{}\"{}", &caps[1], value, &caps[3])
                }
            })
            .into_owned()
    });
    strip_trailing_commas(&text)
}

/// Run `pass` over the parts of `text` outside double-quoted strings,
/// leaving string contents untouched. An unterminated string runs to the
/// end of the text.
fn outside_strings(text: &str, pass: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut segment_start = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
                out.push_str(&text[segment_start..=i]);
                segment_start = i + 1;
            }
        } else if ch == '"' {
            out.push_str(&pass(&text[segment_start..i]));
            segment_start = i;
            in_string = true;
        }
    }
    let rest = &text[segment_start..];
    if in_string {
        out.push_str(rest);
    } else {
        out.push_str(&pass(rest));
    }
    out
}

fn until_stable(text: &str, pass: impl Fn(&str) -> String) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_REPAIR_PASSES {
        let next = pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

// ============================================================================
// Key/value extraction
// ============================================================================

fn extract_pairs(text: &str) -> Record {
    let mut record = Record::new();
    for caps in KEY_VALUE.captures_iter(text) {
        let key = caps[1].trim().to_lowercase().replace(' ', "_");
        if key.is_empty() || record.contains_key(&key) {
            continue;
        }
        record.insert(key, coerce_scalar(caps[2].trim()));
    }
    record
}

fn coerce_scalar(raw: &str) -> Value {
    let quoted = raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')));
    if quoted {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }
    match raw.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "none" | "undefined" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}
