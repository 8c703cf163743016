//! Shaping of the final assistant message into the caller's output.
//!
//! Free text goes through at most one paragraph-trimming heuristic and is then
//! coerced according to the requested [`OutputFormat`]. A schema-bound answer
//! skips both and returns the parsed call arguments.

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::error::OutputError;
use crate::message::ChatMessage;
use crate::request::{OutputFormat, RequestSpec, TrimMode};

/// Paragraph separator used by the trimming heuristics.
const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// The shaped output of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    /// Free text.
    Text(String),
    /// Numeric coercion of the text; may be NaN.
    Number(f64),
    /// Text parsed as JSON.
    Json(Value),
    /// Parsed arguments of a schema-bound call.
    Structured(Value),
}

impl OutputValue {
    /// The text, for [`OutputValue::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The number, for [`OutputValue::Number`].
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The JSON value, for [`OutputValue::Json`] and [`OutputValue::Structured`].
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) | Self::Structured(value) => Some(value),
            _ => None,
        }
    }
}

/// Largest integer an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Serialize for OutputValue {
    #[allow(clippy::cast_possible_truncation)]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::Number(n) if !n.is_finite() => serializer.serialize_none(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Json(value) | Self::Structured(value) => value.serialize(serializer),
        }
    }
}

/// The caller-facing reply: `{"response": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// The shaped output.
    pub response: OutputValue,
}

/// Drop the first paragraph and the last two.
///
/// Only applies with more than two paragraphs. If nothing would remain, the
/// text is returned whole.
#[must_use]
pub fn trim(text: &str) -> String {
    let pieces: Vec<&str> = text.split(PARAGRAPH_SEPARATOR).collect();
    if pieces.len() <= 2 {
        return text.to_string();
    }
    let kept = pieces[1..pieces.len() - 2].join(PARAGRAPH_SEPARATOR);
    if kept.is_empty() {
        text.to_string()
    } else {
        kept
    }
}

/// Drop the first paragraph. Only applies with more than two paragraphs.
#[must_use]
pub fn trim_front(text: &str) -> String {
    let pieces: Vec<&str> = text.split(PARAGRAPH_SEPARATOR).collect();
    if pieces.len() <= 2 {
        return text.to_string();
    }
    pieces[1..].join(PARAGRAPH_SEPARATOR)
}

/// Numeric coercion that never fails.
///
/// Surrounding whitespace (including the byte-order mark) is ignored and
/// blank text is zero. `Infinity` with
/// an optional sign, unsigned `0x`/`0o`/`0b` integers and decimal literals
/// with an optional exponent are accepted; anything else is NaN.
#[must_use]
pub fn coerce_number(text: &str) -> f64 {
    let s = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if s.is_empty() {
        return 0.0;
    }

    let radix = match s.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return parse_radix(&s[2..], radix);
    }

    let (sign, unsigned) = match s.as_bytes()[0] {
        b'-' => (-1.0, &s[1..]),
        b'+' => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    if unsigned == "Infinity" {
        return sign * f64::INFINITY;
    }
    let well_formed = unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && unsigned
            .bytes()
            .all(|b| b.is_ascii_digit() || b".eE+-".contains(&b));
    if !well_formed {
        return f64::NAN;
    }
    unsigned.parse::<f64>().map_or(f64::NAN, |n| sign * n)
}

fn parse_radix(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    digits.chars().try_fold(0.0_f64, |acc, c| {
        c.to_digit(radix).map(|d| acc.mul_add(f64::from(radix), f64::from(d)))
    })
    .unwrap_or(f64::NAN)
}

/// Shape `message` as requested by `spec`.
pub fn process(message: &ChatMessage, spec: &RequestSpec) -> Result<OutputValue, OutputError> {
    if spec.schema.is_some() {
        let call = message
            .function_call
            .as_ref()
            .ok_or(OutputError::MissingFunctionCall)?;
        let value: Value = serde_json::from_str(&call.arguments)?;
        debug!("returning structured output");
        return Ok(OutputValue::Structured(value));
    }

    let text = message.text();
    let text = match spec.trim_mode() {
        TrimMode::Trim => trim(text),
        TrimMode::TrimFront => trim_front(text),
        TrimMode::None => text.to_string(),
    };

    let output = match spec.output_format() {
        OutputFormat::Json => OutputValue::Json(serde_json::from_str(&text)?),
        OutputFormat::Number => OutputValue::Number(coerce_number(&text)),
        OutputFormat::Text => OutputValue::Text(text),
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FunctionCall;
    use serde_json::json;

    #[test]
    fn test_trim() {
        assert_eq!(trim("A\n\nB\n\nC\n\nD"), "B");
        assert_eq!(trim("A\n\nB\n\nC\n\nD\n\nE"), "B\n\nC");
        // Nothing between the first and the last two: keep everything.
        assert_eq!(trim("A\n\nB\n\nC"), "A\n\nB\n\nC");
        assert_eq!(trim("A\n\nB"), "A\n\nB");
        assert_eq!(trim("plain"), "plain");
    }

    #[test]
    fn test_trim_front() {
        assert_eq!(trim_front("A\n\nB\n\nC"), "B\n\nC");
        assert_eq!(trim_front("A\n\nB"), "A\n\nB");
    }

    #[test]
    fn test_coerce_number() {
        assert!((coerce_number("42") - 42.0).abs() < f64::EPSILON);
        assert!((coerce_number("  -3.5e2\n") + 350.0).abs() < f64::EPSILON);
        assert!((coerce_number(".5") - 0.5).abs() < f64::EPSILON);
        assert!((coerce_number("0x1F") - 31.0).abs() < f64::EPSILON);
        assert!((coerce_number("0b101") - 5.0).abs() < f64::EPSILON);
        assert!(coerce_number("") == 0.0);
        assert!(coerce_number("-Infinity").is_infinite());
        assert!(coerce_number("abc").is_nan());
        assert!(coerce_number("12px").is_nan());
        assert!(coerce_number("inf").is_nan());
        assert!(coerce_number("-0x10").is_nan());
        assert!(coerce_number("1e").is_nan());
        assert!(coerce_number("+-1").is_nan());
        assert!((coerce_number("\u{feff}42") - 42.0).abs() < f64::EPSILON);
        assert!(coerce_number("\u{feff} \u{a0}") == 0.0);
    }

    #[test]
    fn test_process_number() {
        let spec = RequestSpec::new("q").with_output_format("Number");
        let out = process(&ChatMessage::assistant("42"), &spec).unwrap();
        assert_eq!(out, OutputValue::Number(42.0));
        assert_eq!(
            serde_json::to_value(Response { response: out }).unwrap(),
            json!({"response": 42})
        );

        let nan = process(&ChatMessage::assistant("abc"), &spec).unwrap();
        assert!(nan.as_number().unwrap().is_nan());
        assert_eq!(serde_json::to_value(&nan).unwrap(), Value::Null);
    }

    #[test]
    fn test_process_json() {
        let spec = RequestSpec::new("q").with_output_format("json");
        let out = process(&ChatMessage::assistant(r#"{"colors":["red"]}"#), &spec).unwrap();
        assert_eq!(out, OutputValue::Json(json!({"colors": ["red"]})));

        let err = process(&ChatMessage::assistant("not json"), &spec).unwrap_err();
        assert!(matches!(err, OutputError::Json(_)));
    }

    #[test]
    fn test_process_trims_before_coercion() {
        let spec = RequestSpec::new("q")
            .with_trim_mode(TrimMode::TrimFront)
            .with_output_format("number");
        let out = process(&ChatMessage::assistant("Sure!\n\n7\n\nDone"), &spec).unwrap();
        // trimFront keeps "7\n\nDone", which is not a number.
        assert!(out.as_number().unwrap().is_nan());

        let spec = RequestSpec::new("q").with_trim_mode(TrimMode::Trim);
        let out = process(&ChatMessage::assistant("Sure!\n\nBody\n\nHope\n\nBye"), &spec).unwrap();
        assert_eq!(out.as_text(), Some("Body"));
    }

    #[test]
    fn test_schema_skips_trim_and_coercion() {
        let spec = RequestSpec::new("q")
            .with_schema(json!({"type": "object"}))
            .with_trim_mode(TrimMode::Trim)
            .with_output_format("number");
        let message = ChatMessage::assistant_call(FunctionCall::new("user-schema", r#"{"n":4}"#));
        let out = process(&message, &spec).unwrap();
        assert_eq!(out, OutputValue::Structured(json!({"n": 4})));
        assert_eq!(serde_json::to_value(&out).unwrap(), json!({"n": 4}));
    }

    #[test]
    fn test_schema_without_call_is_error() {
        let spec = RequestSpec::new("q").with_schema(json!({"type": "object"}));
        let err = process(&ChatMessage::assistant("text"), &spec).unwrap_err();
        assert!(matches!(err, OutputError::MissingFunctionCall));
    }

    #[test]
    fn test_text_is_unchanged() {
        let spec = RequestSpec::new("q").with_output_format("xml");
        let out = process(&ChatMessage::assistant("  hi\n\n"), &spec).unwrap();
        assert_eq!(serde_json::to_value(&out).unwrap(), json!("  hi\n\n"));
    }
}
