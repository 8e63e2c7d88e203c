use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::provider::{ProviderError, VisionProvider, VisionRequest};

// ── Constants ────────────────────────────────────────────────────────────────

/// Low temperature keeps the model close to the requested shape.
pub const TEMPERATURE: f64 = 0.1;
pub const MAX_TOKENS: u32 = 1000;

const JSON_ONLY_DIRECTIVE: &str =
    "Ensure your response is ONLY valid JSON with no additional text or formatting.";

// ── Lazy static regexes ──────────────────────────────────────────────────────

/// First `{` to last `}`, across newlines.
static GREEDY_OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReplyFailure {
    /// The reply has no `{ ... }` span at all.
    #[error("OpenAI response is not valid JSON")]
    NoJson,
    /// A span was found but none of the candidates parsed.
    #[error("Failed to parse OpenAI response as JSON")]
    InvalidJson,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Missing required fields: imageUrl, prompt, or schema")]
    MissingField,
    #[error("Invalid JSON schema")]
    InvalidSchema(#[source] serde_json::Error),
    #[error("OpenAI API error: {0}")]
    Provider(String),
    #[error("No response from OpenAI")]
    EmptyReply,
    #[error("{reason}")]
    UnparseableReply { reason: ReplyFailure, raw: String },
    #[error("Failed to analyze image")]
    Generic,
}

impl From<ProviderError> for AnalysisError {
    fn from(err: ProviderError) -> Self {
        AnalysisError::Provider(err.to_string())
    }
}

impl AnalysisError {
    /// Raw provider text, when the failure has one worth showing.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            AnalysisError::UnparseableReply { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Which stage produced the JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Direct,
    GreedySpan,
    BalancedSpan,
}

// ── Public API ───────────────────────────────────────────────────────────────

pub async fn analyze(
    provider: &dyn VisionProvider,
    image_ref: &str,
    instruction: &str,
    schema_text: &str,
) -> Result<Value, AnalysisError> {
    if image_ref.is_empty() || instruction.is_empty() || schema_text.is_empty() {
        return Err(AnalysisError::MissingField);
    }

    let schema: Value = serde_json::from_str(schema_text).map_err(AnalysisError::InvalidSchema)?;
    tracing::debug!("schema parsed");

    let request = VisionRequest {
        image_url: image_ref.to_string(),
        text: compose_instruction(instruction, &schema),
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
    };

    let reply = provider.complete(&request).await.map_err(|e| {
        tracing::warn!(error = %e, "provider call failed");
        AnalysisError::from(e)
    })?;
    tracing::debug!("provider replied");

    let content = match reply {
        Some(text) if !text.is_empty() => text,
        _ => return Err(AnalysisError::EmptyReply),
    };

    match recover_json(&content) {
        Ok((value, recovery)) => {
            tracing::info!(?recovery, "analysis complete");
            Ok(value)
        }
        Err(reason) => {
            tracing::warn!(%reason, "reply could not be parsed");
            Err(AnalysisError::UnparseableReply {
                reason,
                raw: content,
            })
        }
    }
}

// ── Instruction framing ──────────────────────────────────────────────────────

pub fn compose_instruction(instruction: &str, schema: &Value) -> String {
    format!(
        "{instruction}\n\n<OUTPUT> Always respond in JSON according to this schema: {}</OUTPUT>\n\n{JSON_ONLY_DIRECTIVE}",
        escape_schema(schema)
    )
}

/// Pretty-print with two-space indent and backslash every double quote.
fn escape_schema(schema: &Value) -> String {
    let schema = integral_floats_as_integers(schema);
    serde_json::to_string_pretty(&schema)
        .unwrap_or_else(|_| schema.to_string())
        .replace('"', "\\\"")
}

/// Largest magnitude below which every integral `f64` is exact.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

/// `1.0` prints as `1` in the instruction, the way JSON writers that keep a
/// single number type print it.
fn integral_floats_as_integers(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < EXACT_INTEGER_LIMIT => Value::from(f as i64),
            _ => value.clone(),
        },
        Value::Array(items) => items.iter().map(integral_floats_as_integers).collect(),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), integral_floats_as_integers(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

// ── Reply recovery ───────────────────────────────────────────────────────────

pub fn recover_json(text: &str) -> Result<(Value, Recovery), ReplyFailure> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok((value, Recovery::Direct));
    }

    let greedy = GREEDY_OBJECT_RE.find(text).ok_or(ReplyFailure::NoJson)?;
    if let Ok(value) = serde_json::from_str::<Value>(greedy.as_str()) {
        return Ok((value, Recovery::GreedySpan));
    }

    balanced_spans(text)
        .find_map(|span| serde_json::from_str::<Value>(span).ok())
        .map(|value| (value, Recovery::BalancedSpan))
        .ok_or(ReplyFailure::InvalidJson)
}

/// Every balanced `{ ... }` span, ordered by start position. Braces inside
/// string literals do not count.
fn balanced_spans(text: &str) -> impl Iterator<Item = &str> + '_ {
    text.char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(move |(start, _)| {
            balanced_end(&text[start..]).map(|len| &text[start..start + len])
        })
}

/// Byte length of the balanced object starting at `s[0] == '{'`.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
