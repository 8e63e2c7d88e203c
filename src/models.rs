use serde::Serialize;
use serde_json::Value;

/// Body of `POST /api/analyze`, read from any JSON document. A field that is
/// absent or falsy (`null`, `false`, `0`, `""`) is `None`, so it is reported
/// as missing instead of as a malformed body. Other non-string values are
/// coerced to text the way a JavaScript caller would see them, which is what
/// turns an object `schema` into an invalid one.
#[derive(Debug, Default, PartialEq)]
pub struct AnalyzeRequest {
    pub image_url: Option<String>,
    pub prompt: Option<String>,
    pub schema: Option<String>,
}

impl AnalyzeRequest {
    /// `None` for a `null` body, which has no fields to read at all.
    pub fn from_json(body: &Value) -> Option<Self> {
        if body.is_null() {
            return None;
        }
        let field = |name: &str| body.get(name).filter(|v| is_truthy(v)).map(text_of);
        Some(Self {
            image_url: field("imageUrl"),
            prompt: field("prompt"),
            schema: field("schema"),
        })
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| if item.is_null() { String::new() } else { text_of(item) })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}
