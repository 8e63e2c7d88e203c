//! Server-rendered HTML for the upload/prompt/schema form and the result view.
//!
//! Markup lives in askama templates under `templates/`; everything written
//! into them goes through askama's HTML escaping. Nested templates are
//! rendered into their parent with `|safe`, which is sound because their own
//! output was escaped when they rendered.

use askama::Template;
use serde_json::Value;

const SCHEMA_PLACEHOLDER: &str = r#"Enter your JSON schema here... e.g., {"type": "object", "properties": {"description": {"type": "string"}, "tags": {"type": "array", "items": {"type": "string"}}}}"#;

// ============================================================
// TEMPLATES
// ============================================================

/// What to show beside the form after a submission.
#[derive(Debug)]
pub enum Outcome {
    Result(Value),
    Error {
        message: String,
        raw_response: Option<String>,
    },
}

/// The whole page: the form, refilled with the last submission, and its outcome.
#[derive(Debug, Default, Template)]
#[template(path = "page.html")]
pub struct PageView {
    pub image_url: Option<String>,
    pub prompt: String,
    pub schema: String,
    pub outcome: Option<Outcome>,
}

/// Result card: one entry per top-level key, the raw JSON and a copy button.
#[derive(Template)]
#[template(path = "partials/result.html")]
struct ResultView<'a> {
    value: &'a Value,
}

#[derive(Template)]
#[template(path = "partials/error.html")]
struct ErrorPanel<'a> {
    message: &'a str,
    raw_response: Option<&'a str>,
}

/// One JSON value, styled by type. Arrays and objects render their children
/// through the same template.
#[derive(Template)]
#[template(path = "partials/value.html")]
struct ValueView<'a> {
    value: &'a Value,
}

// ============================================================
// VIEW HELPERS
// ============================================================

impl PageView {
    fn schema_placeholder(&self) -> &'static str {
        SCHEMA_PLACEHOLDER
    }

    fn result_view(&self) -> Option<ResultView<'_>> {
        match &self.outcome {
            Some(Outcome::Result(value)) => Some(ResultView { value }),
            _ => None,
        }
    }

    fn error_panel(&self) -> Option<ErrorPanel<'_>> {
        match &self.outcome {
            Some(Outcome::Error {
                message,
                raw_response,
            }) => Some(ErrorPanel {
                message,
                raw_response: raw_response.as_deref(),
            }),
            _ => None,
        }
    }
}

impl<'a> ResultView<'a> {
    fn is_object(&self) -> bool {
        self.value.is_object()
    }

    fn entries(&self) -> Vec<(&'a str, ValueView<'a>)> {
        object_entries(self.value)
    }

    fn whole(&self) -> ValueView<'a> {
        ValueView { value: self.value }
    }

    fn pretty(&self) -> String {
        serde_json::to_string_pretty(self.value).unwrap_or_else(|_| self.value.to_string())
    }
}

impl<'a> ValueView<'a> {
    fn kind(&self) -> &'static str {
        match self.value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Display text of a scalar; strings come back unquoted.
    fn scalar(&self) -> String {
        match self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn items(&self) -> Vec<ValueView<'a>> {
        match self.value {
            Value::Array(items) => items.iter().map(|value| ValueView { value }).collect(),
            _ => Vec::new(),
        }
    }

    fn entries(&self) -> Vec<(&'a str, ValueView<'a>)> {
        object_entries(self.value)
    }
}

fn object_entries(value: &Value) -> Vec<(&str, ValueView<'_>)> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| (key.as_str(), ValueView { value }))
            .collect(),
        _ => Vec::new(),
    }
}
