use std::collections::HashMap;

use askama::Template;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use url::Url;

use crate::analyze::{self, AnalysisError};
use crate::ingress::IngressError;
use crate::models::{AnalyzeRequest, ErrorBody, UploadResponse};
use crate::render::{Outcome, PageView};
use crate::state::AppState;

const GENERIC_FAILURE: &str = "Failed to analyze image";
const NO_IMAGE: &str = "Please upload an image first";

// ── Error → HTTP ─────────────────────────────────────────────────────────────

fn analysis_status(e: &AnalysisError) -> StatusCode {
    match e {
        AnalysisError::MissingField | AnalysisError::InvalidSchema(_) => StatusCode::BAD_REQUEST,
        AnalysisError::Provider(_)
        | AnalysisError::EmptyReply
        | AnalysisError::UnparseableReply { .. }
        | AnalysisError::Generic => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Text shown to the caller. An empty reply is reported like any other
/// unexpected failure.
fn analysis_message(e: &AnalysisError) -> String {
    match e {
        AnalysisError::EmptyReply | AnalysisError::Generic => GENERIC_FAILURE.to_string(),
        other => other.to_string(),
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = analysis_status(&self);
        if status.is_server_error() {
            tracing::error!(error = ?self, "analysis failed");
        } else {
            tracing::warn!(error = %self, "analysis rejected");
        }
        let body = ErrorBody {
            error: analysis_message(&self),
            raw_response: self.raw_response().map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}

fn ingress_status(e: &IngressError) -> StatusCode {
    match e {
        IngressError::MissingFile | IngressError::NotAnImage | IngressError::Multipart(_) => {
            StatusCode::BAD_REQUEST
        }
        IngressError::TooLarge | IngressError::FormTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        IngressError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        let status = ingress_status(&self);
        if let IngressError::Storage(io) = &self {
            tracing::error!(error = %io, "could not store upload");
        } else {
            tracing::warn!(error = %self, "upload rejected");
        }
        let body = ErrorBody {
            error: self.to_string(),
            raw_response: None,
        };
        (status, Json(body)).into_response()
    }
}

// ── Multipart ────────────────────────────────────────────────────────────────

struct UploadedFile {
    bytes: Bytes,
    content_type: String,
}

#[derive(Default)]
struct MultipartForm {
    file: Option<UploadedFile>,
    fields: HashMap<String, String>,
}

impl MultipartForm {
    fn field(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }
}

/// Hitting the body limit inside the file part means the image is too big;
/// anywhere else it is the form as a whole.
fn multipart_error(e: MultipartError, in_file: bool) -> IngressError {
    if e.status() != StatusCode::PAYLOAD_TOO_LARGE {
        IngressError::Multipart(e.body_text())
    } else if in_file {
        IngressError::TooLarge
    } else {
        IngressError::FormTooLarge
    }
}

/// Reads the `file` part plus any text parts. A file part with no name and no
/// bytes (what browsers send when nothing was picked) counts as absent.
async fn read_multipart(multipart: &mut Multipart) -> Result<MultipartForm, IngressError> {
    let mut form = MultipartForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, false))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "file" {
            let picked = field.file_name().is_some_and(|f| !f.is_empty());
            let content_type = field.content_type().unwrap_or("").to_string();
            let bytes = field.bytes().await.map_err(|e| multipart_error(e, true))?;
            if picked || !bytes.is_empty() {
                form.file = Some(UploadedFile {
                    bytes,
                    content_type,
                });
            }
        } else {
            let text = field.text().await.map_err(|e| multipart_error(e, false))?;
            form.fields.insert(name, text);
        }
    }

    Ok(form)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// The body is read as raw bytes and parsed as JSON whatever its declared
/// content type. Only a body that is not JSON at all is a generic failure.
pub async fn analyze_endpoint(State(state): State<AppState>, body: Bytes) -> Response {
    let parsed = match serde_json::from_slice::<Value>(&body) {
        Ok(value) => AnalyzeRequest::from_json(&value),
        Err(e) => {
            tracing::warn!(error = %e, "unreadable analyze request");
            None
        }
    };
    let Some(req) = parsed else {
        return AnalysisError::Generic.into_response();
    };

    let result = analyze::analyze(
        state.provider.as_ref(),
        req.image_url.as_deref().unwrap_or_default(),
        req.prompt.as_deref().unwrap_or_default(),
        req.schema.as_deref().unwrap_or_default(),
    )
    .await;

    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn upload_endpoint(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    match receive_upload(&state, &mut multipart).await {
        Ok(url) => (
            StatusCode::OK,
            Json(UploadResponse {
                url: url.to_string(),
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn receive_upload(state: &AppState, multipart: &mut Multipart) -> Result<Url, IngressError> {
    // Only the file can push an upload past its limit.
    let form = read_multipart(multipart).await.map_err(|e| match e {
        IngressError::FormTooLarge => IngressError::TooLarge,
        other => other,
    })?;
    let file = form.file.ok_or(IngressError::MissingFile)?;
    state.store.store(&file.bytes, &file.content_type).await
}

pub async fn index() -> Response {
    render_page(StatusCode::OK, &PageView::default())
}

/// Form post from the index page: store the image if one was picked, run the
/// analysis, and render the page again with the outcome.
pub async fn submit_form(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let form = match read_multipart(&mut multipart).await {
        Ok(form) => form,
        Err(e) => {
            let status = ingress_status(&e);
            return page_with_error(status, PageView::default(), e.to_string());
        }
    };

    let mut view = PageView {
        image_url: Some(form.field("image_url")).filter(|u| !u.is_empty()),
        prompt: form.field("prompt"),
        schema: form.field("schema"),
        outcome: None,
    };

    if let Some(file) = &form.file {
        match state.store.store(&file.bytes, &file.content_type).await {
            Ok(url) => view.image_url = Some(url.to_string()),
            Err(e) => {
                let status = ingress_status(&e);
                tracing::warn!(error = %e, "form upload rejected");
                return page_with_error(status, view, e.to_string());
            }
        }
    }

    let Some(image_url) = view.image_url.clone() else {
        return page_with_error(StatusCode::BAD_REQUEST, view, NO_IMAGE.to_string());
    };

    match analyze::analyze(state.provider.as_ref(), &image_url, &view.prompt, &view.schema).await {
        Ok(value) => {
            view.outcome = Some(Outcome::Result(value));
            render_page(StatusCode::OK, &view)
        }
        Err(e) => {
            let status = analysis_status(&e);
            tracing::warn!(error = %e, "form analysis failed");
            view.outcome = Some(Outcome::Error {
                message: analysis_message(&e),
                raw_response: e.raw_response().map(str::to_string),
            });
            render_page(status, &view)
        }
    }
}

fn page_with_error(status: StatusCode, mut view: PageView, message: String) -> Response {
    view.outcome = Some(Outcome::Error {
        message,
        raw_response: None,
    });
    render_page(status, &view)
}

fn render_page(status: StatusCode, view: &PageView) -> Response {
    match view.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "page template failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Html(format!("Template error: {e}"))).into_response()
        }
    }
}
