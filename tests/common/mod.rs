#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use image_schema_analyzer::{
    build_router,
    ingress::ImageStore,
    provider::{ProviderError, VisionProvider, VisionRequest},
    state::AppState,
};
use tower::ServiceExt;
use url::Url;

pub const BOUNDARY: &str = "----analyzer-test-boundary";

// --- Stub provider ---

/// Replies with canned text and records every request it sees.
#[derive(Clone)]
pub struct StubProvider {
    reply: Arc<Mutex<Result<Option<String>, String>>>,
    calls: Arc<Mutex<Vec<VisionRequest>>>,
}

impl StubProvider {
    pub fn replying(text: &str) -> Self {
        Self::with(Ok(Some(text.to_string())))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Err(message.to_string()))
    }

    pub fn silent() -> Self {
        Self::with(Ok(None))
    }

    fn with(reply: Result<Option<String>, String>) -> Self {
        Self {
            reply: Arc::new(Mutex::new(reply)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<VisionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionProvider for StubProvider {
    async fn complete(&self, request: &VisionRequest) -> Result<Option<String>, ProviderError> {
        self.calls.lock().unwrap().push(request.clone());
        self.reply.lock().unwrap().clone().map_err(|message| ProviderError::Api {
            status: 429,
            message,
        })
    }
}

// --- App ---

pub fn app_with(provider: &StubProvider, upload_dir: &Path) -> Router {
    let store = ImageStore::Disk {
        dir: upload_dir.to_path_buf(),
        public_base: Url::parse("http://localhost:8000/").unwrap(),
    };
    build_router(AppState::new(Arc::new(provider.clone()), store))
}

/// App whose uploads become `data:` URLs instead of files.
pub fn inline_app_with(provider: &StubProvider) -> Router {
    build_router(AppState::new(Arc::new(provider.clone()), ImageStore::Inline))
}

pub async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Vec<u8>)> {
    let (status, _, body) = send_with_headers(app, request).await?;
    Ok((status, body))
}

pub async fn send_with_headers(
    app: &Router,
    request: Request<Body>,
) -> Result<(StatusCode, HeaderMap, Vec<u8>)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await?.to_bytes().to_vec();
    Ok((status, headers, body))
}

pub fn json_post(uri: &str, body: &str) -> Request<Body> {
    post_as(uri, "application/json", body)
}

pub fn post_as(uri: &str, content_type: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", content_type)
        .body(Body::from(body.to_string()))
        .unwrap()
}

// --- Multipart ---

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_post(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}
