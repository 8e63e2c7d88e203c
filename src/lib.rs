//! Image analysis service: upload an image, give a prompt and a JSON Schema,
//! get back the JSON a multimodal model produced for it.

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};

pub mod analyze;
pub mod config;
pub mod ingress;
pub mod models;
pub mod provider;
pub mod render;
pub mod routes;
pub mod state;

use ingress::{MAX_IMAGE_BYTES, MAX_INLINE_URL_LEN, UPLOADS_ROUTE};
use state::AppState;

/// Room for multipart boundaries and the text fields sent alongside the file.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// `POST /api/upload` carries one image.
const UPLOAD_LIMIT: usize = MAX_IMAGE_BYTES + MULTIPART_OVERHEAD;

/// A form post may carry a new image and, in inline mode, the previous one as
/// a `data:` URL in the hidden `image_url` field.
const FORM_LIMIT: usize = MAX_IMAGE_BYTES + MAX_INLINE_URL_LEN + MULTIPART_OVERHEAD;

/// `imageUrl` may be a `data:` URL.
const ANALYZE_LIMIT: usize = MAX_INLINE_URL_LEN + MULTIPART_OVERHEAD;

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(
            "/",
            get(routes::index)
                .post(routes::submit_form)
                .layer(DefaultBodyLimit::max(FORM_LIMIT)),
        )
        .route("/health", get(routes::health))
        .route(
            "/api/analyze",
            post(routes::analyze_endpoint).layer(DefaultBodyLimit::max(ANALYZE_LIMIT)),
        )
        .route(
            "/api/upload",
            post(routes::upload_endpoint).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        );

    if let Some(dir) = state.store.serve_dir() {
        // Uploaded files are user content served from this origin.
        let uploads = ServiceBuilder::new()
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_static("sandbox"),
            ))
            .service(ServeDir::new(dir));
        router = router.nest_service(UPLOADS_ROUTE, uploads);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
