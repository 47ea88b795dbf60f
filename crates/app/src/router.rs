use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;

use id_review_store::ImageResolver;

use crate::{
    review,
    session::{SessionRegistry, SharedStore},
    telemetry,
};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    sessions: SessionRegistry,
    images: Arc<ImageResolver>,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, store: SharedStore, images: ImageResolver) -> Self {
        Self {
            metrics,
            sessions: SessionRegistry::new(store),
            images: Arc::new(images),
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn images(&self) -> &ImageResolver {
        &self.images
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/sessions/:session", delete(review::close_session))
        .route("/api/sessions/:session/requests", get(review::list_requests))
        .route("/api/sessions/:session/reload", post(review::reload_requests))
        .route(
            "/api/sessions/:session/diagnostics",
            get(review::session_diagnostics),
        )
        .route(
            "/api/sessions/:session/requests/:id/draft",
            put(review::put_draft),
        )
        .route(
            "/api/sessions/:session/requests/:id/approve",
            post(review::approve_request),
        )
        .route(
            "/api/sessions/:session/requests/:id/reject",
            post(review::reject_request),
        )
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
