use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use serde::{Deserialize, Serialize};
use tracing::warn;

use id_review_core::{Decision, RequestId, RequestStatus, ReviewError, StatusSummary};
use id_review_store::ImageResolver;

use crate::{problem::ProblemResponse, router::AppState, session::SessionWorkflow};

/// A pending request as shown to the reviewer.
#[derive(Debug, Serialize)]
pub struct RequestView {
    pub id: RequestId,
    pub user_id: String,
    pub status: RequestStatus,
    pub id_image_url: String,
    pub selfie_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Loading,
    NoData,
    Ready,
}

#[derive(Debug, Serialize)]
pub struct QueueView {
    pub state: QueueState,
    pub loading: bool,
    pub requests: Vec<RequestView>,
    pub summary: StatusSummary,
}

#[derive(Debug, Serialize)]
pub struct DecisionView {
    pub id: RequestId,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    pub reloaded: bool,
    pub queue: QueueView,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticsView {
    pub loading: bool,
    pub last_error: Option<String>,
    pub summary: StatusSummary,
}

#[derive(Debug, Deserialize)]
pub struct DraftBody {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Clone, Copy)]
enum DecisionKind {
    Approve,
    Reject,
}

impl DecisionKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

pub fn describe_metrics() {
    describe_counter!(
        "review_decisions_total",
        "Count of approve/reject decisions, labelled by decision and result"
    );
}

pub async fn list_requests(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Json<QueueView> {
    let session = state.sessions().open(&session);
    let workflow = session.ready().await;
    Json(queue_view(workflow, state.images()))
}

pub async fn reload_requests(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Json<QueueView> {
    let session = state.sessions().open(&session);
    session.reload().await;
    Json(queue_view(session.workflow(), state.images()))
}

pub async fn put_draft(
    State(state): State<AppState>,
    Path((session, id)): Path<(String, String)>,
    Json(body): Json<DraftBody>,
) -> StatusCode {
    let session = state.sessions().open(&session);
    session
        .ready()
        .await
        .set_draft_reason(RequestId::from(id), body.reason);
    StatusCode::NO_CONTENT
}

pub async fn approve_request(
    State(state): State<AppState>,
    Path((session, id)): Path<(String, String)>,
) -> Result<Json<DecisionView>, ProblemResponse> {
    decide(state, &session, RequestId::from(id), DecisionKind::Approve).await
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path((session, id)): Path<(String, String)>,
) -> Result<Json<DecisionView>, ProblemResponse> {
    decide(state, &session, RequestId::from(id), DecisionKind::Reject).await
}

/// Reports the session's last recorded failure without touching the store.
pub async fn session_diagnostics(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Result<Json<DiagnosticsView>, ProblemResponse> {
    let session = state
        .sessions()
        .get(&session)
        .ok_or_else(ProblemResponse::session_not_found)?;
    let workflow = session.workflow();
    Ok(Json(DiagnosticsView {
        loading: workflow.is_loading(),
        last_error: workflow.last_error(),
        summary: workflow.summary(),
    }))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Result<StatusCode, ProblemResponse> {
    if state.sessions().close(&session) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ProblemResponse::session_not_found())
    }
}

async fn decide(
    state: AppState,
    session: &str,
    id: RequestId,
    kind: DecisionKind,
) -> Result<Json<DecisionView>, ProblemResponse> {
    let session = state.sessions().open(session);
    let workflow = session.ready().await;
    let outcome = match kind {
        DecisionKind::Approve => workflow.approve(&id).await,
        DecisionKind::Reject => workflow.reject(&id).await,
    };

    let decision = match outcome {
        Ok(decision) => decision,
        Err(err) => {
            counter!("review_decisions_total", "decision" => kind.as_str(), "result" => err.kind())
                .increment(1);
            return Err(match err {
                ReviewError::UnknownRequest(_) => ProblemResponse::unknown_request(),
                ReviewError::Write { .. } | ReviewError::Fetch(_) => {
                    ProblemResponse::decision_not_recorded()
                }
            });
        }
    };
    counter!("review_decisions_total", "decision" => kind.as_str(), "result" => "ok").increment(1);

    let reloaded = session.reload().await;
    Ok(Json(decision_view(id, &decision, reloaded, workflow, state.images())))
}

fn decision_view(
    id: RequestId,
    decision: &Decision,
    reloaded: bool,
    workflow: &SessionWorkflow,
    images: &ImageResolver,
) -> DecisionView {
    if !reloaded {
        warn!(stage = "app", request = %id, "decision recorded but queue is stale");
    }
    DecisionView {
        id,
        status: decision.status(),
        rejection_reason: decision.rejection_reason().map(str::to_string),
        reloaded,
        queue: queue_view(workflow, images),
    }
}

fn queue_view(workflow: &SessionWorkflow, images: &ImageResolver) -> QueueView {
    let loading = workflow.is_loading();
    let mut drafts = workflow.drafts();
    let requests: Vec<RequestView> = workflow
        .actionable_requests()
        .into_iter()
        .map(|request| RequestView {
            id_image_url: images.resolve(request.id_image_ref.as_deref()),
            selfie_image_url: images.resolve(request.selfie_image_ref.as_deref()),
            draft_reason: drafts.remove(&request.id),
            status: request.status(),
            user_id: request.user_id,
            created_at: request.created_at,
            id: request.id,
        })
        .collect();

    let state = if loading {
        QueueState::Loading
    } else if requests.is_empty() {
        QueueState::NoData
    } else {
        QueueState::Ready
    };

    QueueView {
        state,
        loading,
        requests,
        summary: workflow.summary(),
    }
}
