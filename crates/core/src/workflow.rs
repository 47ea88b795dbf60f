use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    draft::DraftAnnotations,
    store::{RequestStore, StoreError},
    types::{Decision, RequestId, StatusSummary, VerificationRequest},
};

/// Review session controller over one reviewer's working set.
///
/// Decisions are never applied locally. `approve`/`reject` only write through
/// the store; callers run [`ReviewWorkflow::load_all`] afterwards to observe
/// the result. Session state sits behind a lock that is never held across an
/// await, so drafts stay editable while a store call is in flight.
pub struct ReviewWorkflow<S> {
    store: S,
    session: Mutex<Session>,
    loads_in_flight: AtomicUsize,
}

struct Session {
    requests: Arc<[VerificationRequest]>,
    drafts: DraftAnnotations,
    last_error: Option<String>,
}

impl Session {
    fn empty() -> Self {
        Self {
            requests: Arc::from(Vec::new()),
            drafts: DraftAnnotations::new(),
            last_error: None,
        }
    }
}

impl<S> ReviewWorkflow<S>
where
    S: RequestStore,
{
    /// Creates a session with an empty working set. Nothing is fetched until
    /// [`ReviewWorkflow::load_all`] runs.
    pub fn new(store: S) -> Self {
        Self {
            store,
            session: Mutex::new(Session::empty()),
            loads_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replaces the working set with a fresh copy from the store.
    ///
    /// Drafts are discarded whatever the outcome. On failure the working set
    /// becomes empty and the session stays usable; retrying is always safe.
    /// When loads overlap, the last one to resolve wins.
    pub async fn load_all(&self) -> Result<usize, ReviewError> {
        let _loading = LoadGuard::enter(&self.loads_in_flight);
        let fetched = self.store.list_all().await;

        let mut session = self.lock_session();
        session.drafts.clear();
        match fetched {
            Ok(mut requests) => {
                requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                let count = requests.len();
                session.requests = Arc::from(requests);
                session.last_error = None;
                debug!(stage = "workflow", count, "working set reloaded");
                Ok(count)
            }
            Err(err) => {
                session.requests = Arc::from(Vec::new());
                session.last_error = Some(err.to_string());
                warn!(stage = "workflow", error = %err, "failed to load verification requests");
                Err(ReviewError::Fetch(err))
            }
        }
    }

    /// Marks `id` approved and clears any stored rejection reason.
    pub async fn approve(&self, id: &RequestId) -> Result<Decision, ReviewError> {
        self.ensure_known(id)?;
        self.commit(id, Decision::Approve).await
    }

    /// Marks `id` rejected using the trimmed draft reason, or the default
    /// reason when the draft is blank.
    pub async fn reject(&self, id: &RequestId) -> Result<Decision, ReviewError> {
        let decision = {
            let session = self.lock_session();
            if !contains(&session.requests, id) {
                return Err(ReviewError::UnknownRequest(id.clone()));
            }
            session.drafts.rejection_for(id)
        };
        self.commit(id, decision).await
    }

    /// Records draft rejection text for `id`. Purely local.
    pub fn set_draft_reason(&self, id: RequestId, text: impl Into<String>) {
        self.lock_session().drafts.set(id, text);
    }

    pub fn draft_reason(&self, id: &RequestId) -> Option<String> {
        self.lock_session().drafts.get(id).map(str::to_string)
    }

    /// Snapshot of all drafts, for building views in one pass.
    pub fn drafts(&self) -> HashMap<RequestId, String> {
        let session = self.lock_session();
        session
            .requests
            .iter()
            .filter_map(|request| {
                session
                    .drafts
                    .get(&request.id)
                    .map(|text| (request.id.clone(), text.to_string()))
            })
            .collect()
    }

    /// The whole working set, newest first.
    pub fn requests(&self) -> Arc<[VerificationRequest]> {
        self.lock_session().requests.clone()
    }

    /// Pending requests from the working set, keeping its order.
    pub fn actionable_requests(&self) -> Vec<VerificationRequest> {
        self.lock_session()
            .requests
            .iter()
            .filter(|request| request.is_pending())
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> StatusSummary {
        StatusSummary::from_requests(self.lock_session().requests.iter())
    }

    /// `true` while at least one load is unresolved.
    pub fn is_loading(&self) -> bool {
        self.loads_in_flight.load(Ordering::SeqCst) > 0
    }

    /// Message of the most recent failed load or decision, if not since cleared
    /// by a success.
    pub fn last_error(&self) -> Option<String> {
        self.lock_session().last_error.clone()
    }

    async fn commit(&self, id: &RequestId, decision: Decision) -> Result<Decision, ReviewError> {
        match self.store.update_status(id, &decision).await {
            Ok(()) => {
                let mut session = self.lock_session();
                session.drafts.discard(id);
                session.last_error = None;
                info!(stage = "workflow", request = %id, decision = decision.kind(), "decision recorded");
                Ok(decision)
            }
            Err(err) => {
                self.lock_session().last_error = Some(err.to_string());
                warn!(stage = "workflow", request = %id, decision = decision.kind(), error = %err, "failed to record decision");
                Err(ReviewError::Write {
                    id: id.clone(),
                    source: err,
                })
            }
        }
    }

    fn ensure_known(&self, id: &RequestId) -> Result<(), ReviewError> {
        if contains(&self.lock_session().requests, id) {
            Ok(())
        } else {
            Err(ReviewError::UnknownRequest(id.clone()))
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn contains(requests: &[VerificationRequest], id: &RequestId) -> bool {
    requests.iter().any(|request| &request.id == id)
}

struct LoadGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> LoadGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Failures reported by [`ReviewWorkflow`]. None of them leave the session
/// unusable.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("verification request {0} is not in the working set")]
    UnknownRequest(RequestId),
    #[error("failed to load verification requests: {0}")]
    Fetch(#[source] StoreError),
    #[error("failed to record decision for {id}: {source}")]
    Write {
        id: RequestId,
        #[source]
        source: StoreError,
    },
}

impl ReviewError {
    /// Label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownRequest(_) => "unknown_request",
            Self::Fetch(_) => "fetch_failure",
            Self::Write { .. } => "write_failure",
        }
    }
}
