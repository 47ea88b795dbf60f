use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info};

use id_review_core::{RequestStore, ReviewWorkflow};

pub type SharedStore = Arc<dyn RequestStore>;
pub type SessionWorkflow = ReviewWorkflow<SharedStore>;

pub fn describe_metrics() {
    describe_counter!(
        "review_loads_total",
        "Count of working set reloads from the record store, labelled by result"
    );
    describe_gauge!(
        "review_sessions_active",
        "Number of reviewing sessions held by the process"
    );
}

/// A named reviewing session. Its working set is loaded on first use.
pub struct ReviewSession {
    workflow: SessionWorkflow,
    activated: AsyncMutex<bool>,
}

impl ReviewSession {
    fn new(store: SharedStore) -> Self {
        Self {
            workflow: ReviewWorkflow::new(store),
            activated: AsyncMutex::new(false),
        }
    }

    /// Returns the workflow once the activation load has resolved.
    ///
    /// Concurrent first callers wait on the same activation load; only one
    /// of them issues it.
    pub async fn ready(&self) -> &SessionWorkflow {
        let mut activated = self.activated.lock().await;
        if !*activated {
            self.load().await;
            *activated = true;
        }
        &self.workflow
    }

    /// Reloads the working set. On a fresh session this is the activation
    /// load, so it is not issued twice.
    pub async fn reload(&self) -> bool {
        let mut activated = self.activated.lock().await;
        if *activated {
            drop(activated);
            return self.load().await;
        }
        let loaded = self.load().await;
        *activated = true;
        loaded
    }

    /// The workflow as it stands, without waiting for activation.
    pub fn workflow(&self) -> &SessionWorkflow {
        &self.workflow
    }

    async fn load(&self) -> bool {
        match self.workflow.load_all().await {
            Ok(count) => {
                counter!("review_loads_total", "result" => "ok").increment(1);
                debug!(stage = "app", count, "queue reloaded");
                true
            }
            Err(err) => {
                counter!("review_loads_total", "result" => "error").increment(1);
                error!(stage = "app", error = %err, "queue reload failed");
                false
            }
        }
    }
}

/// One [`ReviewSession`] per reviewer, all sharing the store client.
#[derive(Clone)]
pub struct SessionRegistry {
    store: SharedStore,
    sessions: Arc<Mutex<HashMap<String, Arc<ReviewSession>>>>,
}

impl SessionRegistry {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the named session, creating it when absent.
    pub fn open(&self, name: &str) -> Arc<ReviewSession> {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(name) {
            return existing.clone();
        }

        let session = Arc::new(ReviewSession::new(self.store.clone()));
        sessions.insert(name.to_string(), session.clone());
        gauge!("review_sessions_active").set(sessions.len() as f64);
        info!(stage = "app", session = %name, "review session opened");
        session
    }

    pub fn get(&self, name: &str) -> Option<Arc<ReviewSession>> {
        self.lock().get(name).cloned()
    }

    /// Drops the named session along with its working set and drafts.
    pub fn close(&self, name: &str) -> bool {
        let mut sessions = self.lock();
        let removed = sessions.remove(name).is_some();
        if removed {
            gauge!("review_sessions_active").set(sessions.len() as f64);
            info!(stage = "app", session = %name, "review session closed");
        }
        removed
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ReviewSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
