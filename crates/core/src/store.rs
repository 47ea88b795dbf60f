use std::{error::Error as StdError, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{DecodeError, Decision, RequestId, VerificationRequest};

/// Gateway to the remote record store holding verification requests.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Fetches every request, newest `created_at` first.
    async fn list_all(&self) -> Result<Vec<VerificationRequest>, StoreError>;

    /// Writes the decision onto the single request matching `id`.
    ///
    /// The updated record is not returned; callers reload to observe it.
    async fn update_status(&self, id: &RequestId, decision: &Decision) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> RequestStore for Arc<S>
where
    S: RequestStore + ?Sized,
{
    async fn list_all(&self) -> Result<Vec<VerificationRequest>, StoreError> {
        (**self).list_all().await
    }

    async fn update_status(&self, id: &RequestId, decision: &Decision) -> Result<(), StoreError> {
        (**self).update_status(id, decision).await
    }
}

/// Errors surfaced by a [`RequestStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to decode stored request: {0}")]
    Decode(#[from] DecodeError),
    #[error("no stored request matches id {0}")]
    MissingTarget(RequestId),
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}
