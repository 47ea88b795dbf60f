//! Domain layer for the identity-verification review queue.
//!
//! The crate owns the typed request record, the [`RequestStore`] seam used to
//! reach the remote record store, and the [`ReviewWorkflow`] controller that
//! applies approve/reject transitions against a reviewer's working set.

pub mod draft;
pub mod store;
pub mod types;
pub mod workflow;

pub use draft::DraftAnnotations;
pub use store::{RequestStore, StoreError};
pub use types::{
    DecodeError, Decision, RequestId, RequestStatus, StatusSummary, VerificationRequest,
    DEFAULT_REJECTION_REASON,
};
pub use workflow::{ReviewError, ReviewWorkflow};
