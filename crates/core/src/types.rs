use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason stored when a reviewer rejects without entering any text.
pub const DEFAULT_REJECTION_REASON: &str = "No reason provided";

/// Store-assigned identifier of a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    /// Returns the canonical store representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DecodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DecodeError::UnknownStatus(other.to_string())),
        }
    }
}

/// Terminal decision a reviewer records against a request.
///
/// Carrying the reason inside the `Reject` variant keeps the stored
/// `(status, rejection_reason)` pair consistent by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

impl Decision {
    /// Builds a rejection from the reviewer's draft text.
    ///
    /// The draft is trimmed; an absent or blank draft falls back to
    /// [`DEFAULT_REJECTION_REASON`].
    pub fn reject_with_draft(draft: Option<&str>) -> Self {
        let reason = draft
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or(DEFAULT_REJECTION_REASON);
        Self::Reject {
            reason: reason.to_string(),
        }
    }

    pub fn status(&self) -> RequestStatus {
        match self {
            Self::Approve => RequestStatus::Approved,
            Self::Reject { .. } => RequestStatus::Rejected,
        }
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Self::Approve => None,
            Self::Reject { reason } => Some(reason),
        }
    }

    /// Label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject { .. } => "reject",
        }
    }
}

/// An identity-verification submission under review.
///
/// `status` and `rejection_reason` are only reachable through accessors so
/// that a reason exists exactly when the request is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationRequest {
    pub id: RequestId,
    pub user_id: String,
    status: RequestStatus,
    pub id_image_ref: Option<String>,
    pub selfie_image_ref: Option<String>,
    rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VerificationRequest {
    /// Creates a freshly submitted request in `Pending`.
    pub fn pending(id: RequestId, user_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            status: RequestStatus::Pending,
            id_image_ref: None,
            selfie_image_ref: None,
            rejection_reason: None,
            created_at,
        }
    }

    /// Validates a stored `(status, rejection_reason)` pair and builds the record.
    pub fn from_parts(
        id: RequestId,
        user_id: impl Into<String>,
        status: RequestStatus,
        rejection_reason: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DecodeError> {
        match (status, &rejection_reason) {
            (RequestStatus::Rejected, None) => return Err(DecodeError::MissingReason(id)),
            (RequestStatus::Pending | RequestStatus::Approved, Some(_)) => {
                return Err(DecodeError::UnexpectedReason { id, status })
            }
            _ => {}
        }

        Ok(Self {
            id,
            user_id: user_id.into(),
            status,
            id_image_ref: None,
            selfie_image_ref: None,
            rejection_reason,
            created_at,
        })
    }

    pub fn with_images(mut self, id_image_ref: Option<String>, selfie_image_ref: Option<String>) -> Self {
        self.id_image_ref = id_image_ref;
        self.selfie_image_ref = selfie_image_ref;
        self
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Applies a terminal decision, overwriting any earlier one.
    pub fn apply(&mut self, decision: &Decision) {
        self.status = decision.status();
        self.rejection_reason = decision.rejection_reason().map(str::to_string);
    }
}

/// Per-status counts over a working set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl StatusSummary {
    pub fn from_requests<'a>(requests: impl IntoIterator<Item = &'a VerificationRequest>) -> Self {
        let mut summary = Self::default();
        for request in requests {
            match request.status() {
                RequestStatus::Pending => summary.pending += 1,
                RequestStatus::Approved => summary.approved += 1,
                RequestStatus::Rejected => summary.rejected += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected
    }
}

/// Errors raised while turning stored rows into typed requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown request status `{0}`")]
    UnknownStatus(String),
    #[error("request {id} is {status} but carries a rejection reason")]
    UnexpectedReason { id: RequestId, status: RequestStatus },
    #[error("rejected request {0} has no rejection reason")]
    MissingReason(RequestId),
    #[error("malformed store payload: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn reject_with_draft_trims_text() {
        let decision = Decision::reject_with_draft(Some("  fake ID  "));
        assert_eq!(decision.rejection_reason(), Some("fake ID"));
        assert_eq!(decision.status(), RequestStatus::Rejected);
    }

    #[test]
    fn reject_with_blank_draft_uses_default_reason() {
        for draft in [None, Some(""), Some("   \t\n")] {
            let decision = Decision::reject_with_draft(draft);
            assert_eq!(decision.rejection_reason(), Some(DEFAULT_REJECTION_REASON));
        }
    }

    #[test]
    fn approve_clears_previous_reason() {
        let mut request = VerificationRequest::from_parts(
            RequestId::from("req-1"),
            "user-1",
            RequestStatus::Rejected,
            Some("blurry".to_string()),
            created_at(),
        )
        .expect("valid rejected row");

        request.apply(&Decision::Approve);

        assert_eq!(request.status(), RequestStatus::Approved);
        assert_eq!(request.rejection_reason(), None);
    }

    #[test]
    fn from_parts_rejects_reason_on_pending_row() {
        let err = VerificationRequest::from_parts(
            RequestId::from("req-2"),
            "user-2",
            RequestStatus::Pending,
            Some("stale".to_string()),
            created_at(),
        )
        .expect_err("reason on pending row");
        assert!(matches!(
            err,
            DecodeError::UnexpectedReason { status: RequestStatus::Pending, .. }
        ));
    }

    #[test]
    fn from_parts_requires_reason_when_rejected() {
        let err = VerificationRequest::from_parts(
            RequestId::from("req-3"),
            "user-3",
            RequestStatus::Rejected,
            None,
            created_at(),
        )
        .expect_err("rejected row without reason");
        assert_eq!(err, DecodeError::MissingReason(RequestId::from("req-3")));
    }

    #[test]
    fn status_parses_store_values() {
        assert_eq!("approved".parse::<RequestStatus>(), Ok(RequestStatus::Approved));
        assert_eq!(
            "escalated".parse::<RequestStatus>(),
            Err(DecodeError::UnknownStatus("escalated".to_string()))
        );
    }

    #[test]
    fn summary_counts_each_status() {
        let mut approved = VerificationRequest::pending(RequestId::from("a"), "u", created_at());
        approved.apply(&Decision::Approve);
        let pending = VerificationRequest::pending(RequestId::from("b"), "u", created_at());
        let mut rejected = VerificationRequest::pending(RequestId::from("c"), "u", created_at());
        rejected.apply(&Decision::reject_with_draft(None));

        let summary = StatusSummary::from_requests([&approved, &pending, &rejected]);
        assert_eq!(
            summary,
            StatusSummary {
                pending: 1,
                approved: 1,
                rejected: 1
            }
        );
        assert_eq!(summary.total(), 3);
    }
}
