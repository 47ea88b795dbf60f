use std::collections::HashMap;

use crate::types::{Decision, RequestId};

/// In-progress rejection reasons typed by the reviewer, keyed by request.
#[derive(Debug, Clone, Default)]
pub struct DraftAnnotations {
    reasons: HashMap<RequestId, String>,
}

impl DraftAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the raw draft text, replacing any earlier draft for `id`.
    pub fn set(&mut self, id: RequestId, text: impl Into<String>) {
        self.reasons.insert(id, text.into());
    }

    pub fn get(&self, id: &RequestId) -> Option<&str> {
        self.reasons.get(id).map(String::as_str)
    }

    pub fn discard(&mut self, id: &RequestId) {
        self.reasons.remove(id);
    }

    pub fn clear(&mut self) {
        self.reasons.clear();
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    /// Resolves the rejection decision for `id` from its current draft.
    pub fn rejection_for(&self, id: &RequestId) -> Decision {
        Decision::reject_with_draft(self.get(id))
    }
}
