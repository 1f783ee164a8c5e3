use std::sync::Arc;

use crate::client::ChainClient;
use crate::transaction::SignedPayload;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Success { identifier: String },
    Failure { reason: String },
}

/// Delivers signed payloads through a shared [`ChainClient`]. Never retries:
/// a failure goes straight back to the caller to be counted.
pub struct Submitter<C: ?Sized = dyn ChainClient> {
    client: Arc<C>,
}

impl<C: ?Sized> Clone for Submitter<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: ChainClient + ?Sized> Submitter<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    pub async fn submit(&self, payload: &SignedPayload) -> SubmissionOutcome {
        match self.client.submit(payload).await {
            Ok(identifier) => SubmissionOutcome::Success { identifier },
            Err(err) => SubmissionOutcome::Failure {
                reason: err.to_string(),
            },
        }
    }
}
