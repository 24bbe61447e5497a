//! Per-request context: correlation id, deadline, and cancellation.
//!
//! Every inbound request gets one `RequestContext`; clones share the same
//! cancellation token, so cancelling the parent cancels all fan-out work
//! spawned from it.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Request-scoped state passed explicitly through the orchestration layers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id propagated to every downstream call.
    pub request_id: String,
    deadline: Instant,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Create a context with an explicit correlation id and an overall
    /// request timeout.
    pub fn new(request_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            request_id: request_id.into(),
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a context with a freshly generated correlation id.
    pub fn with_generated_id(timeout: Duration) -> Self {
        Self::new(Uuid::new_v4().to_string(), timeout)
    }

    /// The absolute deadline for this request.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left until the deadline (zero once it has passed).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// The shared cancellation token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this request and everything spawned from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
