//! Deadline-aware HTTP invocation of downstream collaborators.
//!
//! One `ServiceClient` wraps one collaborator base URL. Calls carry the
//! request's correlation id, are capped by both a per-call timeout and the
//! request deadline, and abort promptly when the parent request is
//! cancelled. Read-only calls retry once on a transient network failure;
//! side-effecting calls are never retried.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::context::RequestContext;

/// Header used to propagate the correlation id across services.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Default cap on a single downstream call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause before the single retry of a read-only call.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Errors that can occur when invoking a downstream collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to {service} timed out")]
    Timeout { service: &'static str },

    #[error("{service} unavailable ({status:?}): {detail}")]
    Unavailable {
        service: &'static str,
        /// Downstream HTTP status, `None` for connection-level failures.
        status: Option<u16>,
        detail: String,
    },

    #[error("bad response from {service}: {detail}")]
    BadResponse {
        service: &'static str,
        detail: String,
    },

    #[error("request to {service} cancelled")]
    Cancelled { service: &'static str },
}

/// Whether a call may be retried on transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Read-only call (e.g. retrieval search): one retry after a short
    /// backoff when the network fails or the call times out.
    ReadOnly,
    /// Side-effecting call (e.g. quiz generation): never retried.
    SideEffecting,
}

impl RetryPolicy {
    fn max_attempts(self) -> usize {
        match self {
            Self::ReadOnly => 2,
            Self::SideEffecting => 1,
        }
    }
}

/// HTTP client for a single downstream collaborator.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    service: &'static str,
    base_url: String,
    http: reqwest::Client,
    call_timeout: Duration,
}

impl ServiceClient {
    /// Create a client for a collaborator. `service` is the short name used
    /// in errors and logs; `base_url` is the collaborator's root URL.
    pub fn new(service: &'static str, base_url: impl Into<String>) -> Self {
        Self {
            service,
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Override the per-call timeout (still capped by the request deadline).
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The collaborator name this client talks to.
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Issue a GET and decode the JSON response.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        path: &str,
        policy: RetryPolicy,
    ) -> Result<T, ClientError> {
        self.request_json(ctx, Method::GET, path, None, policy).await
    }

    /// Issue a POST with a JSON body and decode the JSON response.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        path: &str,
        body: &B,
        policy: RetryPolicy,
    ) -> Result<T, ClientError> {
        let value = serde_json::to_value(body).map_err(|e| ClientError::BadResponse {
            service: self.service,
            detail: format!("failed to encode request body: {e}"),
        })?;
        self.request_json(ctx, Method::POST, path, Some(value), policy)
            .await
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        policy: RetryPolicy,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut last_err: Option<ClientError> = None;

        for attempt in 0..policy.max_attempts() {
            if attempt > 0 {
                tokio::time::sleep(RETRY_BACKOFF.min(ctx.remaining())).await;
                tracing::warn!(
                    service = self.service,
                    url = %url,
                    attempt,
                    "retrying downstream call after transient failure"
                );
            }

            if ctx.is_cancelled() {
                return Err(ClientError::Cancelled {
                    service: self.service,
                });
            }

            // The call budget is the per-call cap or whatever is left of the
            // request deadline, whichever is shorter.
            let budget = self.call_timeout.min(ctx.remaining());
            if budget.is_zero() {
                return Err(last_err.unwrap_or(ClientError::Timeout {
                    service: self.service,
                }));
            }

            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(REQUEST_ID_HEADER, &ctx.request_id)
                .timeout(budget);
            if let Some(ref v) = body {
                request = request.json(v);
            }

            let outcome = tokio::select! {
                _ = ctx.cancel_token().cancelled() => {
                    return Err(ClientError::Cancelled { service: self.service });
                }
                res = request.send() => res,
            };

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let detail = response.text().await.unwrap_or_default();
                        // A non-2xx answer is a downstream decision, not a
                        // transient fault: surfaced immediately, never retried.
                        return Err(ClientError::Unavailable {
                            service: self.service,
                            status: Some(status.as_u16()),
                            detail,
                        });
                    }
                    return response.json::<T>().await.map_err(|e| ClientError::BadResponse {
                        service: self.service,
                        detail: e.to_string(),
                    });
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(ClientError::Timeout {
                        service: self.service,
                    });
                }
                Err(e) if e.is_connect() => {
                    last_err = Some(ClientError::Unavailable {
                        service: self.service,
                        status: None,
                        detail: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(ClientError::Unavailable {
                        service: self.service,
                        status: None,
                        detail: e.to_string(),
                    });
                }
            }
        }

        Err(last_err.unwrap_or(ClientError::Timeout {
            service: self.service,
        }))
    }
}
