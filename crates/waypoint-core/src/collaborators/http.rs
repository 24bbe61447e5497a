//! HTTP implementations of the collaborator seams, built on
//! [`ServiceClient`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::client::{ClientError, RetryPolicy, ServiceClient};
use crate::context::RequestContext;

use super::types::{
    DraftQuestion, DraftRequest, DraftResponse, ResourceCandidate, SearchRequest, SearchResponse,
    Snippet,
};
use super::{QuestionAuthor, ResourceSearch, SnippetStore};

/// Retrieval collaborator over HTTP (`POST {base}/search`).
#[derive(Debug, Clone)]
pub struct HttpRetrievalClient {
    client: ServiceClient,
}

impl HttpRetrievalClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: ServiceClient::new("retrieval", base_url),
        }
    }
}

#[async_trait]
impl ResourceSearch for HttpRetrievalClient {
    async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ResourceCandidate>, ClientError> {
        let request = SearchRequest {
            query: query.to_string(),
            top_k,
        };
        // Search is read-only: a single retry on transient failure is safe.
        let response: SearchResponse = self
            .client
            .post_json(ctx, "/search", &request, RetryPolicy::ReadOnly)
            .await?;

        tracing::debug!(
            query = %query,
            returned = response.results.len(),
            total_found = response.total_found,
            "retrieval search completed"
        );
        Ok(response.results)
    }
}

/// Content-store collaborator over HTTP (`GET {base}/snippet/{id}`).
#[derive(Debug, Clone)]
pub struct HttpContentClient {
    client: ServiceClient,
}

impl HttpContentClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: ServiceClient::new("content-store", base_url),
        }
    }
}

#[async_trait]
impl SnippetStore for HttpContentClient {
    async fn citation_snippet(
        &self,
        ctx: &RequestContext,
        resource_id: Uuid,
    ) -> Result<Snippet, ClientError> {
        self.client
            .get_json(ctx, &format!("/snippet/{resource_id}"), RetryPolicy::ReadOnly)
            .await
    }
}

/// Question-authoring collaborator over HTTP (`POST {base}/draft`).
#[derive(Debug, Clone)]
pub struct HttpAuthoringClient {
    client: ServiceClient,
}

impl HttpAuthoringClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: ServiceClient::new("question-authoring", base_url),
        }
    }
}

#[async_trait]
impl QuestionAuthor for HttpAuthoringClient {
    async fn draft_questions(
        &self,
        ctx: &RequestContext,
        request: &DraftRequest,
    ) -> Result<Vec<DraftQuestion>, ClientError> {
        // Drafting bills a model invocation downstream: never retried.
        let response: DraftResponse = self
            .client
            .post_json(ctx, "/draft", request, RetryPolicy::SideEffecting)
            .await?;
        Ok(response.questions)
    }
}
