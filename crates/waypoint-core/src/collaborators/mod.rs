//! Collaborator seams -- the adapter interfaces for the backend services the
//! orchestrator fans out to.
//!
//! Each trait is intentionally object-safe so orchestrators can hold
//! `Arc<dyn ...>` and tests can substitute in-process fakes for the HTTP
//! implementations in [`http`].

pub mod http;
pub mod types;

use async_trait::async_trait;
use uuid::Uuid;

use crate::client::ClientError;
use crate::context::RequestContext;

use types::{DraftQuestion, DraftRequest, ResourceCandidate, Snippet};

/// Semantic retrieval: ranked resource candidates for a query.
#[async_trait]
pub trait ResourceSearch: Send + Sync {
    /// Search the catalog. May return fewer than `top_k` results.
    async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ResourceCandidate>, ClientError>;
}

/// Content store: citation snippets grounding quiz questions.
#[async_trait]
pub trait SnippetStore: Send + Sync {
    async fn citation_snippet(
        &self,
        ctx: &RequestContext,
        resource_id: Uuid,
    ) -> Result<Snippet, ClientError>;
}

/// Question authoring: drafts multiple-choice questions from snippets.
///
/// Generation has side effects downstream (model invocations are billed),
/// so implementations must not retry on their own.
#[async_trait]
pub trait QuestionAuthor: Send + Sync {
    async fn draft_questions(
        &self,
        ctx: &RequestContext,
        request: &DraftRequest,
    ) -> Result<Vec<DraftQuestion>, ClientError>;
}

// Compile-time assertions: the seams must stay object-safe.
const _: () = {
    fn _assert_object_safe(
        _: &dyn ResourceSearch,
        _: &dyn SnippetStore,
        _: &dyn QuestionAuthor,
    ) {
    }
};
