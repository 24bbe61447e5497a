//! Wire types shared with the downstream collaborators.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use waypoint_db::models::Difficulty;

/// One ranked hit from the retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCandidate {
    pub resource_id: Uuid,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub duration_min: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(default)]
    pub skills: Vec<String>,
    /// Relevance score assigned by the retrieval service.
    #[serde(default)]
    pub score: f64,
}

/// Request body for `POST /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
}

/// Response body for `POST /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<ResourceCandidate>,
    #[serde(default)]
    pub total_found: u32,
}

/// Citation-grounding content for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub resource_id: Uuid,
    pub title: String,
    pub content: String,
}

/// One option of a drafted question, as authored downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOption {
    pub id: String,
    pub text: String,
}

/// A question drafted by the authoring collaborator. `correct_option` names
/// the id of the single correct [`DraftOption`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftQuestion {
    pub question_text: String,
    pub options: Vec<DraftOption>,
    pub correct_option: String,
    pub explanation: String,
    pub source_resource_id: Uuid,
    pub citation: String,
}

/// Request body for `POST /draft`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRequest {
    pub snippets: Vec<Snippet>,
    pub num_questions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

/// Response body for `POST /draft`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftResponse {
    pub questions: Vec<DraftQuestion>,
}
