use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Requested difficulty for quiz generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        };
        f.write_str(s)
    }
}

impl FromStr for Difficulty {
    type Err = DifficultyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(DifficultyParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Difficulty`] string.
#[derive(Debug, Clone)]
pub struct DifficultyParseError(pub String);

impl fmt::Display for DifficultyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid difficulty: {:?}", self.0)
    }
}

impl std::error::Error for DifficultyParseError {}

// ---------------------------------------------------------------------------
// Learning-path documents (stored as JSONB inside the plans row)
// ---------------------------------------------------------------------------

/// A single learning resource placed inside a milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceItem {
    /// References an entry in the external resource catalog.
    pub resource_id: Uuid,
    pub title: String,
    pub url: String,
    pub duration_min: u32,
    /// Optional ordinal difficulty level (lower is more introductory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    pub skills: Vec<String>,
    /// Rationale for including this resource in the plan.
    pub why_included: String,
    /// Contiguous zero-based position within the milestone.
    pub order: u32,
}

/// An ordered stage of a learning path with its own time estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub milestone_id: Uuid,
    pub title: String,
    pub description: String,
    pub resources: Vec<ResourceItem>,
    pub estimated_hours: f64,
    pub skills_gained: Vec<String>,
    /// Contiguous zero-based position within the plan.
    pub order: u32,
}

// ---------------------------------------------------------------------------
// Quiz documents
// ---------------------------------------------------------------------------

/// Server-held quiz option. `is_correct` never leaves this representation;
/// the generate path serializes [`QuizOptionView`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOption {
    pub option_id: String,
    pub text: String,
    pub is_correct: bool,
}

/// Server-held quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredQuestion {
    pub question_id: Uuid,
    pub question_text: String,
    pub options: Vec<StoredOption>,
    pub explanation: String,
    /// Must be one of the resource ids the quiz was generated from.
    pub source_resource_id: Uuid,
    /// Grounded in that resource's content.
    pub citation: String,
}

/// Client-facing quiz option: structurally cannot carry correctness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOptionView {
    pub option_id: String,
    pub text: String,
}

/// Client-facing quiz question. Explanation is withheld until grading
/// because it names the correct answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestionView {
    pub question_id: Uuid,
    pub question_text: String,
    pub options: Vec<QuizOptionView>,
    pub source_resource_id: Uuid,
    pub citation: String,
}

/// Client-facing quiz as returned by the generate path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizView {
    pub quiz_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub questions: Vec<QuizQuestionView>,
    pub total_questions: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&StoredQuestion> for QuizQuestionView {
    fn from(q: &StoredQuestion) -> Self {
        Self {
            question_id: q.question_id,
            question_text: q.question_text.clone(),
            options: q
                .options
                .iter()
                .map(|o| QuizOptionView {
                    option_id: o.option_id.clone(),
                    text: o.text.clone(),
                })
                .collect(),
            source_resource_id: q.source_resource_id,
            citation: q.citation.clone(),
        }
    }
}

impl From<&QuizRecord> for QuizView {
    fn from(record: &QuizRecord) -> Self {
        Self {
            quiz_id: record.id,
            title: record.title.clone(),
            questions: record.questions.0.iter().map(QuizQuestionView::from).collect(),
            total_questions: record.total_questions as u32,
            created_at: record.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Grading
// ---------------------------------------------------------------------------

/// One (question, selected option) pair from a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPair {
    pub question_id: Uuid,
    pub selected_option_id: String,
}

/// Grading outcome for a single question. Only ever produced by the submit
/// path; carries the detail the generate path must not reveal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: Uuid,
    pub correct: bool,
    /// `None` when the question was left unanswered.
    pub selected_option_id: Option<String>,
    pub correct_option_id: String,
    pub explanation: String,
    pub citation: String,
}

/// Aggregate grading outcome, recomputed from the stored answer key on each
/// submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    pub quiz_id: Uuid,
    /// Fraction of questions answered correctly, in `[0, 1]`.
    pub score: f64,
    pub total_questions: u32,
    pub correct_count: u32,
    pub results: Vec<QuestionResult>,
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// Typed view of the request preference map. Recognized keys get fields;
/// unknown keys are preserved in `extra` and never cause failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Preferences {
    /// True when no recognized or unknown preference is present.
    pub fn is_empty(&self) -> bool {
        self.media_type.is_none()
            && self.provider.is_none()
            && self.language.is_none()
            && self.extra.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A learning path -- the top-level unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanRecord {
    #[serde(rename = "plan_id")]
    pub id: Uuid,
    pub user_id: String,
    pub goal: String,
    /// The requested time budget; the milestone-hour sum stays at or below it.
    pub total_hours: f64,
    pub hours_per_week: i32,
    pub estimated_weeks: i32,
    pub prerequisites_met: bool,
    /// Unmet prerequisite skills at plan time; replan reuses them.
    pub skill_gaps: Json<Vec<String>>,
    pub reasoning: String,
    pub milestones: Json<Vec<Milestone>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A generated quiz. Immutable after creation; grading history is appended
/// to `quiz_attempts` instead.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizRecord {
    pub id: Uuid,
    pub title: Option<String>,
    pub resource_ids: Json<Vec<Uuid>>,
    /// Server-held representation; exactly one option per question is
    /// marked correct.
    pub questions: Json<Vec<StoredQuestion>>,
    pub total_questions: i32,
    pub created_at: DateTime<Utc>,
}

/// Server-private answer key, created atomically with its quiz and read-only
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnswerKeyRecord {
    pub quiz_id: Uuid,
    /// question_id -> correct option_id.
    pub entries: Json<BTreeMap<Uuid, String>>,
    pub created_at: DateTime<Utc>,
}

/// One grading attempt for a quiz (appended history, derived data).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizAttemptRecord {
    pub id: i64,
    pub quiz_id: Uuid,
    pub score: f64,
    pub correct_count: i32,
    pub answers: Json<Vec<AnswerPair>>,
    pub submitted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
