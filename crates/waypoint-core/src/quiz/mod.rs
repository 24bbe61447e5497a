//! Quiz orchestration: generate a citation-grounded quiz with a private
//! answer key, and grade submissions against that key.
//!
//! The two-phase protocol is generate -> submit. Correctness information is
//! confined to the server-held representation and the answer key; the
//! generate path serializes only the sanitized view types.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::Context as _;
use sqlx::PgPool;
use tokio::sync::{Semaphore, mpsc};
use uuid::Uuid;

use waypoint_db::models::{
    AnswerPair, Difficulty, QuestionResult, QuizResult, QuizView, StoredOption, StoredQuestion,
};
use waypoint_db::queries::quizzes::{self, NewQuiz};

use crate::collaborators::types::{DraftQuestion, DraftRequest, Snippet};
use crate::collaborators::{QuestionAuthor, SnippetStore};
use crate::context::RequestContext;
use crate::error::OrchestratorError;

/// Question count used when the request leaves it unspecified or zero.
pub const DEFAULT_NUM_QUESTIONS: u32 = 5;

/// Hard upper bound on the requested question count.
pub const MAX_NUM_QUESTIONS: u32 = 20;

/// How many questions one resource's content can support.
pub const MAX_QUESTIONS_PER_RESOURCE: u32 = 2;

/// Concurrency cap for snippet fetches.
const SNIPPET_CONCURRENCY: usize = 8;

/// A quiz generation request.
#[derive(Debug, Clone)]
pub struct QuizGenerateRequest {
    pub resource_ids: Vec<Uuid>,
    pub num_questions: Option<u32>,
    pub difficulty: Option<Difficulty>,
}

/// Result of a successful generate call: the sanitized quiz plus warnings
/// for any adjustments (scaled-down count, skipped resources).
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub quiz: QuizView,
    pub warnings: Vec<String>,
}

/// Orchestrates quiz generation and grading.
pub struct QuizOrchestrator {
    pool: PgPool,
    snippets: Arc<dyn SnippetStore>,
    author: Arc<dyn QuestionAuthor>,
}

impl QuizOrchestrator {
    pub fn new(
        pool: PgPool,
        snippets: Arc<dyn SnippetStore>,
        author: Arc<dyn QuestionAuthor>,
    ) -> Self {
        Self {
            pool,
            snippets,
            author,
        }
    }

    /// Generate a quiz from a resource set and persist it atomically with
    /// its answer key.
    ///
    /// Under-resourced requests scale down: the question count is capped at
    /// [`MAX_QUESTIONS_PER_RESOURCE`] per usable resource and the adjustment
    /// is recorded in the outcome warnings.
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        request: &QuizGenerateRequest,
    ) -> Result<GenerateOutcome, OrchestratorError> {
        if request.resource_ids.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "resource_ids must not be empty".to_string(),
            ));
        }
        let requested = match request.num_questions {
            None | Some(0) => DEFAULT_NUM_QUESTIONS,
            Some(n) if n > MAX_NUM_QUESTIONS => {
                return Err(OrchestratorError::InvalidRequest(format!(
                    "num_questions must be at most {MAX_NUM_QUESTIONS}, got {n}"
                )));
            }
            Some(n) => n,
        };

        // Dedupe ids, preserving request order.
        let mut seen = HashSet::new();
        let resource_ids: Vec<Uuid> = request
            .resource_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let mut warnings = Vec::new();

        // 1. Fetch citation snippets concurrently.
        let (fetched, failures) = self.fetch_snippets(ctx, &resource_ids).await;
        for (id, detail) in &failures {
            warnings.push(format!("skipped resource {id}: {detail}"));
        }

        let snippets: Vec<Snippet> = resource_ids
            .iter()
            .filter_map(|id| fetched.get(id).cloned())
            .collect();
        if snippets.is_empty() {
            return Err(OrchestratorError::InsufficientSource(
                "no citation content available for the requested resources".to_string(),
            ));
        }

        // 2. Scale the question count down to what the sources support.
        let cap = snippets.len() as u32 * MAX_QUESTIONS_PER_RESOURCE;
        let target = requested.min(cap);
        if target < requested {
            warnings.push(format!(
                "requested {requested} questions but {} usable resources support at most {cap}; \
                 scaled down to {target}",
                snippets.len()
            ));
        }

        // 3. Draft questions. Generation is side-effecting downstream, so a
        //    failure here surfaces instead of being retried.
        let draft_request = DraftRequest {
            snippets: snippets.clone(),
            num_questions: target,
            difficulty: request.difficulty,
        };
        let drafts = self
            .author
            .draft_questions(ctx, &draft_request)
            .await
            .map_err(|e| OrchestratorError::ServiceUnavailable(e.to_string()))?;

        // 4. Keep only structurally sound drafts grounded in the resource set.
        let allowed: HashSet<Uuid> = snippets.iter().map(|s| s.resource_id).collect();
        let mut accepted: Vec<DraftQuestion> = Vec::new();
        for draft in drafts {
            match draft_problem(&draft, &allowed) {
                None => accepted.push(draft),
                Some(problem) => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        problem = %problem,
                        "discarding unusable drafted question"
                    );
                    warnings.push(format!("discarded one drafted question: {problem}"));
                }
            }
        }
        accepted.truncate(target as usize);

        if accepted.is_empty() {
            return Err(OrchestratorError::ServiceUnavailable(
                "question authoring returned no usable questions".to_string(),
            ));
        }
        if (accepted.len() as u32) < target {
            warnings.push(format!(
                "authoring produced {} usable questions of the {target} requested",
                accepted.len()
            ));
        }

        // 5. Build the server-held representation and the answer key.
        let mut questions = Vec::with_capacity(accepted.len());
        let mut key_entries: BTreeMap<Uuid, String> = BTreeMap::new();
        for draft in &accepted {
            let question_id = Uuid::new_v4();
            let options: Vec<StoredOption> = draft
                .options
                .iter()
                .map(|o| StoredOption {
                    option_id: o.id.clone(),
                    text: o.text.clone(),
                    is_correct: o.id == draft.correct_option,
                })
                .collect();
            key_entries.insert(question_id, draft.correct_option.clone());
            questions.push(StoredQuestion {
                question_id,
                question_text: draft.question_text.clone(),
                options,
                explanation: draft.explanation.clone(),
                source_resource_id: draft.source_resource_id,
                citation: draft.citation.clone(),
            });
        }

        let title = if snippets.len() == 1 {
            format!("Quiz: {}", snippets[0].title)
        } else {
            format!("Quiz: {} resources", snippets.len())
        };

        // 6. Quiz and key land in one transaction (create-if-absent).
        let record = quizzes::insert_quiz_with_key(
            &self.pool,
            &NewQuiz {
                id: Uuid::new_v4(),
                title: Some(title.as_str()),
                resource_ids: &resource_ids,
                questions: &questions,
                key_entries: &key_entries,
            },
        )
        .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            quiz_id = %record.id,
            questions = record.total_questions,
            "quiz generated"
        );

        Ok(GenerateOutcome {
            quiz: QuizView::from(&record),
            warnings,
        })
    }

    /// Grade a submission against the stored answer key.
    ///
    /// Recomputes from the immutable key on every call, so identical
    /// submissions yield identical results. Answer entries for unknown
    /// question ids are ignored; unanswered questions count as incorrect.
    pub async fn submit(
        &self,
        ctx: &RequestContext,
        quiz_id: Uuid,
        answers: &[AnswerPair],
    ) -> Result<QuizResult, OrchestratorError> {
        let quiz = quizzes::get_quiz(&self.pool, quiz_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("quiz {quiz_id}")))?;

        let key = quizzes::get_answer_key(&self.pool, quiz_id)
            .await?
            .with_context(|| format!("answer key missing for quiz {quiz_id}"))?;

        let (results, correct_count) = grade(&quiz.questions.0, &key.entries.0, answers)?;

        let total = quiz.questions.0.len() as u32;
        let score = if total == 0 {
            0.0
        } else {
            f64::from(correct_count) / f64::from(total)
        };

        quizzes::insert_attempt(&self.pool, quiz_id, score, correct_count as i32, answers).await?;

        tracing::info!(
            request_id = %ctx.request_id,
            quiz_id = %quiz_id,
            correct = correct_count,
            total = total,
            "quiz graded"
        );

        Ok(QuizResult {
            quiz_id,
            score,
            total_questions: total,
            correct_count,
            results,
        })
    }

    async fn fetch_snippets(
        &self,
        ctx: &RequestContext,
        resource_ids: &[Uuid],
    ) -> (HashMap<Uuid, Snippet>, Vec<(Uuid, String)>) {
        let semaphore = Arc::new(Semaphore::new(SNIPPET_CONCURRENCY));
        let (tx, mut rx) = mpsc::channel(resource_ids.len().max(1));

        for id in resource_ids.iter().copied() {
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.snippets);
            let ctx = ctx.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = store.citation_snippet(&ctx, id).await;
                let _ = tx.send((id, result)).await;
            });
        }
        drop(tx);

        let mut fetched = HashMap::new();
        let mut failures = Vec::new();
        while let Some((id, result)) = rx.recv().await {
            match result {
                Ok(snippet) => {
                    fetched.insert(id, snippet);
                }
                Err(e) => failures.push((id, e.to_string())),
            }
        }
        // Stable warning order regardless of completion order.
        failures.sort_by_key(|(id, _)| *id);
        (fetched, failures)
    }
}

/// Why a drafted question cannot be used, or `None` when it is sound.
fn draft_problem(draft: &DraftQuestion, allowed_sources: &HashSet<Uuid>) -> Option<String> {
    if draft.question_text.trim().is_empty() {
        return Some("empty question text".to_string());
    }
    if draft.options.len() < 2 {
        return Some(format!("only {} option(s)", draft.options.len()));
    }
    let mut ids = HashSet::new();
    if !draft.options.iter().all(|o| ids.insert(o.id.as_str())) {
        return Some("duplicate option ids".to_string());
    }
    let correct_matches = draft
        .options
        .iter()
        .filter(|o| o.id == draft.correct_option)
        .count();
    if correct_matches != 1 {
        return Some(format!(
            "correct option {:?} matches {correct_matches} options",
            draft.correct_option
        ));
    }
    if !allowed_sources.contains(&draft.source_resource_id) {
        return Some(format!(
            "source resource {} is not part of the quiz's resource set",
            draft.source_resource_id
        ));
    }
    if draft.citation.trim().is_empty() {
        return Some("missing citation".to_string());
    }
    None
}

/// Grade stored questions against the answer key. Pure; returns the
/// per-question results and the correct count.
fn grade(
    questions: &[StoredQuestion],
    key: &BTreeMap<Uuid, String>,
    answers: &[AnswerPair],
) -> anyhow::Result<(Vec<QuestionResult>, u32)> {
    let answer_map: HashMap<Uuid, &str> = answers
        .iter()
        .map(|a| (a.question_id, a.selected_option_id.as_str()))
        .collect();

    let mut results = Vec::with_capacity(questions.len());
    let mut correct_count = 0;

    for question in questions {
        let correct_option_id = key
            .get(&question.question_id)
            .with_context(|| format!("no key entry for question {}", question.question_id))?;

        let selected = answer_map.get(&question.question_id).copied();
        let correct = selected == Some(correct_option_id.as_str());
        if correct {
            correct_count += 1;
        }

        results.push(QuestionResult {
            question_id: question.question_id,
            correct,
            selected_option_id: selected.map(str::to_string),
            correct_option_id: correct_option_id.clone(),
            explanation: question.explanation.clone(),
            citation: question.citation.clone(),
        });
    }

    Ok((results, correct_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::types::DraftOption;

    fn draft(source: Uuid) -> DraftQuestion {
        DraftQuestion {
            question_text: "Which clause filters rows?".to_string(),
            options: vec![
                DraftOption {
                    id: "A".to_string(),
                    text: "WHERE".to_string(),
                },
                DraftOption {
                    id: "B".to_string(),
                    text: "ORDER BY".to_string(),
                },
            ],
            correct_option: "A".to_string(),
            explanation: "WHERE filters rows.".to_string(),
            source_resource_id: source,
            citation: "\"Use WHERE to filter rows.\"".to_string(),
        }
    }

    fn stored(question_id: Uuid, correct: &str) -> StoredQuestion {
        StoredQuestion {
            question_id,
            question_text: "Q".to_string(),
            options: vec![
                StoredOption {
                    option_id: "A".to_string(),
                    text: "a".to_string(),
                    is_correct: correct == "A",
                },
                StoredOption {
                    option_id: "B".to_string(),
                    text: "b".to_string(),
                    is_correct: correct == "B",
                },
            ],
            explanation: "because".to_string(),
            source_resource_id: Uuid::new_v4(),
            citation: "cite".to_string(),
        }
    }

    #[test]
    fn sound_draft_passes_validation() {
        let source = Uuid::new_v4();
        let allowed = HashSet::from([source]);
        assert_eq!(draft_problem(&draft(source), &allowed), None);
    }

    #[test]
    fn draft_with_foreign_source_is_rejected() {
        let allowed = HashSet::from([Uuid::new_v4()]);
        let problem = draft_problem(&draft(Uuid::new_v4()), &allowed);
        assert!(problem.is_some_and(|p| p.contains("resource set")));
    }

    #[test]
    fn draft_with_ambiguous_correct_option_is_rejected() {
        let source = Uuid::new_v4();
        let allowed = HashSet::from([source]);
        let mut bad = draft(source);
        bad.correct_option = "Z".to_string();
        let problem = draft_problem(&bad, &allowed);
        assert!(problem.is_some_and(|p| p.contains("matches 0 options")));
    }

    #[test]
    fn draft_without_citation_is_rejected() {
        let source = Uuid::new_v4();
        let allowed = HashSet::from([source]);
        let mut bad = draft(source);
        bad.citation = "  ".to_string();
        assert!(draft_problem(&bad, &allowed).is_some());
    }

    #[test]
    fn draft_with_duplicate_option_ids_is_rejected() {
        let source = Uuid::new_v4();
        let allowed = HashSet::from([source]);
        let mut bad = draft(source);
        bad.options[1].id = "A".to_string();
        let problem = draft_problem(&bad, &allowed);
        assert!(problem.is_some_and(|p| p.contains("duplicate")));
    }

    #[test]
    fn grade_counts_correct_answers() {
        let q1 = Uuid::new_v4();
        let q2 = Uuid::new_v4();
        let questions = vec![stored(q1, "A"), stored(q2, "B")];
        let key = BTreeMap::from([(q1, "A".to_string()), (q2, "B".to_string())]);
        let answers = vec![
            AnswerPair {
                question_id: q1,
                selected_option_id: "A".to_string(),
            },
            AnswerPair {
                question_id: q2,
                selected_option_id: "A".to_string(),
            },
        ];

        let (results, correct) = grade(&questions, &key, &answers).unwrap();
        assert_eq!(correct, 1);
        assert!(results[0].correct);
        assert!(!results[1].correct);
        assert_eq!(results[1].correct_option_id, "B");
    }

    #[test]
    fn unanswered_questions_are_incorrect_not_errors() {
        let q1 = Uuid::new_v4();
        let questions = vec![stored(q1, "A")];
        let key = BTreeMap::from([(q1, "A".to_string())]);

        let (results, correct) = grade(&questions, &key, &[]).unwrap();
        assert_eq!(correct, 0);
        assert_eq!(results[0].selected_option_id, None);
        assert!(!results[0].correct);
    }

    #[test]
    fn answers_for_unknown_questions_are_ignored() {
        let q1 = Uuid::new_v4();
        let questions = vec![stored(q1, "A")];
        let key = BTreeMap::from([(q1, "A".to_string())]);
        let answers = vec![
            AnswerPair {
                question_id: Uuid::new_v4(),
                selected_option_id: "B".to_string(),
            },
            AnswerPair {
                question_id: q1,
                selected_option_id: "A".to_string(),
            },
        ];

        let (results, correct) = grade(&questions, &key, &answers).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(correct, 1);
    }

    #[test]
    fn grade_is_idempotent() {
        let q1 = Uuid::new_v4();
        let questions = vec![stored(q1, "B")];
        let key = BTreeMap::from([(q1, "B".to_string())]);
        let answers = vec![AnswerPair {
            question_id: q1,
            selected_option_id: "B".to_string(),
        }];

        let first = grade(&questions, &key, &answers).unwrap();
        let second = grade(&questions, &key, &answers).unwrap();
        assert_eq!(first, second);
    }
}
