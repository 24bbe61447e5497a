//! End-to-end tests for the planning flow against a real database, with
//! in-process fakes standing in for the HTTP collaborators.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use waypoint_db::models::Preferences;
use waypoint_db::queries::{plans, quizzes};
use waypoint_test_utils::{create_test_db, drop_test_db};

use waypoint_core::client::ClientError;
use waypoint_core::collaborators::types::{
    DraftOption, DraftQuestion, DraftRequest, ResourceCandidate, Snippet,
};
use waypoint_core::collaborators::{QuestionAuthor, ResourceSearch, SnippetStore};
use waypoint_core::context::RequestContext;
use waypoint_core::orchestrator::{
    PlanOrchestrator, PlanQuizOptions, PlanRequest, PlannerConfig,
};
use waypoint_core::quiz::QuizOrchestrator;
use waypoint_core::skills::CatalogSkillResolver;

// ===========================================================================
// Collaborator fakes
// ===========================================================================

/// Returns the same candidate list for every query, counting calls.
struct StaticSearch {
    results: Vec<ResourceCandidate>,
    calls: AtomicUsize,
}

impl StaticSearch {
    fn new(results: Vec<ResourceCandidate>) -> Arc<Self> {
        Arc::new(Self {
            results,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ResourceSearch for StaticSearch {
    async fn search(
        &self,
        _ctx: &RequestContext,
        _query: &str,
        top_k: usize,
    ) -> Result<Vec<ResourceCandidate>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.iter().take(top_k).cloned().collect())
    }
}

/// Every search fails as if the collaborator were down.
struct FailingSearch;

#[async_trait]
impl ResourceSearch for FailingSearch {
    async fn search(
        &self,
        _ctx: &RequestContext,
        _query: &str,
        _top_k: usize,
    ) -> Result<Vec<ResourceCandidate>, ClientError> {
        Err(ClientError::Unavailable {
            service: "retrieval",
            status: None,
            detail: "connection refused".to_string(),
        })
    }
}

/// Serves a snippet for any resource id.
struct StaticSnippets;

#[async_trait]
impl SnippetStore for StaticSnippets {
    async fn citation_snippet(
        &self,
        _ctx: &RequestContext,
        resource_id: Uuid,
    ) -> Result<Snippet, ClientError> {
        Ok(Snippet {
            resource_id,
            title: format!("Resource {resource_id}"),
            content: "The SELECT statement retrieves rows from a table.".to_string(),
        })
    }
}

/// Drafts deterministic questions, one per requested slot, cycling through
/// the snippets. Option "A" is always correct.
struct ScriptedAuthor;

#[async_trait]
impl QuestionAuthor for ScriptedAuthor {
    async fn draft_questions(
        &self,
        _ctx: &RequestContext,
        request: &DraftRequest,
    ) -> Result<Vec<DraftQuestion>, ClientError> {
        let drafts = (0..request.num_questions)
            .map(|i| {
                let snippet = &request.snippets[i as usize % request.snippets.len()];
                DraftQuestion {
                    question_text: format!("Question {i} about {}", snippet.title),
                    options: vec![
                        DraftOption {
                            id: "A".to_string(),
                            text: "The right answer".to_string(),
                        },
                        DraftOption {
                            id: "B".to_string(),
                            text: "A wrong answer".to_string(),
                        },
                        DraftOption {
                            id: "C".to_string(),
                            text: "Another wrong answer".to_string(),
                        },
                        DraftOption {
                            id: "D".to_string(),
                            text: "Yet another wrong answer".to_string(),
                        },
                    ],
                    correct_option: "A".to_string(),
                    explanation: "Option A matches the cited sentence.".to_string(),
                    source_resource_id: snippet.resource_id,
                    citation: snippet.content.clone(),
                }
            })
            .collect();
        Ok(drafts)
    }
}

/// Authoring collaborator that is always down.
struct FailingAuthor;

#[async_trait]
impl QuestionAuthor for FailingAuthor {
    async fn draft_questions(
        &self,
        _ctx: &RequestContext,
        _request: &DraftRequest,
    ) -> Result<Vec<DraftQuestion>, ClientError> {
        Err(ClientError::Unavailable {
            service: "question-authoring",
            status: Some(503),
            detail: "model backend overloaded".to_string(),
        })
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

fn candidate(id: u128, title: &str, minutes: u32, skills: &[&str], score: f64) -> ResourceCandidate {
    ResourceCandidate {
        resource_id: Uuid::from_u128(id),
        title: title.to_string(),
        url: format!("https://example.com/{id}"),
        duration_min: minutes,
        level: None,
        skills: skills.iter().map(|s| s.to_string()).collect(),
        score,
    }
}

fn orchestrator(
    pool: &PgPool,
    search: Arc<dyn ResourceSearch>,
    author: Arc<dyn QuestionAuthor>,
) -> PlanOrchestrator {
    let quizzes = Arc::new(QuizOrchestrator::new(
        pool.clone(),
        Arc::new(StaticSnippets),
        author,
    ));
    PlanOrchestrator::new(
        pool.clone(),
        search,
        Arc::new(CatalogSkillResolver::new()),
        quizzes,
        PlannerConfig::default(),
    )
}

fn ctx() -> RequestContext {
    RequestContext::with_generated_id(Duration::from_secs(30))
}

fn sql_request() -> PlanRequest {
    PlanRequest {
        goal: "Learn SQL basics".to_string(),
        current_skills: vec![],
        time_budget_hours: 10,
        hours_per_week: 5,
        preferences: Preferences::default(),
        user_id: Some("user-1".to_string()),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn sql_basics_end_to_end() {
    let (pool, db_name) = create_test_db().await;

    let search = StaticSearch::new(vec![
        candidate(1, "SQL Intro", 120, &["sql"], 0.9),
        candidate(2, "SQL Joins", 120, &["sql"], 0.8),
        candidate(3, "SQL Practice", 120, &["sql"], 0.7),
    ]);
    let planner = orchestrator(&pool, search, Arc::new(ScriptedAuthor));

    let outcome = planner
        .plan(&ctx(), &sql_request(), None)
        .await
        .expect("planning should succeed");

    let plan = &outcome.plan;
    assert_eq!(plan.goal, "Learn SQL basics");
    assert_eq!(plan.total_hours, 10.0);
    assert_eq!(plan.estimated_weeks, 2);
    assert!(plan.prerequisites_met);
    assert_eq!(plan.milestones.0.len(), 1);
    assert_eq!(plan.milestones.0[0].estimated_hours, 6.0);
    assert!(outcome.quiz.is_none());

    // Orders are contiguous and zero-based at both levels.
    for (idx, milestone) in plan.milestones.0.iter().enumerate() {
        assert_eq!(milestone.order, idx as u32);
        for (ridx, resource) in milestone.resources.iter().enumerate() {
            assert_eq!(resource.order, ridx as u32);
        }
    }

    // The milestone-hour sum respects the budget.
    let sum: f64 = plan.milestones.0.iter().map(|m| m.estimated_hours).sum();
    assert!(sum <= plan.total_hours * 1.01);

    // The plan is durable.
    let stored = plans::get_plan(&pool, plan.id)
        .await
        .expect("get_plan should succeed")
        .expect("plan should be stored");
    assert_eq!(stored.milestones.0, plan.milestones.0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn retrieval_total_failure_yields_degraded_success() {
    let (pool, db_name) = create_test_db().await;

    let planner = orchestrator(&pool, Arc::new(FailingSearch), Arc::new(ScriptedAuthor));

    let outcome = planner
        .plan(&ctx(), &sql_request(), None)
        .await
        .expect("total retrieval failure must not fail the request");

    assert!(
        outcome
            .warnings
            .iter()
            .any(|w| w.contains("retrieval unavailable")),
        "warnings: {:?}",
        outcome.warnings
    );
    assert!(outcome.plan.milestones.0.is_empty());
    assert!(outcome.plan.prerequisites_met);
    assert!(
        outcome.plan.reasoning.contains("minimal plan"),
        "reasoning should reflect degraded mode: {}",
        outcome.plan.reasoning
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn unmet_prerequisites_inject_remediation_milestone() {
    let (pool, db_name) = create_test_db().await;

    // "machine learning" requires python and statistics in the catalog.
    let search = StaticSearch::new(vec![
        candidate(1, "ML Crash Course", 120, &["machine-learning"], 0.9),
        candidate(2, "Python Primer", 60, &["python"], 0.6),
    ]);
    let planner = orchestrator(&pool, search, Arc::new(ScriptedAuthor));

    let request = PlanRequest {
        goal: "Intro to Machine Learning".to_string(),
        current_skills: vec!["statistics".to_string()],
        time_budget_hours: 20,
        hours_per_week: 4,
        preferences: Preferences::default(),
        user_id: None,
    };

    let outcome = planner
        .plan(&ctx(), &request, None)
        .await
        .expect("planning should succeed");

    let plan = &outcome.plan;
    assert!(!plan.prerequisites_met);
    assert_eq!(plan.skill_gaps.0, vec!["python".to_string()]);
    assert_eq!(plan.estimated_weeks, 5);

    let first = &plan.milestones.0[0];
    assert_eq!(first.order, 0);
    assert!(first.title.starts_with("Prerequisites"));
    assert!(
        first
            .resources
            .iter()
            .any(|r| r.resource_id == Uuid::from_u128(2)),
        "remediation milestone should hold the python resource"
    );

    // A resource id appears at most once across the whole plan, even though
    // the goal and gap searches returned the same candidates.
    let mut seen = HashSet::new();
    for milestone in &plan.milestones.0 {
        for resource in &milestone.resources {
            assert!(
                seen.insert(resource.resource_id),
                "resource {} appears twice",
                resource.resource_id
            );
        }
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn invalid_request_fails_fast_without_network_calls() {
    let (pool, db_name) = create_test_db().await;

    let search = StaticSearch::new(vec![candidate(1, "SQL Intro", 60, &["sql"], 0.9)]);
    let counting = Arc::clone(&search);
    let planner = orchestrator(&pool, search, Arc::new(ScriptedAuthor));

    let mut request = sql_request();
    request.goal = "   ".to_string();

    let err = planner.plan(&ctx(), &request, None).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
    assert_eq!(
        counting.calls.load(Ordering::SeqCst),
        0,
        "validation failures must not reach the retrieval collaborator"
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn optional_quiz_failure_is_absorbed_as_warning() {
    let (pool, db_name) = create_test_db().await;

    let search = StaticSearch::new(vec![candidate(1, "SQL Intro", 120, &["sql"], 0.9)]);
    let planner = orchestrator(&pool, search, Arc::new(FailingAuthor));

    let outcome = planner
        .plan(&ctx(), &sql_request(), Some(&PlanQuizOptions::default()))
        .await
        .expect("quiz failure must not fail the plan");

    assert!(outcome.quiz.is_none());
    assert!(
        outcome
            .warnings
            .iter()
            .any(|w| w.contains("quiz generation failed")),
        "warnings: {:?}",
        outcome.warnings
    );
    assert!(!outcome.plan.milestones.0.is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn plan_with_quiz_returns_sanitized_quiz() {
    let (pool, db_name) = create_test_db().await;

    let search = StaticSearch::new(vec![
        candidate(1, "SQL Intro", 120, &["sql"], 0.9),
        candidate(2, "SQL Joins", 120, &["sql"], 0.8),
    ]);
    let planner = orchestrator(&pool, search, Arc::new(ScriptedAuthor));

    let outcome = planner
        .plan(&ctx(), &sql_request(), Some(&PlanQuizOptions::default()))
        .await
        .expect("planning should succeed");

    let quiz = outcome.quiz.expect("quiz should be generated");
    assert!(quiz.total_questions > 0);

    let serialized = serde_json::to_string(&quiz).expect("quiz view should serialize");
    assert!(!serialized.contains("is_correct"));
    assert!(!serialized.contains("correct_option"));

    // Quiz and answer key are durable.
    let stored = quizzes::get_quiz(&pool, quiz.quiz_id)
        .await
        .expect("get_quiz should succeed")
        .expect("quiz should be stored");
    assert_eq!(stored.total_questions as u32, quiz.total_questions);
    assert!(
        quizzes::get_answer_key(&pool, quiz.quiz_id)
            .await
            .expect("get_answer_key should succeed")
            .is_some()
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn replan_removes_completed_resources() {
    let (pool, db_name) = create_test_db().await;

    let search = StaticSearch::new(vec![
        candidate(1, "SQL Intro", 120, &["sql"], 0.9),
        candidate(2, "SQL Joins", 120, &["sql"], 0.8),
        candidate(3, "SQL Practice", 120, &["sql"], 0.7),
    ]);
    let planner = orchestrator(&pool, search, Arc::new(ScriptedAuthor));

    let created = planner
        .plan(&ctx(), &sql_request(), None)
        .await
        .expect("planning should succeed");

    let outcome = planner
        .replan(
            &ctx(),
            created.plan.id,
            &[Uuid::from_u128(1)],
            Some("joins were hard"),
        )
        .await
        .expect("replan should succeed");

    let remaining: Vec<Uuid> = outcome
        .plan
        .milestones
        .0
        .iter()
        .flat_map(|m| m.resources.iter().map(|r| r.resource_id))
        .collect();
    assert_eq!(remaining.len(), 2);
    assert!(!remaining.contains(&Uuid::from_u128(1)));

    assert!(outcome.plan.reasoning.contains("removed 1 completed"));
    assert!(outcome.plan.reasoning.contains("joins were hard"));
    assert!(outcome.plan.updated_at >= created.plan.updated_at);

    // Budget columns survive the replan untouched.
    assert_eq!(outcome.plan.total_hours, 10.0);
    assert_eq!(outcome.plan.estimated_weeks, 2);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn replan_unknown_plan_is_not_found() {
    let (pool, db_name) = create_test_db().await;

    let search = StaticSearch::new(vec![]);
    let planner = orchestrator(&pool, search, Arc::new(ScriptedAuthor));

    let err = planner
        .replan(&ctx(), Uuid::new_v4(), &[], None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    pool.close().await;
    drop_test_db(&db_name).await;
}
