//! Plan orchestration: runs one planning request through
//! Validate -> ResolveSkills -> Retrieve -> Allocate -> Assemble ->
//! OptionalQuiz, degrading gracefully when optional collaborators fail.

use std::collections::HashSet;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::{Semaphore, mpsc};
use uuid::Uuid;

use waypoint_db::models::{Difficulty, Milestone, PlanRecord, Preferences, QuizView};
use waypoint_db::queries::plans::{self, NewPlan};

use crate::allocator::{self, Allocation, AllocatorInput};
use crate::collaborators::ResourceSearch;
use crate::collaborators::types::ResourceCandidate;
use crate::context::RequestContext;
use crate::error::OrchestratorError;
use crate::quiz::{QuizGenerateRequest, QuizOrchestrator};
use crate::skills::{self, SkillResolver};

/// Tuning knobs for the planning flow.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Result count requested for the goal query.
    pub goal_top_k: usize,
    /// Result count requested per skill-gap query.
    pub gap_top_k: usize,
    /// Cap on concurrent retrieval sub-calls.
    pub max_concurrent_searches: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            goal_top_k: 12,
            gap_top_k: 4,
            max_concurrent_searches: 8,
        }
    }
}

/// A validated-on-entry planning request.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub goal: String,
    pub current_skills: Vec<String>,
    pub time_budget_hours: u32,
    pub hours_per_week: u32,
    pub preferences: Preferences,
    pub user_id: Option<String>,
}

/// Quiz settings when the caller wants a quiz with the plan.
#[derive(Debug, Clone, Default)]
pub struct PlanQuizOptions {
    pub num_questions: Option<u32>,
    pub difficulty: Option<Difficulty>,
}

/// Result of a planning request. `warnings` records every degraded-mode
/// decision; a non-empty list still means success.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: PlanRecord,
    pub quiz: Option<QuizView>,
    pub warnings: Vec<String>,
}

/// Top-level coordinator for plan creation and replanning.
pub struct PlanOrchestrator {
    pool: PgPool,
    search: Arc<dyn ResourceSearch>,
    skills: Arc<dyn SkillResolver>,
    quizzes: Arc<QuizOrchestrator>,
    config: PlannerConfig,
}

impl PlanOrchestrator {
    pub fn new(
        pool: PgPool,
        search: Arc<dyn ResourceSearch>,
        skills: Arc<dyn SkillResolver>,
        quizzes: Arc<QuizOrchestrator>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            pool,
            search,
            skills,
            quizzes,
            config,
        }
    }

    /// Create a learning path, optionally with a quiz over its resources.
    ///
    /// Retrieval and quiz failures degrade the outcome (warnings, smaller
    /// candidate set, `quiz = None`) instead of failing the request;
    /// validation failures fail fast before any network call.
    pub async fn plan(
        &self,
        ctx: &RequestContext,
        request: &PlanRequest,
        quiz: Option<&PlanQuizOptions>,
    ) -> Result<PlanOutcome, OrchestratorError> {
        validate_request(request)?;
        let goal = request.goal.trim();
        let mut warnings = Vec::new();

        // ResolveSkills: unmet prerequisites become the remediation gap set.
        let prerequisites = match self.skills.prerequisites_for(ctx, goal).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    error = %e,
                    "skill resolution unavailable, assuming no prerequisites"
                );
                warnings.push(format!(
                    "skill resolution unavailable ({e}); assuming no prerequisites"
                ));
                Vec::new()
            }
        };
        let gaps = skills::unmet_gaps(&prerequisites, &request.current_skills);
        let prerequisites_met = gaps.is_empty();

        // Retrieve: concurrent searches for the goal and each gap.
        let (candidates, retrieval_warnings, any_search_succeeded) =
            self.retrieve(ctx, goal, &gaps).await;
        warnings.extend(retrieval_warnings);
        let degraded = !any_search_succeeded;
        if degraded {
            warnings.push("retrieval unavailable; assembled a minimal plan".to_string());
        }

        // Allocate: pure and deterministic.
        let allocation = allocator::allocate(&AllocatorInput {
            candidates: &candidates,
            gap_skills: &gaps,
            total_hours: f64::from(request.time_budget_hours),
        });

        // Assemble and persist.
        let estimated_weeks = request.time_budget_hours.div_ceil(request.hours_per_week);
        let reasoning = compose_reasoning(
            f64::from(request.time_budget_hours),
            &allocation,
            &gaps,
            degraded,
            &request.preferences,
        );
        let milestones: Vec<Milestone> = allocation
            .milestones
            .into_iter()
            .map(|draft| draft.into_milestone())
            .collect();

        let record = plans::insert_plan(
            &self.pool,
            &NewPlan {
                user_id: request.user_id.as_deref().unwrap_or("anonymous"),
                goal,
                total_hours: f64::from(request.time_budget_hours),
                hours_per_week: request.hours_per_week as i32,
                estimated_weeks: estimated_weeks as i32,
                prerequisites_met,
                skill_gaps: &gaps,
                reasoning: &reasoning,
                milestones: &milestones,
            },
        )
        .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            plan_id = %record.id,
            milestones = record.milestones.0.len(),
            prerequisites_met,
            degraded,
            "learning path assembled"
        );

        // OptionalQuiz: absorbed into warnings on failure.
        let quiz_view = match quiz {
            None => None,
            Some(options) => {
                let resource_ids = collect_resource_ids(&record.milestones.0);
                if resource_ids.is_empty() {
                    warnings.push("no resources selected; skipping quiz generation".to_string());
                    None
                } else {
                    let quiz_request = QuizGenerateRequest {
                        resource_ids,
                        num_questions: options.num_questions,
                        difficulty: options.difficulty,
                    };
                    match self.quizzes.generate(ctx, &quiz_request).await {
                        Ok(outcome) => {
                            warnings.extend(outcome.warnings);
                            Some(outcome.quiz)
                        }
                        Err(e) => {
                            tracing::warn!(
                                request_id = %ctx.request_id,
                                plan_id = %record.id,
                                error = %e,
                                "quiz generation failed, returning plan without quiz"
                            );
                            warnings.push(format!("quiz generation failed: {e}"));
                            None
                        }
                    }
                }
            }
        };

        Ok(PlanOutcome {
            plan: record,
            quiz: quiz_view,
            warnings,
        })
    }

    /// Re-run allocation for an existing plan after progress: completed
    /// resources drop out, the stored budget and gap set stay in force.
    pub async fn replan(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
        completed_lessons: &[Uuid],
        feedback: Option<&str>,
    ) -> Result<PlanOutcome, OrchestratorError> {
        let plan = plans::get_plan(&self.pool, plan_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("plan {plan_id}")))?;

        let completed: HashSet<Uuid> = completed_lessons.iter().copied().collect();

        let mut remaining = Vec::new();
        let mut removed = 0usize;
        for milestone in &plan.milestones.0 {
            for resource in &milestone.resources {
                if completed.contains(&resource.resource_id) {
                    removed += 1;
                } else {
                    remaining.push(resource.clone());
                }
            }
        }

        // Remaining resources become candidates again; earlier placement
        // keeps higher keep-priority via a synthetic score.
        let count = remaining.len();
        let candidates: Vec<ResourceCandidate> = remaining
            .into_iter()
            .enumerate()
            .map(|(idx, resource)| ResourceCandidate {
                resource_id: resource.resource_id,
                title: resource.title,
                url: resource.url,
                duration_min: resource.duration_min,
                level: resource.level,
                skills: resource.skills,
                score: (count - idx) as f64,
            })
            .collect();

        let gaps = plan.skill_gaps.0.clone();
        let allocation = allocator::allocate(&AllocatorInput {
            candidates: &candidates,
            gap_skills: &gaps,
            total_hours: plan.total_hours,
        });

        let mut reasoning = format!("Replanned: removed {removed} completed resource(s).");
        if let Some(fb) = feedback.map(str::trim).filter(|fb| !fb.is_empty()) {
            reasoning.push_str(&format!(" Feedback noted: {fb}."));
        }
        for note in &allocation.notes {
            reasoning.push(' ');
            reasoning.push_str(note);
            reasoning.push('.');
        }

        let milestones: Vec<Milestone> = allocation
            .milestones
            .into_iter()
            .map(|draft| draft.into_milestone())
            .collect();

        let updated =
            plans::update_plan_milestones(&self.pool, plan_id, &milestones, &reasoning).await?;

        tracing::info!(
            request_id = %ctx.request_id,
            plan_id = %plan_id,
            removed,
            milestones = updated.milestones.0.len(),
            "plan updated after replan"
        );

        Ok(PlanOutcome {
            plan: updated,
            quiz: None,
            warnings: Vec::new(),
        })
    }

    /// Fan out retrieval sub-calls for the goal and each gap, bounded by the
    /// configured concurrency cap. Individual failures degrade the candidate
    /// set; the bool reports whether any search succeeded.
    async fn retrieve(
        &self,
        ctx: &RequestContext,
        goal: &str,
        gaps: &[String],
    ) -> (Vec<ResourceCandidate>, Vec<String>, bool) {
        let mut queries: Vec<(String, usize)> = vec![(goal.to_string(), self.config.goal_top_k)];
        for gap in gaps {
            queries.push((gap.clone(), self.config.gap_top_k));
        }

        let cap = queries.len().clamp(1, self.config.max_concurrent_searches);
        let semaphore = Arc::new(Semaphore::new(cap));
        let (tx, mut rx) = mpsc::channel(queries.len());

        for (query, top_k) in queries {
            let semaphore = Arc::clone(&semaphore);
            let search = Arc::clone(&self.search);
            let ctx = ctx.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = search.search(&ctx, &query, top_k).await;
                let _ = tx.send((query, result)).await;
            });
        }
        drop(tx);

        let mut candidates = Vec::new();
        let mut warnings = Vec::new();
        let mut any_succeeded = false;
        while let Some((query, result)) = rx.recv().await {
            match result {
                Ok(mut results) => {
                    any_succeeded = true;
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        query = %query,
                        results = results.len(),
                        "retrieval sub-call completed"
                    );
                    candidates.append(&mut results);
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        query = %query,
                        error = %e,
                        "retrieval sub-call failed, continuing without it"
                    );
                    warnings.push(format!("retrieval for {query:?} failed: {e}"));
                }
            }
        }
        // Stable warning order regardless of completion order.
        warnings.sort();

        (candidates, warnings, any_succeeded)
    }
}

/// Fail fast on client-fixable input problems, before any network call.
fn validate_request(request: &PlanRequest) -> Result<(), OrchestratorError> {
    if request.goal.trim().is_empty() {
        return Err(OrchestratorError::InvalidRequest(
            "goal must not be empty".to_string(),
        ));
    }
    if request.time_budget_hours < 1 {
        return Err(OrchestratorError::InvalidRequest(
            "time_budget_hours must be at least 1".to_string(),
        ));
    }
    if request.hours_per_week < 1 {
        return Err(OrchestratorError::InvalidRequest(
            "hours_per_week must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Every resource id placed in the plan, in milestone order.
fn collect_resource_ids(milestones: &[Milestone]) -> Vec<Uuid> {
    milestones
        .iter()
        .flat_map(|m| m.resources.iter().map(|r| r.resource_id))
        .collect()
}

/// Human-readable summary of the allocation decisions.
fn compose_reasoning(
    total_hours: f64,
    allocation: &Allocation,
    gaps: &[String],
    degraded: bool,
    preferences: &Preferences,
) -> String {
    let mut parts = Vec::new();

    if degraded {
        parts.push("Retrieval was unavailable; assembled a minimal plan".to_string());
    }
    if !gaps.is_empty() {
        parts.push(format!(
            "Unmet prerequisites ({}) are covered by a remediation milestone first",
            gaps.join(", ")
        ));
    }
    parts.push(format!(
        "Allocated {:.1} of the {:.0}-hour budget across {} milestone(s)",
        allocation.allocated_hours,
        total_hours,
        allocation.milestones.len()
    ));
    parts.extend(allocation.notes.iter().cloned());

    if !preferences.is_empty() {
        let mut noted = Vec::new();
        if let Some(ref media) = preferences.media_type {
            noted.push(format!("media_type={media}"));
        }
        if let Some(ref provider) = preferences.provider {
            noted.push(format!("provider={provider}"));
        }
        if let Some(ref language) = preferences.language {
            noted.push(format!("language={language}"));
        }
        if !preferences.extra.is_empty() {
            noted.push(format!("{} unrecognized key(s) preserved", preferences.extra.len()));
        }
        parts.push(format!("Preferences recorded: {}", noted.join(", ")));
    }

    let mut reasoning = parts.join(". ");
    reasoning.push('.');
    reasoning
}
