//! Database query functions for the `plans` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{Milestone, PlanRecord};

/// Fields required to insert a plan.
#[derive(Debug)]
pub struct NewPlan<'a> {
    pub user_id: &'a str,
    pub goal: &'a str,
    pub total_hours: f64,
    pub hours_per_week: i32,
    pub estimated_weeks: i32,
    pub prerequisites_met: bool,
    pub skill_gaps: &'a [String],
    pub reasoning: &'a str,
    pub milestones: &'a [Milestone],
}

/// Insert a new plan row. Returns the inserted plan with server-generated
/// defaults (id, timestamps).
pub async fn insert_plan(pool: &PgPool, new: &NewPlan<'_>) -> Result<PlanRecord> {
    let plan = sqlx::query_as::<_, PlanRecord>(
        "INSERT INTO plans \
         (user_id, goal, total_hours, hours_per_week, estimated_weeks, \
          prerequisites_met, skill_gaps, reasoning, milestones) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(new.goal)
    .bind(new.total_hours)
    .bind(new.hours_per_week)
    .bind(new.estimated_weeks)
    .bind(new.prerequisites_met)
    .bind(Json(new.skill_gaps))
    .bind(new.reasoning)
    .bind(Json(new.milestones))
    .fetch_one(pool)
    .await
    .context("failed to insert plan")?;

    Ok(plan)
}

/// Fetch a plan by its ID.
pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<PlanRecord>> {
    let plan = sqlx::query_as::<_, PlanRecord>("SELECT * FROM plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// List all plans for a user, newest first.
pub async fn list_plans_for_user(pool: &PgPool, user_id: &str) -> Result<Vec<PlanRecord>> {
    let plans = sqlx::query_as::<_, PlanRecord>(
        "SELECT * FROM plans WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list plans for user")?;

    Ok(plans)
}

/// Replace a plan's milestones and reasoning after a replan, bumping
/// `updated_at`. The budget columns are left untouched.
///
/// Returns the updated plan. Fails if the plan does not exist.
pub async fn update_plan_milestones(
    pool: &PgPool,
    id: Uuid,
    milestones: &[Milestone],
    reasoning: &str,
) -> Result<PlanRecord> {
    let plan = sqlx::query_as::<_, PlanRecord>(
        "UPDATE plans \
         SET milestones = $1, reasoning = $2, updated_at = now() \
         WHERE id = $3 \
         RETURNING *",
    )
    .bind(Json(milestones))
    .bind(reasoning)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update plan milestones")?;

    match plan {
        Some(p) => Ok(p),
        None => anyhow::bail!("plan {id} not found"),
    }
}
