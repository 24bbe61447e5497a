//! `waypoint plan` subcommands: inspect stored plans from the terminal.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use waypoint_db::queries::plans;

/// Print one plan with its milestones and resources.
pub async fn cmd_show(pool: &PgPool, plan_id: &str) -> Result<()> {
    let id = Uuid::parse_str(plan_id).context("plan id must be a UUID")?;
    let plan = plans::get_plan(pool, id)
        .await?
        .with_context(|| format!("plan {id} not found"))?;

    println!("Plan {}", plan.id);
    println!("  goal: {}", plan.goal);
    println!("  user: {}", plan.user_id);
    println!(
        "  budget: {:.0}h total at {}h/week over {} week(s)",
        plan.total_hours, plan.hours_per_week, plan.estimated_weeks
    );
    println!("  prerequisites met: {}", plan.prerequisites_met);
    if !plan.skill_gaps.0.is_empty() {
        println!("  skill gaps: {}", plan.skill_gaps.0.join(", "));
    }
    println!("  updated: {}", plan.updated_at.format("%Y-%m-%d %H:%M UTC"));
    println!();

    for milestone in &plan.milestones.0 {
        println!(
            "  [{}] {} ({:.1}h)",
            milestone.order, milestone.title, milestone.estimated_hours
        );
        for resource in &milestone.resources {
            println!(
                "      {}. {} ({} min) {}",
                resource.order, resource.title, resource.duration_min, resource.url
            );
        }
    }

    println!();
    println!("  reasoning: {}", plan.reasoning);
    Ok(())
}

/// List a user's plans, newest first.
pub async fn cmd_list(pool: &PgPool, user: &str) -> Result<()> {
    let plans = plans::list_plans_for_user(pool, user).await?;

    if plans.is_empty() {
        println!("No plans for user {user:?}.");
        return Ok(());
    }

    for plan in &plans {
        println!(
            "{}  {}  {} milestone(s)  created {}",
            plan.id,
            plan.goal,
            plan.milestones.0.len(),
            plan.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
