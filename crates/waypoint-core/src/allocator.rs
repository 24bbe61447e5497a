//! Budget allocation: a pure, deterministic mapping from scored candidates
//! and an hour budget to ordered milestone drafts.
//!
//! The grouping heuristic is a behavioral contract (changing it requires a
//! test update): candidates group by their primary skill tag; candidates
//! matching a prerequisite gap form a remediation group pinned at order 0;
//! groups order by minimum level ordinal (unleveled last), then name, and
//! are capped at [`MAX_MILESTONES`] by merging the tail into one milestone.

use std::collections::BTreeMap;

use uuid::Uuid;

use waypoint_db::models::{Milestone, ResourceItem};

use crate::collaborators::types::ResourceCandidate;

/// Upper bound on milestones in one plan.
pub const MAX_MILESTONES: usize = 5;

/// Input to [`allocate`].
#[derive(Debug, Clone)]
pub struct AllocatorInput<'a> {
    pub candidates: &'a [ResourceCandidate],
    /// Unmet prerequisite skills; matching candidates form the remediation
    /// milestone.
    pub gap_skills: &'a [String],
    /// The request's time budget in hours.
    pub total_hours: f64,
}

/// A milestone before identifiers are assigned. Everything in a draft is a
/// deterministic function of the allocator input.
#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneDraft {
    pub title: String,
    pub description: String,
    pub resources: Vec<ResourceItem>,
    pub estimated_hours: f64,
    pub skills_gained: Vec<String>,
    pub order: u32,
}

impl MilestoneDraft {
    /// Assign a fresh identifier, producing the persistable milestone.
    pub fn into_milestone(self) -> Milestone {
        Milestone {
            milestone_id: Uuid::new_v4(),
            title: self.title,
            description: self.description,
            resources: self.resources,
            estimated_hours: self.estimated_hours,
            skills_gained: self.skills_gained,
            order: self.order,
        }
    }
}

/// A candidate dropped to fit the budget.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedResource {
    pub resource_id: Uuid,
    pub title: String,
    pub duration_min: u32,
    pub score: f64,
}

/// Result of one allocation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub milestones: Vec<MilestoneDraft>,
    /// Lowest-priority candidates removed to fit the budget, in drop order.
    pub dropped: Vec<DroppedResource>,
    /// Hour sum across all milestones (at or below the budget).
    pub allocated_hours: f64,
    /// Human-readable allocation decisions for the plan's `reasoning`.
    pub notes: Vec<String>,
}

/// Group candidates into ordered milestones within the hour budget.
///
/// Keep-priority: score descending, then shorter duration first (more
/// breadth per hour), then resource id. When the candidate durations
/// overflow the budget, the lowest-priority candidates are dropped until
/// the plan fits, each drop recorded in `notes`.
pub fn allocate(input: &AllocatorInput<'_>) -> Allocation {
    let mut notes = Vec::new();

    // 1. Dedupe by resource id; a resource appears at most once per plan.
    //    On duplicates the higher-scored payload wins (first wins on ties).
    let mut by_id: BTreeMap<Uuid, ResourceCandidate> = BTreeMap::new();
    for cand in input.candidates {
        match by_id.get(&cand.resource_id) {
            Some(existing) if existing.score >= cand.score => {}
            _ => {
                by_id.insert(cand.resource_id, cand.clone());
            }
        }
    }

    // 2. Keep-priority order.
    let mut kept: Vec<ResourceCandidate> = by_id.into_values().collect();
    kept.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.duration_min.cmp(&b.duration_min))
            .then(a.resource_id.cmp(&b.resource_id))
    });

    // 3. Drop from the tail until the durations fit the budget.
    let budget_min = input.total_hours * 60.0;
    let mut dropped = Vec::new();
    let mut kept_min: u64 = kept.iter().map(|c| u64::from(c.duration_min)).sum();
    while kept_min as f64 > budget_min {
        let Some(cand) = kept.pop() else { break };
        kept_min -= u64::from(cand.duration_min);
        notes.push(format!(
            "dropped \"{}\" ({} min, score {:.2}) to fit the {}h budget",
            cand.title, cand.duration_min, cand.score, input.total_hours
        ));
        dropped.push(DroppedResource {
            resource_id: cand.resource_id,
            title: cand.title,
            duration_min: cand.duration_min,
            score: cand.score,
        });
    }

    // 4. Group: gap-matching candidates go to remediation, the rest by
    //    primary skill tag.
    let gap_set: Vec<String> = input.gap_skills.iter().map(|g| g.to_lowercase()).collect();
    let mut remediation: Vec<ResourceCandidate> = Vec::new();
    let mut groups: BTreeMap<String, Vec<ResourceCandidate>> = BTreeMap::new();

    for cand in kept {
        let matches_gap = cand
            .skills
            .iter()
            .any(|s| gap_set.contains(&s.to_lowercase()));
        if matches_gap {
            remediation.push(cand);
        } else {
            let key = cand
                .skills
                .first()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "general".to_string());
            groups.entry(key).or_default().push(cand);
        }
    }

    // 5. Order groups: minimum level first (unleveled last), then name.
    let mut ordered: Vec<(String, Vec<ResourceCandidate>)> = groups.into_iter().collect();
    ordered.sort_by_key(|(name, cands)| {
        let min_level = cands
            .iter()
            .map(|c| c.level.unwrap_or(i32::MAX))
            .min()
            .unwrap_or(i32::MAX);
        (min_level, name.clone())
    });

    // 6. Cap the milestone count, merging the tail into one group.
    let slots = if gap_set.is_empty() {
        MAX_MILESTONES
    } else {
        MAX_MILESTONES - 1
    };
    if ordered.len() > slots {
        let tail: Vec<ResourceCandidate> = ordered
            .split_off(slots - 1)
            .into_iter()
            .flat_map(|(_, cands)| cands)
            .collect();
        notes.push(format!(
            "merged {} remaining topic groups into one milestone to stay within {} milestones",
            tail.iter()
                .map(|c| c.skills.first().cloned().unwrap_or_default())
                .collect::<std::collections::BTreeSet<_>>()
                .len(),
            MAX_MILESTONES
        ));
        ordered.push(("further topics".to_string(), tail));
    }

    // 7. Build milestone drafts, remediation pinned at order 0.
    let mut milestones = Vec::new();
    let mut order: u32 = 0;

    if !gap_set.is_empty() {
        let gap_list = input.gap_skills.join(", ");
        if remediation.is_empty() {
            notes.push(format!(
                "no candidates matched the prerequisite gap(s): {gap_list}"
            ));
        }
        milestones.push(build_draft(
            format!("Prerequisites: {gap_list}"),
            format!("Close the prerequisite gaps ({gap_list}) before the main track."),
            remediation,
            order,
            |cand| {
                let matched = cand
                    .skills
                    .iter()
                    .find(|s| gap_set.contains(&s.to_lowercase()))
                    .cloned()
                    .unwrap_or_default();
                format!("Covers prerequisite \"{matched}\"")
            },
        ));
        order += 1;
    }

    for (name, cands) in ordered {
        let (title, description) = group_headline(&name, cands.len());
        let display = display_skill(&name);
        milestones.push(build_draft(
            title,
            description,
            cands,
            order,
            |cand| format!("Relevant to {display} (score {:.2})", cand.score),
        ));
        order += 1;
    }

    let allocated_hours = round2(
        milestones
            .iter()
            .map(|m| m.estimated_hours)
            .sum::<f64>(),
    );

    Allocation {
        milestones,
        dropped,
        allocated_hours,
        notes,
    }
}

/// Assemble one draft: resources ordered by level, then score, then id, with
/// contiguous zero-based `order` values.
fn build_draft(
    title: String,
    description: String,
    mut cands: Vec<ResourceCandidate>,
    order: u32,
    why: impl Fn(&ResourceCandidate) -> String,
) -> MilestoneDraft {
    cands.sort_by(|a, b| {
        a.level
            .unwrap_or(i32::MAX)
            .cmp(&b.level.unwrap_or(i32::MAX))
            .then(b.score.total_cmp(&a.score))
            .then(a.resource_id.cmp(&b.resource_id))
    });

    let total_min: u64 = cands.iter().map(|c| u64::from(c.duration_min)).sum();
    let skills_gained: Vec<String> = cands
        .iter()
        .flat_map(|c| c.skills.iter().map(|s| s.to_lowercase()))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    let resources = cands
        .into_iter()
        .enumerate()
        .map(|(idx, cand)| ResourceItem {
            why_included: why(&cand),
            resource_id: cand.resource_id,
            title: cand.title,
            url: cand.url,
            duration_min: cand.duration_min,
            level: cand.level,
            skills: cand.skills,
            order: idx as u32,
        })
        .collect();

    MilestoneDraft {
        title,
        description,
        resources,
        estimated_hours: round2(total_min as f64 / 60.0),
        skills_gained,
        order,
    }
}

fn group_headline(name: &str, count: usize) -> (String, String) {
    match name {
        "general" => (
            "Core resources".to_string(),
            "A curated sequence of resources for the goal.".to_string(),
        ),
        "further topics" => (
            "Further topics".to_string(),
            "Additional topics rounding out the plan.".to_string(),
        ),
        _ => {
            let display = display_skill(name);
            (
                format!("{display} fundamentals"),
                format!("Build working knowledge of {display} through {count} selected resources."),
            )
        }
    }
}

/// Human form of a skill tag: short tags read as acronyms, longer ones get
/// an initial capital.
fn display_skill(tag: &str) -> String {
    if tag.len() <= 3 {
        tag.to_uppercase()
    } else {
        let mut chars = tag.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
