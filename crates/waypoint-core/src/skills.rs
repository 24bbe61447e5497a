//! Skill prerequisite resolution.
//!
//! The `SkillResolver` seam mirrors the other collaborator traits so the
//! prerequisite set can come from an external service; the default
//! implementation is an in-process catalog keyed by goal keywords.

use async_trait::async_trait;

use crate::client::ClientError;
use crate::context::RequestContext;

/// Maps a learning goal to its inferred prerequisite skills.
#[async_trait]
pub trait SkillResolver: Send + Sync {
    async fn prerequisites_for(
        &self,
        ctx: &RequestContext,
        goal: &str,
    ) -> Result<Vec<String>, ClientError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn SkillResolver) {}
};

/// Keyword-driven prerequisite catalog.
///
/// A goal matches an entry when it contains the keyword (case-insensitive);
/// prerequisites from all matching entries are merged, deduplicated, and
/// returned sorted for determinism.
#[derive(Debug, Clone)]
pub struct CatalogSkillResolver {
    entries: Vec<(&'static str, &'static [&'static str])>,
}

impl CatalogSkillResolver {
    pub fn new() -> Self {
        Self {
            entries: vec![
                ("machine learning", &["python", "statistics"]),
                ("deep learning", &["python", "linear-algebra"]),
                ("data engineering", &["sql", "python"]),
                ("data science", &["statistics", "sql"]),
                ("advanced sql", &["sql"]),
                ("react", &["javascript", "html-css"]),
                ("web development", &["html-css", "javascript"]),
                ("kubernetes", &["docker", "linux-basics"]),
                ("docker", &["linux-basics"]),
                ("rust", &["programming-basics"]),
            ],
        }
    }
}

impl Default for CatalogSkillResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SkillResolver for CatalogSkillResolver {
    async fn prerequisites_for(
        &self,
        _ctx: &RequestContext,
        goal: &str,
    ) -> Result<Vec<String>, ClientError> {
        let goal_lower = goal.to_lowercase();
        let mut prereqs: Vec<String> = self
            .entries
            .iter()
            .filter(|(keyword, _)| goal_lower.contains(keyword))
            .flat_map(|(_, skills)| skills.iter().map(|s| s.to_string()))
            .collect();
        prereqs.sort();
        prereqs.dedup();
        Ok(prereqs)
    }
}

/// Prerequisites not covered by the caller's current skills
/// (case-insensitive), preserving the prerequisite order.
pub fn unmet_gaps(prerequisites: &[String], current_skills: &[String]) -> Vec<String> {
    let current: Vec<String> = current_skills
        .iter()
        .map(|s| s.trim().to_lowercase())
        .collect();

    prerequisites
        .iter()
        .filter(|p| !current.contains(&p.trim().to_lowercase()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::new("test", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn goal_without_keywords_has_no_prerequisites() {
        let resolver = CatalogSkillResolver::new();
        let prereqs = resolver
            .prerequisites_for(&ctx(), "Learn SQL basics")
            .await
            .unwrap();
        assert!(prereqs.is_empty());
    }

    #[tokio::test]
    async fn keyword_match_is_case_insensitive() {
        let resolver = CatalogSkillResolver::new();
        let prereqs = resolver
            .prerequisites_for(&ctx(), "Intro to Machine Learning")
            .await
            .unwrap();
        assert_eq!(prereqs, vec!["python".to_string(), "statistics".to_string()]);
    }

    #[tokio::test]
    async fn overlapping_keywords_merge_and_dedupe() {
        let resolver = CatalogSkillResolver::new();
        let prereqs = resolver
            .prerequisites_for(&ctx(), "machine learning for data science")
            .await
            .unwrap();
        assert_eq!(
            prereqs,
            vec![
                "python".to_string(),
                "sql".to_string(),
                "statistics".to_string()
            ]
        );
    }

    #[test]
    fn unmet_gaps_subtracts_current_skills() {
        let prereqs = vec!["python".to_string(), "statistics".to_string()];
        let current = vec!["Python ".to_string()];
        assert_eq!(unmet_gaps(&prereqs, &current), vec!["statistics".to_string()]);
    }

    #[test]
    fn unmet_gaps_empty_when_all_met() {
        let prereqs = vec!["sql".to_string()];
        let current = vec!["SQL".to_string()];
        assert!(unmet_gaps(&prereqs, &current).is_empty());
    }
}
