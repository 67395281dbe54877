//! Read-only query surface: paginated, filterable, sortable views over the
//! skill index plus aggregate statistics. All anonymous, all non-blocking.

use std::cmp::Ordering;

use skillgrid_core::{
    CoreError, RatingFlag, RatingTopic, Result, Skill, SkillAnalysis, SkillSearchResult,
};

use crate::Kernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    Rating,
    Installs,
    Stars,
    Recent,
    Name,
}

impl SortKey {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "rating" => Ok(Self::Rating),
            "installs" | "" => Ok(Self::Installs),
            "stars" => Ok(Self::Stars),
            "recent" => Ok(Self::Recent),
            "name" => Ok(Self::Name),
            other => Err(CoreError::invalid(format!("unknown sort key: {other}"))),
        }
    }
}

fn matches_search(skill: &Skill, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    skill.owner.to_lowercase().contains(needle)
        || skill.repo.to_lowercase().contains(needle)
        || skill.name.to_lowercase().contains(needle)
        || skill.description.to_lowercase().contains(needle)
}

fn matches_category(skill: &Skill, category: &str) -> bool {
    if category.is_empty() {
        return true;
    }
    skill.analysis.as_ref().is_some_and(|a| {
        a.primary_category.eq_ignore_ascii_case(category)
            || a
                .secondary_categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(category))
    })
}

/// Rated skills first (overall descending), unrated last.
fn cmp_by_rating(a: &Skill, b: &Skill) -> Ordering {
    match (a.overall_rating(), b.overall_rating()) {
        (Some(ra), Some(rb)) => rb.partial_cmp(&ra).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl Kernel {
    /// The main catalog view. `total` reflects the filter, not the page.
    pub fn list_skills_filtered(
        &self,
        limit: u32,
        offset: u32,
        sort_by: &str,
        search: &str,
        category: &str,
    ) -> Result<(Vec<Skill>, u64)> {
        let sort = SortKey::parse(sort_by)?;
        let needle = search.to_lowercase();
        let state = self.state();
        let mut all: Vec<Skill> = state
            .skills
            .values()
            .filter(|s| matches_search(s, &needle) && matches_category(s, category))
            .cloned()
            .collect();
        let total = all.len() as u64;

        match sort {
            SortKey::Rating => all.sort_by(cmp_by_rating),
            SortKey::Installs => all.sort_by(|a, b| b.install_count.cmp(&a.install_count)),
            SortKey::Stars => all.sort_by(|a, b| b.stars.cmp(&a.stars)),
            SortKey::Recent => all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
            SortKey::Name => {
                all.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            }
        }

        let page = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    /// Relevance-ranked substring search. Empty queries return nothing.
    pub fn search_skills(&self, query: &str) -> Vec<SkillSearchResult> {
        let query = query.to_lowercase();
        let terms: Vec<&str> = query.split_whitespace().collect();
        if terms.is_empty() {
            return Vec::new();
        }
        let state = self.state();
        let mut results: Vec<SkillSearchResult> = state
            .skills
            .values()
            .filter_map(|skill| {
                let mut score = 0.0f32;
                for term in &terms {
                    if skill.name.to_lowercase().contains(term) {
                        score += 3.0;
                    }
                    if skill.description.to_lowercase().contains(term) {
                        score += 2.0;
                    }
                    if let Some(analysis) = &skill.analysis {
                        if analysis.primary_category.to_lowercase().contains(term) {
                            score += 2.0;
                        }
                        for tag in &analysis.tags {
                            if tag.to_lowercase().contains(term) {
                                score += 1.0;
                            }
                        }
                    }
                }
                (score > 0.0).then(|| SkillSearchResult {
                    skill: skill.clone(),
                    relevance_score: score,
                })
            })
            .collect();
        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
        });
        results
    }

    pub fn get_skills_by_category(&self, category: &str) -> Vec<Skill> {
        let state = self.state();
        state
            .skills
            .values()
            .filter(|s| !category.is_empty() && matches_category(s, category))
            .cloned()
            .collect()
    }

    pub fn get_skills_by_owner(&self, owner: &str) -> Vec<Skill> {
        let state = self.state();
        state
            .skills
            .values()
            .filter(|s| s.owner.eq_ignore_ascii_case(owner))
            .cloned()
            .collect()
    }

    pub fn get_top_rated_skills(&self, limit: u32) -> Vec<Skill> {
        let state = self.state();
        let mut skills: Vec<Skill> = state.skills.values().cloned().collect();
        skills.sort_by(cmp_by_rating);
        skills.truncate(limit as usize);
        skills
    }

    pub fn get_skills_providing_mcp(&self) -> Vec<Skill> {
        let state = self.state();
        state
            .skills
            .values()
            .filter(|s| s.analysis.as_ref().is_some_and(|a| a.provides_mcp))
            .cloned()
            .collect()
    }

    /// Skills carrying Warning or Critical flags, with those flags attached.
    pub fn get_skills_with_flags(&self) -> Vec<(Skill, Vec<RatingFlag>)> {
        let state = self.state();
        state
            .skills
            .values()
            .filter_map(|skill| {
                let analysis = skill.analysis.as_ref()?;
                let flags: Vec<RatingFlag> = analysis
                    .ratings
                    .flags
                    .iter()
                    .filter(|f| f.severity != skillgrid_core::FlagSeverity::Info)
                    .cloned()
                    .collect();
                (!flags.is_empty()).then(|| (skill.clone(), flags))
            })
            .collect()
    }

    pub fn get_skills_by_topic_rating(&self, topic: RatingTopic, limit: u32) -> Vec<Skill> {
        let state = self.state();
        let mut skills: Vec<Skill> = state
            .skills
            .values()
            .filter(|s| s.analysis.is_some())
            .cloned()
            .collect();
        let score = |skill: &Skill| -> u8 {
            skill
                .analysis
                .as_ref()
                .and_then(|a| a.topic_rating(topic))
                .map(|t| t.score)
                .unwrap_or(0)
        };
        skills.sort_by(|a, b| score(b).cmp(&score(a)));
        skills.truncate(limit as usize);
        skills
    }

    pub fn get_unanalyzed_skills(&self) -> Vec<Skill> {
        let state = self.state();
        state
            .skills
            .values()
            .filter(|s| s.analysis.is_none())
            .cloned()
            .collect()
    }

    /// Sorted unique primary + secondary categories across analyzed skills.
    pub fn get_categories(&self) -> Vec<String> {
        let state = self.state();
        let mut categories: Vec<String> = state
            .skills
            .values()
            .filter_map(|s| s.analysis.as_ref())
            .flat_map(|a| {
                std::iter::once(a.primary_category.clone())
                    .chain(a.secondary_categories.iter().cloned())
            })
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Every history entry across all skills, newest first by `analyzed_at`.
    pub fn get_all_analysis_history(
        &self,
        limit: u32,
        offset: u32,
    ) -> (Vec<(String, SkillAnalysis)>, u64) {
        let state = self.state();
        let mut all: Vec<(String, SkillAnalysis)> = state
            .skills
            .iter()
            .flat_map(|(id, skill)| {
                skill
                    .analysis_history
                    .iter()
                    .map(move |a| (id.clone(), a.clone()))
            })
            .collect();
        all.sort_by(|a, b| b.1.analyzed_at.cmp(&a.1.analyzed_at));
        let total = all.len() as u64;
        let page = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        (page, total)
    }

    /// (total skills, analyzed skills, total installs, total users).
    pub fn get_stats(&self) -> (u64, u64, u64, u64) {
        let state = self.state();
        let total = state.skills.len() as u64;
        let analyzed = state
            .skills
            .values()
            .filter(|s| s.analysis.is_some())
            .count() as u64;
        let installs: u64 = state.skills.values().map(|s| s.install_count).sum();
        let users = state.users.len() as u64;
        (total, analyzed, installs, users)
    }

    /// (history entries across all skills, skills with at least one entry).
    pub fn get_analysis_history_stats(&self) -> (u64, u64) {
        let state = self.state();
        let entries: u64 = state
            .skills
            .values()
            .map(|s| s.analysis_history.len() as u64)
            .sum();
        let with_history = state
            .skills
            .values()
            .filter(|s| !s.analysis_history.is_empty())
            .count() as u64;
        (entries, with_history)
    }

    /// Rough byte accounting for operators:
    /// (total, skill content, analysis history, job queues).
    pub fn get_memory_stats(&self) -> (u64, u64, u64, u64) {
        let state = self.state();
        let content: u64 = state
            .skills
            .values()
            .map(|s| s.files.iter().map(|f| f.content.len() as u64).sum::<u64>())
            .sum();
        let history: u64 = state
            .skills
            .values()
            .flat_map(|s| s.analysis_history.iter())
            .map(|a| {
                (a.summary.len() + a.compatibility_notes.len()) as u64
                    + a.ratings.topics.iter().map(|t| t.reasoning.len() as u64).sum::<u64>()
                    + 512
            })
            .sum();
        let queues: u64 = state
            .analysis
            .jobs
            .values()
            .map(|j| (j.encrypted_credential.len() + j.skill_id.len()) as u64 + 256)
            .sum::<u64>()
            + state.enrichment.jobs.len() as u64 * 256;
        (content + history + queues, content, history, queues)
    }
}
