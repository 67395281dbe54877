//! Skill id grammar: `owner "/" repo ["/" name]`, each segment
//! `[A-Za-z0-9._-]+`. When the skill name equals the repo name the
//! two-segment short form is canonical.

use crate::error::{CoreError, Result};

fn valid_segment(seg: &str) -> bool {
    !seg.is_empty()
        && seg
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
}

/// Validate a skill id against the grammar.
pub fn validate_skill_id(id: &str) -> Result<()> {
    let segments: Vec<&str> = id.split('/').collect();
    if !(2..=3).contains(&segments.len()) || !segments.iter().all(|seg| valid_segment(seg)) {
        return Err(CoreError::invalid(format!("invalid skill id: {id}")));
    }
    Ok(())
}

/// Canonical id for an (owner, repo, name) triple: short form when the name
/// repeats the repo.
pub fn canonical_skill_id(owner: &str, repo: &str, name: &str) -> String {
    if name == repo {
        format!("{owner}/{repo}")
    } else {
        format!("{owner}/{repo}/{name}")
    }
}

/// Expansion of a two-segment id to the three-segment form
/// (`owner/repo` -> `owner/repo/repo`), used as a lookup fallback.
pub fn expand_short_id(id: &str) -> Option<String> {
    let segments: Vec<&str> = id.split('/').collect();
    match segments.as_slice() {
        [owner, repo] => Some(format!("{owner}/{repo}/{repo}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_two_and_three_segment_ids() {
        assert!(validate_skill_id("vercel/agent-skills").is_ok());
        assert!(validate_skill_id("vercel/agent-skills/pdf-export").is_ok());
        assert!(validate_skill_id("a.b/c_d/e-f.1").is_ok());
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in [
            "",
            "single",
            "a/b/c/d",
            "a//b",
            "/a/b",
            "a/b/",
            "owner/re po",
            "owner/repo/näme",
        ] {
            assert!(validate_skill_id(bad).is_err(), "expected reject: {bad}");
        }
    }

    #[test]
    fn short_form_is_canonical_when_name_matches_repo() {
        assert_eq!(canonical_skill_id("o", "r", "r"), "o/r");
        assert_eq!(canonical_skill_id("o", "r", "n"), "o/r/n");
        assert_eq!(expand_short_id("o/r").as_deref(), Some("o/r/r"));
        assert_eq!(expand_short_id("o/r/n"), None);
    }
}
