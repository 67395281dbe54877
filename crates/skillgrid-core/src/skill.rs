use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::analysis::SkillAnalysis;
use crate::auth::Identity;
use crate::checksum::sha256_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum SkillFileType {
    /// The main SKILL.md document.
    SkillMd,
    Reference,
    Asset,
    Config,
    Other,
}

impl SkillFileType {
    /// Classification by path convention, matching what workers ship.
    pub fn classify(path: &str) -> Self {
        let lower = path.to_ascii_lowercase();
        if lower == "skill.md" || lower.ends_with("/skill.md") {
            Self::SkillMd
        } else if lower.starts_with("references/") {
            Self::Reference
        } else if lower.starts_with("assets/") {
            Self::Asset
        } else if lower.ends_with(".toml")
            || lower.ends_with(".yaml")
            || lower.ends_with(".yml")
            || lower.ends_with(".json")
        {
            Self::Config
        } else {
            Self::Other
        }
    }
}

/// A single file within a skill. `checksum` and `size_bytes` are always
/// derived from `content` by the kernel; caller-supplied values are not
/// trusted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SkillFile {
    pub path: String,
    pub content: String,
    pub checksum: String,
    pub size_bytes: u64,
    pub file_type: SkillFileType,
}

impl SkillFile {
    pub fn from_content(path: String, content: String) -> Self {
        let checksum = sha256_hex(content.as_bytes());
        let size_bytes = content.len() as u64;
        let file_type = SkillFileType::classify(&path);
        Self {
            path,
            content,
            checksum,
            size_bytes,
            file_type,
        }
    }

    /// Re-derive checksum, size, and type from the current content.
    pub fn normalize(&mut self) {
        self.checksum = sha256_hex(self.content.as_bytes());
        self.size_bytes = self.content.len() as u64;
        self.file_type = SkillFileType::classify(&self.path);
    }
}

/// Append-only audit entry recorded whenever a file's bytes change.
/// Content is not duplicated here; the checksum is what verification needs.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SkillFileVersion {
    pub path: String,
    pub checksum: String,
    pub size_bytes: u64,
    pub fetched_at: DateTime<Utc>,
    pub fetched_by: Identity,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub artifact_url: Option<String>,
    /// Current file set, path-unique.
    #[serde(default)]
    pub files: Vec<SkillFile>,
    /// Aggregate over the current file set; `None` only when no files are
    /// stored yet.
    #[serde(default)]
    pub files_checksum: Option<String>,
    #[serde(default)]
    pub stars: u32,
    /// Latest analysis; always equal to `analysis_history[0]` when present.
    #[serde(default)]
    pub analysis: Option<SkillAnalysis>,
    /// Append-only, latest first.
    #[serde(default)]
    pub analysis_history: Vec<SkillAnalysis>,
    /// Append-only per-path version log, latest first.
    #[serde(default)]
    pub file_history: Vec<SkillFileVersion>,
    #[serde(default)]
    pub install_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Where the index entry came from (import tag).
    #[serde(default)]
    pub source: String,
}

impl Skill {
    /// The main SKILL.md file, if the skill has been enriched.
    pub fn skill_md(&self) -> Option<&SkillFile> {
        self.files
            .iter()
            .find(|f| f.file_type == SkillFileType::SkillMd)
    }

    pub fn overall_rating(&self) -> Option<f32> {
        self.analysis.as_ref().map(|a| a.ratings.overall)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SkillSearchResult {
    pub skill: Skill,
    pub relevance_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileVerifyResult {
    pub path: String,
    pub is_valid: bool,
    pub stored_checksum: String,
    pub provided_checksum: String,
}

/// Structured report from verifying a caller's local file set against the
/// stored one.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SkillVerifyResult {
    pub skill_id: String,
    pub is_valid: bool,
    pub files_checked: u32,
    pub files_valid: u32,
    pub files_invalid: Vec<FileVerifyResult>,
    pub missing_files: Vec<String>,
    pub extra_files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_classification() {
        assert_eq!(SkillFileType::classify("SKILL.md"), SkillFileType::SkillMd);
        assert_eq!(
            SkillFileType::classify("nested/skill.md"),
            SkillFileType::SkillMd
        );
        assert_eq!(
            SkillFileType::classify("references/api.md"),
            SkillFileType::Reference
        );
        assert_eq!(
            SkillFileType::classify("assets/diagram.png"),
            SkillFileType::Asset
        );
        assert_eq!(
            SkillFileType::classify("config.yaml"),
            SkillFileType::Config
        );
        assert_eq!(SkillFileType::classify("setup.py"), SkillFileType::Other);
    }

    #[test]
    fn from_content_derives_checksum_and_size() {
        let f = SkillFile::from_content("SKILL.md".into(), "# hello".into());
        assert_eq!(f.size_bytes, 7);
        assert_eq!(f.checksum, sha256_hex(b"# hello"));
        assert_eq!(f.file_type, SkillFileType::SkillMd);
    }
}
