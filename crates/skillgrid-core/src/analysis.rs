use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Identity;
use crate::error::{CoreError, Result};

/// The fixed rating topic set. Workers must emit exactly these tags;
/// unknown topics are rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum RatingTopic {
    Quality,
    Documentation,
    Maintainability,
    Completeness,
    Security,
    /// Safety score: 100 = safe, 0 = malicious.
    Malicious,
    Privacy,
    Usability,
    Compatibility,
    Performance,
    Trustworthiness,
    Maintenance,
    Community,
}

impl RatingTopic {
    pub const ALL: [RatingTopic; 13] = [
        Self::Quality,
        Self::Documentation,
        Self::Maintainability,
        Self::Completeness,
        Self::Security,
        Self::Malicious,
        Self::Privacy,
        Self::Usability,
        Self::Compatibility,
        Self::Performance,
        Self::Trustworthiness,
        Self::Maintenance,
        Self::Community,
    ];

    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "Quality" => Ok(Self::Quality),
            "Documentation" => Ok(Self::Documentation),
            "Maintainability" => Ok(Self::Maintainability),
            "Completeness" => Ok(Self::Completeness),
            "Security" => Ok(Self::Security),
            "Malicious" => Ok(Self::Malicious),
            "Privacy" => Ok(Self::Privacy),
            "Usability" => Ok(Self::Usability),
            "Compatibility" => Ok(Self::Compatibility),
            "Performance" => Ok(Self::Performance),
            "Trustworthiness" => Ok(Self::Trustworthiness),
            "Maintenance" => Ok(Self::Maintenance),
            "Community" => Ok(Self::Community),
            other => Err(CoreError::invalid(format!("unknown rating topic: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum FlagType {
    SecurityRisk,
    MaliciousPattern,
    PrivacyConcern,
    Unmaintained,
    Deprecated,
    ExcessivePermissions,
    UnverifiedSource,
    KnownVulnerability,
}

impl FlagType {
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "SecurityRisk" => Ok(Self::SecurityRisk),
            "MaliciousPattern" => Ok(Self::MaliciousPattern),
            "PrivacyConcern" => Ok(Self::PrivacyConcern),
            "Unmaintained" => Ok(Self::Unmaintained),
            "Deprecated" => Ok(Self::Deprecated),
            "ExcessivePermissions" => Ok(Self::ExcessivePermissions),
            "UnverifiedSource" => Ok(Self::UnverifiedSource),
            "KnownVulnerability" => Ok(Self::KnownVulnerability),
            other => Err(CoreError::invalid(format!("unknown flag type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum FlagSeverity {
    Info,
    Warning,
    Critical,
}

impl FlagSeverity {
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "Info" => Ok(Self::Info),
            "Warning" => Ok(Self::Warning),
            "Critical" => Ok(Self::Critical),
            other => Err(CoreError::invalid(format!("unknown severity: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopicRating {
    pub topic: RatingTopic,
    /// 0-100.
    pub score: u8,
    /// 0-100.
    pub confidence: u8,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RatingFlag {
    pub flag_type: FlagType,
    pub severity: FlagSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Ratings {
    /// Weighted average on a 0.0-5.0 scale.
    pub overall: f32,
    pub topics: Vec<TopicRating>,
    pub flags: Vec<RatingFlag>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct McpDependency {
    pub name: String,
    pub package: String,
    pub required: bool,
    pub indexed: bool,
    pub verified: bool,
    pub ratings: Option<Ratings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SoftwareDependency {
    pub name: String,
    pub install_cmd: Option<String>,
    pub url: Option<String>,
    pub required: bool,
    pub ratings: Option<Ratings>,
}

/// A companion file the skill expects the agent to read.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReferencedFile {
    pub path: String,
    pub context: String,
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReferencedUrl {
    pub url: String,
    pub context: String,
    pub fetched: bool,
}

/// One rated report, as appended to a skill's history. Provenance fields
/// are stamped by the kernel at completion time, never taken from worker
/// JSON.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SkillAnalysis {
    pub ratings: Ratings,

    pub primary_category: String,
    pub secondary_categories: Vec<String>,
    pub tags: Vec<String>,

    pub has_mcp: bool,
    pub provides_mcp: bool,
    pub required_mcps: Vec<McpDependency>,
    pub software_deps: Vec<SoftwareDependency>,

    pub has_references: bool,
    pub has_assets: bool,
    pub estimated_token_usage: u32,

    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub use_cases: Vec<String>,
    pub compatibility_notes: String,
    pub prerequisites: Vec<String>,

    #[serde(default)]
    pub referenced_files: Vec<ReferencedFile>,
    #[serde(default)]
    pub referenced_urls: Vec<ReferencedUrl>,

    pub analyzed_at: DateTime<Utc>,
    pub analyzed_by: Identity,
    pub model_used: String,
    pub analysis_version: String,
    #[serde(default)]
    pub tee_worker_version: Option<String>,
    #[serde(default)]
    pub prompt_version: Option<String>,
}

impl SkillAnalysis {
    pub fn topic_rating(&self, topic: RatingTopic) -> Option<&TopicRating> {
        self.ratings.topics.iter().find(|t| t.topic == topic)
    }
}

/// Versioned analysis prompt template. At most one carries `is_default`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalysisPrompt {
    pub id: String,
    pub name: String,
    pub version: String,
    pub prompt_template: String,
    pub created_by: Identity,
    pub created_at: DateTime<Utc>,
    pub is_default: bool,
}
