//! Domain model for the skillgrid coordination core.
//!
//! Everything the kernel stores or the server ships over the wire lives
//! here: skills and their files, analysis reports, job records for the two
//! queues, the caller role model, and the error taxonomy. The crate is
//! deliberately free of IO: the kernel owns state, the server owns HTTP.

pub mod analysis;
pub mod auth;
pub mod checksum;
pub mod error;
pub mod id;
pub mod job;
pub mod limits;
pub mod report;
pub mod skill;
pub mod user;

pub use analysis::{
    AnalysisPrompt, FlagSeverity, FlagType, McpDependency, RatingFlag, RatingTopic, Ratings,
    ReferencedFile, ReferencedUrl, SkillAnalysis, SoftwareDependency, TopicRating,
};
pub use auth::{AccessState, Identity, Role};
pub use error::{CoreError, Result};
pub use job::{
    AnalysisJob, AnalysisJobSummary, EnrichmentFile, EnrichmentJob, EnrichmentResult,
    EnrichmentStatus, JobStatus, PendingEnrichmentPayload, PendingJobFile, PendingJobPayload,
    CANCELLED_BY_REQUESTER,
};
pub use skill::{
    FileVerifyResult, Skill, SkillFile, SkillFileType, SkillFileVersion, SkillSearchResult,
    SkillVerifyResult,
};
pub use user::UserProfile;
