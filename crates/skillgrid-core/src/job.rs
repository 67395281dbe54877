//! Job records for the two queues and the payloads handed to workers on
//! claim. Both queues share the claim/complete/fail/cancel protocol; the
//! enrichment side adds a `NotFound` terminal outcome and an optional
//! auto-chained analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Identity;

/// Error message recorded on jobs cancelled by their requester. Late worker
/// completions against a job carrying this message are benign no-ops.
pub const CANCELLED_BY_REQUESTER: &str = "cancelled by requester";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalysisJob {
    pub id: String,
    pub skill_id: String,
    pub requester: Identity,
    pub model: String,
    /// Captured from the requester's profile at submission; later profile
    /// mutations do not affect in-flight jobs.
    pub encrypted_credential: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub claimed_by: Option<Identity>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalysisJob {
    pub fn is_cancelled(&self) -> bool {
        self.status == JobStatus::Failed && self.error.as_deref() == Some(CANCELLED_BY_REQUESTER)
    }
}

/// Summary row for operator job listings. Claim provenance is exposed so
/// an operator sweep can spot stuck `Processing` jobs; the core itself
/// never ages them out.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalysisJobSummary {
    pub job_id: String,
    pub skill_id: String,
    pub model: String,
    pub status: JobStatus,
    pub requester: Identity,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub claimed_by: Option<Identity>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<&AnalysisJob> for AnalysisJobSummary {
    fn from(job: &AnalysisJob) -> Self {
        Self {
            job_id: job.id.clone(),
            skill_id: job.skill_id.clone(),
            model: job.model.clone(),
            status: job.status,
            requester: job.requester.clone(),
            created_at: job.created_at,
            claimed_at: job.claimed_at,
            claimed_by: job.claimed_by.clone(),
            error: job.error.clone(),
        }
    }
}

/// Lightweight file entry shipped with claim payloads.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingJobFile {
    pub path: String,
    pub content: String,
}

/// Everything a worker needs to execute an analysis job, snapshotted at
/// claim time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingJobPayload {
    pub job_id: String,
    pub skill_id: String,
    pub skill_name: String,
    pub skill_description: String,
    pub skill_owner: String,
    pub skill_repo: String,
    pub skill_md_content: Option<String>,
    pub skill_files: Vec<PendingJobFile>,
    pub model: String,
    pub encrypted_credential: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum EnrichmentStatus {
    Pending,
    Processing,
    Completed,
    /// The source host confirmed the artifact does not exist. Distinct from
    /// `Failed`, which covers transient errors worth resubmitting.
    NotFound,
    Failed,
}

impl EnrichmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::NotFound | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrichmentJob {
    pub id: String,
    pub skill_id: String,
    pub owner: String,
    pub repo: String,
    pub name: String,
    pub requester: Identity,
    pub auto_analyze: bool,
    /// Analysis job enqueued on successful completion when `auto_analyze`.
    #[serde(default)]
    pub chained_analysis_job_id: Option<String>,
    pub status: EnrichmentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub claimed_by: Option<Identity>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl EnrichmentJob {
    pub fn is_cancelled(&self) -> bool {
        self.status == EnrichmentStatus::Failed
            && self.error.as_deref() == Some(CANCELLED_BY_REQUESTER)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingEnrichmentPayload {
    pub job_id: String,
    pub skill_id: String,
    pub owner: String,
    pub repo: String,
    pub name: String,
    pub auto_analyze: bool,
}

/// A file discovered alongside SKILL.md during enrichment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrichmentFile {
    pub path: String,
    pub content: String,
}

/// What a worker reports back for an enrichment job.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrichmentResult {
    pub found: bool,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub files_found: Vec<EnrichmentFile>,
}
