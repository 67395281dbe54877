//! The analysis queue: FIFO pending order, at-most-once claims, idempotent
//! completion, requester cancellation.
//!
//! Claims pop from the head of the pending order under the state lock, so
//! two workers calling concurrently always receive disjoint slices. A job
//! returned once is never returned again.

use chrono::{DateTime, Utc};
use skillgrid_core::checksum::sha256_hex;
use skillgrid_core::limits::{MAX_ANALYSIS_HISTORY, MAX_CLAIM_BATCH};
use skillgrid_core::{
    report, AnalysisJob, AnalysisJobSummary, CoreError, Identity, JobStatus, PendingJobFile,
    PendingJobPayload, Result, CANCELLED_BY_REQUESTER,
};
use tracing::{info, warn};

use crate::{CoreState, Kernel};

/// Compact deterministic job id: prefix plus the first 16 hex chars of a
/// sha-256 over the submission tuple and the queue counter.
pub(crate) fn derive_job_id(
    prefix: &str,
    skill_id: &str,
    requester: &Identity,
    tail: &str,
    counter: u64,
) -> String {
    let digest = sha256_hex(format!("{skill_id}|{requester}|{tail}|{counter}").as_bytes());
    format!("{prefix}-{}", &digest[..16])
}

/// Create and enqueue an analysis job. Shared by direct submission and the
/// enrichment auto-chain; the caller has already validated skill existence
/// and credential availability.
pub(crate) fn enqueue_analysis(
    state: &mut CoreState,
    skill_key: &str,
    requester: &Identity,
    model: &str,
    encrypted_credential: String,
    now: DateTime<Utc>,
) -> Result<String> {
    let queue = &mut state.analysis;
    queue.counter += 1;
    let job_id = derive_job_id("aj", skill_key, requester, model, queue.counter);
    if queue.jobs.contains_key(&job_id) {
        return Err(CoreError::internal(format!(
            "analysis job id collision: {job_id}"
        )));
    }
    queue.jobs.insert(
        job_id.clone(),
        AnalysisJob {
            id: job_id.clone(),
            skill_id: skill_key.to_string(),
            requester: requester.clone(),
            model: model.to_string(),
            encrypted_credential,
            status: JobStatus::Pending,
            created_at: now,
            claimed_at: None,
            claimed_by: None,
            completed_at: None,
            error: None,
        },
    );
    queue.pending.push_back(job_id.clone());
    Ok(job_id)
}

impl Kernel {
    /// Submit an analysis request. Idempotent while a job for the same
    /// `(skill, requester, model)` tuple is still live: the existing job id
    /// is returned instead of a new one. Terminal jobs never block
    /// resubmission.
    pub fn request_analysis(
        &self,
        caller: &Identity,
        skill_id: &str,
        model: &str,
    ) -> Result<String> {
        let now = Self::now();
        let mut state = self.state();
        if !state.access.analysis_enabled {
            return Err(CoreError::precondition("analysis submissions are disabled"));
        }
        if model.trim().is_empty() {
            return Err(CoreError::invalid("model must not be empty"));
        }
        let key = state
            .resolve_skill_id(skill_id)
            .ok_or_else(|| CoreError::not_found(format!("skill not found: {skill_id}")))?;
        let credential = state
            .users
            .get(caller)
            .and_then(|u| u.encrypted_credential.clone())
            .ok_or_else(|| {
                CoreError::precondition("no encrypted credential set; save your credential first")
            })?;

        if let Some(live) = state.analysis.jobs.values().find(|job| {
            job.skill_id == key
                && &job.requester == caller
                && job.model == model
                && !job.status.is_terminal()
        }) {
            return Ok(live.id.clone());
        }

        let job_id = enqueue_analysis(&mut state, &key, caller, model, credential, now)?;
        info!(job_id = %job_id, skill_id = %key, model, "analysis job queued");
        Ok(job_id)
    }

    /// Hand out up to `limit` pending jobs (hard cap 10) in FIFO order,
    /// transitioning each to `Processing`. A job whose skill has vanished
    /// is failed in place and skipped.
    pub fn claim_pending_jobs(
        &self,
        caller: &Identity,
        limit: u32,
    ) -> Result<Vec<PendingJobPayload>> {
        let now = Self::now();
        let mut state = self.state();
        state.require_worker(caller)?;
        let limit = (limit as usize).min(MAX_CLAIM_BATCH);

        let CoreState {
            skills, analysis, ..
        } = &mut *state;
        let mut payloads = Vec::new();
        while payloads.len() < limit {
            let Some(job_id) = analysis.pending.pop_front() else {
                break;
            };
            let Some(job) = analysis.jobs.get_mut(&job_id) else {
                continue;
            };
            if job.status != JobStatus::Pending {
                continue;
            }
            let Some(skill) = skills.get(&job.skill_id) else {
                job.status = JobStatus::Failed;
                job.error = Some("skill not found".to_string());
                job.completed_at = Some(now);
                warn!(job_id = %job_id, "failing queued job for missing skill");
                continue;
            };
            let skill_md = skill
                .skill_md()
                .map(|f| f.content.clone())
                .unwrap_or_else(|| format!("# {}\n\n{}", skill.name, skill.description));
            payloads.push(PendingJobPayload {
                job_id: job.id.clone(),
                skill_id: job.skill_id.clone(),
                skill_name: skill.name.clone(),
                skill_description: skill.description.clone(),
                skill_owner: skill.owner.clone(),
                skill_repo: skill.repo.clone(),
                skill_md_content: Some(skill_md),
                skill_files: skill
                    .files
                    .iter()
                    .map(|f| PendingJobFile {
                        path: f.path.clone(),
                        content: f.content.clone(),
                    })
                    .collect(),
                model: job.model.clone(),
                encrypted_credential: job.encrypted_credential.clone(),
            });
            job.status = JobStatus::Processing;
            job.claimed_at = Some(now);
            job.claimed_by = Some(caller.clone());
        }
        Ok(payloads)
    }

    /// Canonical completion path. Re-submission against a `Completed` job,
    /// or one cancelled by its requester, is a benign no-op so workers can
    /// retry freely on network failure.
    pub fn submit_job_result_with_metadata(
        &self,
        caller: &Identity,
        job_id: &str,
        analysis_json: &str,
        tee_worker_version: &str,
        prompt_version: &str,
    ) -> Result<()> {
        let now = Self::now();
        let mut state = self.state();
        state.require_worker(caller)?;
        let is_admin = state.access.is_admin(caller);

        let CoreState {
            skills,
            users,
            analysis: queue,
            ..
        } = &mut *state;
        let job = queue
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::not_found(format!("job not found: {job_id}")))?;

        match job.status {
            JobStatus::Completed => return Ok(()),
            JobStatus::Failed if job.is_cancelled() => return Ok(()),
            JobStatus::Failed => {
                return Err(CoreError::conflict("job already failed"));
            }
            JobStatus::Pending => {
                return Err(CoreError::conflict("job has not been claimed"));
            }
            JobStatus::Processing => {}
        }
        if job.claimed_by.as_ref() != Some(caller) && !is_admin {
            return Err(CoreError::unauthorized(
                "job was claimed by a different worker",
            ));
        }

        let mut analysis = report::parse_analysis_report(
            analysis_json,
            &job.model,
            &job.requester,
            now,
        )?;
        if !tee_worker_version.is_empty() {
            analysis.tee_worker_version = Some(tee_worker_version.to_string());
        }
        if !prompt_version.is_empty() {
            analysis.prompt_version = Some(prompt_version.to_string());
        }

        // History prepend and current-analysis update happen under the same
        // lock as the status flip, so readers never observe one without the
        // other.
        if let Some(skill) = skills.get_mut(&job.skill_id) {
            skill.analysis_history.insert(0, analysis.clone());
            skill.analysis_history.truncate(MAX_ANALYSIS_HISTORY);
            skill.analysis = Some(analysis);
            skill.updated_at = now;
        }
        if let Some(profile) = users.get_mut(&job.requester) {
            profile.analyses_performed += 1;
            profile.last_active = now;
        }

        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.error = None;
        info!(job_id = %job_id, skill_id = %job.skill_id, "analysis job completed");
        Ok(())
    }

    /// Compatibility shim: completion without TEE or prompt provenance.
    pub fn submit_job_result(
        &self,
        caller: &Identity,
        job_id: &str,
        analysis_json: &str,
    ) -> Result<()> {
        self.submit_job_result_with_metadata(caller, job_id, analysis_json, "", "")
    }

    /// Record a worker-side failure. Terminal: the requester must submit
    /// again. Retrying an already-failed job is a no-op.
    pub fn submit_job_error(&self, caller: &Identity, job_id: &str, message: &str) -> Result<()> {
        let now = Self::now();
        let mut state = self.state();
        state.require_worker(caller)?;
        let is_admin = state.access.is_admin(caller);
        let job = state
            .analysis
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::not_found(format!("job not found: {job_id}")))?;
        match job.status {
            JobStatus::Failed => Ok(()),
            JobStatus::Completed => Err(CoreError::conflict("job already completed")),
            JobStatus::Pending => Err(CoreError::conflict("job has not been claimed")),
            JobStatus::Processing => {
                if job.claimed_by.as_ref() != Some(caller) && !is_admin {
                    return Err(CoreError::unauthorized(
                        "job was claimed by a different worker",
                    ));
                }
                job.status = JobStatus::Failed;
                job.error = Some(message.to_string());
                job.completed_at = Some(now);
                warn!(job_id = %job_id, error = message, "analysis job failed");
                Ok(())
            }
        }
    }

    /// Requester (or admin) cancellation from `Pending` or `Processing`.
    /// The job lands in `Failed` with a well-known message; a late worker
    /// completion then no-ops.
    pub fn cancel_analysis_job(&self, caller: &Identity, job_id: &str) -> Result<()> {
        let now = Self::now();
        let mut state = self.state();
        let is_admin = state.access.is_admin(caller);
        let CoreState {
            analysis: queue, ..
        } = &mut *state;
        let job = queue
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::not_found(format!("job not found: {job_id}")))?;
        if &job.requester != caller && !is_admin {
            return Err(CoreError::unauthorized(
                "only the requester or an admin may cancel",
            ));
        }
        if job.status.is_terminal() {
            return Err(CoreError::precondition("job already terminal"));
        }
        if job.status == JobStatus::Pending {
            queue.pending.retain(|id| id != job_id);
        }
        job.status = JobStatus::Failed;
        job.error = Some(CANCELLED_BY_REQUESTER.to_string());
        job.completed_at = Some(now);
        info!(job_id = %job_id, "analysis job cancelled");
        Ok(())
    }

    pub fn get_job_status(&self, job_id: &str) -> Result<(JobStatus, Option<String>)> {
        let state = self.state();
        let job = state
            .analysis
            .jobs
            .get(job_id)
            .ok_or_else(|| CoreError::not_found(format!("job not found: {job_id}")))?;
        Ok((job.status, job.error.clone()))
    }

    /// Most recent jobs first.
    pub fn list_analysis_jobs(&self, limit: u32) -> Vec<AnalysisJobSummary> {
        let state = self.state();
        let mut summaries: Vec<AnalysisJobSummary> =
            state.analysis.jobs.values().map(Into::into).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries.truncate(limit as usize);
        summaries
    }

    pub fn get_pending_job_count(&self) -> u64 {
        self.state().analysis.pending.len() as u64
    }
}
