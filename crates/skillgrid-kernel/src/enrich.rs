//! The enrichment queue: fetch jobs for artifact contents, structurally
//! parallel to the analysis queue but with a distinct `NotFound` terminal
//! outcome and an optional auto-chained analysis on success.

use skillgrid_core::checksum::sanitize_markdown;
use skillgrid_core::limits::{DEFAULT_ANALYSIS_MODEL, MAX_CLAIM_BATCH};
use skillgrid_core::{
    CoreError, EnrichmentJob, EnrichmentResult, EnrichmentStatus, Identity,
    PendingEnrichmentPayload, Result, SkillFile, CANCELLED_BY_REQUESTER,
};
use tracing::{info, warn};

use crate::queue::{derive_job_id, enqueue_analysis};
use crate::{skills::apply_file_set, CoreState, Kernel};

fn new_enrichment_job(
    state: &mut CoreState,
    skill_key: &str,
    requester: &Identity,
    auto_analyze: bool,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<String> {
    let skill = &state.skills[skill_key];
    let (owner, repo, name) = (skill.owner.clone(), skill.repo.clone(), skill.name.clone());
    let queue = &mut state.enrichment;
    queue.counter += 1;
    let job_id = derive_job_id(
        "ej",
        skill_key,
        requester,
        if auto_analyze { "auto" } else { "fetch" },
        queue.counter,
    );
    if queue.jobs.contains_key(&job_id) {
        return Err(CoreError::internal(format!(
            "enrichment job id collision: {job_id}"
        )));
    }
    queue.jobs.insert(
        job_id.clone(),
        EnrichmentJob {
            id: job_id.clone(),
            skill_id: skill_key.to_string(),
            owner,
            repo,
            name,
            requester: requester.clone(),
            auto_analyze,
            chained_analysis_job_id: None,
            status: EnrichmentStatus::Pending,
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
    /// Queue a fetch of the skill's contents from the source host. A live
    /// enrichment for the same skill is returned as-is instead of queueing
    /// a second fetch.
    pub fn request_enrichment(
        &self,
        caller: &Identity,
        skill_id: &str,
        auto_analyze: bool,
    ) -> Result<String> {
        let now = Self::now();
        let mut state = self.state();
        let key = state
            .resolve_skill_id(skill_id)
            .ok_or_else(|| CoreError::not_found(format!("skill not found: {skill_id}")))?;
        if auto_analyze
            && !state
                .users
                .get(caller)
                .is_some_and(|u| u.encrypted_credential.is_some())
        {
            return Err(CoreError::precondition(
                "auto-analyze requires an encrypted credential; save your credential first",
            ));
        }
        if let Some(live) = state
            .enrichment
            .jobs
            .values()
            .find(|job| job.skill_id == key && !job.status.is_terminal())
        {
            return Ok(live.id.clone());
        }
        let job_id = new_enrichment_job(&mut state, &key, caller, auto_analyze, now)?;
        info!(job_id = %job_id, skill_id = %key, auto_analyze, "enrichment job queued");
        Ok(job_id)
    }

    /// Admin sweep: queue enrichment for skills still missing SKILL.md.
    /// Returns (queued, total still missing).
    pub fn queue_enrichment_batch(
        &self,
        caller: &Identity,
        limit: u32,
        auto_analyze: bool,
    ) -> Result<(u32, u32)> {
        let now = Self::now();
        let mut state = self.state();
        state.require_admin(caller)?;

        let live_skills: std::collections::HashSet<String> = state
            .enrichment
            .jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .map(|job| job.skill_id.clone())
            .collect();
        let missing: Vec<String> = state
            .skills
            .values()
            .filter(|s| s.skill_md().is_none())
            .map(|s| s.id.clone())
            .collect();
        let total_missing = missing.len() as u32;

        let mut queued = 0u32;
        for skill_id in missing
            .into_iter()
            .filter(|id| !live_skills.contains(id))
            .take(limit as usize)
        {
            new_enrichment_job(&mut state, &skill_id, caller, auto_analyze, now)?;
            queued += 1;
        }
        Ok((queued, total_missing))
    }

    /// FIFO claim, mirroring the analysis queue.
    pub fn claim_enrichment_jobs(
        &self,
        caller: &Identity,
        limit: u32,
    ) -> Result<Vec<PendingEnrichmentPayload>> {
        let now = Self::now();
        let mut state = self.state();
        state.require_worker(caller)?;
        let limit = (limit as usize).min(MAX_CLAIM_BATCH);
        let queue = &mut state.enrichment;

        let mut payloads = Vec::new();
        while payloads.len() < limit {
            let Some(job_id) = queue.pending.pop_front() else {
                break;
            };
            let Some(job) = queue.jobs.get_mut(&job_id) else {
                continue;
            };
            if job.status != EnrichmentStatus::Pending {
                continue;
            }
            payloads.push(PendingEnrichmentPayload {
                job_id: job.id.clone(),
                skill_id: job.skill_id.clone(),
                owner: job.owner.clone(),
                repo: job.repo.clone(),
                name: job.name.clone(),
                auto_analyze: job.auto_analyze,
            });
            job.status = EnrichmentStatus::Processing;
            job.claimed_at = Some(now);
            job.claimed_by = Some(caller.clone());
        }
        Ok(payloads)
    }

    /// Worker result. `found == false` (or empty content) lands in
    /// `NotFound`; otherwise the fetched files replace the skill's file set
    /// and, when requested, an analysis job is chained with the requester's
    /// current credential and the default model.
    pub fn submit_enrichment_result(
        &self,
        caller: &Identity,
        job_id: &str,
        result: EnrichmentResult,
    ) -> Result<()> {
        let now = Self::now();
        let mut state = self.state();
        state.require_worker(caller)?;
        let is_admin = state.access.is_admin(caller);

        let job = state
            .enrichment
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::not_found(format!("enrichment job not found: {job_id}")))?;
        match job.status {
            EnrichmentStatus::Completed | EnrichmentStatus::NotFound => return Ok(()),
            EnrichmentStatus::Failed if job.is_cancelled() => return Ok(()),
            EnrichmentStatus::Failed => {
                return Err(CoreError::conflict("enrichment job already failed"));
            }
            EnrichmentStatus::Pending => {
                return Err(CoreError::conflict("enrichment job has not been claimed"));
            }
            EnrichmentStatus::Processing => {}
        }
        if job.claimed_by.as_ref() != Some(caller) && !is_admin {
            return Err(CoreError::unauthorized(
                "job was claimed by a different worker",
            ));
        }

        let skill_key = job.skill_id.clone();
        let requester = job.requester.clone();
        let auto_analyze = job.auto_analyze;

        let content = result.content.as_deref().unwrap_or_default();
        if !result.found || content.is_empty() {
            job.status = EnrichmentStatus::NotFound;
            job.completed_at = Some(now);
            info!(job_id = %job_id, skill_id = %skill_key, "artifact not found on source host");
            return Ok(());
        }

        let sanitized = sanitize_markdown(content)?;
        let mut files = vec![SkillFile::from_content("SKILL.md".to_string(), sanitized)];
        for found in &result.files_found {
            if found.path == "SKILL.md" {
                continue;
            }
            files.push(SkillFile::from_content(
                found.path.clone(),
                found.content.clone(),
            ));
        }
        // Same normalization and versioning path as an admin file write, so
        // caps and provenance do not diverge between the two.
        let files = crate::skills::normalize_files(files)?;
        let source_url = result.source_url.clone();

        let CoreState {
            skills, enrichment, ..
        } = &mut *state;
        let Some(skill) = skills.get_mut(&skill_key) else {
            let job = enrichment.jobs.get_mut(job_id).expect("job present");
            job.status = EnrichmentStatus::Failed;
            job.error = Some("skill not found".to_string());
            job.completed_at = Some(now);
            warn!(job_id = %job_id, "failing enrichment for missing skill");
            return Ok(());
        };
        apply_file_set(skill, files, &requester, source_url.as_deref(), now);

        let chained = if auto_analyze {
            let credential = state
                .users
                .get(&requester)
                .and_then(|u| u.encrypted_credential.clone());
            match credential {
                Some(credential) => Some(enqueue_analysis(
                    &mut state,
                    &skill_key,
                    &requester,
                    DEFAULT_ANALYSIS_MODEL,
                    credential,
                    now,
                )?),
                None => {
                    warn!(job_id = %job_id, "auto-analyze skipped: requester credential gone");
                    None
                }
            }
        } else {
            None
        };

        let job = state
            .enrichment
            .jobs
            .get_mut(job_id)
            .expect("job present");
        job.status = EnrichmentStatus::Completed;
        job.chained_analysis_job_id = chained.clone();
        job.completed_at = Some(now);
        info!(
            job_id = %job_id,
            skill_id = %skill_key,
            chained = chained.as_deref().unwrap_or("-"),
            "enrichment job completed"
        );
        Ok(())
    }

    pub fn submit_enrichment_error(
        &self,
        caller: &Identity,
        job_id: &str,
        message: &str,
    ) -> Result<()> {
        let now = Self::now();
        let mut state = self.state();
        state.require_worker(caller)?;
        let is_admin = state.access.is_admin(caller);
        let job = state
            .enrichment
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::not_found(format!("enrichment job not found: {job_id}")))?;
        match job.status {
            EnrichmentStatus::Failed => Ok(()),
            EnrichmentStatus::Completed | EnrichmentStatus::NotFound => {
                Err(CoreError::conflict("enrichment job already terminal"))
            }
            EnrichmentStatus::Pending => {
                Err(CoreError::conflict("enrichment job has not been claimed"))
            }
            EnrichmentStatus::Processing => {
                if job.claimed_by.as_ref() != Some(caller) && !is_admin {
                    return Err(CoreError::unauthorized(
                        "job was claimed by a different worker",
                    ));
                }
                job.status = EnrichmentStatus::Failed;
                job.error = Some(message.to_string());
                job.completed_at = Some(now);
                Ok(())
            }
        }
    }

    pub fn cancel_enrichment_job(&self, caller: &Identity, job_id: &str) -> Result<()> {
        let now = Self::now();
        let mut state = self.state();
        let is_admin = state.access.is_admin(caller);
        let queue = &mut state.enrichment;
        let job = queue
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::not_found(format!("enrichment job not found: {job_id}")))?;
        if &job.requester != caller && !is_admin {
            return Err(CoreError::unauthorized(
                "only the requester or an admin may cancel",
            ));
        }
        if job.status.is_terminal() {
            return Err(CoreError::precondition("enrichment job already terminal"));
        }
        if job.status == EnrichmentStatus::Pending {
            queue.pending.retain(|id| id != job_id);
        }
        job.status = EnrichmentStatus::Failed;
        job.error = Some(CANCELLED_BY_REQUESTER.to_string());
        job.completed_at = Some(now);
        Ok(())
    }

    pub fn get_enrichment_job_status(
        &self,
        job_id: &str,
    ) -> Result<(EnrichmentStatus, Option<String>)> {
        let state = self.state();
        let job = state
            .enrichment
            .jobs
            .get(job_id)
            .ok_or_else(|| CoreError::not_found(format!("enrichment job not found: {job_id}")))?;
        Ok((job.status, job.error.clone()))
    }

    pub fn get_enrichment_job(&self, job_id: &str) -> Option<EnrichmentJob> {
        self.state().enrichment.jobs.get(job_id).cloned()
    }

    pub fn get_pending_enrichment_count(&self) -> u64 {
        self.state().enrichment.pending.len() as u64
    }
}
