//! The skill index: primary content store keyed by canonical
//! `owner/repo[/name]` ids, with per-file checksums, a deterministic
//! aggregate, and append-only file/analysis histories.

use chrono::{DateTime, Utc};
use skillgrid_core::checksum::{files_checksum, validate_file_path};
use skillgrid_core::limits::{MAX_FILE_HISTORY, MAX_SKILL_FILES, MAX_SKILL_FILE_BYTES};
use skillgrid_core::{
    id, CoreError, FileVerifyResult, Identity, Result, Skill, SkillFile, SkillFileVersion,
    SkillVerifyResult,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::Kernel;

/// Validate and normalize an incoming file set: path grammar, size and
/// count caps, duplicate-path rejection, checksums re-derived from content.
pub(crate) fn normalize_files(mut files: Vec<SkillFile>) -> Result<Vec<SkillFile>> {
    if files.len() > MAX_SKILL_FILES {
        return Err(CoreError::invalid(format!(
            "too many files: {} (max {MAX_SKILL_FILES})",
            files.len()
        )));
    }
    let mut seen = HashSet::new();
    for file in &mut files {
        validate_file_path(&file.path)?;
        if file.content.len() > MAX_SKILL_FILE_BYTES {
            return Err(CoreError::invalid(format!(
                "file '{}' too large: {} bytes (max {MAX_SKILL_FILE_BYTES})",
                file.path,
                file.content.len()
            )));
        }
        if !seen.insert(file.path.clone()) {
            return Err(CoreError::invalid(format!(
                "duplicate file path: {}",
                file.path
            )));
        }
        file.normalize();
    }
    Ok(files)
}

/// Replace a skill's file set, recording a version entry for every file
/// whose bytes are new or changed, and recompute the aggregate checksum.
/// Returns the new aggregate.
pub(crate) fn apply_file_set(
    skill: &mut Skill,
    files: Vec<SkillFile>,
    fetched_by: &Identity,
    source_url: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let previous: HashMap<String, String> = skill
        .files
        .iter()
        .map(|f| (f.path.clone(), f.checksum.clone()))
        .collect();
    for file in &files {
        if previous.get(&file.path) != Some(&file.checksum) {
            skill.file_history.insert(
                0,
                SkillFileVersion {
                    path: file.path.clone(),
                    checksum: file.checksum.clone(),
                    size_bytes: file.size_bytes,
                    fetched_at: now,
                    fetched_by: fetched_by.clone(),
                    source_url: source_url.map(str::to_string),
                },
            );
        }
    }
    skill.file_history.truncate(MAX_FILE_HISTORY);
    let aggregate = files_checksum(&files);
    skill.files_checksum = (!files.is_empty()).then(|| aggregate.clone());
    skill.files = files;
    skill.updated_at = now;
    aggregate
}

impl Kernel {
    /// Insert a new skill. The id must be the canonical form for its
    /// (owner, repo, name) triple; a duplicate id is a conflict.
    pub fn add_skill(&self, caller: &Identity, skill: Skill) -> Result<String> {
        let mut state = self.state();
        state.require_admin(caller)?;
        let stored_id = prepare_insert(&mut state.skills, skill, caller, Self::now())?;
        Ok(stored_id)
    }

    /// Batch insert; duplicates are skipped silently. Returns how many were
    /// inserted.
    pub fn add_skills_batch(&self, caller: &Identity, skills: Vec<Skill>) -> Result<u32> {
        let mut state = self.state();
        state.require_admin(caller)?;
        let now = Self::now();
        let mut inserted = 0u32;
        for skill in skills {
            match prepare_insert(&mut state.skills, skill, caller, now) {
                Ok(_) => inserted += 1,
                Err(CoreError::Conflict(_)) => {}
                Err(other) => return Err(other),
            }
        }
        debug!(inserted, "skill batch import");
        Ok(inserted)
    }

    /// Replace the file set and return the new aggregate checksum.
    pub fn set_skill_files(
        &self,
        caller: &Identity,
        skill_id: &str,
        files: Vec<SkillFile>,
    ) -> Result<String> {
        let files = normalize_files(files)?;
        let now = Self::now();
        let mut state = self.state();
        state.require_admin(caller)?;
        let key = state
            .resolve_skill_id(skill_id)
            .ok_or_else(|| CoreError::not_found(format!("skill not found: {skill_id}")))?;
        let skill = state.skills.get_mut(&key).expect("resolved id present");
        Ok(apply_file_set(skill, files, caller, None, now))
    }

    /// Upsert a single file with the same versioning rules.
    pub fn add_skill_file(
        &self,
        caller: &Identity,
        skill_id: &str,
        file: SkillFile,
    ) -> Result<String> {
        let now = Self::now();
        let mut state = self.state();
        state.require_admin(caller)?;
        let key = state
            .resolve_skill_id(skill_id)
            .ok_or_else(|| CoreError::not_found(format!("skill not found: {skill_id}")))?;
        let skill = state.skills.get_mut(&key).expect("resolved id present");
        let mut files: Vec<SkillFile> = skill
            .files
            .iter()
            .filter(|f| f.path != file.path)
            .cloned()
            .collect();
        files.push(file);
        let files = normalize_files(files)?;
        Ok(apply_file_set(skill, files, caller, None, now))
    }

    /// Bump the install counter and return the new value. Any
    /// authenticated caller.
    pub fn record_install(&self, _caller: &Identity, skill_id: &str) -> Result<u64> {
        let mut state = self.state();
        let key = state
            .resolve_skill_id(skill_id)
            .ok_or_else(|| CoreError::not_found(format!("skill not found: {skill_id}")))?;
        let skill = state.skills.get_mut(&key).expect("resolved id present");
        skill.install_count += 1;
        Ok(skill.install_count)
    }

    /// Drop the current analysis; history is preserved.
    pub fn clear_analysis(&self, caller: &Identity, skill_id: &str) -> Result<()> {
        let mut state = self.state();
        state.require_admin(caller)?;
        let key = state
            .resolve_skill_id(skill_id)
            .ok_or_else(|| CoreError::not_found(format!("skill not found: {skill_id}")))?;
        state.skills.get_mut(&key).expect("resolved id present").analysis = None;
        Ok(())
    }

    pub fn clear_analysis_history(&self, caller: &Identity, skill_id: &str) -> Result<()> {
        let mut state = self.state();
        state.require_admin(caller)?;
        let key = state
            .resolve_skill_id(skill_id)
            .ok_or_else(|| CoreError::not_found(format!("skill not found: {skill_id}")))?;
        state
            .skills
            .get_mut(&key)
            .expect("resolved id present")
            .analysis_history
            .clear();
        Ok(())
    }

    /// Bulk overwrite of install counters from source-host telemetry.
    /// Unknown ids are skipped; returns how many were updated.
    pub fn sync_install_counts(
        &self,
        caller: &Identity,
        data: Vec<(String, u64)>,
    ) -> Result<u32> {
        let mut state = self.state();
        state.require_admin(caller)?;
        let mut updated = 0u32;
        for (skill_id, count) in data {
            if let Some(key) = state.resolve_skill_id(&skill_id) {
                state.skills.get_mut(&key).expect("resolved id present").install_count = count;
                updated += 1;
            }
        }
        Ok(updated)
    }

    pub fn get_skill(&self, skill_id: &str) -> Option<Skill> {
        let state = self.state();
        state.skill(skill_id).ok().cloned()
    }

    pub fn get_skill_file(&self, skill_id: &str, path: &str) -> Result<SkillFile> {
        let state = self.state();
        let skill = state.skill(skill_id)?;
        skill
            .files
            .iter()
            .find(|f| f.path == path)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("file not found: {path}")))
    }

    pub fn get_skill_files(&self, skill_id: &str) -> Result<Vec<SkillFile>> {
        Ok(self.state().skill(skill_id)?.files.clone())
    }

    pub fn get_skill_checksum(&self, skill_id: &str) -> Result<Option<String>> {
        Ok(self.state().skill(skill_id)?.files_checksum.clone())
    }

    pub fn get_file_history(&self, skill_id: &str) -> Result<Vec<SkillFileVersion>> {
        Ok(self.state().skill(skill_id)?.file_history.clone())
    }

    pub fn get_analysis_history(
        &self,
        skill_id: &str,
    ) -> Result<Vec<skillgrid_core::SkillAnalysis>> {
        Ok(self.state().skill(skill_id)?.analysis_history.clone())
    }

    /// Distinct models that have produced a report for this skill; clients
    /// use it to hide models already used.
    pub fn get_analyzed_models(&self, skill_id: &str) -> Result<Vec<String>> {
        let state = self.state();
        let skill = state.skill(skill_id)?;
        let mut models: Vec<String> = Vec::new();
        for analysis in &skill.analysis_history {
            if !models.contains(&analysis.model_used) {
                models.push(analysis.model_used.clone());
            }
        }
        Ok(models)
    }

    pub fn get_install_command(&self, skill_id: &str) -> Result<String> {
        let state = self.state();
        let skill = state.skill(skill_id)?;
        Ok(if skill.repo == skill.name {
            format!("skillgrid add {}/{}", skill.owner, skill.repo)
        } else {
            format!(
                "skillgrid add {}/{} --skill {}",
                skill.owner, skill.repo, skill.name
            )
        })
    }

    /// Skills with no SKILL.md yet, as lightweight tuples for enrichment
    /// tooling. Returns (page, total).
    pub fn list_skills_missing_content(
        &self,
        limit: u32,
        offset: u32,
    ) -> (Vec<(String, String, String, String)>, u32) {
        let state = self.state();
        let mut missing: Vec<(String, String, String, String)> = state
            .skills
            .values()
            .filter(|s| s.skill_md().is_none())
            .map(|s| {
                (
                    s.id.clone(),
                    s.owner.clone(),
                    s.repo.clone(),
                    s.name.clone(),
                )
            })
            .collect();
        missing.sort_by(|a, b| a.0.cmp(&b.0));
        let total = missing.len() as u32;
        let page = missing
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        (page, total)
    }

    /// Compare one claimed checksum against the stored file. Pure query.
    pub fn verify_file_checksum(
        &self,
        skill_id: &str,
        path: &str,
        claimed: &str,
    ) -> Result<FileVerifyResult> {
        let state = self.state();
        let skill = state.skill(skill_id)?;
        let stored = skill
            .files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.checksum.clone())
            .ok_or_else(|| CoreError::not_found(format!("file not found: {path}")))?;
        Ok(FileVerifyResult {
            path: path.to_string(),
            is_valid: stored == claimed,
            stored_checksum: stored,
            provided_checksum: claimed.to_string(),
        })
    }

    /// Verify a caller's local file set against the stored one: per-file
    /// mismatches plus paths missing locally and extra local paths.
    pub fn verify_skill_files(
        &self,
        skill_id: &str,
        local_files: Vec<(String, String)>,
    ) -> Result<SkillVerifyResult> {
        let state = self.state();
        let skill = state.skill(skill_id)?;

        let stored: HashMap<&str, &str> = skill
            .files
            .iter()
            .map(|f| (f.path.as_str(), f.checksum.as_str()))
            .collect();
        let local: HashMap<&str, &str> = local_files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();

        let mut files_valid = 0u32;
        let mut files_invalid = Vec::new();
        let mut missing_files = Vec::new();
        for (path, stored_checksum) in &stored {
            match local.get(path) {
                Some(local_checksum) if local_checksum == stored_checksum => files_valid += 1,
                Some(local_checksum) => files_invalid.push(FileVerifyResult {
                    path: path.to_string(),
                    is_valid: false,
                    stored_checksum: stored_checksum.to_string(),
                    provided_checksum: local_checksum.to_string(),
                }),
                None => missing_files.push(path.to_string()),
            }
        }
        let mut extra_files: Vec<String> = local
            .keys()
            .filter(|path| !stored.contains_key(**path))
            .map(|path| path.to_string())
            .collect();
        files_invalid.sort_by(|a, b| a.path.cmp(&b.path));
        missing_files.sort();
        extra_files.sort();

        let is_valid = files_invalid.is_empty() && missing_files.is_empty();
        Ok(SkillVerifyResult {
            skill_id: skill.id.clone(),
            is_valid,
            files_checked: local_files.len() as u32,
            files_valid,
            files_invalid,
            missing_files,
            extra_files,
        })
    }
}

/// Shared insert path: canonical-id enforcement, file normalization,
/// history consistency, timestamps.
fn prepare_insert(
    skills: &mut HashMap<String, Skill>,
    mut skill: Skill,
    imported_by: &Identity,
    now: DateTime<Utc>,
) -> Result<String> {
    id::validate_skill_id(&skill.id)?;
    let canonical = id::canonical_skill_id(&skill.owner, &skill.repo, &skill.name);
    if skill.id != canonical {
        return Err(CoreError::invalid(format!(
            "skill id '{}' does not match canonical id '{canonical}'",
            skill.id
        )));
    }
    if skills.contains_key(&canonical) {
        return Err(CoreError::conflict(format!(
            "skill already exists: {canonical}"
        )));
    }
    let files = normalize_files(std::mem::take(&mut skill.files))?;
    skill.created_at = now;
    skill.file_history.clear();
    let import_source = skill.source_url.clone();
    apply_file_set(&mut skill, files, imported_by, import_source.as_deref(), now);
    if skill.analysis.is_some() && skill.analysis_history.is_empty() {
        skill.analysis_history = skill.analysis.clone().into_iter().collect();
    }
    skills.insert(canonical.clone(), skill);
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, file, sample_skill};
    use skillgrid_core::checksum::sha256_hex;

    #[test]
    fn duplicate_insert_conflicts_single_but_skips_in_batch() {
        let (kernel, _dir) = testutil::kernel();
        let admin = testutil::admin(&kernel);
        kernel.add_skill(&admin, sample_skill("o/r")).unwrap();
        let err = kernel.add_skill(&admin, sample_skill("o/r")).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let inserted = kernel
            .add_skills_batch(&admin, vec![sample_skill("o/r"), sample_skill("o/other")])
            .unwrap();
        assert_eq!(inserted, 1);
    }

    #[test]
    fn insert_rejects_non_canonical_and_malformed_ids() {
        let (kernel, _dir) = testutil::kernel();
        let admin = testutil::admin(&kernel);
        let mut skill = sample_skill("o/r");
        skill.id = "o/r/r".into(); // long form of a name==repo skill
        assert!(matches!(
            kernel.add_skill(&admin, skill).unwrap_err(),
            CoreError::InvalidArgument(_)
        ));
        let mut skill = sample_skill("o/r");
        skill.id = "bad id".into();
        assert!(kernel.add_skill(&admin, skill).is_err());
    }

    #[test]
    fn short_and_long_lookups_resolve() {
        let (kernel, _dir) = testutil::kernel();
        let admin = testutil::admin(&kernel);
        kernel.add_skill(&admin, sample_skill("o/r")).unwrap();
        kernel.add_skill(&admin, sample_skill("o/r2/custom")).unwrap();
        assert!(kernel.get_skill("o/r").is_some());
        assert!(kernel.get_skill("o/r/r").is_some(), "long form resolves");
        assert!(kernel.get_skill("o/r2/custom").is_some());
        assert!(kernel.get_skill("o/missing").is_none());
    }

    #[test]
    fn set_files_recomputes_aggregate_and_records_versions() {
        let (kernel, _dir) = testutil::kernel();
        let admin = testutil::admin(&kernel);
        kernel.add_skill(&admin, sample_skill("o/r")).unwrap();

        let agg = kernel
            .set_skill_files(
                &admin,
                "o/r",
                vec![file("SKILL.md", "# one"), file("references/a.md", "alpha")],
            )
            .unwrap();
        let skill = kernel.get_skill("o/r").unwrap();
        assert_eq!(skill.files_checksum.as_deref(), Some(agg.as_str()));
        assert_eq!(skill.file_history.len(), 2);

        // Unchanged file produces no new version entry; changed one does.
        kernel
            .set_skill_files(
                &admin,
                "o/r",
                vec![file("SKILL.md", "# one"), file("references/a.md", "beta")],
            )
            .unwrap();
        let skill = kernel.get_skill("o/r").unwrap();
        assert_eq!(skill.file_history.len(), 3);
        assert_eq!(skill.file_history[0].path, "references/a.md");
    }

    #[test]
    fn file_set_caps_and_duplicates_rejected() {
        let (kernel, _dir) = testutil::kernel();
        let admin = testutil::admin(&kernel);
        kernel.add_skill(&admin, sample_skill("o/r")).unwrap();

        let dup = vec![file("a.md", "x"), file("a.md", "y")];
        assert!(kernel.set_skill_files(&admin, "o/r", dup).is_err());

        let oversized = vec![SkillFile::from_content(
            "big.md".into(),
            "x".repeat(MAX_SKILL_FILE_BYTES + 1),
        )];
        assert!(kernel.set_skill_files(&admin, "o/r", oversized).is_err());

        let too_many: Vec<SkillFile> = (0..=MAX_SKILL_FILES)
            .map(|i| file(&format!("f{i}.md"), "x"))
            .collect();
        assert!(kernel.set_skill_files(&admin, "o/r", too_many).is_err());
    }

    #[test]
    fn checksums_are_rederived_from_content() {
        let (kernel, _dir) = testutil::kernel();
        let admin = testutil::admin(&kernel);
        kernel.add_skill(&admin, sample_skill("o/r")).unwrap();
        let mut lying = file("a.md", "real content");
        lying.checksum = "0".repeat(64);
        lying.size_bytes = 9999;
        kernel.set_skill_files(&admin, "o/r", vec![lying]).unwrap();
        let stored = kernel.get_skill_file("o/r", "a.md").unwrap();
        assert_eq!(stored.checksum, sha256_hex(b"real content"));
        assert_eq!(stored.size_bytes, 12);
    }

    #[test]
    fn verify_round_trip_and_tamper_detection() {
        let (kernel, _dir) = testutil::kernel();
        let admin = testutil::admin(&kernel);
        kernel.add_skill(&admin, sample_skill("o/r")).unwrap();
        kernel
            .set_skill_files(&admin, "o/r", vec![file("a", "x"), file("b", "y")])
            .unwrap();

        let ok = kernel
            .verify_skill_files(
                "o/r",
                vec![
                    ("a".into(), sha256_hex(b"x")),
                    ("b".into(), sha256_hex(b"y")),
                ],
            )
            .unwrap();
        assert!(ok.is_valid);
        assert_eq!(ok.files_valid, 2);
        assert!(ok.files_invalid.is_empty());
        assert!(ok.missing_files.is_empty() && ok.extra_files.is_empty());

        let tampered = kernel
            .verify_skill_files(
                "o/r",
                vec![("a".into(), "00".repeat(32)), ("b".into(), sha256_hex(b"y"))],
            )
            .unwrap();
        assert!(!tampered.is_valid);
        assert_eq!(tampered.files_invalid.len(), 1);
        assert_eq!(tampered.files_invalid[0].path, "a");
        assert_eq!(tampered.files_invalid[0].stored_checksum, sha256_hex(b"x"));

        let partial = kernel
            .verify_skill_files(
                "o/r",
                vec![("a".into(), sha256_hex(b"x")), ("c".into(), "ff".into())],
            )
            .unwrap();
        assert!(!partial.is_valid);
        assert_eq!(partial.missing_files, vec!["b".to_string()]);
        assert_eq!(partial.extra_files, vec!["c".to_string()]);
    }

    #[test]
    fn install_counter_increments_and_returns() {
        let (kernel, _dir) = testutil::kernel();
        let admin = testutil::admin(&kernel);
        kernel.add_skill(&admin, sample_skill("o/r")).unwrap();
        let user = Identity::from("user-a");
        assert_eq!(kernel.record_install(&user, "o/r").unwrap(), 1);
        assert_eq!(kernel.record_install(&user, "o/r").unwrap(), 2);
        assert!(matches!(
            kernel.record_install(&user, "o/none").unwrap_err(),
            CoreError::NotFound(_)
        ));
    }
}
