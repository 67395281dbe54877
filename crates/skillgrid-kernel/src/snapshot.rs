//! Snapshot persistence: one versioned JSON region per state container,
//! written with temp-file-plus-rename and restored through registered
//! migrations at startup. A migration failure aborts the open.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use skillgrid_core::{AccessState, AnalysisJob, AnalysisPrompt, EnrichmentJob, Identity, Skill,
    UserProfile};

use crate::{CoreState, QueueState};

#[derive(Serialize, serde::Deserialize)]
struct Region {
    version: u32,
    data: Value,
}

type Migration = fn(&mut Value) -> Result<()>;

struct RegionSpec {
    name: &'static str,
    current: u32,
    /// `(from, fn)` pairs; each migration lifts `from` to `from + 1`.
    migrations: &'static [(u32, Migration)],
}

const SKILLS: RegionSpec = RegionSpec {
    name: "skills",
    current: 2,
    migrations: &[(1, migrate_skills_v1_to_v2)],
};
const USERS: RegionSpec = RegionSpec {
    name: "users",
    current: 1,
    migrations: &[],
};
const PROMPTS: RegionSpec = RegionSpec {
    name: "prompts",
    current: 1,
    migrations: &[],
};
const ACCESS: RegionSpec = RegionSpec {
    name: "access",
    current: 1,
    migrations: &[],
};
const ANALYSIS_JOBS: RegionSpec = RegionSpec {
    name: "analysis_jobs",
    current: 1,
    migrations: &[],
};
const ENRICHMENT_JOBS: RegionSpec = RegionSpec {
    name: "enrichment_jobs",
    current: 1,
    migrations: &[],
};

/// v1 skills predate per-file version history and the extended analysis
/// provenance fields; backfill empty defaults so v2 deserialization sees a
/// complete record.
fn migrate_skills_v1_to_v2(data: &mut Value) -> Result<()> {
    let Some(map) = data.as_object_mut() else {
        bail!("skills region is not an object");
    };
    for skill in map.values_mut() {
        let Some(obj) = skill.as_object_mut() else {
            bail!("skill entry is not an object");
        };
        obj.entry("file_history").or_insert_with(|| Value::Array(vec![]));
        let patch_analysis = |analysis: &mut Value| {
            if let Some(a) = analysis.as_object_mut() {
                a.entry("referenced_files").or_insert_with(|| Value::Array(vec![]));
                a.entry("referenced_urls").or_insert_with(|| Value::Array(vec![]));
                a.entry("tee_worker_version").or_insert(Value::Null);
                a.entry("prompt_version").or_insert(Value::Null);
            }
        };
        if let Some(analysis) = obj.get_mut("analysis") {
            patch_analysis(analysis);
        }
        if let Some(history) = obj.get_mut("analysis_history").and_then(|h| h.as_array_mut()) {
            for entry in history {
                patch_analysis(entry);
            }
        }
    }
    Ok(())
}

fn region_path(dir: &Path, spec: &RegionSpec) -> std::path::PathBuf {
    dir.join(format!("{}.json", spec.name))
}

fn load_region<T: DeserializeOwned + Default>(dir: &Path, spec: &RegionSpec) -> Result<T> {
    let path = region_path(dir, spec);
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = std::fs::read(&path)
        .with_context(|| format!("reading state region {}", path.display()))?;
    let mut region: Region = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing state region {}", spec.name))?;
    if region.version > spec.current {
        bail!(
            "state region '{}' is version {} but this build supports up to {}",
            spec.name,
            region.version,
            spec.current
        );
    }
    for (from, migrate) in spec.migrations {
        if region.version == *from {
            migrate(&mut region.data).with_context(|| {
                format!("migrating region '{}' from v{from}", spec.name)
            })?;
            region.version = from + 1;
            info!(region = spec.name, from, "state region migrated");
        }
    }
    if region.version != spec.current {
        bail!(
            "no migration path for region '{}' from v{} to v{}",
            spec.name,
            region.version,
            spec.current
        );
    }
    serde_json::from_value(region.data)
        .with_context(|| format!("decoding state region '{}'", spec.name))
}

fn save_region<T: Serialize>(dir: &Path, spec: &RegionSpec, data: &T) -> Result<()> {
    let region = Region {
        version: spec.current,
        data: serde_json::to_value(data)?,
    };
    let path = region_path(dir, spec);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(&region)?)
        .with_context(|| format!("writing state region {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("committing state region {}", path.display()))?;
    Ok(())
}

pub(crate) fn load(dir: &Path) -> Result<CoreState> {
    Ok(CoreState {
        skills: load_region::<HashMap<String, Skill>>(dir, &SKILLS)?,
        users: load_region::<HashMap<Identity, UserProfile>>(dir, &USERS)?,
        prompts: load_region::<HashMap<String, AnalysisPrompt>>(dir, &PROMPTS)?,
        access: load_region::<AccessState>(dir, &ACCESS)?,
        analysis: load_region::<QueueState<AnalysisJob>>(dir, &ANALYSIS_JOBS)?,
        enrichment: load_region::<QueueState<EnrichmentJob>>(dir, &ENRICHMENT_JOBS)?,
    })
}

pub(crate) fn save(dir: &Path, state: &CoreState) -> Result<()> {
    save_region(dir, &SKILLS, &state.skills)?;
    save_region(dir, &USERS, &state.users)?;
    save_region(dir, &PROMPTS, &state.prompts)?;
    save_region(dir, &ACCESS, &state.access)?;
    save_region(dir, &ANALYSIS_JOBS, &state.analysis)?;
    save_region(dir, &ENRICHMENT_JOBS, &state.enrichment)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, sample_skill};
    use crate::Kernel;

    #[test]
    fn missing_regions_start_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = load(dir.path()).unwrap();
        assert!(state.skills.is_empty());
        assert!(state.access.analysis_enabled);
    }

    #[test]
    fn save_then_load_is_indistinguishable() {
        let (kernel, dir) = testutil::kernel();
        let admin = testutil::admin(&kernel);
        let worker = testutil::worker(&kernel, &admin);
        kernel.add_skill(&admin, sample_skill("o/r")).unwrap();
        let user = Identity::from("user-a");
        kernel
            .set_encrypted_credential(&user, "ab".repeat(40))
            .unwrap();
        let job_id = kernel.request_analysis(&user, "o/r", "haiku").unwrap();
        kernel.save().unwrap();

        let restored = Kernel::open(dir.path()).unwrap();
        assert!(restored.get_skill("o/r").is_some());
        assert!(restored.has_credential(&user));
        assert_eq!(restored.get_pending_job_count(), 1);
        assert_eq!(
            restored.get_job_status(&job_id).unwrap().0,
            skillgrid_core::JobStatus::Pending
        );
        assert_eq!(restored.get_workers(&admin).unwrap(), vec![worker.clone()]);
        // FIFO order survives: the restored queue hands the same job out.
        let claimed = restored.claim_pending_jobs(&worker, 10).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].job_id, job_id);
    }

    #[test]
    fn v1_skills_region_is_migrated() {
        let dir = tempfile::TempDir::new().unwrap();
        let v1_skill = serde_json::json!({
            "o/r": {
                "id": "o/r", "name": "r", "description": "d", "owner": "o", "repo": "r",
                "files": [], "stars": 1, "install_count": 2,
                "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z",
                "source": "import",
                "analysis_history": []
            }
        });
        std::fs::write(
            dir.path().join("skills.json"),
            serde_json::to_vec(&serde_json::json!({"version": 1, "data": v1_skill})).unwrap(),
        )
        .unwrap();
        let kernel = Kernel::open(dir.path()).unwrap();
        let skill = kernel.get_skill("o/r").expect("migrated skill");
        assert!(skill.file_history.is_empty());
        assert_eq!(skill.install_count, 2);
    }

    #[test]
    fn unbridgeable_region_version_aborts_startup() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("skills.json"),
            serde_json::to_vec(&serde_json::json!({"version": 99, "data": {}})).unwrap(),
        )
        .unwrap();
        assert!(Kernel::open(dir.path()).is_err());
    }
}
