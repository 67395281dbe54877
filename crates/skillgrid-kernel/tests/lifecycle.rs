//! End-to-end exercises of the coordination core: submit/claim/complete,
//! idempotent resubmission, FIFO ordering, cancellation races, enrichment
//! chaining, and checksum verification.

use chrono::Utc;
use skillgrid_core::{
    CoreError, EnrichmentFile, EnrichmentResult, EnrichmentStatus, Identity, JobStatus, Skill,
    CANCELLED_BY_REQUESTER,
};
use skillgrid_kernel::Kernel;

fn kernel() -> (Kernel, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let kernel = Kernel::open(dir.path()).expect("kernel open");
    (kernel, dir)
}

fn setup() -> (Kernel, tempfile::TempDir, Identity, Identity) {
    let (kernel, dir) = kernel();
    let admin = Identity::from("admin-1");
    kernel.ensure_admin(&admin);
    let worker = Identity::from("worker-1");
    kernel.add_worker(&admin, &worker).expect("add worker");
    (kernel, dir, admin, worker)
}

fn skill(id: &str) -> Skill {
    let (owner, repo, name) = match id.split('/').collect::<Vec<_>>().as_slice() {
        [owner, repo] => (owner.to_string(), repo.to_string(), repo.to_string()),
        [owner, repo, name] => (owner.to_string(), repo.to_string(), name.to_string()),
        _ => panic!("bad test id"),
    };
    let now = Utc::now();
    Skill {
        id: id.to_string(),
        name,
        description: "a test skill".into(),
        owner,
        repo,
        source_url: None,
        artifact_url: None,
        files: Vec::new(),
        files_checksum: None,
        stars: 0,
        analysis: None,
        analysis_history: Vec::new(),
        file_history: Vec::new(),
        install_count: 0,
        created_at: now,
        updated_at: now,
        source: "test".into(),
    }
}

fn credentialed_user(kernel: &Kernel, name: &str) -> Identity {
    let user = Identity::from(name);
    kernel
        .set_encrypted_credential(&user, "ab".repeat(40))
        .expect("set credential");
    user
}

fn report_json() -> String {
    serde_json::json!({
        "ratings": {
            "overall": 4.0,
            "topics": [
                {"topic": "Quality", "score": 80, "confidence": 85, "reasoning": "good"}
            ],
            "flags": []
        },
        "primary_category": "devops",
        "secondary_categories": [],
        "tags": [],
        "has_mcp": false,
        "provides_mcp": false,
        "required_mcps": [],
        "software_deps": [],
        "has_references": false,
        "has_assets": false,
        "estimated_token_usage": 900,
        "summary": "Fine.",
        "strengths": [],
        "weaknesses": [],
        "use_cases": [],
        "compatibility_notes": "",
        "prerequisites": []
    })
    .to_string()
}

#[test]
fn submit_claim_complete_round_trip() {
    let (kernel, _dir, admin, worker) = setup();
    kernel
        .add_skill(&admin, skill("vercel/agent-skills"))
        .unwrap();
    let user = credentialed_user(&kernel, "user-u");

    let job_id = kernel
        .request_analysis(&user, "vercel/agent-skills", "haiku")
        .unwrap();

    let claimed = kernel.claim_pending_jobs(&worker, 5).unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].job_id, job_id);
    assert_eq!(claimed[0].encrypted_credential, "ab".repeat(40));
    assert!(claimed[0].skill_md_content.is_some(), "fallback content");

    kernel
        .submit_job_result_with_metadata(&worker, &job_id, &report_json(), "1.9.5", "v2")
        .unwrap();

    let (status, error) = kernel.get_job_status(&job_id).unwrap();
    assert_eq!(status, JobStatus::Completed);
    assert!(error.is_none());

    let stored = kernel.get_skill("vercel/agent-skills").unwrap();
    let analysis = stored.analysis.expect("current analysis set");
    assert_eq!(analysis.analyzed_by, user);
    assert_eq!(analysis.model_used, "haiku");
    assert_eq!(analysis.tee_worker_version.as_deref(), Some("1.9.5"));
    assert_eq!(analysis.prompt_version.as_deref(), Some("v2"));
    assert_eq!(stored.analysis_history.len(), 1);

    let profile = kernel.get_my_profile(&user).unwrap();
    assert_eq!(profile.analyses_performed, 1);
}

#[test]
fn resubmission_is_idempotent_while_live_and_fresh_after_terminal() {
    let (kernel, _dir, admin, worker) = setup();
    kernel.add_skill(&admin, skill("o/r")).unwrap();
    let user = credentialed_user(&kernel, "user-u");

    let first = kernel.request_analysis(&user, "o/r", "haiku").unwrap();
    // Pending: same tuple returns the same id.
    assert_eq!(
        kernel.request_analysis(&user, "o/r", "haiku").unwrap(),
        first
    );
    // Processing: still the same id.
    kernel.claim_pending_jobs(&worker, 10).unwrap();
    assert_eq!(
        kernel.request_analysis(&user, "o/r", "haiku").unwrap(),
        first
    );
    // A different model queues separately.
    let other = kernel.request_analysis(&user, "o/r", "opus").unwrap();
    assert_ne!(other, first);

    kernel
        .submit_job_result_with_metadata(&worker, &first, &report_json(), "", "")
        .unwrap();
    // Terminal: a new submission creates a fresh job.
    let second = kernel.request_analysis(&user, "o/r", "haiku").unwrap();
    assert_ne!(second, first);
}

#[test]
fn pending_queue_is_fifo_across_users_and_claims_disjoint() {
    let (kernel, _dir, admin, worker) = setup();
    kernel.add_skill(&admin, skill("o/s1")).unwrap();
    kernel.add_skill(&admin, skill("o/s2")).unwrap();
    kernel.add_skill(&admin, skill("o/s3")).unwrap();
    let alice = credentialed_user(&kernel, "alice");
    let bob = credentialed_user(&kernel, "bob");

    let j1 = kernel.request_analysis(&alice, "o/s1", "haiku").unwrap();
    let j2 = kernel.request_analysis(&bob, "o/s2", "haiku").unwrap();
    let j3 = kernel.request_analysis(&alice, "o/s3", "haiku").unwrap();
    assert_eq!(kernel.get_pending_job_count(), 3);

    let first_batch = kernel.claim_pending_jobs(&worker, 2).unwrap();
    assert_eq!(
        first_batch.iter().map(|p| p.job_id.as_str()).collect::<Vec<_>>(),
        vec![j1.as_str(), j2.as_str()]
    );

    // A second claim never sees already-claimed jobs.
    let second_worker = Identity::from("worker-2");
    kernel.add_worker(&admin, &second_worker).unwrap();
    let second_batch = kernel.claim_pending_jobs(&second_worker, 10).unwrap();
    assert_eq!(
        second_batch.iter().map(|p| p.job_id.as_str()).collect::<Vec<_>>(),
        vec![j3.as_str()]
    );
    assert_eq!(kernel.get_pending_job_count(), 0);
    assert!(kernel.claim_pending_jobs(&worker, 10).unwrap().is_empty());
}

#[test]
fn history_is_prefix_stable_across_completions() {
    let (kernel, _dir, admin, worker) = setup();
    kernel.add_skill(&admin, skill("o/r")).unwrap();
    let user = credentialed_user(&kernel, "user-u");

    let j1 = kernel.request_analysis(&user, "o/r", "haiku").unwrap();
    kernel.claim_pending_jobs(&worker, 10).unwrap();
    kernel
        .submit_job_result_with_metadata(&worker, &j1, &report_json(), "", "")
        .unwrap();
    let first_entry = kernel.get_skill("o/r").unwrap().analysis_history[0].clone();

    let j2 = kernel.request_analysis(&user, "o/r", "opus").unwrap();
    kernel.claim_pending_jobs(&worker, 10).unwrap();
    kernel
        .submit_job_result_with_metadata(&worker, &j2, &report_json(), "", "")
        .unwrap();

    let stored = kernel.get_skill("o/r").unwrap();
    assert_eq!(stored.analysis_history.len(), 2);
    assert_eq!(stored.analysis_history[0].model_used, "opus");
    // The older entry is byte-identical to its pre-second-completion value.
    assert_eq!(
        serde_json::to_string(&stored.analysis_history[1]).unwrap(),
        serde_json::to_string(&first_entry).unwrap()
    );
    assert_eq!(
        kernel.get_analyzed_models("o/r").unwrap(),
        vec!["opus".to_string(), "haiku".to_string()]
    );
}

#[test]
fn cancellation_race_with_late_completion() {
    let (kernel, _dir, admin, worker) = setup();
    kernel.add_skill(&admin, skill("o/r")).unwrap();
    let user = credentialed_user(&kernel, "user-u");

    let job_id = kernel.request_analysis(&user, "o/r", "haiku").unwrap();
    kernel.claim_pending_jobs(&worker, 10).unwrap();

    // A stranger cannot cancel someone else's job.
    let stranger = Identity::from("stranger");
    assert!(matches!(
        kernel.cancel_analysis_job(&stranger, &job_id).unwrap_err(),
        CoreError::Unauthorized(_)
    ));

    kernel.cancel_analysis_job(&user, &job_id).unwrap();
    let (status, error) = kernel.get_job_status(&job_id).unwrap();
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(error.as_deref(), Some(CANCELLED_BY_REQUESTER));

    // The worker's late completion is a benign no-op and leaves no trace
    // in the skill history.
    kernel
        .submit_job_result_with_metadata(&worker, &job_id, &report_json(), "1.9.5", "v2")
        .unwrap();
    let stored = kernel.get_skill("o/r").unwrap();
    assert!(stored.analysis.is_none());
    assert!(stored.analysis_history.is_empty());

    // Cancelling a terminal job is a precondition failure.
    assert!(matches!(
        kernel.cancel_analysis_job(&user, &job_id).unwrap_err(),
        CoreError::PreconditionFailed(_)
    ));
}

#[test]
fn cancel_pending_job_removes_it_from_the_queue() {
    let (kernel, _dir, admin, worker) = setup();
    kernel.add_skill(&admin, skill("o/a")).unwrap();
    kernel.add_skill(&admin, skill("o/b")).unwrap();
    let user = credentialed_user(&kernel, "user-u");
    let ja = kernel.request_analysis(&user, "o/a", "haiku").unwrap();
    let jb = kernel.request_analysis(&user, "o/b", "haiku").unwrap();

    kernel.cancel_analysis_job(&user, &ja).unwrap();
    assert_eq!(kernel.get_pending_job_count(), 1);
    let claimed = kernel.claim_pending_jobs(&worker, 10).unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].job_id, jb);
}

#[test]
fn completion_is_idempotent_and_guarded() {
    let (kernel, _dir, admin, worker) = setup();
    kernel.add_skill(&admin, skill("o/r")).unwrap();
    let user = credentialed_user(&kernel, "user-u");
    let job_id = kernel.request_analysis(&user, "o/r", "haiku").unwrap();

    // Completing an unclaimed job is a conflict.
    assert!(matches!(
        kernel
            .submit_job_result_with_metadata(&worker, &job_id, &report_json(), "", "")
            .unwrap_err(),
        CoreError::Conflict(_)
    ));

    kernel.claim_pending_jobs(&worker, 10).unwrap();

    // A different worker cannot complete someone else's claim, but an
    // admin can.
    let other = Identity::from("worker-2");
    kernel.add_worker(&admin, &other).unwrap();
    assert!(matches!(
        kernel
            .submit_job_result_with_metadata(&other, &job_id, &report_json(), "", "")
            .unwrap_err(),
        CoreError::Unauthorized(_)
    ));

    kernel
        .submit_job_result_with_metadata(&worker, &job_id, &report_json(), "", "")
        .unwrap();
    // Re-submission after completion: no-op success, history unchanged.
    kernel
        .submit_job_result_with_metadata(&worker, &job_id, &report_json(), "", "")
        .unwrap();
    assert_eq!(kernel.get_skill("o/r").unwrap().analysis_history.len(), 1);

    // Unknown jobs error.
    assert!(matches!(
        kernel
            .submit_job_result_with_metadata(&worker, "aj-missing", &report_json(), "", "")
            .unwrap_err(),
        CoreError::NotFound(_)
    ));

    // Malformed report payloads are invalid-argument, not internal.
    let j2 = kernel.request_analysis(&user, "o/r", "opus").unwrap();
    kernel.claim_pending_jobs(&worker, 10).unwrap();
    assert!(matches!(
        kernel
            .submit_job_result_with_metadata(&worker, &j2, "not json", "", "")
            .unwrap_err(),
        CoreError::InvalidArgument(_)
    ));
}

#[test]
fn worker_failure_path_is_terminal() {
    let (kernel, _dir, admin, worker) = setup();
    kernel.add_skill(&admin, skill("o/r")).unwrap();
    let user = credentialed_user(&kernel, "user-u");
    let job_id = kernel.request_analysis(&user, "o/r", "haiku").unwrap();
    kernel.claim_pending_jobs(&worker, 10).unwrap();

    kernel
        .submit_job_error(&worker, &job_id, "upstream timeout")
        .unwrap();
    let (status, error) = kernel.get_job_status(&job_id).unwrap();
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(error.as_deref(), Some("upstream timeout"));

    // Completing a plainly failed job is a conflict; retrying the error is
    // a no-op.
    assert!(kernel
        .submit_job_result_with_metadata(&worker, &job_id, &report_json(), "", "")
        .is_err());
    kernel.submit_job_error(&worker, &job_id, "again").unwrap();

    // The core does not retry: a fresh submission is the only way forward.
    let retry = kernel.request_analysis(&user, "o/r", "haiku").unwrap();
    assert_ne!(retry, job_id);
}

#[test]
fn submission_preconditions() {
    let (kernel, _dir, admin, _worker) = setup();
    kernel.add_skill(&admin, skill("o/r")).unwrap();
    let user = credentialed_user(&kernel, "user-u");

    // Unknown skill.
    assert!(matches!(
        kernel.request_analysis(&user, "o/none", "haiku").unwrap_err(),
        CoreError::NotFound(_)
    ));
    // No credential stored.
    let fresh = Identity::from("fresh");
    assert!(matches!(
        kernel.request_analysis(&fresh, "o/r", "haiku").unwrap_err(),
        CoreError::PreconditionFailed(_)
    ));
    // Kill-switch off.
    kernel.set_analysis_enabled(&admin, false).unwrap();
    assert!(matches!(
        kernel.request_analysis(&user, "o/r", "haiku").unwrap_err(),
        CoreError::PreconditionFailed(_)
    ));
    kernel.set_analysis_enabled(&admin, true).unwrap();
    assert!(kernel.request_analysis(&user, "o/r", "haiku").is_ok());

    // Non-worker claims are unauthorized; empty queue claims are Ok([]).
    assert!(matches!(
        kernel.claim_pending_jobs(&user, 5).unwrap_err(),
        CoreError::Unauthorized(_)
    ));
}

#[test]
fn credential_snapshot_is_immutable_after_submission() {
    let (kernel, _dir, admin, worker) = setup();
    kernel.add_skill(&admin, skill("o/r")).unwrap();
    let user = credentialed_user(&kernel, "user-u");
    let original_blob = "ab".repeat(40);

    kernel.request_analysis(&user, "o/r", "haiku").unwrap();
    // Profile mutates after submission; the in-flight job keeps the
    // snapshot taken at submission time.
    kernel
        .set_encrypted_credential(&user, "cd".repeat(40))
        .unwrap();
    let claimed = kernel.claim_pending_jobs(&worker, 1).unwrap();
    assert_eq!(claimed[0].encrypted_credential, original_blob);
}

#[test]
fn enrichment_with_auto_analyze_chains_a_job() {
    let (kernel, _dir, admin, worker) = setup();
    kernel.add_skill(&admin, skill("owner/repo")).unwrap();
    let user = credentialed_user(&kernel, "user-u");

    let e1 = kernel
        .request_enrichment(&user, "owner/repo", true)
        .unwrap();
    // Idempotent while live, regardless of requester.
    assert_eq!(
        kernel.request_enrichment(&user, "owner/repo", true).unwrap(),
        e1
    );

    let claimed = kernel.claim_enrichment_jobs(&worker, 10).unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].job_id, e1);
    assert!(claimed[0].auto_analyze);

    kernel
        .submit_enrichment_result(
            &worker,
            &e1,
            EnrichmentResult {
                found: true,
                content: Some("# A skill\n\nDoes things.".into()),
                source_url: Some("https://source.example/owner/repo".into()),
                files_found: vec![EnrichmentFile {
                    path: "a.md".into(),
                    content: "extra".into(),
                }],
            },
        )
        .unwrap();

    let stored = kernel.get_skill("owner/repo").unwrap();
    assert_eq!(stored.files.len(), 2);
    assert!(stored.skill_md().is_some());
    assert!(stored.files_checksum.is_some());
    assert_eq!(stored.file_history.len(), 2);
    assert_eq!(
        stored.file_history[0].source_url.as_deref(),
        Some("https://source.example/owner/repo")
    );
    assert_eq!(stored.file_history[0].fetched_by, user);

    let job = kernel.get_enrichment_job(&e1).unwrap();
    assert_eq!(job.status, EnrichmentStatus::Completed);
    let chained = job.chained_analysis_job_id.expect("chained analysis job");
    assert_eq!(
        kernel.get_job_status(&chained).unwrap().0,
        JobStatus::Pending
    );
    assert_eq!(kernel.get_pending_job_count(), 1);

    // The chained job is claimable like any other.
    let payloads = kernel.claim_pending_jobs(&worker, 10).unwrap();
    assert_eq!(payloads[0].job_id, chained);
    assert_eq!(payloads[0].skill_md_content.as_deref(), Some("# A skill\n\nDoes things.\n"));
}

#[test]
fn enrichment_not_found_is_distinct_from_failed() {
    let (kernel, _dir, admin, worker) = setup();
    kernel.add_skill(&admin, skill("o/r")).unwrap();
    let user = credentialed_user(&kernel, "user-u");

    let e1 = kernel.request_enrichment(&user, "o/r", false).unwrap();
    kernel.claim_enrichment_jobs(&worker, 10).unwrap();
    kernel
        .submit_enrichment_result(
            &worker,
            &e1,
            EnrichmentResult {
                found: false,
                content: None,
                source_url: None,
                files_found: vec![],
            },
        )
        .unwrap();
    let (status, error) = kernel.get_enrichment_job_status(&e1).unwrap();
    assert_eq!(status, EnrichmentStatus::NotFound);
    assert!(error.is_none());
    assert!(kernel.get_skill("o/r").unwrap().files.is_empty());

    // A transient failure uses the Failed status instead.
    let e2 = kernel.request_enrichment(&user, "o/r", false).unwrap();
    assert_ne!(e2, e1);
    kernel.claim_enrichment_jobs(&worker, 10).unwrap();
    kernel
        .submit_enrichment_error(&worker, &e2, "rate limited")
        .unwrap();
    let (status, error) = kernel.get_enrichment_job_status(&e2).unwrap();
    assert_eq!(status, EnrichmentStatus::Failed);
    assert_eq!(error.as_deref(), Some("rate limited"));
}

#[test]
fn enrichment_auto_analyze_requires_credential() {
    let (kernel, _dir, admin, _worker) = setup();
    kernel.add_skill(&admin, skill("o/r")).unwrap();
    let fresh = Identity::from("fresh");
    assert!(matches!(
        kernel.request_enrichment(&fresh, "o/r", true).unwrap_err(),
        CoreError::PreconditionFailed(_)
    ));
    // Without auto-analyze no credential is needed.
    assert!(kernel.request_enrichment(&fresh, "o/r", false).is_ok());
}

#[test]
fn enrichment_batch_queues_only_missing_content() {
    let (kernel, _dir, admin, worker) = setup();
    kernel.add_skill(&admin, skill("o/a")).unwrap();
    kernel.add_skill(&admin, skill("o/b")).unwrap();
    kernel.add_skill(&admin, skill("o/c")).unwrap();
    kernel
        .set_skill_files(
            &admin,
            "o/a",
            vec![skillgrid_core::SkillFile::from_content(
                "SKILL.md".into(),
                "# done".into(),
            )],
        )
        .unwrap();

    let (queued, total_missing) = kernel.queue_enrichment_batch(&admin, 1, false).unwrap();
    assert_eq!((queued, total_missing), (1, 2));
    let (queued, total_missing) = kernel.queue_enrichment_batch(&admin, 10, false).unwrap();
    assert_eq!((queued, total_missing), (1, 2));
    assert_eq!(kernel.get_pending_enrichment_count(), 2);

    let claimed = kernel.claim_enrichment_jobs(&worker, 10).unwrap();
    assert_eq!(claimed.len(), 2);

    let (page, total) = kernel.list_skills_missing_content(10, 0);
    assert_eq!(total, 2);
    assert_eq!(page.len(), 2);
}

#[test]
fn claim_batch_size_is_capped() {
    let (kernel, _dir, admin, worker) = setup();
    let user = credentialed_user(&kernel, "user-u");
    for i in 0..15 {
        kernel.add_skill(&admin, skill(&format!("o/s{i}"))).unwrap();
        kernel
            .request_analysis(&user, &format!("o/s{i}"), "haiku")
            .unwrap();
    }
    let claimed = kernel.claim_pending_jobs(&worker, 50).unwrap();
    assert_eq!(claimed.len(), 10, "per-claim batch cap");
    assert_eq!(kernel.get_pending_job_count(), 5);
}
