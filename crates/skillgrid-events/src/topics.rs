//! Canonical event topic constants.
//!
//! Centralized so publishers and SSE consumers stay in sync. Keep the list
//! grouped by surface and favor dot.case names.

// Analysis queue
pub const TOPIC_JOBS_SUBMITTED: &str = "skill.jobs.submitted";
pub const TOPIC_JOBS_CLAIMED: &str = "skill.jobs.claimed";
pub const TOPIC_JOBS_COMPLETED: &str = "skill.jobs.completed";
pub const TOPIC_JOBS_FAILED: &str = "skill.jobs.failed";
pub const TOPIC_JOBS_CANCELLED: &str = "skill.jobs.cancelled";

// Enrichment queue
pub const TOPIC_ENRICH_SUBMITTED: &str = "skill.enrich.submitted";
pub const TOPIC_ENRICH_CLAIMED: &str = "skill.enrich.claimed";
pub const TOPIC_ENRICH_COMPLETED: &str = "skill.enrich.completed";
pub const TOPIC_ENRICH_NOT_FOUND: &str = "skill.enrich.not.found";
pub const TOPIC_ENRICH_FAILED: &str = "skill.enrich.failed";
pub const TOPIC_ENRICH_CANCELLED: &str = "skill.enrich.cancelled";

// Skill index
pub const TOPIC_INDEX_UPDATED: &str = "skill.index.updated";
pub const TOPIC_INDEX_FILES_CHANGED: &str = "skill.index.files.changed";

// Service lifecycle
pub const TOPIC_SERVICE_START: &str = "service.start";
pub const TOPIC_SERVICE_SHUTDOWN: &str = "service.shutdown";
