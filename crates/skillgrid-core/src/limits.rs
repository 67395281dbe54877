//! Resource bounds enforced by the kernel. Exceeding a cap is an
//! `InvalidArgument` for the submitting operation, except history eviction
//! which is silent.

/// Largest single skill file the index accepts (bytes of content).
pub const MAX_SKILL_FILE_BYTES: usize = 500_000;

/// Largest SKILL.md body accepted by the markdown sanitizer.
pub const MAX_SKILL_CONTENT_BYTES: usize = 200_000;

/// Maximum files per skill.
pub const MAX_SKILL_FILES: usize = 50;

/// Analysis history entries kept per skill; oldest evicted.
pub const MAX_ANALYSIS_HISTORY: usize = 50;

/// File version entries kept per skill; oldest evicted.
pub const MAX_FILE_HISTORY: usize = 50;

/// Hard cap on jobs handed out per claim call.
pub const MAX_CLAIM_BATCH: usize = 10;

/// Encrypted credential blob bounds (hex characters). The minimum covers a
/// 12-byte iv plus a 16-byte auth tag with empty ciphertext.
pub const MIN_ENCRYPTED_CREDENTIAL_HEX: usize = 56;
pub const MAX_ENCRYPTED_CREDENTIAL_HEX: usize = 4096;

/// Model used for analysis jobs chained off a successful enrichment.
pub const DEFAULT_ANALYSIS_MODEL: &str = "haiku";
