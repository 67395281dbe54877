//! Hash-per-file plus the deterministic aggregate over a skill's file set.

use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};
use crate::limits::MAX_SKILL_CONTENT_BYTES;
use crate::skill::SkillFile;

/// SHA-256 of raw bytes, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Aggregate checksum over a file set: sort by path, feed
/// `path ":" checksum "\n"` per file, hash the result. Identical file sets
/// hash identically regardless of insertion order.
pub fn files_checksum(files: &[SkillFile]) -> String {
    let mut entries: Vec<(&str, &str)> = files
        .iter()
        .map(|f| (f.path.as_str(), f.checksum.as_str()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut buf = String::new();
    for (path, checksum) in entries {
        buf.push_str(path);
        buf.push(':');
        buf.push_str(checksum);
        buf.push('\n');
    }
    sha256_hex(buf.as_bytes())
}

/// Reject traversal and absolute paths before a file enters the index.
pub fn validate_file_path(path: &str) -> Result<()> {
    if path.is_empty()
        || path.contains("..")
        || path.starts_with('/')
        || path.starts_with('\\')
        || path.contains('\0')
    {
        return Err(CoreError::invalid(format!("invalid file path: {path}")));
    }
    Ok(())
}

/// Sanitize SKILL.md content fetched from the source host: size cap, null
/// bytes stripped, runs of more than two blank lines collapsed.
pub fn sanitize_markdown(content: &str) -> Result<String> {
    if content.len() > MAX_SKILL_CONTENT_BYTES {
        return Err(CoreError::invalid(format!(
            "content too large: {} bytes (max {MAX_SKILL_CONTENT_BYTES})",
            content.len()
        )));
    }
    let cleaned = content.replace('\0', "");
    let mut out = String::with_capacity(cleaned.len());
    let mut blanks = 0u32;
    for line in cleaned.lines() {
        if line.trim().is_empty() {
            blanks += 1;
            if blanks <= 2 {
                out.push('\n');
            }
        } else {
            blanks = 0;
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(out)
}
