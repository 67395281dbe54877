use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Identity;

/// Per-identity record, created lazily on first write. The credential blob
/// is ciphertext produced client-side against the worker pool's published
/// key; the core stores and forwards it verbatim and can never decrypt it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub identity: Identity,
    #[serde(default)]
    pub encrypted_credential: Option<String>,
    #[serde(default)]
    pub analyses_performed: u64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(identity: Identity, now: DateTime<Utc>) -> Self {
        Self {
            identity,
            encrypted_credential: None,
            analyses_performed: 0,
            created_at: now,
            last_active: now,
        }
    }
}
