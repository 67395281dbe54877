//! Caller identity and the role model. An identity is an opaque stable
//! string minted by the host runtime (the server fingerprints bearer
//! tokens into these). Roles are resolved against the kernel's access
//! state on every mutating call.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Opaque authenticated caller identifier.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Anonymous,
    User,
    Worker,
    Admin,
}

/// Allow-lists and switches gating the mutating surface. Lives inside the
/// kernel state so it serializes and migrates with everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessState {
    pub admins: BTreeSet<Identity>,
    pub workers: BTreeSet<Identity>,
    pub analysis_enabled: bool,
    pub tee_worker_url: Option<String>,
}

impl Default for AccessState {
    fn default() -> Self {
        Self {
            admins: BTreeSet::new(),
            workers: BTreeSet::new(),
            analysis_enabled: true,
            tee_worker_url: None,
        }
    }
}

impl AccessState {
    pub fn role_of(&self, identity: &Identity) -> Role {
        if self.admins.contains(identity) {
            Role::Admin
        } else if self.workers.contains(identity) {
            Role::Worker
        } else {
            Role::User
        }
    }

    pub fn is_admin(&self, identity: &Identity) -> bool {
        self.admins.contains(identity)
    }

    /// Admin satisfies every worker gate.
    pub fn is_worker(&self, identity: &Identity) -> bool {
        self.workers.contains(identity) || self.admins.contains(identity)
    }
}
