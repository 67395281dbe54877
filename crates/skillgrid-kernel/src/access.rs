//! Admin allow-list, worker allow-list, and the analysis kill-switch.

use skillgrid_core::{Identity, Result};
use tracing::info;

use crate::Kernel;

impl Kernel {
    /// Bootstrap hook: make `identity` an admin unconditionally. Called
    /// once at startup for the identity derived from the deploy-time admin
    /// token, never from the RPC surface.
    pub fn ensure_admin(&self, identity: &Identity) {
        let mut state = self.state();
        if state.access.admins.insert(identity.clone()) {
            info!(identity = %identity, "bootstrap admin registered");
        }
    }

    pub fn add_admin(&self, caller: &Identity, identity: &Identity) -> Result<()> {
        let mut state = self.state();
        state.require_admin(caller)?;
        state.access.admins.insert(identity.clone());
        Ok(())
    }

    pub fn add_worker(&self, caller: &Identity, identity: &Identity) -> Result<()> {
        let mut state = self.state();
        state.require_admin(caller)?;
        state.access.workers.insert(identity.clone());
        Ok(())
    }

    pub fn remove_worker(&self, caller: &Identity, identity: &Identity) -> Result<()> {
        let mut state = self.state();
        state.require_admin(caller)?;
        state.access.workers.remove(identity);
        Ok(())
    }

    pub fn get_workers(&self, caller: &Identity) -> Result<Vec<Identity>> {
        let state = self.state();
        state.require_admin(caller)?;
        Ok(state.access.workers.iter().cloned().collect())
    }

    /// Kill-switch consulted by `request_analysis`. In-flight jobs are not
    /// affected.
    pub fn set_analysis_enabled(&self, caller: &Identity, enabled: bool) -> Result<()> {
        let mut state = self.state();
        state.require_admin(caller)?;
        state.access.analysis_enabled = enabled;
        info!(enabled, "analysis submissions toggled");
        Ok(())
    }

    pub fn analysis_enabled(&self) -> bool {
        self.state().access.analysis_enabled
    }

    /// Advisory worker-pool URL clients use to fetch the enclave's public
    /// encryption key. Never dereferenced by the core.
    pub fn set_tee_worker_url(&self, caller: &Identity, url: String) -> Result<()> {
        let mut state = self.state();
        state.require_admin(caller)?;
        state.access.tee_worker_url = Some(url);
        Ok(())
    }

    pub fn get_tee_worker_url(&self) -> Option<String> {
        self.state().access.tee_worker_url.clone()
    }
}
