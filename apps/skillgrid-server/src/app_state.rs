use skillgrid_events::Bus;
use skillgrid_kernel::Kernel;

#[derive(Clone)]
pub(crate) struct AppState {
    bus: Bus,
    kernel: Kernel,
}

impl AppState {
    pub fn new(bus: Bus, kernel: Kernel) -> Self {
        Self { bus, kernel }
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use skillgrid_core::Identity;

    /// Fresh state on a temp dir with one bootstrap admin and one worker
    /// registered. The temp dir guard must outlive the state.
    pub fn test_state() -> (AppState, tempfile::TempDir, Identity, Identity) {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let kernel = Kernel::open(dir.path()).expect("kernel open");
        let admin = crate::identity::fingerprint("admin-token");
        kernel.ensure_admin(&admin);
        let worker = crate::identity::fingerprint("worker-token");
        kernel.add_worker(&admin, &worker).expect("add worker");
        let state = AppState::new(Bus::new(16), kernel);
        (state, dir, admin, worker)
    }

    pub fn bearer(token: &str) -> axum::http::HeaderMap {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }
}
