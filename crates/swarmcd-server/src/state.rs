use std::sync::Arc;

use swarmcd_core::ledger::RevisionLedger;
use swarmcd_core::status::StatusRegistry;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub status: StatusRegistry,
    pub ledger: Arc<RevisionLedger>,
}

impl AppState {
    pub fn new(status: StatusRegistry, ledger: Arc<RevisionLedger>) -> Self {
        Self { status, ledger }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmcd_core::status::StackStatus;
    use tempfile::TempDir;

    #[test]
    fn state_shares_the_registry() {
        let dir = TempDir::new().unwrap();
        let ledger = RevisionLedger::open(dir.path().join("r.db").to_string_lossy()).unwrap();
        let registry = StatusRegistry::new();
        let state = AppState::new(registry.clone(), Arc::new(ledger));
        registry.insert("web", StackStatus::default());
        assert_eq!(state.status.len(), 1);
    }
}
