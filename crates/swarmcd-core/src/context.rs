use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::ledger::RevisionLedger;
use crate::repo_lock::RepoLockRegistry;
use crate::stack::Stack;
use crate::status::{StackStatus, StatusRegistry};

/// Everything one reconciliation cycle reads: the configuration snapshot and
/// what is derived from it, plus the shared ledger and status registry.
///
/// Only [`Context::apply`] changes it, and the scheduler calls that between
/// cycles when no worker is running.
pub struct Context {
    config: Arc<Config>,
    stacks: Vec<Arc<Stack>>,
    locks: Arc<RepoLockRegistry>,
    status: StatusRegistry,
    ledger: Arc<RevisionLedger>,
}

impl Context {
    pub fn new(config: Config, ledger: Arc<RevisionLedger>) -> Result<Self> {
        let mut ctx = Self {
            config: Arc::new(Config::default()),
            stacks: Vec::new(),
            locks: Arc::new(RepoLockRegistry::default()),
            status: StatusRegistry::new(),
            ledger,
        };
        ctx.apply(config)?;
        Ok(ctx)
    }

    /// Install a new configuration snapshot.
    ///
    /// Stacks are resolved first; if that fails nothing changes. Otherwise
    /// the lock registry is rebuilt from scratch and the status registry is
    /// reseeded, with newly added stacks seeded from the ledger.
    pub fn apply(&mut self, config: Config) -> Result<()> {
        let stacks = Stack::resolve_all(&config)?;
        let locks = RepoLockRegistry::build(config.repos.keys().cloned());

        let ledger = &self.ledger;
        self.status.reseed(stacks.iter().map(|s| s.name.as_str()), |name| {
            match ledger.load(name) {
                Ok(metadata) => StackStatus::from_metadata(&metadata),
                Err(e) => {
                    tracing::warn!(stack = %name, error = %e, "could not seed status from ledger");
                    StackStatus::default()
                }
            }
        });

        tracing::info!(
            stacks = stacks.len(),
            repos = locks.len(),
            "configuration applied"
        );
        self.config = Arc::new(config);
        self.stacks = stacks;
        self.locks = Arc::new(locks);
        Ok(())
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn stacks(&self) -> &[Arc<Stack>] {
        &self.stacks
    }

    pub fn locks(&self) -> &Arc<RepoLockRegistry> {
        &self.locks
    }

    pub fn status(&self) -> &StatusRegistry {
        &self.status
    }

    pub fn ledger(&self) -> &Arc<RevisionLedger> {
        &self.ledger
    }
}
