use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async lock per repo name.
///
/// Built in one piece from a configuration snapshot and never mutated; a
/// reload replaces the whole registry so locks of removed repos go away with
/// it.
#[derive(Debug, Default)]
pub struct RepoLockRegistry {
    locks: HashMap<String, Arc<Mutex<()>>>,
}

impl RepoLockRegistry {
    pub fn build<I, S>(repos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let locks = repos
            .into_iter()
            .map(|r| (r.into(), Arc::new(Mutex::new(()))))
            .collect();
        Self { locks }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn contains(&self, repo: &str) -> bool {
        self.locks.contains_key(repo)
    }

    /// Wait for exclusive access to `repo`. The guard releases on drop.
    /// `None` when the repo has no lock.
    pub async fn acquire(&self, repo: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = Arc::clone(self.locks.get(repo)?);
        Some(lock.lock_owned().await)
    }
}
