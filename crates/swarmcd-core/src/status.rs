//! In-memory, last-known status of every configured stack.
//!
//! The map sits behind one `RwLock`. During a cycle each key is written by a
//! single worker, but different workers write different keys at the same
//! time, so the whole map is locked for every write. Writes are short field
//! copies; readers clone a snapshot.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ledger::StackMetadata;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackStatus {
    /// Message of the last failed reconciliation; empty after a deploy.
    pub error: String,
    pub revision: String,
    pub deployed_stack_revision: String,
    /// RFC 3339, empty when the stack was never deployed.
    pub deployed_at: String,
}

impl StackStatus {
    pub fn from_metadata(metadata: &StackMetadata) -> Self {
        if !metadata.is_deployed() {
            return Self::default();
        }
        Self {
            error: String::new(),
            revision: metadata.repo_revision.clone(),
            deployed_stack_revision: metadata.deployed_stack_revision.clone(),
            deployed_at: format_timestamp(metadata),
        }
    }

    /// Fold one reconciliation outcome into this status.
    ///
    /// A deploy replaces every field and clears the error, a no-op leaves
    /// everything untouched, a failure replaces only the error.
    pub fn apply(&mut self, outcome: &Result<Option<StackMetadata>>) {
        match outcome {
            Ok(Some(metadata)) => {
                self.error.clear();
                self.revision = metadata.repo_revision.clone();
                self.deployed_stack_revision = metadata.deployed_stack_revision.clone();
                self.deployed_at = format_timestamp(metadata);
            }
            Ok(None) => {}
            Err(e) => self.error = e.to_string(),
        }
    }
}

fn format_timestamp(metadata: &StackMetadata) -> String {
    metadata
        .deployed_at
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Shared handle to the status map. Clones refer to the same map.
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    inner: Arc<RwLock<HashMap<String, StackStatus>>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, StackStatus>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, StackStatus>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, stack: &str) -> Option<StackStatus> {
        self.read().get(stack).cloned()
    }

    /// Copy of the whole map. May observe a cycle in progress.
    pub fn snapshot(&self) -> HashMap<String, StackStatus> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn insert(&self, stack: impl Into<String>, status: StackStatus) {
        self.write().insert(stack.into(), status);
    }

    /// Mutate the entry for `stack`, creating a default entry if missing.
    pub fn update(&self, stack: &str, f: impl FnOnce(&mut StackStatus)) {
        let mut map = self.write();
        f(map.entry(stack.to_string()).or_default());
    }

    /// Replace the key set with `stacks`. Existing entries are kept, entries
    /// for stacks no longer listed are dropped, new ones come from `seed`.
    pub fn reseed<'a, I, F>(&self, stacks: I, mut seed: F)
    where
        I: IntoIterator<Item = &'a str>,
        F: FnMut(&str) -> StackStatus,
    {
        let mut map = self.write();
        let mut previous = std::mem::take(&mut *map);
        for name in stacks {
            let status = previous.remove(name).unwrap_or_else(|| seed(name));
            map.insert(name.to_string(), status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SwarmcdError;
    use chrono::{TimeZone, Utc};

    fn deployed() -> StackMetadata {
        StackMetadata::new(
            "rev-2",
            "stack-rev-2",
            "0123456789abcdef",
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        )
    }

    fn existing() -> StackStatus {
        StackStatus {
            error: "previous failure".into(),
            revision: "rev-1".into(),
            deployed_stack_revision: "stack-rev-1".into(),
            deployed_at: "2024-04-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn apply_changed_overwrites_and_clears_error() {
        let mut status = existing();
        status.apply(&Ok(Some(deployed())));
        assert_eq!(status.error, "");
        assert_eq!(status.revision, "rev-2");
        assert_eq!(status.deployed_stack_revision, "stack-rev-2");
        assert_eq!(status.deployed_at, "2024-05-01T12:30:00Z");
    }

    #[test]
    fn apply_unchanged_leaves_every_field() {
        let mut status = existing();
        status.apply(&Ok(None));
        assert_eq!(status, existing());
    }

    #[test]
    fn apply_error_only_touches_error() {
        let mut status = existing();
        status.apply(&Err(SwarmcdError::Reconcile("docker unreachable".into())));
        assert_eq!(status.error, "docker unreachable");
        assert_eq!(status.revision, "rev-1");
        assert_eq!(status.deployed_at, "2024-04-01T00:00:00Z");
    }

    #[test]
    fn never_deployed_metadata_gives_empty_status() {
        assert_eq!(
            StackStatus::from_metadata(&StackMetadata::default()),
            StackStatus::default()
        );
    }

    #[test]
    fn clones_share_the_same_map() {
        let registry = StatusRegistry::new();
        let reader = registry.clone();
        registry.insert("web", existing());
        assert_eq!(reader.get("web"), Some(existing()));
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn update_creates_missing_entries() {
        let registry = StatusRegistry::new();
        registry.update("api", |s| s.error = "boom".into());
        assert_eq!(registry.get("api").unwrap().error, "boom");
    }

    #[test]
    fn reseed_keeps_survivors_drops_removed_and_seeds_new() {
        let registry = StatusRegistry::new();
        registry.insert("web", existing());
        registry.insert("old", StackStatus::default());

        let mut seeded = Vec::new();
        registry.reseed(["web", "new"], |name| {
            seeded.push(name.to_string());
            StackStatus {
                revision: format!("seed-{name}"),
                ..StackStatus::default()
            }
        });

        assert_eq!(seeded, ["new"]);
        assert_eq!(registry.get("web"), Some(existing()));
        assert_eq!(registry.get("new").unwrap().revision, "seed-new");
        assert!(registry.get("old").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_writes_to_distinct_keys_are_all_kept() {
        let registry = StatusRegistry::new();
        std::thread::scope(|s| {
            for i in 0..16 {
                let registry = registry.clone();
                s.spawn(move || {
                    for j in 0..50 {
                        registry.update(&format!("stack-{i}"), |st| st.revision = format!("{j}"));
                    }
                });
            }
        });
        let snap = registry.snapshot();
        assert_eq!(snap.len(), 16);
        assert!(snap.values().all(|s| s.revision == "49"));
    }

    #[test]
    fn status_serializes_with_snake_case_fields() {
        let yaml = serde_yaml::to_string(&existing()).unwrap();
        assert!(yaml.contains("deployed_stack_revision: stack-rev-1"));
    }
}
