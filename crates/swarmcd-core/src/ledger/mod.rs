//! Durable record of what was last deployed for each stack.
//!
//! # Table design
//!
//! A single `revisions` table keyed by stack name:
//! ```text
//! stack | repo_revision | deployed_stack_revision | hash | deployed_at
//! ```
//!
//! `hash` is the hex SHA-256 of the deployed content and is what decides
//! whether a stack needs redeploying. `deployed_at` is stored as RFC 3339
//! text. There is no history: each upsert replaces the whole row.

pub mod connector;
pub mod metadata;
pub mod reconnect;

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use sha2::{Digest, Sha256};

use crate::error::{Result, SwarmcdError};

pub use connector::{Connector, SqliteConnector};
pub use metadata::StackMetadata;
pub use reconnect::Reconnecting;

/// Length of the hash prefix shown to operators.
pub const SHORT_HASH_LEN: usize = 8;

const UNKNOWN_HASH: &str = "unknown";

pub const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS revisions (
        stack                   TEXT PRIMARY KEY,
        repo_revision           TEXT NOT NULL DEFAULT '',
        deployed_stack_revision TEXT NOT NULL DEFAULT '',
        hash                    TEXT NOT NULL DEFAULT '',
        deployed_at             TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );
";

const UPSERT_SQL: &str = "
    INSERT INTO revisions (stack, repo_revision, deployed_stack_revision, hash, deployed_at)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(stack) DO UPDATE SET
        repo_revision = excluded.repo_revision,
        deployed_stack_revision = excluded.deployed_stack_revision,
        hash = excluded.hash,
        deployed_at = excluded.deployed_at
";

const LOAD_SQL: &str = "
    SELECT repo_revision, deployed_stack_revision, hash, deployed_at
    FROM revisions WHERE stack = ?1
";

const LIST_SQL: &str = "
    SELECT stack, repo_revision, deployed_stack_revision, hash, deployed_at
    FROM revisions ORDER BY stack
";

// ---------------------------------------------------------------------------
// Fingerprints
// ---------------------------------------------------------------------------

/// Lowercase hex SHA-256 of `content`.
pub fn fingerprint(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Display prefix of a hash, or `"unknown"` for a hash too short to cut.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(UNKNOWN_HASH)
}

// ---------------------------------------------------------------------------
// RevisionLedger
// ---------------------------------------------------------------------------

/// Persistent store of per-stack [`StackMetadata`].
///
/// Safe to share between threads. Writes are serialized through a
/// process-wide mutex on top of SQLite's own locking; every operation first
/// checks the connection and reopens it if it was lost.
pub struct RevisionLedger<C = SqliteConnector> {
    conn: Reconnecting<C>,
    write_lock: Mutex<()>,
}

impl RevisionLedger<SqliteConnector> {
    /// Open or create the SQLite ledger at `location`.
    pub fn open(location: impl Into<String>) -> Result<Self> {
        Self::with_connector(SqliteConnector::new(location).with_schema(SCHEMA_SQL))
    }
}

impl<C: Connector> RevisionLedger<C> {
    /// Build a ledger over `connector` and open it.
    pub fn with_connector(connector: C) -> Result<Self> {
        let ledger = Self {
            conn: Reconnecting::new(connector),
            write_lock: Mutex::new(()),
        };
        ledger.initialize()?;
        Ok(ledger)
    }

    /// (Re)open the backing store. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<()> {
        self.conn.open()
    }

    /// Check the store is alive and reconnect if needed.
    pub fn ensure_alive(&self) -> Result<()> {
        self.conn.ensure_alive()
    }

    pub fn connector(&self) -> &C {
        self.conn.inner()
    }

    /// Insert or replace the record for `stack`. Last writer wins.
    pub fn upsert(&self, stack: &str, metadata: &StackMetadata) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let deployed_at = metadata
            .deployed_at
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        self.conn
            .execute(
                UPSERT_SQL,
                &[
                    &stack,
                    &metadata.repo_revision,
                    &metadata.deployed_stack_revision,
                    &metadata.hash,
                    &deployed_at,
                ],
            )
            .map_err(|e| context(e, &format!("failed to save revision for '{stack}'")))?;
        tracing::debug!(
            stack = %stack,
            revision = %metadata.repo_revision,
            hash = %metadata.short_hash(),
            "revision saved"
        );
        Ok(())
    }

    /// Stored record for `stack`, or the default record if none exists.
    pub fn load(&self, stack: &str) -> Result<StackMetadata> {
        let mut found = None;
        self.conn
            .query(LOAD_SQL, &[&stack], &mut |row| {
                found = Some(metadata_from_row(row, 0)?);
                Ok(())
            })
            .map_err(|e| context(e, &format!("failed to load revision for '{stack}'")))?;
        Ok(found.unwrap_or_default())
    }

    /// Whether `content` differs from what was last deployed for `stack`.
    pub fn needs_deploy(&self, stack: &str, content: &[u8]) -> Result<bool> {
        let last = self.load(stack)?;
        Ok(last.hash != fingerprint(content))
    }

    /// Every record, ordered by stack name.
    pub fn list_all(&self) -> Result<Vec<(String, StackMetadata)>> {
        let mut out: Vec<(String, StackMetadata)> = Vec::new();
        self.conn
            .query(LIST_SQL, &[], &mut |row| {
                out.push((row.get(0)?, metadata_from_row(row, 1)?));
                Ok(())
            })
            .map_err(|e| context(e, "failed to list revisions"))?;
        Ok(out)
    }
}

/// Read the four metadata columns starting at `first`.
fn metadata_from_row(row: &Row<'_>, first: usize) -> rusqlite::Result<StackMetadata> {
    let raw: String = row.get(first + 3)?;
    let deployed_at = DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(first + 3, Type::Text, Box::new(e)))?;
    Ok(StackMetadata {
        repo_revision: row.get(first)?,
        deployed_stack_revision: row.get(first + 1)?,
        hash: row.get(first + 2)?,
        deployed_at,
    })
}

fn context(err: SwarmcdError, what: &str) -> SwarmcdError {
    match err {
        SwarmcdError::Storage(msg) => SwarmcdError::Storage(format!("{what}: {msg}")),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as CDur;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, RevisionLedger) {
        let dir = TempDir::new().unwrap();
        let ledger = RevisionLedger::open(dir.path().join("revisions.db").to_string_lossy()).unwrap();
        (dir, ledger)
    }

    #[test]
    fn save_and_load_round_trips_every_field() {
        let (_dir, ledger) = open_tmp();
        let now = Utc::now();
        let mut meta = StackMetadata::from_content("abcdefgh", "12345678", b"test content");
        meta.deployed_at = now;

        ledger.upsert("test-stack", &meta).unwrap();
        let loaded = ledger.load("test-stack").unwrap();

        assert_eq!(loaded.repo_revision, "abcdefgh");
        assert_eq!(loaded.deployed_stack_revision, "12345678");
        assert_eq!(loaded.hash, fingerprint(b"test content"));
        let drift = (loaded.deployed_at - now).num_microseconds().unwrap().abs();
        assert!(drift <= 1, "deployed_at drifted by {drift}µs");
    }

    #[test]
    fn upsert_replaces_existing_record() {
        let (_dir, ledger) = open_tmp();
        let first = StackMetadata::new("r1", "s1", "h1", Utc::now() - CDur::minutes(5));
        let second = StackMetadata::new("r2", "s2", "h2", Utc::now());

        ledger.upsert("s1", &first).unwrap();
        ledger.upsert("s1", &second).unwrap();

        let all = ledger.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(ledger.load("s1").unwrap().hash, "h2");
        assert_eq!(ledger.load("s1").unwrap().repo_revision, "r2");
    }

    #[test]
    fn missing_stack_loads_default_record() {
        let (_dir, ledger) = open_tmp();
        let meta = ledger.load("never-seen").unwrap();
        assert_eq!(meta, StackMetadata::default());
        assert!(!meta.is_deployed());
    }

    #[test]
    fn concurrent_upserts_keep_one_record_per_stack() {
        let (_dir, ledger) = open_tmp();
        let ledger = Arc::new(ledger);
        const WORKERS: usize = 10;
        const WRITES: usize = 10;
        let now = Utc::now();

        std::thread::scope(|s| {
            for worker in 0..WORKERS {
                let ledger = Arc::clone(&ledger);
                s.spawn(move || {
                    for j in 0..WRITES {
                        let meta = StackMetadata::new(
                            format!("repoRev-{worker}-{j}"),
                            format!("stackRev-{worker}-{j}"),
                            format!("hash-{worker}-{j}"),
                            now,
                        );
                        ledger.upsert(&format!("stack-{worker}"), &meta).unwrap();
                    }
                });
            }
        });

        let all = ledger.list_all().unwrap();
        assert_eq!(all.len(), WORKERS);
        for (stack, meta) in all {
            let worker = stack.trim_start_matches("stack-");
            assert_eq!(meta.hash, format!("hash-{worker}-{}", WRITES - 1));
            assert_eq!(meta.repo_revision, format!("repoRev-{worker}-{}", WRITES - 1));
        }
    }

    #[test]
    fn operations_survive_a_dropped_connection() {
        let (_dir, ledger) = open_tmp();
        ledger
            .upsert("api", &StackMetadata::new("r1", "s1", "h1", Utc::now()))
            .unwrap();

        ledger.connector().close();
        assert!(!ledger.connector().is_open());

        let meta = ledger.load("api").unwrap();
        assert_eq!(meta.hash, "h1");
        assert!(ledger.connector().is_open());

        ledger.connector().close();
        ledger
            .upsert("api", &StackMetadata::new("r2", "s2", "h2", Utc::now()))
            .unwrap();
        assert_eq!(ledger.load("api").unwrap().hash, "h2");
    }

    #[test]
    fn initialize_is_idempotent() {
        let (_dir, ledger) = open_tmp();
        ledger
            .upsert("api", &StackMetadata::new("r1", "s1", "h1", Utc::now()))
            .unwrap();
        ledger.initialize().unwrap();
        ledger.initialize().unwrap();
        ledger.ensure_alive().unwrap();
        assert_eq!(ledger.load("api").unwrap().hash, "h1");
    }

    #[test]
    fn records_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let location = dir.path().join("revisions.db");
        {
            let ledger = RevisionLedger::open(location.to_string_lossy()).unwrap();
            ledger
                .upsert("web", &StackMetadata::new("r1", "s1", "h1", Utc::now()))
                .unwrap();
        }
        let reopened = RevisionLedger::open(location.to_string_lossy()).unwrap();
        assert_eq!(reopened.load("web").unwrap().hash, "h1");
    }

    #[test]
    fn needs_deploy_compares_fingerprints() {
        let (_dir, ledger) = open_tmp();
        let content = b"services:\n  web:\n    image: nginx:1.27\n";
        assert!(ledger.needs_deploy("web", content).unwrap());

        ledger
            .upsert("web", &StackMetadata::from_content("r1", "s1", content))
            .unwrap();
        assert!(!ledger.needs_deploy("web", content).unwrap());
        assert!(ledger
            .needs_deploy("web", b"services:\n  web:\n    image: nginx:1.28\n")
            .unwrap());
    }

    #[test]
    fn row_inserted_without_timestamp_gets_current_time() {
        let (_dir, ledger) = open_tmp();
        ledger
            .connector()
            .execute("INSERT INTO revisions (stack, hash) VALUES (?1, ?2)", &[&"raw", &"h"])
            .unwrap();
        let meta = ledger.load("raw").unwrap();
        assert!((Utc::now() - meta.deployed_at) < CDur::minutes(1));
    }

    #[test]
    fn fingerprint_is_deterministic_and_sensitive() {
        let a = fingerprint(b"version: '3.8'\n");
        assert_eq!(a, fingerprint(b"version: '3.8'\n"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, fingerprint(b"version: '3.9'\n"));
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn short_hash_uses_placeholder_for_short_input() {
        assert_eq!(short_hash("0123456789abcdef"), "01234567");
        assert_eq!(short_hash(""), "unknown");
        assert_eq!(short_hash("abc"), "unknown");
    }
}
