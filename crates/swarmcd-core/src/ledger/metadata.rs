use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{fingerprint, short_hash};

/// Last deployment recorded for one stack.
///
/// `Default` is the never-deployed record: empty strings and the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StackMetadata {
    pub repo_revision: String,
    /// Revision of the stack's own files; may lag `repo_revision` when the
    /// repo changed elsewhere.
    pub deployed_stack_revision: String,
    /// Hex SHA-256 of the content that was deployed.
    pub hash: String,
    pub deployed_at: DateTime<Utc>,
}

impl StackMetadata {
    pub fn new(
        repo_revision: impl Into<String>,
        deployed_stack_revision: impl Into<String>,
        hash: impl Into<String>,
        deployed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            repo_revision: repo_revision.into(),
            deployed_stack_revision: deployed_stack_revision.into(),
            hash: hash.into(),
            deployed_at,
        }
    }

    /// Metadata for content deployed now.
    pub fn from_content(
        repo_revision: impl Into<String>,
        deployed_stack_revision: impl Into<String>,
        content: &[u8],
    ) -> Self {
        Self::new(
            repo_revision,
            deployed_stack_revision,
            fingerprint(content),
            Utc::now(),
        )
    }

    pub fn is_deployed(&self) -> bool {
        !self.hash.is_empty()
    }

    pub fn short_hash(&self) -> &str {
        short_hash(&self.hash)
    }
}
