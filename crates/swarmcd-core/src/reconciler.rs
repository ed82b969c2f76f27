use async_trait::async_trait;

use crate::error::Result;
use crate::ledger::StackMetadata;
use crate::stack::Stack;
use crate::status::StackStatus;

/// Brings one stack in line with its source.
///
/// Outcomes:
/// - `Ok(Some(metadata))`: something changed and was deployed;
/// - `Ok(None)`: already up to date;
/// - `Err(e)`: reconciliation failed.
///
/// Called while the stack's repo lock is held, so implementations may assume
/// exclusive use of the repo checkout.
#[async_trait]
pub trait StackReconciler: Send + Sync {
    async fn reconcile(&self, stack: &Stack, status: &StackStatus)
        -> Result<Option<StackMetadata>>;
}
