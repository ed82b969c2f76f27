//! The reconciliation loop.
//!
//! Each cycle spawns `concurrency` workers that drain a bounded queue holding
//! every configured stack, waits for all of them, sleeps for the update
//! interval and reloads the configuration:
//!
//! ```text
//! run_cycle ──► queue ──► worker × N ──► repo lock ──► reconciler ──► status
//!     │
//!     └── join ──► sleep ──► reload ──► run_cycle …
//! ```
//!
//! A worker holds a stack's repo lock only around the reconciler call, so
//! stacks sharing a repo are serialized while other repos run in parallel.
//! There is no timeout: a reconciler that never returns keeps its repo
//! locked and its worker busy until the process stops.

use std::sync::Arc;

use async_channel::Receiver;
use tokio::task::JoinSet;

use crate::config::ConfigLoader;
use crate::context::Context;
use crate::error::{Result, SwarmcdError};
use crate::ledger::StackMetadata;
use crate::reconciler::StackReconciler;
use crate::repo_lock::RepoLockRegistry;
use crate::stack::Stack;
use crate::status::StatusRegistry;

/// Counts from one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub workers: usize,
    pub dispatched: usize,
    pub processed: usize,
    pub deployed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &Result<Option<StackMetadata>>) {
        self.processed += 1;
        match outcome {
            Ok(Some(_)) => self.deployed += 1,
            Ok(None) => self.unchanged += 1,
            Err(_) => self.failed += 1,
        }
    }

    fn merge(&mut self, other: CycleReport) {
        self.processed += other.processed;
        self.deployed += other.deployed;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }
}

pub struct Scheduler<L> {
    ctx: Context,
    loader: L,
    reconciler: Arc<dyn StackReconciler>,
}

impl<L: ConfigLoader> Scheduler<L> {
    pub fn new(ctx: Context, loader: L, reconciler: Arc<dyn StackReconciler>) -> Self {
        Self {
            ctx,
            loader,
            reconciler,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run cycles forever.
    ///
    /// Reloading reads YAML files and the ledger synchronously, so it runs
    /// through `block_in_place`; this needs the multi-threaded runtime.
    pub async fn run(&mut self) {
        tracing::info!("starting reconciliation loop");
        loop {
            let report = self.run_cycle().await;
            tracing::info!(
                processed = report.processed,
                deployed = report.deployed,
                failed = report.failed,
                "cycle complete"
            );

            let interval = self.ctx.config().update_interval();
            tracing::info!(seconds = interval.as_secs(), "waiting for the update interval");
            tokio::time::sleep(interval).await;

            tracing::info!("checking for new repos and stacks");
            tokio::task::block_in_place(|| self.reload());
        }
    }

    /// Reconcile every configured stack once and wait for all of them.
    pub async fn run_cycle(&self) -> CycleReport {
        let stacks = self.ctx.stacks().to_vec();
        let workers = self.ctx.config().worker_count();
        tracing::debug!(workers, stacks = stacks.len(), "starting cycle");

        // async-channel rejects a zero capacity
        let (tx, rx) = async_channel::bounded::<Arc<Stack>>(stacks.len().max(1));

        let mut pool = JoinSet::new();
        for id in 0..workers {
            pool.spawn(worker(
                id,
                rx.clone(),
                Arc::clone(self.ctx.locks()),
                self.ctx.status().clone(),
                Arc::clone(&self.reconciler),
            ));
        }
        drop(rx);

        let mut report = CycleReport {
            workers,
            ..CycleReport::default()
        };
        for stack in stacks {
            tracing::debug!(stack = %stack.name, "queueing stack");
            if tx.send(stack).await.is_err() {
                tracing::error!("all workers exited before the queue was drained");
                break;
            }
            report.dispatched += 1;
        }
        drop(tx);

        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(tally) => report.merge(tally),
                Err(e) => tracing::error!(error = %e, "reconciliation worker crashed"),
            }
        }
        report
    }

    /// Load a new configuration snapshot and apply it. On failure the
    /// current snapshot stays in effect. Returns whether a new one was applied.
    pub fn reload(&mut self) -> bool {
        match self.loader.load().and_then(|cfg| self.ctx.apply(cfg)) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "could not reload configuration, keeping previous");
                false
            }
        }
    }
}

async fn worker(
    id: usize,
    queue: Receiver<Arc<Stack>>,
    locks: Arc<RepoLockRegistry>,
    status: StatusRegistry,
    reconciler: Arc<dyn StackReconciler>,
) -> CycleReport {
    let mut tally = CycleReport::default();
    while let Ok(stack) = queue.recv().await {
        let outcome = process(&stack, &locks, &status, reconciler.as_ref()).await;
        tally.record(&outcome);
    }
    tracing::trace!(worker = id, processed = tally.processed, "worker done");
    tally
}

async fn process(
    stack: &Stack,
    locks: &RepoLockRegistry,
    status: &StatusRegistry,
    reconciler: &dyn StackReconciler,
) -> Result<Option<StackMetadata>> {
    let current = status.get(&stack.name).unwrap_or_default();

    let outcome = match locks.acquire(&stack.repo).await {
        Some(_guard) => {
            tracing::debug!(stack = %stack.name, "checking if stack needs to be updated");
            reconciler.reconcile(stack, &current).await
        }
        None => Err(SwarmcdError::UnknownRepo {
            stack: stack.name.clone(),
            repo: stack.repo.clone(),
        }),
    };

    match &outcome {
        Ok(Some(metadata)) => tracing::info!(
            stack = %stack.name,
            revision = %metadata.repo_revision,
            hash = %metadata.short_hash(),
            "stack deployed"
        ),
        Ok(None) => tracing::debug!(stack = %stack.name, "stack up to date"),
        Err(e) => tracing::error!(stack = %stack.name, error = %e, "stack reconciliation failed"),
    }

    status.update(&stack.name, |s| s.apply(&outcome));
    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
