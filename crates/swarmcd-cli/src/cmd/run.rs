use crate::reconciler::SwarmReconciler;
use anyhow::{Context as _, Result};
use std::path::Path;
use std::sync::Arc;
use swarmcd_core::config::{ConfigLoader, DirConfigLoader};
use swarmcd_core::context::Context;
use swarmcd_core::ledger::RevisionLedger;
use swarmcd_core::scheduler::Scheduler;

pub fn run(
    configs: &Path,
    db: &str,
    concurrency: Option<String>,
    address: Option<String>,
) -> Result<()> {
    let loader = DirConfigLoader::new(configs).with_concurrency(concurrency);
    let config = loader
        .load()
        .with_context(|| format!("loading configuration from {}", configs.display()))?;

    let ledger = Arc::new(RevisionLedger::open(db)?);
    tracing::info!(location = %db, "revision ledger ready");

    let ctx = Context::new(config, Arc::clone(&ledger))?;
    let status = ctx.status().clone();
    let address = address.unwrap_or_else(|| ctx.config().address.clone());

    let reconciler = Arc::new(SwarmReconciler::new(Arc::clone(&ledger)));
    let mut scheduler = Scheduler::new(ctx, loader, reconciler);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        tokio::select! {
            _ = scheduler.run() => Ok(()),
            served = swarmcd_server::serve(&address, status, ledger) => {
                served.with_context(|| format!("status server on {address}"))
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("interrupted, shutting down");
                Ok(())
            }
        }
    })
}
