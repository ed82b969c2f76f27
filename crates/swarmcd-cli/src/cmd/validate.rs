use anyhow::{bail, Result};
use std::path::Path;
use swarmcd_core::config::{DirConfigLoader, WarnLevel};

pub fn run(configs: &Path, concurrency: Option<String>, json: bool) -> Result<()> {
    tracing::info!(dir = %configs.display(), "validating configuration");
    let config = DirConfigLoader::new(configs)
        .with_concurrency(concurrency)
        .load_unchecked()?;
    let warnings = config.validate();
    let errors = warnings
        .iter()
        .filter(|w| w.level == WarnLevel::Error)
        .count();

    if json {
        let report = serde_json::json!({
            "repos": config.repos.len(),
            "stacks": config.stacks.len(),
            "warnings": warnings,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for w in &warnings {
            let tag = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("{tag}: {}", w.message);
        }
        if errors == 0 {
            println!(
                "configuration ok: {} repos, {} stacks, update every {}s",
                config.repos.len(),
                config.stacks.len(),
                config.update_interval
            );
        }
    }

    if errors > 0 {
        bail!("configuration has {errors} error(s)");
    }
    Ok(())
}
