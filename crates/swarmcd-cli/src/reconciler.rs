//! Default reconciler: sync a git checkout and run `docker stack deploy`
//! when the stack's compose file changed since the last recorded deploy.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use swarmcd_core::error::{Result, SwarmcdError};
use swarmcd_core::ledger::{RevisionLedger, StackMetadata};
use swarmcd_core::reconciler::StackReconciler;
use swarmcd_core::stack::Stack;
use swarmcd_core::status::StackStatus;
use tokio::process::Command;

pub struct SwarmReconciler {
    ledger: Arc<RevisionLedger>,
}

impl SwarmReconciler {
    pub fn new(ledger: Arc<RevisionLedger>) -> Self {
        Self { ledger }
    }

    /// Run a blocking ledger operation off the async workers.
    async fn with_ledger<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RevisionLedger) -> Result<T> + Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        tokio::task::spawn_blocking(move || f(&ledger))
            .await
            .map_err(|e| SwarmcdError::Reconcile(format!("ledger task failed: {e}")))?
    }
}

#[async_trait]
impl StackReconciler for SwarmReconciler {
    async fn reconcile(
        &self,
        stack: &Stack,
        _status: &StackStatus,
    ) -> Result<Option<StackMetadata>> {
        let git = locate("git")?;
        let docker = locate("docker")?;

        sync_checkout(&git, stack).await?;
        let repo_revision = exec(&git, &revision_args(), Some(&stack.checkout_dir), stack).await?;
        let stack_revision = exec(
            &git,
            &stack_revision_args(&stack.compose_file),
            Some(&stack.checkout_dir),
            stack,
        )
        .await?;

        let content = tokio::fs::read(stack.compose_path()).await?;
        let name = stack.name.clone();
        let (content, changed) = self
            .with_ledger(move |ledger| {
                let changed = ledger.needs_deploy(&name, &content)?;
                Ok((content, changed))
            })
            .await?;
        if !changed {
            return Ok(None);
        }

        tracing::info!(stack = %stack.name, revision = %repo_revision, "deploying stack");
        exec(&docker, &deploy_args(stack), None, stack).await?;

        let metadata = StackMetadata::from_content(repo_revision, stack_revision, &content);
        let name = stack.name.clone();
        let record = metadata.clone();
        self.with_ledger(move |ledger| ledger.upsert(&name, &record))
            .await?;
        Ok(Some(metadata))
    }
}

fn locate(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|_| SwarmcdError::ToolNotFound(program.to_string()))
}

async fn sync_checkout(git: &Path, stack: &Stack) -> Result<()> {
    if stack.checkout_dir.join(".git").is_dir() {
        tracing::debug!(stack = %stack.name, repo = %stack.repo, "updating checkout");
        exec(git, &fetch_args(stack), Some(&stack.checkout_dir), stack).await?;
        exec(git, &reset_args(&stack.branch), Some(&stack.checkout_dir), stack).await?;
    } else {
        tracing::debug!(stack = %stack.name, repo = %stack.repo, "cloning repo");
        if let Some(parent) = stack.checkout_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        exec(git, &clone_args(stack), None, stack).await?;
    }
    Ok(())
}

/// Run `program` and return its trimmed stdout. Credentials embedded in the
/// remote URL are masked in the error.
async fn exec(program: &Path, args: &[String], cwd: Option<&Path>, stack: &Stack) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SwarmcdError::CommandFailed {
            program: program
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| program.display().to_string()),
            status: output.status.to_string(),
            stderr: mask(stderr.trim(), stack),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn mask(text: &str, stack: &Stack) -> String {
    let fetch_url = stack.remote.fetch_url();
    if fetch_url == stack.remote.url {
        text.to_string()
    } else {
        text.replace(&fetch_url, &stack.remote.url)
    }
}

// ---------------------------------------------------------------------------
// Argument builders
// ---------------------------------------------------------------------------

fn clone_args(stack: &Stack) -> Vec<String> {
    vec![
        "clone".into(),
        "--branch".into(),
        stack.branch.clone(),
        stack.remote.fetch_url(),
        stack.checkout_dir.display().to_string(),
    ]
}

fn fetch_args(stack: &Stack) -> Vec<String> {
    vec![
        "fetch".into(),
        stack.remote.fetch_url(),
        format!("+refs/heads/{0}:refs/remotes/origin/{0}", stack.branch),
    ]
}

fn reset_args(branch: &str) -> Vec<String> {
    vec!["reset".into(), "--hard".into(), format!("origin/{branch}")]
}

fn revision_args() -> Vec<String> {
    vec!["rev-parse".into(), "--short".into(), "HEAD".into()]
}

fn stack_revision_args(compose_file: &Path) -> Vec<String> {
    vec![
        "log".into(),
        "-1".into(),
        "--format=%h".into(),
        "--".into(),
        compose_file.display().to_string(),
    ]
}

fn deploy_args(stack: &Stack) -> Vec<String> {
    vec![
        "stack".into(),
        "deploy".into(),
        "--with-registry-auth".into(),
        "-c".into(),
        stack.compose_path().display().to_string(),
        stack.name.clone(),
    ]
}
