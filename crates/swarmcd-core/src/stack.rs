use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, SwarmcdError};

/// Git remote for a repo, with optional HTTP credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Remote {
    pub url: String,
    pub username: Option<String>,
    password: Option<String>,
}

impl Remote {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    /// URL handed to git. Credentials are embedded only for http(s) remotes
    /// when both a username and a password are configured.
    pub fn fetch_url(&self) -> String {
        let (Some(user), Some(pass)) = (&self.username, &self.password) else {
            return self.url.clone();
        };
        for scheme in ["https://", "http://"] {
            if let Some(rest) = self.url.strip_prefix(scheme) {
                return format!("{scheme}{user}:{pass}@{rest}");
            }
        }
        self.url.clone()
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remote")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// One configured stack, resolved against its repo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    pub name: String,
    /// Repo name; also the key of the stack's repo lock.
    pub repo: String,
    pub remote: Remote,
    pub branch: String,
    /// Compose file path relative to the checkout.
    pub compose_file: PathBuf,
    pub checkout_dir: PathBuf,
}

impl Stack {
    pub fn compose_path(&self) -> PathBuf {
        self.checkout_dir.join(&self.compose_file)
    }

    /// Resolve every configured stack, sorted by name.
    pub fn resolve_all(config: &Config) -> Result<Vec<Arc<Stack>>> {
        let mut stacks = Vec::with_capacity(config.stacks.len());
        for (name, sc) in &config.stacks {
            let repo = config
                .repos
                .get(&sc.repo)
                .ok_or_else(|| SwarmcdError::UnknownRepo {
                    stack: name.clone(),
                    repo: sc.repo.clone(),
                })?;
            let remote =
                Remote::new(repo.url.clone()).with_credentials(repo.username.clone(), repo.password()?);
            stacks.push(Arc::new(Stack {
                name: name.clone(),
                repo: sc.repo.clone(),
                remote,
                branch: sc.branch.clone(),
                compose_file: PathBuf::from(&sc.compose_file),
                checkout_dir: config.checkout_dir(&sc.repo),
            }));
        }
        stacks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stacks)
    }
}
