use crate::error::{Result, SwarmcdError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Worker count used when `concurrency` is absent or not positive.
pub const DEFAULT_CONCURRENCY: usize = 3;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// RepoConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

impl RepoConfig {
    /// Inline password, or the trimmed contents of `password_file`.
    pub fn password(&self) -> Result<Option<String>> {
        if let Some(p) = &self.password {
            return Ok(Some(p.clone()));
        }
        match &self.password_file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Ok(Some(raw.trim().to_string()))
            }
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// StackConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub compose_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_file: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sops_files: Vec<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_repos_path")]
    pub repos_path: PathBuf,
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<i64>,
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub repos: HashMap<String, RepoConfig>,
    #[serde(default)]
    pub stacks: HashMap<String, StackConfig>,
}

fn default_repos_path() -> PathBuf {
    PathBuf::from("repos")
}

fn default_update_interval() -> u64 {
    120
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repos_path: default_repos_path(),
            update_interval: default_update_interval(),
            concurrency: None,
            address: default_address(),
            repos: HashMap::new(),
            stacks: HashMap::new(),
        }
    }
}

impl Config {
    /// Load `config.yaml` (optional), `repos.yaml` and `stacks.yaml` from `dir`.
    ///
    /// The repo and stack maps always come from their own files, so keys
    /// removed from those files disappear on reload.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = paths::config_file(dir);
        let mut cfg: Config = if config_path.exists() {
            let data = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str::<Option<Config>>(&data)?.unwrap_or_default()
        } else {
            Config::default()
        };

        cfg.repos = read_map(&paths::repos_file(dir))?;
        cfg.stacks = read_map(&paths::stacks_file(dir))?;
        Ok(cfg)
    }

    /// Apply a raw `SWARMCD_CONCURRENCY` value. Unparseable values are
    /// recorded as `0` so [`Config::worker_count`] falls back with a warning.
    pub fn with_concurrency_override(mut self, raw: Option<&str>) -> Self {
        if let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) {
            self.concurrency = Some(raw.parse().unwrap_or(0));
        }
        self
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    /// Number of reconciliation workers for one cycle.
    pub fn worker_count(&self) -> usize {
        match self.concurrency.and_then(|n| usize::try_from(n).ok()) {
            Some(n) if n > 0 => n,
            _ => {
                tracing::warn!(
                    concurrency = ?self.concurrency,
                    default = DEFAULT_CONCURRENCY,
                    "invalid or missing concurrency, using default"
                );
                DEFAULT_CONCURRENCY
            }
        }
    }

    /// Checkout directory for a repo: `<repos_path>/<repo name>`.
    pub fn checkout_dir(&self, repo: &str) -> PathBuf {
        self.repos_path.join(repo)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.update_interval == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "update_interval must be at least 1 second".to_string(),
            });
        }

        if matches!(self.concurrency, Some(n) if n <= 0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "concurrency must be positive, {} workers will be used",
                    DEFAULT_CONCURRENCY
                ),
            });
        }

        for (name, repo) in &self.repos {
            if repo.url.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("repo '{}' has an empty url", name),
                });
            }
        }

        for (name, stack) in &self.stacks {
            if !self.repos.contains_key(&stack.repo) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "stack '{}' references unknown repo '{}'",
                        name, stack.repo
                    ),
                });
            }
            if stack.compose_file.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("stack '{}' has an empty compose_file", name),
                });
            }
            if stack.values_file.is_some() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "stack '{}' sets values_file, templating is not supported and the compose file is deployed as is",
                        name
                    ),
                });
            }
            if !stack.sops_files.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "stack '{}' lists sops_files, secret decryption is not supported",
                        name
                    ),
                });
            }
        }

        warnings
    }

    /// Fail with [`SwarmcdError::InvalidConfig`] when validation reports any
    /// error-level problem. Warning-level problems are logged.
    pub fn ensure_valid(&self) -> Result<()> {
        let mut errors = Vec::new();
        for w in self.validate() {
            match w.level {
                WarnLevel::Warning => tracing::warn!("{}", w.message),
                WarnLevel::Error => errors.push(w.message),
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            errors.sort();
            Err(SwarmcdError::InvalidConfig(errors.join("; ")))
        }
    }
}

fn read_map<T>(path: &Path) -> Result<HashMap<String, T>>
where
    T: serde::de::DeserializeOwned,
{
    if !path.exists() {
        return Err(SwarmcdError::ConfigNotFound(path.to_path_buf()));
    }
    let data = std::fs::read_to_string(path)?;
    let map: Option<HashMap<String, T>> = serde_yaml::from_str(&data)?;
    Ok(map.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// ConfigLoader
// ---------------------------------------------------------------------------

/// Source of configuration snapshots, consulted once per cycle boundary.
pub trait ConfigLoader: Send + Sync {
    fn load(&self) -> Result<Config>;
}

impl<F> ConfigLoader for F
where
    F: Fn() -> Result<Config> + Send + Sync,
{
    fn load(&self) -> Result<Config> {
        self()
    }
}

/// Loads configuration from a directory of YAML files, applying a raw
/// concurrency override on every load.
#[derive(Debug, Clone)]
pub struct DirConfigLoader {
    dir: PathBuf,
    concurrency: Option<String>,
}

impl DirConfigLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            concurrency: None,
        }
    }

    pub fn with_concurrency(mut self, raw: Option<String>) -> Self {
        self.concurrency = raw;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load without failing on error-level problems, for reporting.
    pub fn load_unchecked(&self) -> Result<Config> {
        tracing::debug!(path = %self.dir.display(), "loading configuration");
        Ok(Config::load(&self.dir)?.with_concurrency_override(self.concurrency.as_deref()))
    }
}

impl ConfigLoader for DirConfigLoader {
    fn load(&self) -> Result<Config> {
        let cfg = self.load_unchecked()?;
        cfg.ensure_valid()?;
        Ok(cfg)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
