use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File and environment constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "config.yaml";
pub const REPOS_FILE: &str = "repos.yaml";
pub const STACKS_FILE: &str = "stacks.yaml";

pub const DEFAULT_DB_PATH: &str = "/data/revisions.db";
pub const DEFAULT_CONFIGS_DIR: &str = ".";

pub const DB_ENV: &str = "SWARMCD_DB";
pub const CONFIGS_ENV: &str = "CONFIGS_PATH";
pub const CONCURRENCY_ENV: &str = "SWARMCD_CONCURRENCY";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_file(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

pub fn repos_file(dir: &Path) -> PathBuf {
    dir.join(REPOS_FILE)
}

pub fn stacks_file(dir: &Path) -> PathBuf {
    dir.join(STACKS_FILE)
}
