use crate::error::{NebulaError, Result};
use std::path::{Path, PathBuf};
use terraform_driver::VAR_FILE;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const CACHE_DIR: &str = ".nebula";
pub const TEMPLATES_DIR: &str = "templates";

/// Marks a working directory whose elastic IP must survive teardown.
pub const ELASTIC_IP_SENTINEL: &str = ".eip";

const ELASTIC_IP_TEMPLATE_SUFFIX: &str = "-eip";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `~/.nebula`
pub fn default_cache_path() -> Result<PathBuf> {
    home::home_dir()
        .map(|h| h.join(CACHE_DIR))
        .ok_or(NebulaError::HomeNotFound)
}

pub fn default_templates_path(cache: &Path) -> PathBuf {
    cache.join(TEMPLATES_DIR)
}

/// Working directory for one constellation.
pub fn target_path(cache: &Path, name: &str) -> PathBuf {
    cache.join(name)
}

pub fn var_file(target: &Path) -> PathBuf {
    target.join(VAR_FILE)
}

pub fn sentinel(target: &Path) -> PathBuf {
    target.join(ELASTIC_IP_SENTINEL)
}

pub fn provider_template(templates: &Path, provider: &str) -> PathBuf {
    templates.join(provider)
}

pub fn elastic_ip_template(templates: &Path, provider: &str) -> PathBuf {
    templates.join(format!("{provider}{ELASTIC_IP_TEMPLATE_SUFFIX}"))
}

pub fn log_dump(target: &Path, stamp: &str) -> PathBuf {
    target.join(format!("nebula-{stamp}.log"))
}
