use anyhow::Context;
use nebula_core::config::DeploymentFile;
use nebula_core::constellation::OrchestratorSettings;
use nebula_core::paths;
use std::path::{Path, PathBuf};

const DEFAULT_TOOL: &str = "terraform";

/// Flags shared by every provisioning command.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub cache: Option<PathBuf>,
    pub tool: Option<PathBuf>,
    pub templates: Option<PathBuf>,
}

/// Resolve orchestrator settings.
///
/// Priority for each setting: explicit flag / env var, then the deployment
/// file, then the built-in default (`~/.nebula`, `<cache>/templates`,
/// `terraform` on PATH).
pub fn resolve(global: &GlobalArgs, file: Option<&DeploymentFile>) -> anyhow::Result<OrchestratorSettings> {
    let tool = resolve_tool(global.tool.as_deref())?;

    let cache = match global
        .cache
        .clone()
        .or_else(|| file.and_then(|f| f.cache_path.clone()))
    {
        Some(p) => p,
        None => paths::default_cache_path()?,
    };

    let templates = global
        .templates
        .clone()
        .or_else(|| file.and_then(|f| f.templates_path.clone()))
        .unwrap_or_else(|| paths::default_templates_path(&cache));

    tracing::debug!(
        tool = %tool,
        cache = %cache.display(),
        templates = %templates.display(),
        "resolved settings"
    );
    Ok(OrchestratorSettings::new(tool, cache, templates))
}

fn resolve_tool(explicit: Option<&Path>) -> anyhow::Result<String> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => which::which(DEFAULT_TOOL)
            .with_context(|| format!("'{DEFAULT_TOOL}' not found on PATH; pass --tool"))?,
    };
    Ok(path.to_string_lossy().into_owned())
}

pub fn load_file(path: &Path) -> anyhow::Result<DeploymentFile> {
    let file = DeploymentFile::load(path)
        .with_context(|| format!("failed to read deployment file {}", path.display()))?;
    file.validate()
        .with_context(|| format!("invalid deployment file {}", path.display()))?;
    Ok(file)
}
