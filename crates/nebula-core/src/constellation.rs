//! Constellation lifecycle.
//!
//! `create` runs, strictly in order:
//!
//! ```text
//! resolve path → ensure folder → write terraform.tfvars → copy templates
//!     → init → [import static IP] → [plan] → apply → Ok { outputs }
//! ```
//!
//! `destroy` runs `[state rm static IP] → destroy`. Any failing step ends the
//! run with [`ConstellationResult::Failed`]; nothing is rolled back, and the
//! working directory is left in place for inspection or a manual re-run.
//!
//! Callers must not run two lifecycles against the same constellation name
//! at once: terraform's local state in the working directory is not safe for
//! concurrent use.

use crate::config::{validate_name, ConstellationSpec};
use crate::error::{NebulaError, Result};
use crate::run_log::RunLog;
use crate::vars::{self, TlsMaterial};
use crate::{io, paths};
use std::path::{Path, PathBuf};
use std::time::Duration;
use terraform_driver::{
    OutputScanner, OutputSet, ProcessInvocation, ProcessOutcome, ProcessRunner, ToolRunner,
};

/// Terraform address of the elastic IP declared by the `-eip` template.
pub const ELASTIC_IP_RESOURCE: &str = "aws_eip.eip_manager";
/// Output carrying the manager node's public address.
pub const MANAGER_IP_OUTPUT: &str = "manager_ip";
/// Pause after creating a working directory before writing into it.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// ConstellationResult
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConstellationResult {
    Ok {
        path: PathBuf,
        outputs: OutputSet,
        name: String,
    },
    Failed {
        path: PathBuf,
        message: String,
        cause: NebulaError,
    },
}

impl ConstellationResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConstellationResult::Ok { .. })
    }

    pub fn path(&self) -> &Path {
        match self {
            ConstellationResult::Ok { path, .. } | ConstellationResult::Failed { path, .. } => {
                path
            }
        }
    }

    pub fn outputs(&self) -> Option<&OutputSet> {
        match self {
            ConstellationResult::Ok { outputs, .. } => Some(outputs),
            ConstellationResult::Failed { .. } => None,
        }
    }

    fn failed(path: PathBuf, message: String, cause: NebulaError) -> Self {
        tracing::error!(path = %path.display(), error = %cause, "{message}");
        ConstellationResult::Failed {
            path,
            message,
            cause,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Terraform binary, either a bare name on PATH or an absolute path.
    pub tool: String,
    /// Parent of every constellation working directory.
    pub cache_path: PathBuf,
    /// Holds `<provider>/` and `<provider>-eip/` template trees.
    pub templates_path: PathBuf,
    pub settle_delay: Duration,
    /// Run `plan` before every `apply`.
    pub plan_before_apply: bool,
}

impl OrchestratorSettings {
    pub fn new(tool: impl Into<String>, cache_path: PathBuf, templates_path: PathBuf) -> Self {
        Self {
            tool: tool.into(),
            cache_path,
            templates_path,
            settle_delay: SETTLE_DELAY,
            plan_before_apply: false,
        }
    }
}

#[derive(Debug)]
pub struct Orchestrator<R = ProcessRunner> {
    runner: R,
    settings: OrchestratorSettings,
}

impl<R: ToolRunner> Orchestrator<R> {
    pub fn new(runner: R, settings: OrchestratorSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn target_path(&self, name: &str) -> PathBuf {
        paths::target_path(&self.settings.cache_path, name)
    }

    /// Provision a new constellation.
    pub async fn create(&self, spec: &ConstellationSpec, log: &mut RunLog) -> ConstellationResult {
        let path = self.target_path(&spec.name);
        match self.try_create(spec, &path, log).await {
            Ok(outputs) => {
                tracing::info!(name = %spec.name, path = %path.display(), "constellation created");
                ConstellationResult::Ok {
                    path,
                    outputs,
                    name: spec.name.clone(),
                }
            }
            Err(cause) => ConstellationResult::failed(
                path,
                format!("could not create constellation '{}'", spec.name),
                cause,
            ),
        }
    }

    /// Re-apply configuration to an existing constellation.
    pub async fn update(&self, spec: &ConstellationSpec, log: &mut RunLog) -> ConstellationResult {
        let path = self.target_path(&spec.name);
        match self.try_update(spec, &path, log).await {
            Ok(outputs) => {
                tracing::info!(name = %spec.name, path = %path.display(), "constellation updated");
                ConstellationResult::Ok {
                    path,
                    outputs,
                    name: spec.name.clone(),
                }
            }
            Err(cause) => ConstellationResult::failed(
                path,
                format!("could not update constellation '{}'", spec.name),
                cause,
            ),
        }
    }

    /// Tear a constellation down. A statically-held IP is detached from
    /// terraform's state first so it survives the destroy.
    pub async fn destroy(&self, name: &str, log: &mut RunLog) -> ConstellationResult {
        let path = self.target_path(name);
        match self.try_destroy(name, &path, log).await {
            Ok(()) => {
                tracing::info!(name, path = %path.display(), "constellation destroyed");
                ConstellationResult::Ok {
                    path,
                    outputs: OutputSet::new(),
                    name: name.to_string(),
                }
            }
            Err(cause) => ConstellationResult::failed(
                path,
                format!("could not destroy constellation '{name}'"),
                cause,
            ),
        }
    }

    async fn try_create(
        &self,
        spec: &ConstellationSpec,
        path: &Path,
        log: &mut RunLog,
    ) -> Result<OutputSet> {
        spec.validate()?;
        self.prepare_folder(path).await?;
        self.write_variables(spec, path)?;
        self.copy_templates(spec, path)?;

        self.run_phase(&spec.name, ProcessInvocation::init(&self.settings.tool, path), log)
            .await?;

        if let Some(ip) = &spec.static_ip {
            let import = ProcessInvocation::import(
                &self.settings.tool,
                path,
                ELASTIC_IP_RESOURCE,
                &ip.allocation_id,
            );
            self.run_phase(&spec.name, import, log).await?;
        }

        self.plan_and_apply(spec, path, log).await
    }

    async fn try_update(
        &self,
        spec: &ConstellationSpec,
        path: &Path,
        log: &mut RunLog,
    ) -> Result<OutputSet> {
        spec.validate()?;
        if !path.is_dir() {
            return Err(NebulaError::MissingTarget(path.to_path_buf()));
        }
        self.write_variables(spec, path)?;
        self.copy_templates(spec, path)?;

        self.run_phase(&spec.name, ProcessInvocation::init(&self.settings.tool, path), log)
            .await?;
        self.plan_and_apply(spec, path, log).await
    }

    async fn try_destroy(&self, name: &str, path: &Path, log: &mut RunLog) -> Result<()> {
        validate_name(name)?;
        if !path.is_dir() {
            return Err(NebulaError::MissingTarget(path.to_path_buf()));
        }

        if paths::sentinel(path).exists() {
            let detach = ProcessInvocation::detach(&self.settings.tool, path, ELASTIC_IP_RESOURCE);
            self.run_phase(name, detach, log).await?;
        }

        self.run_phase(name, ProcessInvocation::destroy(&self.settings.tool, path), log)
            .await?;
        Ok(())
    }

    async fn prepare_folder(&self, path: &Path) -> Result<()> {
        if io::ensure_dir(path)? {
            tracing::debug!(path = %path.display(), "created working directory");
            tokio::time::sleep(self.settings.settle_delay).await;
        }
        Ok(())
    }

    fn write_variables(&self, spec: &ConstellationSpec, path: &Path) -> Result<()> {
        let rendered = vars::render_tfvars(spec);
        io::atomic_write(&paths::var_file(path), rendered.as_bytes())
    }

    fn copy_templates(&self, spec: &ConstellationSpec, path: &Path) -> Result<()> {
        let provider = spec.cloud.provider();
        let base = paths::provider_template(&self.settings.templates_path, provider);
        copy_template(&base, path)?;

        if let Some(ip) = &spec.static_ip {
            let eip = paths::elastic_ip_template(&self.settings.templates_path, provider);
            copy_template(&eip, path)?;
            io::write_if_missing(&paths::sentinel(path), ip.address.as_bytes())?;
        }
        Ok(())
    }

    async fn plan_and_apply(
        &self,
        spec: &ConstellationSpec,
        path: &Path,
        log: &mut RunLog,
    ) -> Result<OutputSet> {
        if self.settings.plan_before_apply {
            self.run_phase(&spec.name, ProcessInvocation::plan(&self.settings.tool, path), log)
                .await?;
        }

        let tls = TlsMaterial::load(&spec.keys)?;
        let apply_vars = vars::apply_vars(&spec.keys, tls.as_ref());
        let apply = ProcessInvocation::apply(&self.settings.tool, path, &apply_vars);

        let mut scanner = OutputScanner::new();
        let outcome = self
            .runner
            .run(&apply, &mut |line: &str| scanner.feed(line))
            .await?;
        self.check(&spec.name, &apply, &outcome, log)?;

        if !scanner.seen_marker() {
            tracing::warn!(name = %spec.name, "apply printed no Outputs block");
        }
        let mut outputs = scanner.finish();

        // Terraform may report a placeholder for an imported address.
        if let Some(ip) = &spec.static_ip {
            outputs.set(MANAGER_IP_OUTPUT, ip.address.clone());
        }
        Ok(outputs)
    }

    async fn run_phase(
        &self,
        name: &str,
        invocation: ProcessInvocation,
        log: &mut RunLog,
    ) -> Result<ProcessOutcome> {
        let outcome = self.runner.run(&invocation, &mut |_| {}).await?;
        self.check(name, &invocation, &outcome, log)?;
        Ok(outcome)
    }

    /// Record the outcome and turn a non-zero exit into an error carrying
    /// that phase's stderr.
    fn check(
        &self,
        name: &str,
        invocation: &ProcessInvocation,
        outcome: &ProcessOutcome,
        log: &mut RunLog,
    ) -> Result<()> {
        log.record(name, invocation.phase, outcome);
        if outcome.success() {
            return Ok(());
        }
        Err(NebulaError::PhaseFailed {
            phase: invocation.phase,
            exit_code: outcome.exit_code,
            stderr: log.stderr(name, invocation.phase).join("\n"),
        })
    }
}

fn copy_template(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(NebulaError::MissingTemplate(src.to_path_buf()));
    }
    let copied = io::copy_dir_all(src, dst)?;
    tracing::debug!(src = %src.display(), copied, "copied template");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
