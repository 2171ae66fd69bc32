pub mod create;
pub mod destroy;
pub mod status;
pub mod update;

use crate::output::{print_json, print_outputs};
use clap::Args;
use nebula_core::constellation::{ConstellationResult, MANAGER_IP_OUTPUT};
use nebula_core::deploy::{Deployment, SyncPolicy};
use nebula_core::metrics::{self, DEFAULT_LIVENESS_BLOCKS};
use nebula_core::poll::PollSpec;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use terraform_driver::OutputSet;

const ISSUES_URL: &str = "https://github.com/orbs-network/nebula/issues";

#[derive(Args, Debug, Clone)]
pub struct ProvisionArgs {
    /// Deployment file (JSON, or YAML with a .yaml/.yml extension)
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    /// Run `terraform plan` before every apply
    #[arg(long)]
    pub plan: bool,

    /// Maximum constellations provisioned at once
    #[arg(long, default_value_t = 2)]
    pub concurrency: usize,

    #[command(flatten)]
    pub sync: SyncArgs,
}

/// Timing of the post-provisioning readiness wait.
#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Poll interval in milliseconds (default: 5000)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Give up after this many milliseconds; 0 waits forever (default: 900000)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Fail the command when a chain does not become ready in time
    #[arg(long)]
    pub strict_sync: bool,
}

impl SyncArgs {
    pub fn spec(&self) -> PollSpec {
        let defaults = metrics::sync_spec();
        PollSpec::new(
            self.interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            Some(
                self.timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(metrics::SYNC_TIMEOUT),
            ),
        )
    }

    pub fn policy(&self) -> SyncPolicy {
        if self.strict_sync {
            SyncPolicy::Strict
        } else {
            SyncPolicy::Advisory
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DestroyArgs {
    /// Constellation names to destroy
    #[arg(required_unless_present = "file")]
    pub names: Vec<String>,

    /// Destroy every named target of a deployment file
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,

    /// Maximum constellations destroyed at once
    #[arg(long, default_value_t = 2)]
    pub concurrency: usize,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Node to inspect as `name=host[:port]/vchains/<id>`; repeatable
    #[arg(long = "node", required = true, value_parser = parse_node)]
    pub nodes: Vec<(String, String)>,

    /// Blocks a live chain must close within the window
    #[arg(long, default_value_t = DEFAULT_LIVENESS_BLOCKS)]
    pub liveness_blocks: u64,

    /// Liveness poll interval in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub interval_ms: u64,

    /// Liveness window in milliseconds
    #[arg(long, default_value_t = 20_000)]
    pub timeout_ms: u64,
}

fn parse_node(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, endpoint)) if !name.is_empty() && !endpoint.is_empty() => {
            Ok((name.to_string(), endpoint.to_string()))
        }
        _ => Err(format!("expected name=endpoint, got '{raw}'")),
    }
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

/// Public address of a provisioned constellation, when the templates
/// export one.
pub fn manager_ip(result: &ConstellationResult) -> Option<&str> {
    result.outputs().and_then(|o| o.get(MANAGER_IP_OUTPUT))
}

#[derive(Serialize)]
struct DeploymentReport<'a> {
    name: &'a str,
    ok: bool,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    outputs: Option<&'a OutputSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log: Option<String>,
}

/// Print every deployment's result. Failures get their run log dumped next
/// to the working directory. Errors when anything failed.
pub fn report(verb: &str, deployments: &[Deployment], json: bool) -> anyhow::Result<()> {
    let mut reports = Vec::with_capacity(deployments.len());
    let mut failed = 0;

    for d in deployments {
        match &d.result {
            ConstellationResult::Ok { path, outputs, name } => {
                if !json {
                    println!("{verb} {name} at {}", path.display());
                    print_outputs(outputs);
                }
                reports.push(DeploymentReport {
                    name,
                    ok: true,
                    path: path.display().to_string(),
                    outputs: Some(outputs),
                    error: None,
                    log: None,
                });
            }
            ConstellationResult::Failed {
                path,
                message,
                cause,
            } => {
                failed += 1;
                let dumped = if path.is_dir() && !d.log.is_empty() {
                    match d.log.dump(&d.name, path) {
                        Ok(p) => Some(p),
                        Err(e) => {
                            tracing::warn!(error = %e, "could not write run log");
                            None
                        }
                    }
                } else {
                    None
                };

                eprintln!("error: {message}: {cause}");
                eprintln!("  working directory: {}", path.display());
                if let Some(p) = &dumped {
                    eprintln!("  run log: {}", p.display());
                }
                eprintln!("  if this looks like a bug, please open an issue at {ISSUES_URL}");

                reports.push(DeploymentReport {
                    name: &d.name,
                    ok: false,
                    path: path.display().to_string(),
                    outputs: None,
                    error: Some(cause.to_string()),
                    log: dumped.map(|p| p.display().to_string()),
                });
            }
        }
    }

    if json {
        print_json(&reports)?;
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} constellation(s) failed", deployments.len());
    }
    Ok(())
}
