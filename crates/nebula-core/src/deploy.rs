//! Running lifecycles across every target of a deployment file, and waiting
//! for freshly provisioned chains to come up.

use crate::config::ConstellationSpec;
use crate::constellation::{ConstellationResult, Orchestrator};
use crate::error::{NebulaError, Result};
use crate::metrics::MetricsClient;
use crate::poll::PollSpec;
use crate::run_log::RunLog;
use futures::stream::{self, StreamExt};
use terraform_driver::ToolRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
}

/// What a readiness timeout means for the command as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Log a warning and carry on.
    #[default]
    Advisory,
    /// Fail the command.
    Strict,
}

/// One target's lifecycle result together with the output it produced.
#[derive(Debug)]
pub struct Deployment {
    pub name: String,
    pub result: ConstellationResult,
    pub log: RunLog,
}

/// Run `op` for every spec, at most `concurrency` at a time. Results come
/// back in input order. A failing target never stops the others.
pub async fn deploy_all<R: ToolRunner>(
    orchestrator: &Orchestrator<R>,
    op: Operation,
    specs: &[ConstellationSpec],
    concurrency: usize,
) -> Vec<Deployment> {
    stream::iter(specs)
        .map(|spec| async move {
            let mut log = RunLog::new();
            let result = match op {
                Operation::Create => orchestrator.create(spec, &mut log).await,
                Operation::Update => orchestrator.update(spec, &mut log).await,
            };
            Deployment {
                name: spec.name.clone(),
                result,
                log,
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Destroy every named constellation, at most `concurrency` at a time.
pub async fn destroy_all<R: ToolRunner>(
    orchestrator: &Orchestrator<R>,
    names: &[String],
    concurrency: usize,
) -> Vec<Deployment> {
    stream::iter(names)
        .map(|name| async move {
            let mut log = RunLog::new();
            let result = orchestrator.destroy(name, &mut log).await;
            Deployment {
                name: name.clone(),
                result,
                log,
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessTarget {
    Height(u64),
    Version(String),
    Commit(String),
}

pub fn chain_endpoint(host: &str, chain: u32) -> String {
    format!("{host}/vchains/{chain}")
}

/// Wait for every chain on `host` to reach `target`. Chains are polled
/// concurrently.
pub async fn wait_for_chains(
    client: &MetricsClient,
    host: &str,
    chains: &[u32],
    target: &ReadinessTarget,
    spec: PollSpec,
    policy: SyncPolicy,
) -> Result<()> {
    let waits = chains.iter().map(|&chain| async move {
        let endpoint = chain_endpoint(host, chain);
        let waited = match target {
            ReadinessTarget::Height(h) => client.wait_until_sync(&endpoint, *h, spec).await,
            ReadinessTarget::Version(v) => client.wait_until_version(&endpoint, v, spec).await,
            ReadinessTarget::Commit(c) => client.wait_until_commit(&endpoint, c, spec).await,
        };
        (endpoint, waited)
    });

    for (endpoint, waited) in futures::future::join_all(waits).await {
        match waited {
            Ok(elapsed) => {
                tracing::info!(%endpoint, elapsed_ms = elapsed.as_millis() as u64, "chain ready");
            }
            Err(e) => match policy {
                SyncPolicy::Strict => return Err(NebulaError::SyncTimeout { endpoint }),
                SyncPolicy::Advisory => {
                    tracing::warn!(%endpoint, error = %e, "chain did not become ready");
                }
            },
        }
    }
    Ok(())
}
