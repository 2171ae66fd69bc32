use super::{manager_ip, report, runtime, ProvisionArgs};
use crate::settings::{self, GlobalArgs};
use nebula_core::constellation::Orchestrator;
use nebula_core::deploy::{deploy_all, wait_for_chains, Operation, ReadinessTarget};
use nebula_core::metrics::MetricsClient;
use terraform_driver::ProcessRunner;

pub fn run(
    global: &GlobalArgs,
    args: &ProvisionArgs,
    version_prefix: Option<String>,
    commit_prefix: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let file = settings::load_file(&args.file)?;
    let unnamed = file.targets.len() - file.named_targets().len();
    if unnamed > 0 {
        anyhow::bail!("{unnamed} target(s) have no name; only named constellations can be updated");
    }

    let mut orch_settings = settings::resolve(global, Some(&file))?;
    orch_settings.plan_before_apply = args.plan;
    let orchestrator = Orchestrator::new(ProcessRunner, orch_settings);
    let specs = file.specs();

    let mut targets = Vec::new();
    if let Some(v) = version_prefix {
        targets.push(ReadinessTarget::Version(v));
    }
    if let Some(c) = commit_prefix {
        targets.push(ReadinessTarget::Commit(c));
    }

    let rt = runtime()?;
    rt.block_on(async {
        let deployments = deploy_all(&orchestrator, Operation::Update, &specs, args.concurrency).await;
        let reported = report("updated", &deployments, json);

        if !targets.is_empty() {
            let client = MetricsClient::new()?;
            for (spec, d) in specs.iter().zip(&deployments) {
                let Some(host) = manager_ip(&d.result) else {
                    continue;
                };
                for target in &targets {
                    tracing::info!(name = %spec.name, host, ?target, "waiting for chains to roll");
                    wait_for_chains(
                        &client,
                        host,
                        &spec.chains,
                        target,
                        args.sync.spec(),
                        args.sync.policy(),
                    )
                    .await?;
                }
            }
        }

        reported
    })
}
