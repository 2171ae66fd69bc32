use super::{manager_ip, report, runtime, ProvisionArgs};
use crate::settings::{self, GlobalArgs};
use nebula_core::constellation::Orchestrator;
use nebula_core::deploy::{deploy_all, wait_for_chains, Operation, ReadinessTarget};
use nebula_core::metrics::MetricsClient;
use terraform_driver::ProcessRunner;

pub fn run(
    global: &GlobalArgs,
    args: &ProvisionArgs,
    sync_height: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let file = settings::load_file(&args.file)?;
    let mut orch_settings = settings::resolve(global, Some(&file))?;
    orch_settings.plan_before_apply = args.plan;
    let orchestrator = Orchestrator::new(ProcessRunner, orch_settings);
    let specs = file.specs();

    let rt = runtime()?;
    rt.block_on(async {
        let deployments = deploy_all(&orchestrator, Operation::Create, &specs, args.concurrency).await;
        let reported = report("created", &deployments, json);

        if let Some(height) = sync_height {
            let client = MetricsClient::new()?;
            let target = ReadinessTarget::Height(height);
            for (spec, d) in specs.iter().zip(&deployments) {
                let Some(host) = manager_ip(&d.result) else {
                    continue;
                };
                tracing::info!(name = %spec.name, host, height, "waiting for chains to sync");
                wait_for_chains(
                    &client,
                    host,
                    &spec.chains,
                    &target,
                    args.sync.spec(),
                    args.sync.policy(),
                )
                .await?;
            }
        }

        reported
    })
}
