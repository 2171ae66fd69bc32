use super::{report, runtime, DestroyArgs};
use crate::settings::{self, GlobalArgs};
use nebula_core::constellation::Orchestrator;
use nebula_core::deploy::destroy_all;
use terraform_driver::ProcessRunner;

pub fn run(global: &GlobalArgs, args: &DestroyArgs, json: bool) -> anyhow::Result<()> {
    let file = args.file.as_deref().map(settings::load_file).transpose()?;

    let mut names = args.names.clone();
    if let Some(f) = &file {
        let unnamed = f.targets.len() - f.named_targets().len();
        if unnamed > 0 {
            tracing::warn!(unnamed, "skipping targets without a name");
        }
        names.extend(f.named_targets());
    }
    if names.is_empty() {
        anyhow::bail!("nothing to destroy: no named constellations given");
    }

    let orchestrator = Orchestrator::new(ProcessRunner, settings::resolve(global, file.as_ref())?);

    let rt = runtime()?;
    let deployments = rt.block_on(destroy_all(&orchestrator, &names, args.concurrency));
    report("destroyed", &deployments, json)
}
