use super::{runtime, StatusArgs};
use crate::output::{print_json, print_table};
use nebula_core::metrics::{LivenessCheck, MetricsClient};
use nebula_core::poll::PollSpec;
use std::collections::BTreeMap;

pub fn run(args: &StatusArgs, json: bool) -> anyhow::Result<()> {
    let endpoints: BTreeMap<String, String> = args.nodes.iter().cloned().collect();
    let check = LivenessCheck::new(
        args.liveness_blocks,
        PollSpec::from_millis(Some(args.interval_ms), Some(args.timeout_ms)),
    );

    let rt = runtime()?;
    let statuses = rt.block_on(async {
        let client = MetricsClient::new()?;
        anyhow::Ok(client.get_status(&endpoints, &check).await)
    })?;

    if json {
        return print_json(&statuses);
    }

    let rows: Vec<Vec<String>> = statuses
        .iter()
        .map(|(name, s)| {
            vec![
                name.clone(),
                endpoints.get(name).cloned().unwrap_or_default(),
                s.status.to_string(),
                s.block_height.to_string(),
                s.version.clone(),
                s.commit_hash.clone(),
            ]
        })
        .collect();
    print_table(
        &["NAME", "ENDPOINT", "STATUS", "HEIGHT", "VERSION", "COMMIT"],
        &rows,
    );
    Ok(())
}
