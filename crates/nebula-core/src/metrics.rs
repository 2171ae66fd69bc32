//! Probes against a node's `/metrics` JSON document.
//!
//! Fetch failures never surface from this module: an unreachable node reads
//! as height `0` / empty version, which pollers see as "not synced yet".

use crate::error::Result;
use crate::poll::{wait_until, PollError, PollSpec, Target};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::fmt;
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

pub const BLOCK_HEIGHT_METRIC: &str = "BlockStorage.BlockHeight";
pub const VERSION_METRIC: &str = "Version.Semantic";
pub const COMMIT_METRIC: &str = "Version.Commit";

pub const SYNC_INTERVAL: Duration = Duration::from_secs(5);
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Blocks a healthy chain is expected to close within the liveness window.
pub const DEFAULT_LIVENESS_BLOCKS: u64 = 3;

/// Timing for the sync/version/commit waits: every 5s for up to 15 minutes.
pub fn sync_spec() -> PollSpec {
    PollSpec::new(SYNC_INTERVAL, Some(SYNC_TIMEOUT))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metric {
    #[serde(rename = "Value")]
    pub value: serde_json::Value,
}

pub type Metrics = HashMap<String, Metric>;

// ---------------------------------------------------------------------------
// NodeStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Green,
    Red,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncState::Green => "green",
            SyncState::Red => "red",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub block_height: u64,
    pub status: SyncState,
    pub version: String,
    pub commit_hash: String,
}

/// A node is live when its height advances by `blocks` within `spec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessCheck {
    pub blocks: u64,
    pub spec: PollSpec,
}

impl LivenessCheck {
    pub fn new(blocks: u64, spec: PollSpec) -> Self {
        Self { blocks, spec }
    }
}

// ---------------------------------------------------------------------------
// MetricsClient
// ---------------------------------------------------------------------------

/// `endpoint` arguments are `host[:port]/vchains/<id>`; the client requests
/// `http://{endpoint}/metrics`.
#[derive(Debug, Clone)]
pub struct MetricsClient {
    http: reqwest::Client,
}

impl MetricsClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http })
    }

    pub fn metrics_url(endpoint: &str) -> String {
        format!("http://{endpoint}/metrics")
    }

    /// Fetch the metrics document; any failure yields an empty map.
    pub async fn fetch(&self, endpoint: &str) -> Metrics {
        let url = Self::metrics_url(endpoint);
        let response = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(%url, error = %e, "metrics fetch failed");
                return Metrics::new();
            }
        };
        match response.json::<Metrics>().await {
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::debug!(%url, error = %e, "metrics document unreadable");
                Metrics::new()
            }
        }
    }

    pub async fn block_height(&self, endpoint: &str) -> u64 {
        let metrics = self.fetch(endpoint).await;
        metrics
            .get(BLOCK_HEIGHT_METRIC)
            .and_then(|m| as_height(&m.value))
            .unwrap_or(0)
    }

    pub async fn version(&self, endpoint: &str) -> String {
        self.text_metric(endpoint, VERSION_METRIC).await
    }

    pub async fn commit(&self, endpoint: &str) -> String {
        self.text_metric(endpoint, COMMIT_METRIC).await
    }

    async fn text_metric(&self, endpoint: &str, name: &str) -> String {
        let metrics = self.fetch(endpoint).await;
        metrics
            .get(name)
            .and_then(|m| m.value.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Wait until the block height reaches `target_height`.
    pub async fn wait_until_sync(
        &self,
        endpoint: &str,
        target_height: u64,
        spec: PollSpec,
    ) -> std::result::Result<Duration, PollError<Infallible>> {
        let target = Target::at_least(target_height);
        wait_until(
            &target,
            || async move { Ok(self.block_height(endpoint).await) },
            spec,
        )
        .await
    }

    /// Wait until the semantic version starts with `version`.
    pub async fn wait_until_version(
        &self,
        endpoint: &str,
        version: &str,
        spec: PollSpec,
    ) -> std::result::Result<Duration, PollError<Infallible>> {
        let target = Target::prefix(version);
        wait_until(
            &target,
            || async move { Ok(self.version(endpoint).await) },
            spec,
        )
        .await
    }

    /// Wait until the commit hash starts with `commit`.
    pub async fn wait_until_commit(
        &self,
        endpoint: &str,
        commit: &str,
        spec: PollSpec,
    ) -> std::result::Result<Duration, PollError<Infallible>> {
        let target = Target::prefix(commit);
        wait_until(
            &target,
            || async move { Ok(self.commit(endpoint).await) },
            spec,
        )
        .await
    }

    /// Green if the height advances by `check.blocks` within the window.
    /// A reachable node that stopped closing blocks is red.
    pub async fn determine_status(&self, endpoint: &str, check: &LivenessCheck) -> SyncState {
        let current = self.block_height(endpoint).await;
        let target = current.saturating_add(check.blocks);
        match self.wait_until_sync(endpoint, target, check.spec).await {
            Ok(elapsed) => {
                let elapsed_ms = elapsed.as_millis() as u64;
                tracing::debug!(endpoint, current, elapsed_ms, "node is live");
                SyncState::Green
            }
            Err(_) => SyncState::Red,
        }
    }

    /// All four lookups for one endpoint, concurrently.
    pub async fn node_status(&self, endpoint: &str, check: &LivenessCheck) -> NodeStatus {
        let (status, block_height, version, commit_hash) = tokio::join!(
            self.determine_status(endpoint, check),
            self.block_height(endpoint),
            self.version(endpoint),
            self.commit(endpoint),
        );
        NodeStatus {
            block_height,
            status,
            version,
            commit_hash,
        }
    }

    /// Status for every named endpoint. Endpoints are probed independently;
    /// the map is returned once all of them finish.
    pub async fn get_status(
        &self,
        endpoints: &BTreeMap<String, String>,
        check: &LivenessCheck,
    ) -> BTreeMap<String, NodeStatus> {
        let lookups = endpoints.iter().map(|(name, endpoint)| async move {
            (name.clone(), self.node_status(endpoint, check).await)
        });
        join_all(lookups).await.into_iter().collect()
    }
}

fn as_height(value: &serde_json::Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        return (f >= 0.0).then_some(f as u64);
    }
    value.as_str().and_then(|s| s.trim().parse().ok())
}
