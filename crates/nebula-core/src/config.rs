use crate::error::{NebulaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 55;
pub const RANDOM_NAME_LEN: usize = 30;

const ADDRESS_HEX_LEN: usize = 40;
const PRIVATE_KEY_HEX_LEN: usize = 64;

// ---------------------------------------------------------------------------
// KeysConfig
// ---------------------------------------------------------------------------

/// Node identity and access material shared by every target in a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeysConfig {
    pub node_address: String,
    pub node_private_key: String,
    /// Path to the SSH public key installed on provisioned machines.
    pub ssh_public_key: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_certificate_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_private_key_path: Option<PathBuf>,
}

impl KeysConfig {
    pub fn validate(&self) -> Result<()> {
        validate_hex("node_address", &self.node_address, ADDRESS_HEX_LEN)?;
        validate_hex("node_private_key", &self.node_private_key, PRIVATE_KEY_HEX_LEN)?;
        if self.tls_certificate_path.is_some() != self.tls_private_key_path.is_some() {
            return Err(NebulaError::Validation(
                "tls_certificate_path and tls_private_key_path must be set together".into(),
            ));
        }
        Ok(())
    }
}

fn validate_hex(field: &str, value: &str, len: usize) -> Result<()> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.len() != len {
        return Err(NebulaError::Validation(format!(
            "{field} must be {len} hex characters, got {}",
            digits.len()
        )));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(NebulaError::Validation(format!(
            "{field} contains non-hex characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CloudConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloudConfig {
    Aws(AwsConfig),
}

impl CloudConfig {
    /// Name of the template directory for this provider.
    pub fn provider(&self) -> &'static str {
        match self {
            CloudConfig::Aws(_) => "aws",
        }
    }

    pub fn region(&self) -> &str {
        match self {
            CloudConfig::Aws(aws) => &aws.region,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            CloudConfig::Aws(aws) => {
                if aws.region.trim().is_empty() {
                    return Err(NebulaError::Validation("aws region is empty".into()));
                }
                if aws.instance_count == 0 {
                    return Err(NebulaError::Validation(
                        "instance_count must be at least 1".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Where booted nodes fetch their boyar configuration from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_url: Option<String>,
}

fn default_instance_type() -> String {
    "t2.medium".to_string()
}

fn default_instance_count() -> u32 {
    2
}

fn default_profile() -> String {
    "default".to_string()
}

// ---------------------------------------------------------------------------
// StaticIp
// ---------------------------------------------------------------------------

/// A pre-allocated public address imported into the constellation instead
/// of letting terraform allocate a fresh one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticIp {
    pub address: String,
    pub allocation_id: String,
}

impl StaticIp {
    pub fn validate(&self) -> Result<()> {
        if self.address.parse::<Ipv4Addr>().is_err() {
            return Err(NebulaError::Validation(format!(
                "invalid static IP address '{}'",
                self.address
            )));
        }
        if self.allocation_id.trim().is_empty() {
            return Err(NebulaError::Validation(format!(
                "static IP {} has no allocation_id",
                self.address
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NebulaError::Validation("constellation name is empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NebulaError::Validation(format!(
            "constellation name '{name}' is {} characters, the limit is {MAX_NAME_LEN}",
            name.len()
        )));
    }
    // Names become a directory under the cache, so nothing that could
    // address another path is allowed.
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(NebulaError::Validation(format!(
            "constellation name '{name}' contains '{bad}'; use letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

/// Time-ordered unique name for targets that do not set one.
pub fn random_name() -> String {
    let mut id = Uuid::now_v7().simple().to_string();
    id.truncate(RANDOM_NAME_LEN);
    id
}

// ---------------------------------------------------------------------------
// ConstellationSpec
// ---------------------------------------------------------------------------

/// Everything the orchestrator needs to provision one constellation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstellationSpec {
    pub name: String,
    pub cloud: CloudConfig,
    pub keys: KeysConfig,
    pub static_ip: Option<StaticIp>,
    pub chains: Vec<u32>,
}

impl ConstellationSpec {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        self.keys.validate()?;
        self.cloud.validate()?;
        if let Some(ip) = &self.static_ip {
            ip.validate()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DeploymentFile (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub cloud: CloudConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_ip: Option<StaticIp>,
    /// Virtual chain ids hosted by this constellation.
    #[serde(default)]
    pub chains: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentFile {
    pub keys: KeysConfig,
    pub targets: Vec<TargetConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_path: Option<PathBuf>,
}

impl DeploymentFile {
    /// Load from JSON, or YAML when the extension is `.yaml`/`.yml`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let file = if is_yaml {
            serde_yaml::from_str(&data)?
        } else {
            serde_json::from_str(&data)?
        };
        Ok(file)
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(NebulaError::Validation("no targets defined".into()));
        }
        self.keys.validate()?;
        let mut seen = HashSet::new();
        for target in &self.targets {
            if let Some(name) = &target.name {
                validate_name(name)?;
                // Same name means same working directory and terraform state.
                if !seen.insert(name.as_str()) {
                    return Err(NebulaError::Validation(format!(
                        "target name '{name}' is used more than once"
                    )));
                }
            }
            target.cloud.validate()?;
            if let Some(ip) = &target.static_ip {
                ip.validate()?;
            }
        }
        Ok(())
    }

    /// Resolve every target into a spec, naming unnamed ones randomly.
    pub fn specs(&self) -> Vec<ConstellationSpec> {
        self.targets
            .iter()
            .map(|t| ConstellationSpec {
                name: t.name.clone().unwrap_or_else(random_name),
                cloud: t.cloud.clone(),
                keys: self.keys.clone(),
                static_ip: t.static_ip.clone(),
                chains: t.chains.clone(),
            })
            .collect()
    }

    /// Names of the targets that carry one; unnamed targets cannot be
    /// addressed after creation.
    pub fn named_targets(&self) -> Vec<String> {
        self.targets.iter().filter_map(|t| t.name.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
