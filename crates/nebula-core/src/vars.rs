//! Terraform variables for a constellation.
//!
//! Non-secret settings go to `terraform.tfvars`, which stays on disk in the
//! working directory. Key material is passed per `apply` as `-var` pairs and
//! is never written to the variables file.

use crate::config::{CloudConfig, ConstellationSpec, KeysConfig};
use crate::error::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt::Write as _;

pub const NODE_KEY_PAIR_VAR: &str = "node_key_pair";
pub const SSL_CERTIFICATE_VAR: &str = "ssl_certificate";
pub const SSL_PRIVATE_KEY_VAR: &str = "ssl_private_key";

/// PEM files read from disk for nodes serving HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub certificate: Vec<u8>,
    pub private_key: Vec<u8>,
}

impl TlsMaterial {
    pub fn load(keys: &KeysConfig) -> Result<Option<Self>> {
        match (&keys.tls_certificate_path, &keys.tls_private_key_path) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                certificate: std::fs::read(cert)?,
                private_key: std::fs::read(key)?,
            })),
            _ => Ok(None),
        }
    }
}

/// Render the flat `key = value` variables file.
pub fn render_tfvars(spec: &ConstellationSpec) -> String {
    let mut out = String::new();
    push_str(&mut out, "name", &spec.name);

    match &spec.cloud {
        CloudConfig::Aws(aws) => {
            push_str(&mut out, "aws_profile", &aws.profile);
            push_str(&mut out, "region", &aws.region);
            push_str(&mut out, "instance_type", &aws.instance_type);
            let _ = writeln!(out, "instance_count = {}", aws.instance_count);
            if let Some(url) = &aws.bootstrap_url {
                push_str(&mut out, "bootstrap_url", url);
            }
        }
    }

    push_str(
        &mut out,
        "path_to_ssh_pubkey",
        &spec.keys.ssh_public_key.to_string_lossy(),
    );
    push_str(&mut out, "node_address", strip_hex_prefix(&spec.keys.node_address));

    let chains: Vec<String> = spec.chains.iter().map(|c| c.to_string()).collect();
    let _ = writeln!(out, "vchains = [{}]", chains.join(", "));

    if let Some(ip) = &spec.static_ip {
        push_str(&mut out, "static_ip", &ip.address);
    }
    out
}

/// `-var` pairs for `apply`: the base64 key pair blob, plus TLS material
/// when the node serves HTTPS.
pub fn apply_vars(keys: &KeysConfig, tls: Option<&TlsMaterial>) -> Vec<(String, String)> {
    let key_pair = serde_json::json!({
        "node-address": strip_hex_prefix(&keys.node_address),
        "node-private-key": strip_hex_prefix(&keys.node_private_key),
    });
    let mut vars = vec![(
        NODE_KEY_PAIR_VAR.to_string(),
        STANDARD.encode(key_pair.to_string()),
    )];
    if let Some(tls) = tls {
        vars.push((SSL_CERTIFICATE_VAR.to_string(), STANDARD.encode(&tls.certificate)));
        vars.push((SSL_PRIVATE_KEY_VAR.to_string(), STANDARD.encode(&tls.private_key)));
    }
    vars
}

fn push_str(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "{key} = \"{}\"", escape(value));
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn strip_hex_prefix(value: &str) -> &str {
    value.strip_prefix("0x").unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AwsConfig, StaticIp};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn keys() -> KeysConfig {
        KeysConfig {
            node_address: format!("0x{}", "a".repeat(40)),
            node_private_key: "b".repeat(64),
            ssh_public_key: PathBuf::from("/home/orbs/.ssh/id_rsa.pub"),
            tls_certificate_path: None,
            tls_private_key_path: None,
        }
    }

    fn spec() -> ConstellationSpec {
        ConstellationSpec {
            name: "orbs-us".into(),
            cloud: CloudConfig::Aws(AwsConfig {
                region: "us-east-1".into(),
                instance_type: "m4.large".into(),
                instance_count: 2,
                profile: "orbs".into(),
                bootstrap_url: Some("https://s3.amazonaws.com/boyar/config.json".into()),
            }),
            keys: keys(),
            static_ip: None,
            chains: vec![42, 1000],
        }
    }

    #[test]
    fn tfvars_contains_cloud_settings() {
        let rendered = render_tfvars(&spec());
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "name = \"orbs-us\"");
        assert!(lines.contains(&"aws_profile = \"orbs\""));
        assert!(lines.contains(&"region = \"us-east-1\""));
        assert!(lines.contains(&"instance_type = \"m4.large\""));
        assert!(lines.contains(&"instance_count = 2"));
        assert!(lines.contains(&"vchains = [42, 1000]"));
        assert!(lines.contains(&"path_to_ssh_pubkey = \"/home/orbs/.ssh/id_rsa.pub\""));
        assert!(lines.contains(&"bootstrap_url = \"https://s3.amazonaws.com/boyar/config.json\""));
        assert!(!rendered.contains("static_ip"));
    }

    #[test]
    fn tfvars_never_contains_private_key() {
        let rendered = render_tfvars(&spec());
        assert!(!rendered.contains(&"b".repeat(64)));
        assert!(rendered.contains(&format!("node_address = \"{}\"", "a".repeat(40))));
    }

    #[test]
    fn tfvars_includes_static_ip() {
        let mut s = spec();
        s.static_ip = Some(StaticIp {
            address: "52.1.2.3".into(),
            allocation_id: "eipalloc-1".into(),
        });
        assert!(render_tfvars(&s).contains("static_ip = \"52.1.2.3\""));
    }

    #[test]
    fn values_are_escaped() {
        let mut s = spec();
        s.name = "we\"ird".into();
        assert!(render_tfvars(&s).starts_with("name = \"we\\\"ird\""));
    }

    #[test]
    fn key_pair_is_base64_json() {
        let vars = apply_vars(&keys(), None);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].0, NODE_KEY_PAIR_VAR);
        let decoded = STANDARD.decode(&vars[0].1).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(json["node-address"], "a".repeat(40));
        assert_eq!(json["node-private-key"], "b".repeat(64));
    }

    #[test]
    fn tls_material_is_loaded_and_encoded() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "CERT").unwrap();
        std::fs::write(&key, "KEY").unwrap();

        let mut k = keys();
        assert_eq!(TlsMaterial::load(&k).unwrap(), None);
        k.tls_certificate_path = Some(cert);
        k.tls_private_key_path = Some(key);
        let tls = TlsMaterial::load(&k).unwrap().unwrap();

        let vars = apply_vars(&k, Some(&tls));
        assert_eq!(vars.len(), 3);
        assert_eq!(vars[1], (SSL_CERTIFICATE_VAR.to_string(), STANDARD.encode("CERT")));
        assert_eq!(vars[2], (SSL_PRIVATE_KEY_VAR.to_string(), STANDARD.encode("KEY")));
    }
}
