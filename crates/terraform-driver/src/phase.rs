use std::fmt;
use std::path::{Path, PathBuf};

/// Variables file written into every working directory before `init`.
pub const VAR_FILE: &str = "terraform.tfvars";

// ─── Phase ────────────────────────────────────────────────────────────────

/// One step of the provisioning lifecycle. Each phase is its own child
/// process; phases are never combined into a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Init,
    Plan,
    ImportExistingIp,
    Apply,
    DetachIp,
    Destroy,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Plan => "plan",
            Phase::ImportExistingIp => "import-existing-ip",
            Phase::Apply => "apply",
            Phase::DetachIp => "detach-ip",
            Phase::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── ProcessInvocation ────────────────────────────────────────────────────

/// A fully-resolved command line for one phase, run with
/// `working_directory` as its cwd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub phase: Phase,
    pub command: String,
    pub args: Vec<String>,
    pub working_directory: PathBuf,
}

impl ProcessInvocation {
    fn new(phase: Phase, tool: &str, dir: &Path, args: Vec<String>) -> Self {
        Self {
            phase,
            command: tool.to_string(),
            args,
            working_directory: dir.to_path_buf(),
        }
    }

    /// `<tool> init`
    pub fn init(tool: &str, dir: &Path) -> Self {
        Self::new(Phase::Init, tool, dir, vec!["init".into()])
    }

    /// `<tool> plan -var-file=terraform.tfvars`
    pub fn plan(tool: &str, dir: &Path) -> Self {
        Self::new(
            Phase::Plan,
            tool,
            dir,
            vec!["plan".into(), var_file_arg()],
        )
    }

    /// `<tool> apply -var-file=terraform.tfvars -auto-approve [-var k=v]...`
    pub fn apply(tool: &str, dir: &Path, vars: &[(String, String)]) -> Self {
        let mut args = vec!["apply".into(), var_file_arg(), "-auto-approve".into()];
        for (k, v) in vars {
            args.push("-var".into());
            args.push(format!("{k}={v}"));
        }
        Self::new(Phase::Apply, tool, dir, args)
    }

    /// `<tool> import <resource-address> <id>`
    pub fn import(tool: &str, dir: &Path, address: &str, id: &str) -> Self {
        Self::new(
            Phase::ImportExistingIp,
            tool,
            dir,
            vec!["import".into(), address.into(), id.into()],
        )
    }

    /// `<tool> state rm <resource-address>`
    ///
    /// Forgets the resource without destroying it, so the cloud object
    /// outlives the `destroy` that follows.
    pub fn detach(tool: &str, dir: &Path, address: &str) -> Self {
        Self::new(
            Phase::DetachIp,
            tool,
            dir,
            vec!["state".into(), "rm".into(), address.into()],
        )
    }

    /// `<tool> destroy -var-file=terraform.tfvars -auto-approve`
    pub fn destroy(tool: &str, dir: &Path) -> Self {
        Self::new(
            Phase::Destroy,
            tool,
            dir,
            vec!["destroy".into(), var_file_arg(), "-auto-approve".into()],
        )
    }

    /// Printable command line with `-var` values masked. Apply variables
    /// carry key material and must not reach the logs.
    pub fn display_masked(&self) -> String {
        let mut parts = vec![self.command.clone()];
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                let key = arg.split_once('=').map(|(k, _)| k).unwrap_or(arg);
                parts.push(format!("{key}=***"));
                mask_next = false;
                continue;
            }
            mask_next = arg == "-var";
            parts.push(arg.clone());
        }
        parts.join(" ")
    }
}

fn var_file_arg() -> String {
    format!("-var-file={VAR_FILE}")
}
