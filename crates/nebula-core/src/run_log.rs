use crate::error::Result;
use crate::io;
use crate::paths;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use terraform_driver::{Phase, ProcessOutcome};

/// Captured output of one phase for one constellation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseLog {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Output of every phase run during one CLI invocation, keyed by
/// `(constellation name, phase)`.
///
/// Owned by whoever drives the lifecycle and passed down explicitly, so
/// concurrent runs against different constellations each keep their own.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: BTreeMap<(String, Phase), PhaseLog>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the outcome's lines. A phase run twice accumulates both runs.
    pub fn record(&mut self, name: &str, phase: Phase, outcome: &ProcessOutcome) {
        let entry = self.entries.entry((name.to_string(), phase)).or_default();
        entry.stdout.extend(outcome.stdout_lines.iter().cloned());
        entry.stderr.extend(outcome.stderr_lines.iter().cloned());
    }

    pub fn get(&self, name: &str, phase: Phase) -> Option<&PhaseLog> {
        self.entries.get(&(name.to_string(), phase))
    }

    pub fn stderr(&self, name: &str, phase: Phase) -> &[String] {
        self.get(name, phase)
            .map(|l| l.stderr.as_slice())
            .unwrap_or(&[])
    }

    /// Phases recorded for `name`, in lifecycle order.
    pub fn phases(&self, name: &str) -> Vec<Phase> {
        self.entries
            .keys()
            .filter(|(n, _)| n == name)
            .map(|(_, p)| *p)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every recorded phase for `name` as one printable block.
    pub fn render(&self, name: &str) -> String {
        let mut out = String::new();
        for ((n, phase), log) in &self.entries {
            if n != name {
                continue;
            }
            out.push_str(&format!("==> {phase} (stdout)\n"));
            for line in &log.stdout {
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(&format!("==> {phase} (stderr)\n"));
            for line in &log.stderr {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Write [`render`](Self::render) into `dir` under a timestamped name.
    pub fn dump(&self, name: &str, dir: &Path) -> Result<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let path = paths::log_dump(dir, &stamp);
        io::atomic_write(&path, self.render(name).as_bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn outcome(stdout: &[&str], stderr: &[&str]) -> ProcessOutcome {
        ProcessOutcome {
            exit_code: 0,
            stdout_lines: stdout.iter().map(|s| s.to_string()).collect(),
            stderr_lines: stderr.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn keyed_by_name_and_phase() {
        let mut log = RunLog::new();
        log.record("a", Phase::Init, &outcome(&["init a"], &[]));
        log.record("b", Phase::Apply, &outcome(&[], &["disk full"]));

        assert_eq!(log.get("a", Phase::Init).unwrap().stdout, vec!["init a"]);
        assert!(log.get("a", Phase::Apply).is_none());
        assert_eq!(log.stderr("b", Phase::Apply), ["disk full".to_string()]);
        assert!(log.stderr("b", Phase::Init).is_empty());
    }

    #[test]
    fn repeated_phase_accumulates() {
        let mut log = RunLog::new();
        log.record("a", Phase::Apply, &outcome(&["first"], &[]));
        log.record("a", Phase::Apply, &outcome(&["second"], &[]));
        assert_eq!(log.get("a", Phase::Apply).unwrap().stdout, vec!["first", "second"]);
    }

    #[test]
    fn phases_come_back_in_lifecycle_order() {
        let mut log = RunLog::new();
        log.record("a", Phase::Apply, &outcome(&[], &[]));
        log.record("a", Phase::Init, &outcome(&[], &[]));
        log.record("z", Phase::Destroy, &outcome(&[], &[]));
        assert_eq!(log.phases("a"), vec![Phase::Init, Phase::Apply]);
    }

    #[test]
    fn dump_writes_only_the_named_constellation() {
        let dir = TempDir::new().unwrap();
        let mut log = RunLog::new();
        log.record("a", Phase::Init, &outcome(&["Terraform has been initialized"], &[]));
        log.record("b", Phase::Init, &outcome(&["other"], &[]));

        let path = log.dump("a", dir.path()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("nebula-"));
        assert!(content.contains("==> init (stdout)"));
        assert!(content.contains("Terraform has been initialized"));
        assert!(!content.contains("other"));
    }
}
