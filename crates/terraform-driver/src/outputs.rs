use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Marker line terraform prints right before the outputs block.
pub const OUTPUTS_MARKER: &str = "Outputs:";

const SEPARATOR: &str = " = ";

static ANSI_RE: OnceLock<Regex> = OnceLock::new();

fn ansi_re() -> &'static Regex {
    // CSI / VT100 sequences, both the 7-bit ESC form and the 8-bit 0x9B form.
    ANSI_RE.get_or_init(|| {
        Regex::new(r"[\x1b\x{9b}][\[()#;?]*(?:[0-9]{1,4}(?:;[0-9]{0,4})*)?[0-9A-ORZcf-nqry=><]")
            .unwrap()
    })
}

/// Remove color and cursor control sequences from `text`.
pub fn strip_ansi(text: &str) -> String {
    ansi_re().replace_all(text, "").into_owned()
}

// ─── OutputRecord ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub key: String,
    pub value: String,
}

impl OutputRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse one `key = value` line. Lines without `" = "` are not output
    /// lines and yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        if !line.contains(SEPARATOR) {
            return None;
        }
        let cleaned = strip_ansi(line);
        let (key, value) = cleaned.split_once(SEPARATOR)?;
        Some(Self::new(key.trim(), value.trim()))
    }
}

impl fmt::Display for OutputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.key, self.value)
    }
}

// ─── OutputSet ────────────────────────────────────────────────────────────

/// Records in the order terraform printed them. Keys may repeat (a retried
/// apply prints the block twice); lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputSet(Vec<OutputRecord>);

impl OutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: OutputRecord) {
        self.0.push(record);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.value.as_str())
    }

    /// Overwrite the first record for `key`, or append one if absent.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|r| r.key == key) {
            Some(existing) => existing.value = value,
            None => self.0.push(OutputRecord::new(key, value)),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OutputRecord> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<OutputRecord> for OutputSet {
    fn from_iter<I: IntoIterator<Item = OutputRecord>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for OutputSet {
    type Item = OutputRecord;
    type IntoIter = std::vec::IntoIter<OutputRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a OutputSet {
    type Item = &'a OutputRecord;
    type IntoIter = std::slice::Iter<'a, OutputRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Parse every `key = value` line of `raw`, in input order.
pub fn parse_outputs(raw: &str) -> OutputSet {
    raw.lines().filter_map(OutputRecord::parse_line).collect()
}

// ─── OutputScanner ────────────────────────────────────────────────────────

/// Streaming extractor for `apply` stdout.
///
/// Lines before the [`OUTPUTS_MARKER`] are ignored (resource logs such as
/// `instance_type = "t2.micro"` appear there too); after it, every
/// `key = value` line becomes a record.
#[derive(Debug, Default)]
pub struct OutputScanner {
    armed: bool,
    outputs: OutputSet,
}

impl OutputScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) {
        if !self.armed {
            self.armed = line.contains(OUTPUTS_MARKER);
            return;
        }
        if let Some(record) = OutputRecord::parse_line(line) {
            self.outputs.push(record);
        }
    }

    pub fn seen_marker(&self) -> bool {
        self.armed
    }

    pub fn finish(self) -> OutputSet {
        self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_lines_in_order() {
        let set = parse_outputs("manager_ip = 1.2.3.4\nregion = us-east-1\n");
        let keys: Vec<_> = set.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["manager_ip", "region"]);
        assert_eq!(set.get("manager_ip"), Some("1.2.3.4"));
    }

    #[test]
    fn strips_ansi_around_key_and_value() {
        let colored = parse_outputs("\u{1b}[0mfoo\u{1b}[0m = \u{1b}[0mbar\u{1b}[0m");
        assert_eq!(colored.len(), 1);
        assert_eq!(colored.iter().next(), Some(&OutputRecord::new("foo", "bar")));
        assert_eq!(colored, parse_outputs("foo = bar"));
    }

    #[test]
    fn strip_ansi_handles_bold_green_marker() {
        assert_eq!(strip_ansi("\u{1b}[0m\u{1b}[1m\u{1b}[32mOutputs:\u{1b}[0m"), "Outputs:");
    }

    #[test]
    fn no_separator_means_no_records() {
        assert!(parse_outputs("Apply complete! Resources: 3 added.\n\nOutputs:\n").is_empty());
        assert!(parse_outputs("a=b\nc =d").is_empty());
    }

    #[test]
    fn splits_on_first_separator_and_trims() {
        let set = parse_outputs("  url   = http://x/?a = b  ");
        assert_eq!(set.get("url"), Some("http://x/?a = b"));
    }

    #[test]
    fn duplicate_keys_are_kept_and_first_wins() {
        let set = parse_outputs("ip = 1.1.1.1\nip = 2.2.2.2");
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("ip"), Some("1.1.1.1"));
    }

    #[test]
    fn reparsing_serialized_records_is_stable() {
        let raw = "\u{1b}[1mmanager_ip\u{1b}[0m = 10.0.0.1\nnoise line\nvpc_id = vpc-123";
        let once = parse_outputs(raw);
        let serialized: Vec<String> = once.iter().map(|r| r.to_string()).collect();
        assert_eq!(parse_outputs(&serialized.join("\n")), once);
    }

    #[test]
    fn set_overrides_first_match_or_appends() {
        let mut set = parse_outputs("ip = 1.1.1.1\nip = 2.2.2.2");
        set.set("ip", "9.9.9.9");
        assert_eq!(set.get("ip"), Some("9.9.9.9"));
        assert_eq!(set.len(), 2);

        set.set("dns", "node.example");
        assert_eq!(set.get("dns"), Some("node.example"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn scanner_ignores_lines_before_marker() {
        let mut scanner = OutputScanner::new();
        for line in [
            "aws_instance.node: Creating...",
            "  instance_type = \"t2.medium\"",
            "Apply complete! Resources: 1 added, 0 changed, 0 destroyed.",
            "",
            "\u{1b}[0m\u{1b}[1m\u{1b}[32mOutputs:\u{1b}[0m",
            "",
            "manager_ip = 1.2.3.4",
        ] {
            scanner.feed(line);
        }
        assert!(scanner.seen_marker());
        let set = scanner.finish();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("manager_ip"), Some("1.2.3.4"));
    }

    #[test]
    fn scanner_without_marker_yields_nothing() {
        let mut scanner = OutputScanner::new();
        scanner.feed("manager_ip = 1.2.3.4");
        assert!(!scanner.seen_marker());
        assert!(scanner.finish().is_empty());
    }
}
