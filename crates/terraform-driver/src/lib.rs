//! `terraform-driver` drives the `terraform` CLI as a subprocess.
//!
//! Every provisioning phase (`init`, `plan`, `import`, `apply`, `state rm`,
//! `destroy`) is a separate child process. This crate builds the argv for each
//! phase, runs it with output streamed line by line, and extracts the
//! `Outputs:` block that `apply` prints on success.
//!
//! # Architecture
//!
//! ```text
//! ProcessInvocation   ← one phase: command, args, working directory
//!     │
//!     ▼
//! ToolRunner          ← async seam; ProcessRunner spawns via tokio::process
//!     │                  stdout streamed to a callback, stderr drained
//!     ▼
//! ProcessOutcome      ← exit code + retained stdout/stderr lines
//!     │
//!     ▼
//! OutputScanner       ← arms on "Outputs:", parses `key = value` lines
//! ```

pub mod error;
pub mod outputs;
pub mod phase;
pub mod process;

pub use error::DriverError;
pub use outputs::{parse_outputs, strip_ansi, OutputRecord, OutputScanner, OutputSet};
pub use phase::{Phase, ProcessInvocation, VAR_FILE};
pub use process::{ProcessOutcome, ProcessRunner, ToolRunner};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, DriverError>;
