pub mod config;
pub mod constellation;
pub mod deploy;
pub mod error;
pub mod io;
pub mod metrics;
pub mod paths;
pub mod poll;
pub mod run_log;
pub mod vars;

pub use error::{NebulaError, Result};
