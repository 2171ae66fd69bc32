use std::path::PathBuf;

use terraform_driver::{DriverError, Phase};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NebulaError {
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("terraform {phase} exited with code {exit_code}{}", stderr_suffix(.stderr))]
    PhaseFailed {
        phase: Phase,
        exit_code: i32,
        stderr: String,
    },

    #[error("no constellation found at {}", .0.display())]
    MissingTarget(PathBuf),

    #[error("template directory not found: {}", .0.display())]
    MissingTemplate(PathBuf),

    #[error("timed out waiting for {endpoint} to become ready")]
    SyncTimeout { endpoint: String },

    #[error("home directory not found: set HOME or pass --cache")]
    HomeNotFound,

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\nstderr: {stderr}")
    }
}

pub type Result<T> = std::result::Result<T, NebulaError>;
