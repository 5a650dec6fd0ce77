//! Error types for refactoring detection and AST diffing.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the miner.
#[derive(Error, Debug)]
pub enum MinerError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Glob pattern error: {0}")]
    Glob(#[from] globset::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Tree-sitter parse error for {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid git ref '{reference}': {message}")]
    InvalidRef { reference: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("File not found in snapshot: {0}")]
    FileNotFound(PathBuf),

    /// A programming defect detected while diffing one file or entity pair.
    #[error("Invariant violated diffing {src_path} -> {dst_path}: {message}")]
    InvariantViolation {
        src_path: PathBuf,
        dst_path: PathBuf,
        message: String,
    },
}

impl MinerError {
    /// Build an invariant violation tied to a file pair.
    pub fn invariant(
        src_path: impl Into<PathBuf>,
        dst_path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        MinerError::InvariantViolation {
            src_path: src_path.into(),
            dst_path: dst_path.into(),
            message: message.into(),
        }
    }
}

/// A specialized Result type for miner operations.
pub type Result<T> = std::result::Result<T, MinerError>;
