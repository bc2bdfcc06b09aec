//! CLI command implementations.

pub mod query;
pub mod seed;
pub mod stats;

use clap::ValueEnum;
use mapstore_core::CoreError;
use mapstore_model::ModelError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The seed file could not be read.
    #[error("cannot read {path:?}: {source}")]
    Io {
        /// Seed path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The seed file is not valid JSON or has the wrong shape.
    #[error("malformed seed: {0}")]
    Json(#[from] serde_json::Error),

    /// The seed is well-formed but inconsistent.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// A store rejected an operation.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The engine rejected an operation.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}
