//! Error types

use std::io;
use thiserror::Error;

use crate::cluster::Algorithm;

/// Result type for simulation and de-interleaving operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while simulating or de-interleaving pulse streams
#[derive(Error, Debug)]
pub enum Error {
    /// Behavior mix percentages do not add up
    #[error("emitter percentages must sum to 100, got {fixed} + {agile} + {stagger} = {total}")]
    InvalidMix {
        fixed: u32,
        agile: u32,
        stagger: u32,
        total: u64,
    },

    /// Emitter description violates its behavior
    #[error("invalid emitter: {0}")]
    InvalidEmitter(String),

    /// Simulation or pipeline configuration is unusable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unknown pulse attribute name
    #[error("unknown feature '{0}'")]
    UnknownFeature(String),

    /// Nothing left to cluster on
    #[error("select at least one feature present in the data")]
    NoFeatures,

    /// Empty buffer or table
    #[error("no data to process")]
    NoData,

    /// Algorithm not compiled into this build
    #[error("{0} clustering is not available in this build")]
    Unavailable(Algorithm),

    /// Clustering parameters out of range
    #[error("invalid parameters for {algorithm}: {reason}")]
    InvalidParameters {
        algorithm: Algorithm,
        reason: String,
    },

    /// Underlying clustering library failed
    #[error("{algorithm} clustering failed: {reason}")]
    Clustering {
        algorithm: Algorithm,
        reason: String,
    },

    /// Parameter search could not evaluate any candidate
    #[error("parameter search for {0} found no usable candidate")]
    Tuning(Algorithm),

    /// Filesystem access failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Pulse table could not be read or written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Session state could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
