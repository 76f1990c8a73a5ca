mod cluster;
mod common;
mod config;
mod dbscan;
mod deinterleave;
mod emitter;
mod error;
mod features;
#[cfg(feature = "hdbscan")]
mod hierarchical;
mod kmeans;
pub mod logging;
mod simulation;
mod stats;
mod stream;
mod tune;
mod workspace;

pub use cluster::{
    normalize_labels, Algorithm, Capabilities, ClusterParams, Clusterer, ClusteringRun, Label,
    RawLabel, Summary, NOISE,
};
pub use common::*;
pub use config::{load_config, save_config, Config, DeinterleaveConfig, SimulationConfig};
pub use dbscan::Dbscan;
pub use deinterleave::{DataSource, DeinterleaveRequest, Deinterleaved, Deinterleaver};
pub use emitter::{Behavior, BehaviorMix, Emitter, ParameterRange, ParameterRanges};
pub use error::{Error, Result};
pub use features::{scaled_features, FeatureMatrix, Raw, Standardized, Standardizer};
#[cfg(feature = "hdbscan")]
pub use hierarchical::Hdbscan;
pub use kmeans::KMeans;
pub use simulation::{
    generate_window, AutoPopulation, Jitter, ManualPopulation, Mode, Population,
    SimulationSession, Simulator, Window,
};
pub use stats::{ClusterStats, FeatureStats};
pub use stream::StreamBuffer;
pub use tune::{tune, TuningCache, TuningResult};
pub use workspace::{sanitize_user, Workspace, DEINTERLEAVED_FILE};
