use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView1;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::common::Real;
use crate::dbscan::Dbscan;
use crate::error::{Error, Result};
use crate::kmeans::KMeans;

/// Label as produced by a clustering algorithm; `NOISE` marks unassigned points.
pub type RawLabel = i32;
pub const NOISE: RawLabel = -1;

pub const DEFAULT_EPS: Real = 0.7;
pub const DEFAULT_MIN_SAMPLES: usize = 5;
pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Partition into a fixed number of groups
    KMeans,
    /// Fixed-radius density clustering
    Dbscan,
    /// Hierarchical density clustering
    Hdbscan,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::KMeans, Algorithm::Dbscan, Algorithm::Hdbscan];

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::KMeans => "kmeans",
            Algorithm::Dbscan => "dbscan",
            Algorithm::Hdbscan => "hdbscan",
        }
    }

    pub fn is_density_based(self) -> bool {
        !matches!(self, Algorithm::KMeans)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::KMeans => write!(f, "k-means"),
            Algorithm::Dbscan => write!(f, "DBSCAN"),
            Algorithm::Hdbscan => write!(f, "HDBSCAN"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.to_ascii_lowercase().replace('-', "");
        Algorithm::ALL
            .iter()
            .copied()
            .find(|algorithm| algorithm.name() == normalized)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown algorithm '{}'", s)))
    }
}

/// Algorithms compiled into this build. Resolved once and then fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    algorithms: Vec<Algorithm>,
}

impl Capabilities {
    pub fn detect() -> Self {
        let algorithms = Algorithm::ALL
            .iter()
            .copied()
            .filter(|&algorithm| algorithm != Algorithm::Hdbscan || cfg!(feature = "hdbscan"))
            .collect();
        Self { algorithms }
    }

    #[cfg(test)]
    pub(crate) fn from_algorithms(algorithms: Vec<Algorithm>) -> Self {
        Self { algorithms }
    }

    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    pub fn supports(&self, algorithm: Algorithm) -> bool {
        self.algorithms.contains(&algorithm)
    }
}

pub trait Clusterer {
    /// One raw label per row of `data`, in row order.
    fn fit_predict(&self, data: ArrayView2<Real>) -> Result<Vec<RawLabel>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum ClusterParams {
    KMeans { k: usize, seed: u64 },
    Dbscan { eps: Real, min_samples: usize },
    Hdbscan { min_cluster_size: usize, min_samples: usize },
}

impl ClusterParams {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            ClusterParams::KMeans { .. } => Algorithm::KMeans,
            ClusterParams::Dbscan { .. } => Algorithm::Dbscan,
            ClusterParams::Hdbscan { .. } => Algorithm::Hdbscan,
        }
    }

    /// Untuned parameters for `algorithm`. k-means needs a group count, which
    /// falls back to the known emitter count.
    pub fn defaults(algorithm: Algorithm, known_emitters: Option<usize>, seed: u64) -> Result<Self> {
        match algorithm {
            Algorithm::KMeans => known_emitters
                .map(|k| ClusterParams::KMeans { k, seed })
                .ok_or_else(|| Error::InvalidParameters {
                    algorithm,
                    reason: "k must be given when the emitter count is unknown".to_string(),
                }),
            Algorithm::Dbscan => Ok(ClusterParams::Dbscan {
                eps: DEFAULT_EPS,
                min_samples: DEFAULT_MIN_SAMPLES,
            }),
            Algorithm::Hdbscan => Ok(ClusterParams::Hdbscan {
                min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
                min_samples: DEFAULT_MIN_SAMPLES,
            }),
        }
    }

    pub fn clusterer(&self) -> Result<Box<dyn Clusterer>> {
        match *self {
            ClusterParams::KMeans { k, seed } => Ok(Box::new(KMeans::new(k, seed))),
            ClusterParams::Dbscan { eps, min_samples } => Ok(Box::new(Dbscan::new(eps, min_samples))),
            #[cfg(feature = "hdbscan")]
            ClusterParams::Hdbscan {
                min_cluster_size,
                min_samples,
            } => Ok(Box::new(crate::hierarchical::Hdbscan::new(
                min_cluster_size,
                min_samples,
            ))),
            #[cfg(not(feature = "hdbscan"))]
            ClusterParams::Hdbscan { .. } => Err(Error::Unavailable(Algorithm::Hdbscan)),
        }
    }
}

impl fmt::Display for ClusterParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterParams::KMeans { k, seed } => write!(f, "k-means(k={}, seed={})", k, seed),
            ClusterParams::Dbscan { eps, min_samples } => {
                write!(f, "DBSCAN(eps={:.1}, min_samples={})", eps, min_samples)
            }
            ClusterParams::Hdbscan {
                min_cluster_size,
                min_samples,
            } => write!(
                f,
                "HDBSCAN(min_cluster_size={}, min_samples={})",
                min_cluster_size, min_samples
            ),
        }
    }
}

/// Emitter assignment of one pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    Unassigned,
    /// Emitter id, starting at 1
    Assigned(u32),
}

impl Label {
    /// Numeric form used in tables: 0 for unassigned pulses.
    pub fn id(self) -> u32 {
        match self {
            Label::Unassigned => 0,
            Label::Assigned(id) => id,
        }
    }
}

/// Maps noise to `Unassigned` and every other raw label, in ascending order,
/// to consecutive ids from 1.
pub fn normalize_labels(raw: &[RawLabel]) -> Vec<Label> {
    let distinct: Vec<RawLabel> = raw
        .iter()
        .copied()
        .filter(|&label| label != NOISE)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    raw.iter()
        .map(|&label| {
            if label == NOISE {
                Label::Unassigned
            } else {
                // Present by construction.
                let position = distinct.binary_search(&label).unwrap_or_default();
                Label::Assigned(position as u32 + 1)
            }
        })
        .collect()
}

/// Number of distinct non-noise labels.
pub fn count_clusters(raw: &[RawLabel]) -> usize {
    raw.iter()
        .filter(|&&label| label != NOISE)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Outcome of a single clustering pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteringRun {
    pub params: ClusterParams,
    pub labels: Vec<Label>,
    pub n_clusters: usize,
    pub n_noise: usize,
}

impl ClusteringRun {
    pub fn execute(params: &ClusterParams, data: ArrayView2<Real>) -> Result<Self> {
        let raw = params.clusterer()?.fit_predict(data)?;
        let labels = normalize_labels(&raw);
        Ok(Self {
            params: *params,
            n_clusters: count_clusters(&raw),
            n_noise: labels.iter().filter(|&&l| l == Label::Unassigned).count(),
            labels,
        })
    }
}

/// Headline numbers of a de-interleaving pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_pulses: usize,
    pub detected_emitters: usize,
    pub noise_pulses: usize,
    pub known_emitters: Option<usize>,
}

impl Summary {
    pub fn new(run: &ClusteringRun, known_emitters: Option<usize>) -> Self {
        Self {
            total_pulses: run.labels.len(),
            detected_emitters: run.n_clusters,
            noise_pulses: run.n_noise,
            known_emitters,
        }
    }

    pub fn matches_known(&self) -> Option<bool> {
        self.known_emitters
            .map(|known| known == self.detected_emitters)
    }
}

pub(crate) fn squared_distance(a: ArrayView1<Real>, b: ArrayView1<Real>) -> Real {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
