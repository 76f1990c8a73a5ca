use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cluster::{Algorithm, ClusterParams, ClusteringRun, DEFAULT_MIN_SAMPLES};
use crate::common::{Real, Storable};
use crate::deinterleave::DataSource;
use crate::error::{Error, Result};

/// Best candidate of a parameter sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome<P> {
    pub best: P,
    pub error: usize,
    pub evaluated: usize,
}

/// Walks `candidates` in order and keeps the one with the smallest objective.
///
/// Ties go to the earliest candidate and a zero stops the sweep at once.
/// Candidates for which `objective` returns `None` are skipped.
pub fn search<P, I, F>(candidates: I, mut objective: F) -> Option<SearchOutcome<P>>
where
    I: IntoIterator<Item = P>,
    F: FnMut(&P) -> Option<usize>,
{
    let mut best: Option<SearchOutcome<P>> = None;
    let mut evaluated = 0;

    for candidate in candidates {
        evaluated += 1;
        let error = match objective(&candidate) {
            Some(error) => error,
            None => continue,
        };
        if best.as_ref().map_or(true, |b| error < b.error) {
            best = Some(SearchOutcome {
                best: candidate,
                error,
                evaluated,
            });
        }
        if error == 0 {
            break;
        }
    }

    best.map(|outcome| SearchOutcome {
        evaluated,
        ..outcome
    })
}

/// HDBSCAN sweep: `min_cluster_size` from 2 to 39, `min_samples` following it.
pub fn hdbscan_candidates() -> impl Iterator<Item = ClusterParams> {
    (2..=39).map(|size| ClusterParams::Hdbscan {
        min_cluster_size: size,
        min_samples: size,
    })
}

/// DBSCAN sweep: `eps` from 0.1 to 2.9 in steps of 0.1 with `min_samples` at 5.
pub fn dbscan_candidates() -> impl Iterator<Item = ClusterParams> {
    (1..=29).map(|step| ClusterParams::Dbscan {
        eps: step as Real / 10.0,
        min_samples: DEFAULT_MIN_SAMPLES,
    })
}

pub fn candidates(algorithm: Algorithm, known_emitters: usize, seed: u64) -> Vec<ClusterParams> {
    match algorithm {
        Algorithm::KMeans => vec![ClusterParams::KMeans {
            k: known_emitters,
            seed,
        }],
        Algorithm::Dbscan => dbscan_candidates().collect(),
        Algorithm::Hdbscan => hdbscan_candidates().collect(),
    }
}

pub type TuningResult = SearchOutcome<ClusterParams>;

/// Searches parameters of `algorithm` that reproduce `known_emitters` clusters
/// on already scaled features.
pub fn tune(
    algorithm: Algorithm,
    data: ArrayView2<Real>,
    known_emitters: usize,
    seed: u64,
) -> Result<TuningResult> {
    let outcome = search(candidates(algorithm, known_emitters, seed), |params| {
        match ClusteringRun::execute(params, data) {
            Ok(run) => {
                let error = run.n_clusters.abs_diff(known_emitters);
                debug!(%params, clusters = run.n_clusters, error, "tuning candidate");
                Some(error)
            }
            Err(e) => {
                warn!(%params, error = %e, "skipping tuning candidate");
                None
            }
        }
    })
    .ok_or(Error::Tuning(algorithm))?;

    info!(
        best = %outcome.best,
        error = outcome.error,
        evaluated = outcome.evaluated,
        known_emitters,
        "parameter search finished"
    );
    Ok(outcome)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheEntry {
    source: DataSource,
    algorithm: Algorithm,
    fingerprint: u64,
    known_emitters: usize,
    result: TuningResult,
}

/// Tuned parameters per data source and algorithm, valid until the source
/// data changes. Persisted between runs as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TuningCache {
    entries: Vec<CacheEntry>,
}

impl Storable for TuningCache {}

impl TuningCache {
    pub const FILE: &'static str = "tuning_cache.json";

    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, source: &DataSource, algorithm: Algorithm) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| &entry.source == source && entry.algorithm == algorithm)
    }

    pub fn get(
        &mut self,
        source: &DataSource,
        algorithm: Algorithm,
        fingerprint: u64,
        known_emitters: usize,
    ) -> Option<TuningResult> {
        let index = self.position(source, algorithm)?;
        let entry = &self.entries[index];
        if entry.fingerprint == fingerprint && entry.known_emitters == known_emitters {
            debug!(%source, %algorithm, best = %entry.result.best, "reusing tuned parameters");
            Some(entry.result)
        } else {
            debug!(%source, %algorithm, "source changed, dropping tuned parameters");
            self.entries.swap_remove(index);
            None
        }
    }

    pub fn insert(
        &mut self,
        source: &DataSource,
        algorithm: Algorithm,
        fingerprint: u64,
        known_emitters: usize,
        result: TuningResult,
    ) {
        let entry = CacheEntry {
            source: source.clone(),
            algorithm,
            fingerprint,
            known_emitters,
            result,
        };
        match self.position(source, algorithm) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
    }

    /// Forgets everything tuned on `source`.
    pub fn invalidate(&mut self, source: &DataSource) {
        self.entries.retain(|entry| &entry.source != source);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn search_stops_at_first_exact_match() {
        let errors = [2, 1, 0, 0, 1];
        let mut seen = Vec::new();
        let outcome = search(0..errors.len(), |&i| {
            seen.push(i);
            Some(errors[i])
        })
        .unwrap();
        assert_eq!(outcome.best, 2);
        assert_eq!(outcome.error, 0);
        assert_eq!(outcome.evaluated, 3);
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn search_keeps_first_minimum_and_runs_to_end_without_match() {
        let errors = [5, 3, 2, 4, 2, 7];
        let outcome = search(0..errors.len(), |&i| Some(errors[i])).unwrap();
        assert_eq!(outcome.best, 2);
        assert_eq!(outcome.error, 2);
        assert_eq!(outcome.evaluated, errors.len());
    }

    #[test]
    fn search_skips_failed_candidates() {
        let outcome = search(0..4, |&i| if i < 2 { None } else { Some(i) }).unwrap();
        assert_eq!(outcome.best, 2);
        assert!(search(0..3, |_| None::<usize>).is_none());
    }

    #[test]
    fn sweeps_have_expected_shape() {
        let hdbscan: Vec<_> = hdbscan_candidates().collect();
        assert_eq!(hdbscan.len(), 38);
        assert_eq!(
            hdbscan[0],
            ClusterParams::Hdbscan {
                min_cluster_size: 2,
                min_samples: 2
            }
        );
        assert_eq!(
            hdbscan[37],
            ClusterParams::Hdbscan {
                min_cluster_size: 39,
                min_samples: 39
            }
        );

        let dbscan: Vec<_> = dbscan_candidates().collect();
        assert_eq!(dbscan.len(), 29);
        assert_eq!(
            dbscan[0],
            ClusterParams::Dbscan {
                eps: 0.1,
                min_samples: 5
            }
        );
        assert_eq!(
            dbscan[28],
            ClusterParams::Dbscan {
                eps: 2.9,
                min_samples: 5
            }
        );
    }

    #[test]
    fn cache_is_dropped_when_data_changes() {
        let mut cache = TuningCache::new();
        let result = TuningResult {
            best: ClusterParams::Dbscan {
                eps: 0.3,
                min_samples: 5,
            },
            error: 0,
            evaluated: 3,
        };
        cache.insert(&DataSource::Auto, Algorithm::Dbscan, 1, 3, result);
        assert_eq!(cache.get(&DataSource::Auto, Algorithm::Dbscan, 1, 3), Some(result));
        assert_eq!(cache.get(&DataSource::Manual, Algorithm::Dbscan, 1, 3), None);
        assert_eq!(cache.get(&DataSource::Auto, Algorithm::Hdbscan, 1, 3), None);
        assert_eq!(cache.get(&DataSource::Auto, Algorithm::Dbscan, 2, 3), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_survives_json() {
        let mut cache = TuningCache::new();
        let result = TuningResult {
            best: ClusterParams::Dbscan {
                eps: 0.4,
                min_samples: 5,
            },
            error: 0,
            evaluated: 4,
        };
        cache.insert(&DataSource::Manual, Algorithm::Dbscan, 11, 3, result);
        cache.insert(&DataSource::File("upload.csv".into()), Algorithm::Dbscan, 12, 2, result);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TuningCache::FILE);
        cache.to_file(&path).unwrap();
        let mut loaded = TuningCache::from_file(&path).unwrap();
        assert_eq!(loaded, cache);
        assert_eq!(loaded.get(&DataSource::Manual, Algorithm::Dbscan, 11, 3), Some(result));
    }

    /// Three rows of points 0.12 apart: eps 0.1 and 0.2 leave every point
    /// with fewer than five neighbours, eps 0.3 reaches two on each side.
    fn three_rows() -> Array2<Real> {
        Array2::from_shape_fn((60, 2), |(i, j)| {
            if j == 0 {
                0.12 * (i % 20) as Real
            } else {
                10.0 * (i / 20) as Real
            }
        })
    }

    #[test]
    fn dbscan_sweep_stops_at_first_exact_eps() {
        let data = three_rows();
        let outcome = tune(Algorithm::Dbscan, data.view(), 3, 42).unwrap();
        assert_eq!(
            outcome.best,
            ClusterParams::Dbscan {
                eps: 0.3,
                min_samples: 5
            }
        );
        assert_eq!(outcome.error, 0);
        assert_eq!(outcome.evaluated, 3);
    }

    #[test]
    fn dbscan_sweep_keeps_closest_count_without_match() {
        let data = three_rows();
        let outcome = tune(Algorithm::Dbscan, data.view(), 5, 42).unwrap();
        assert_eq!(outcome.error, 2);
        assert_eq!(outcome.evaluated, 29);
        assert_eq!(
            outcome.best,
            ClusterParams::Dbscan {
                eps: 0.3,
                min_samples: 5
            }
        );
    }

    #[test]
    fn invalidate_only_touches_one_source() {
        let mut cache = TuningCache::new();
        let result = TuningResult {
            best: ClusterParams::Hdbscan {
                min_cluster_size: 4,
                min_samples: 4,
            },
            error: 1,
            evaluated: 38,
        };
        cache.insert(&DataSource::Auto, Algorithm::Hdbscan, 7, 2, result);
        cache.insert(&DataSource::Manual, Algorithm::Hdbscan, 7, 2, result);
        cache.invalidate(&DataSource::Auto);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&DataSource::Manual, Algorithm::Hdbscan, 7, 2).is_some());
    }
}
