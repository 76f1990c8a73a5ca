use hdbscan::{Hdbscan as HdbscanClusterer, HdbscanHyperParams};
use ndarray::ArrayView2;

use crate::cluster::{Algorithm, Clusterer, RawLabel, NOISE};
use crate::common::Real;
use crate::error::{Error, Result};

/// Hierarchical density clustering backed by the `hdbscan` crate.
#[derive(Debug, Clone)]
pub struct Hdbscan {
    min_cluster_size: usize,
    min_samples: usize,
}

impl Hdbscan {
    pub fn new(min_cluster_size: usize, min_samples: usize) -> Self {
        Self {
            min_cluster_size,
            min_samples,
        }
    }
}

impl Clusterer for Hdbscan {
    fn fit_predict(&self, data: ArrayView2<Real>) -> Result<Vec<RawLabel>> {
        if self.min_cluster_size < 2 || self.min_samples == 0 {
            return Err(Error::InvalidParameters {
                algorithm: Algorithm::Hdbscan,
                reason: format!(
                    "min_cluster_size must be at least 2 and min_samples at least 1, got {} and {}",
                    self.min_cluster_size, self.min_samples
                ),
            });
        }

        let n = data.nrows();
        // Too few points to hold a single cluster of the requested size.
        if n < self.min_cluster_size || n <= self.min_samples {
            return Ok(vec![NOISE; n]);
        }

        let rows: Vec<Vec<Real>> = data.outer_iter().map(|row| row.to_vec()).collect();
        let hyper_params = HdbscanHyperParams::builder()
            .min_cluster_size(self.min_cluster_size)
            .min_samples(self.min_samples)
            .build();

        HdbscanClusterer::new(&rows, hyper_params)
            .cluster()
            .map_err(|e| Error::Clustering {
                algorithm: Algorithm::Hdbscan,
                reason: format!("{:?}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use ndarray_rand::rand::rngs::StdRng;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use std::collections::BTreeSet;

    fn three_groups() -> Array2<Real> {
        let mut rng = StdRng::seed_from_u64(11);
        let centres = [(0.0, 0.0), (20.0, 0.0), (0.0, 20.0)];
        let noise = Array2::<Real>::random_using((90, 2), Normal::new(0.0, 0.5).unwrap(), &mut rng);
        Array2::from_shape_fn((90, 2), |(i, j)| {
            let (cx, cy) = centres[i / 30];
            noise[[i, j]] + if j == 0 { cx } else { cy }
        })
    }

    #[test]
    fn finds_separated_groups() {
        let data = three_groups();
        let labels = Hdbscan::new(12, 5).fit_predict(data.view()).unwrap();
        let clusters: BTreeSet<_> = labels.iter().filter(|&&l| l != NOISE).collect();
        assert_eq!(clusters.len(), 3);
        for group in labels.chunks(30) {
            let ids: BTreeSet<_> = group.iter().filter(|&&l| l != NOISE).collect();
            assert_eq!(ids.len(), 1);
        }
    }

    #[test]
    fn tiny_input_is_all_noise() {
        let data = Array2::zeros((3, 2));
        let labels = Hdbscan::new(5, 5).fit_predict(data.view()).unwrap();
        assert_eq!(labels, vec![NOISE; 3]);
    }

    #[test]
    fn rejects_single_point_clusters() {
        let data = three_groups();
        assert!(Hdbscan::new(1, 1).fit_predict(data.view()).is_err());
    }
}
