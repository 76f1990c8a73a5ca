use ndarray::{Array2, ArrayView2, Axis};
use ndarray_rand::rand::distributions::{Distribution, WeightedIndex};
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::{Rng, SeedableRng};

use crate::cluster::{squared_distance, Algorithm, Clusterer, RawLabel};
use crate::common::Real;
use crate::error::{Error, Result};

const MAX_ITERATIONS: usize = 300;
const TOLERANCE: Real = 1e-8;

/// Lloyd's k-means with k-means++ seeding. Deterministic for a given seed.
#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    seed: u64,
    max_iterations: usize,
}

impl KMeans {
    pub fn new(k: usize, seed: u64) -> Self {
        Self {
            k,
            seed,
            max_iterations: MAX_ITERATIONS,
        }
    }

    fn nearest(&self, point: ndarray::ArrayView1<Real>, centroids: &Array2<Real>) -> (usize, Real) {
        centroids
            .outer_iter()
            .enumerate()
            .map(|(index, centroid)| (index, squared_distance(point, centroid)))
            .fold((0, Real::INFINITY), |best, candidate| {
                if candidate.1 < best.1 {
                    candidate
                } else {
                    best
                }
            })
    }

    fn seed_centroids(&self, data: &ArrayView2<Real>, rng: &mut StdRng) -> Array2<Real> {
        let n = data.nrows();
        let mut centroids = Array2::zeros((self.k, data.ncols()));
        centroids.row_mut(0).assign(&data.row(rng.gen_range(0..n)));

        for c in 1..self.k {
            let chosen = centroids.slice(ndarray::s![..c, ..]).to_owned();
            let weights: Vec<Real> = data
                .outer_iter()
                .map(|point| self.nearest(point, &chosen).1)
                .collect();
            let next = match WeightedIndex::new(&weights) {
                Ok(dist) => dist.sample(rng),
                // Every point already coincides with a centroid.
                Err(_) => rng.gen_range(0..n),
            };
            centroids.row_mut(c).assign(&data.row(next));
        }
        centroids
    }
}

impl Clusterer for KMeans {
    fn fit_predict(&self, data: ArrayView2<Real>) -> Result<Vec<RawLabel>> {
        let n = data.nrows();
        if self.k == 0 || self.k > n {
            return Err(Error::InvalidParameters {
                algorithm: Algorithm::KMeans,
                reason: format!("k must be between 1 and {}, got {}", n, self.k),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = self.seed_centroids(&data, &mut rng);
        let mut assignments = vec![0usize; n];

        for iteration in 0..self.max_iterations {
            let mut changed = false;
            for (i, point) in data.outer_iter().enumerate() {
                let (nearest, _) = self.nearest(point, &centroids);
                if assignments[i] != nearest {
                    assignments[i] = nearest;
                    changed = true;
                }
            }

            let mut updated = centroids.clone();
            for (c, mut centroid) in updated.outer_iter_mut().enumerate() {
                let members: Vec<usize> = (0..n).filter(|&i| assignments[i] == c).collect();
                // An emptied cluster keeps its previous centre.
                if let Some(mean) = data.select(Axis(0), &members).mean_axis(Axis(0)) {
                    centroid.assign(&mean);
                }
            }

            let shift: Real = centroids
                .outer_iter()
                .zip(updated.outer_iter())
                .map(|(old, new)| squared_distance(old, new))
                .sum();
            centroids = updated;

            if (!changed && iteration > 0) || shift < TOLERANCE {
                break;
            }
        }

        Ok(assignments.into_iter().map(|a| a as RawLabel).collect())
    }
}
