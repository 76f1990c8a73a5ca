use std::collections::VecDeque;

use ndarray::ArrayView2;

use crate::cluster::{squared_distance, Algorithm, Clusterer, RawLabel, NOISE};
use crate::common::Real;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Point {
    Unvisited,
    Noise,
    Member(RawLabel),
}

/// Density-based clustering with a fixed neighbourhood radius.
///
/// A point is a core point when at least `min_samples` points, itself
/// included, lie within `eps`. Points not reachable from any core point are
/// labelled `NOISE`.
#[derive(Debug, Clone)]
pub struct Dbscan {
    eps: Real,
    min_samples: usize,
}

impl Dbscan {
    pub fn new(eps: Real, min_samples: usize) -> Self {
        Self { eps, min_samples }
    }

    fn region_query(&self, data: &ArrayView2<Real>, index: usize) -> Vec<usize> {
        let eps_sq = self.eps * self.eps;
        let point = data.row(index);
        data.outer_iter()
            .enumerate()
            .filter(|(_, other)| squared_distance(point, *other) <= eps_sq)
            .map(|(i, _)| i)
            .collect()
    }
}

impl Clusterer for Dbscan {
    fn fit_predict(&self, data: ArrayView2<Real>) -> Result<Vec<RawLabel>> {
        if !(self.eps > 0.0) || !self.eps.is_finite() || self.min_samples == 0 {
            return Err(Error::InvalidParameters {
                algorithm: Algorithm::Dbscan,
                reason: format!(
                    "eps must be positive and min_samples at least 1, got eps={} min_samples={}",
                    self.eps, self.min_samples
                ),
            });
        }

        let n = data.nrows();
        let mut points = vec![Point::Unvisited; n];
        let mut cluster: RawLabel = 0;

        for i in 0..n {
            if points[i] != Point::Unvisited {
                continue;
            }
            let neighbors = self.region_query(&data, i);
            if neighbors.len() < self.min_samples {
                points[i] = Point::Noise;
                continue;
            }

            points[i] = Point::Member(cluster);
            let mut seeds: VecDeque<usize> = VecDeque::new();
            for q in neighbors {
                match points[q] {
                    Point::Unvisited => {
                        points[q] = Point::Member(cluster);
                        seeds.push_back(q);
                    }
                    // Border point of this cluster.
                    Point::Noise => points[q] = Point::Member(cluster),
                    Point::Member(_) => {}
                }
            }

            while let Some(q) = seeds.pop_front() {
                let q_neighbors = self.region_query(&data, q);
                if q_neighbors.len() < self.min_samples {
                    continue;
                }
                for r in q_neighbors {
                    match points[r] {
                        Point::Unvisited => {
                            points[r] = Point::Member(cluster);
                            seeds.push_back(r);
                        }
                        Point::Noise => points[r] = Point::Member(cluster),
                        Point::Member(_) => {}
                    }
                }
            }
            cluster += 1;
        }

        Ok(points
            .into_iter()
            .map(|point| match point {
                Point::Member(label) => label,
                _ => NOISE,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn isolated_point_is_noise() {
        let data = array![[0.0, 0.0], [0.1, 0.0], [0.0, 0.1], [9.0, 9.0]];
        let labels = Dbscan::new(0.5, 3).fit_predict(data.view()).unwrap();
        assert_eq!(labels, vec![0, 0, 0, NOISE]);
    }

    #[test]
    fn border_points_join_the_cluster() {
        // Points 0..=2 are core; point 3 only sees point 2 and itself.
        let data = array![[0.0], [0.1], [0.2], [0.6]];
        let labels = Dbscan::new(0.45, 3).fit_predict(data.view()).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 0]);
    }

    #[test]
    fn chains_connect_through_core_points() {
        let data = Array2::from_shape_fn((20, 1), |(i, _)| i as Real * 0.5);
        let labels = Dbscan::new(0.6, 2).fit_predict(data.view()).unwrap();
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn rejects_non_positive_eps() {
        let data = array![[0.0]];
        assert!(Dbscan::new(0.0, 5).fit_predict(data.view()).is_err());
        assert!(Dbscan::new(0.5, 0).fit_predict(data.view()).is_err());
    }
}
