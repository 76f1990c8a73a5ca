use std::collections::BTreeMap;

use ndarray::Array1;
use serde::Serialize;

use crate::cluster::Label;
use crate::common::{Feature, PulseRecord, Real};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureStats {
    pub feature: Feature,
    pub mean: Real,
    /// Sample standard deviation; 0 for a single pulse.
    pub std: Real,
}

/// Consistency of the pulses assigned to one output id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStats {
    pub emitter_id: u32,
    pub pulses: usize,
    pub features: Vec<FeatureStats>,
}

impl ClusterStats {
    pub fn feature(&self, feature: Feature) -> Option<&FeatureStats> {
        self.features.iter().find(|stats| stats.feature == feature)
    }
}

/// Frequency and PRI are always reported, followed by any other feature used.
pub fn reported_features(used: &[Feature]) -> Vec<Feature> {
    let mut reported = vec![Feature::Frequency, Feature::Pri];
    for &feature in used {
        if !reported.contains(&feature) {
            reported.push(feature);
        }
    }
    reported
}

/// Per-cluster count, mean and standard deviation, ordered by emitter id.
pub fn cluster_statistics(
    pulses: &[PulseRecord],
    labels: &[Label],
    features: &[Feature],
) -> Vec<ClusterStats> {
    let mut members: BTreeMap<u32, Vec<&PulseRecord>> = BTreeMap::new();
    for (pulse, label) in pulses.iter().zip(labels) {
        members.entry(label.id()).or_default().push(pulse);
    }

    members
        .into_iter()
        .map(|(emitter_id, group)| ClusterStats {
            emitter_id,
            pulses: group.len(),
            features: features
                .iter()
                .map(|&feature| {
                    let values: Array1<Real> = group.iter().map(|p| p.feature(feature)).collect();
                    FeatureStats {
                        feature,
                        mean: values.mean().unwrap_or(0.0),
                        std: if values.len() > 1 { values.std(1.0) } else { 0.0 },
                    }
                })
                .collect(),
        })
        .collect()
}
