use core::marker::PhantomData;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::Serialize;

use crate::common::{Feature, Real};
use crate::error::{Error, Result};
use crate::stream::StreamBuffer;

#[derive(Debug, Serialize)]
pub struct Raw {}

#[derive(Debug, Serialize)]
pub struct Standardized {}

/// Pulse attributes laid out one row per pulse, in buffer order.
#[derive(Debug, Serialize)]
pub struct FeatureMatrix<D> {
    pub features: Vec<Feature>,
    pub matrix: Array2<Real>,
    _domain: PhantomData<D>,
}

impl<D> FeatureMatrix<D> {
    fn new(features: Vec<Feature>, matrix: Array2<Real>) -> Self {
        Self {
            features,
            matrix,
            _domain: PhantomData,
        }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.matrix.nrows(), self.matrix.ncols())
    }

    pub fn view(&self) -> ArrayView2<'_, Real> {
        self.matrix.view()
    }
}

/// Resolves the requested attributes against what the buffer carries.
///
/// Duplicates collapse to their first occurrence and attributes missing from
/// the buffer are dropped without complaint.
pub fn select(requested: &[Feature], buffer: &StreamBuffer) -> Result<Vec<Feature>> {
    if requested.is_empty() {
        return Err(Error::NoFeatures);
    }
    let mut selected: Vec<Feature> = Vec::with_capacity(requested.len());
    for &feature in requested {
        if buffer.has(feature) && !selected.contains(&feature) {
            selected.push(feature);
        }
    }
    if selected.is_empty() {
        return Err(Error::NoFeatures);
    }
    Ok(selected)
}

impl FeatureMatrix<Raw> {
    pub fn from_buffer(buffer: &StreamBuffer, features: &[Feature]) -> Self {
        let pulses = buffer.pulses();
        let matrix = Array2::from_shape_fn((pulses.len(), features.len()), |(row, col)| {
            pulses[row].feature(features[col])
        });
        Self::new(features.to_vec(), matrix)
    }

    pub fn standardize(self) -> FeatureMatrix<Standardized> {
        let scaler = Standardizer::fit(&self.matrix);
        FeatureMatrix::new(self.features, scaler.transform(&self.matrix))
    }
}

impl From<FeatureMatrix<Raw>> for FeatureMatrix<Standardized> {
    fn from(raw: FeatureMatrix<Raw>) -> Self {
        raw.standardize()
    }
}

/// Per-column zero mean, unit variance scaling. Fitted on the data it is
/// applied to; nothing is kept between runs.
#[derive(Debug, Clone)]
pub struct Standardizer {
    pub mean: Array1<Real>,
    pub scale: Array1<Real>,
}

impl Standardizer {
    pub fn fit(matrix: &Array2<Real>) -> Self {
        let ncols = matrix.ncols();
        let mean = matrix
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(ncols));
        // Constant columns are centred but not scaled.
        let scale = if matrix.nrows() == 0 {
            Array1::ones(ncols)
        } else {
            matrix
                .std_axis(Axis(0), 0.0)
                .mapv(|std| if std > Real::EPSILON { std } else { 1.0 })
        };
        Self { mean, scale }
    }

    pub fn transform(&self, matrix: &Array2<Real>) -> Array2<Real> {
        (matrix - &self.mean) / &self.scale
    }
}

/// Selects, extracts and standardizes the clustering input for a buffer.
pub fn scaled_features(
    buffer: &StreamBuffer,
    requested: &[Feature],
) -> Result<FeatureMatrix<Standardized>> {
    if requested.is_empty() {
        return Err(Error::NoFeatures);
    }
    if buffer.is_empty() {
        return Err(Error::NoData);
    }
    let features = select(requested, buffer)?;
    Ok(FeatureMatrix::from_buffer(buffer, &features).into())
}
