use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cluster::{Algorithm, Capabilities, ClusterParams, ClusteringRun, Label, Summary};
use crate::common::{Feature, PulseRecord, Real};
use crate::error::{Error, Result};
use crate::features::scaled_features;
use crate::stats::{cluster_statistics, reported_features, ClusterStats};
use crate::stream::StreamBuffer;
use crate::tune::{tune, TuningCache, TuningResult};

/// Where the pulses to de-interleave come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Buffer of the auto-generated simulation
    Auto,
    /// Buffer of the manually configured simulation
    Manual,
    /// Uploaded pulse table
    File(PathBuf),
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Auto => write!(f, "auto"),
            DataSource::Manual => write!(f, "manual"),
            DataSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl std::str::FromStr for DataSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "auto" => DataSource::Auto,
            "manual" => DataSource::Manual,
            path => DataSource::File(PathBuf::from(path)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeinterleaveRequest {
    pub features: Vec<Feature>,
    pub algorithm: Algorithm,
    /// Explicit parameters; take precedence over tuned ones.
    pub params: Option<ClusterParams>,
    pub known_emitters: Option<usize>,
    pub auto_tune: bool,
    pub seed: u64,
}

impl Default for DeinterleaveRequest {
    fn default() -> Self {
        Self {
            features: vec![Feature::Frequency, Feature::Pri],
            algorithm: Algorithm::Dbscan,
            params: None,
            known_emitters: None,
            auto_tune: true,
            seed: 42,
        }
    }
}

/// Result of one de-interleaving pass, labels in buffer order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deinterleaved {
    pub features: Vec<Feature>,
    pub params: ClusterParams,
    pub tuning: Option<TuningResult>,
    pub labels: Vec<Label>,
    pub summary: Summary,
    pub stats: Vec<ClusterStats>,
}

#[derive(Debug, Serialize)]
struct LabelledRow {
    #[serde(rename = "freq_MHz")]
    freq_mhz: Real,
    pri_us: Real,
    pw_us: Real,
    doa_deg: Real,
    #[serde(rename = "amp_dB")]
    amp_db: Real,
    toa_us: Real,
    #[serde(rename = "Emitter_ID")]
    emitter_id: u32,
}

impl LabelledRow {
    fn new(pulse: &PulseRecord, label: Label) -> Self {
        let pulse = pulse.rounded();
        Self {
            freq_mhz: pulse.freq_mhz,
            pri_us: pulse.pri_us,
            pw_us: pulse.pw_us,
            doa_deg: pulse.doa_deg,
            amp_db: pulse.amp_db,
            toa_us: pulse.toa_us,
            emitter_id: label.id(),
        }
    }
}

impl Deinterleaved {
    /// Writes `pulses` with an `Emitter_ID` column appended. `pulses` must be
    /// the buffer the labels were computed on.
    pub fn to_writer<W: Write>(&self, pulses: &[PulseRecord], writer: W) -> Result<()> {
        if pulses.len() != self.labels.len() {
            return Err(Error::InvalidConfig(format!(
                "{} labels cannot annotate {} pulses",
                self.labels.len(),
                pulses.len()
            )));
        }
        let mut wtr = csv::Writer::from_writer(writer);
        for (pulse, &label) in pulses.iter().zip(&self.labels) {
            wtr.serialize(LabelledRow::new(pulse, label))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, pulses: &[PulseRecord], path: &Path) -> Result<()> {
        self.to_writer(pulses, File::create(path)?)
    }
}

/// Runs the feature, clustering and tuning stages and remembers tuned
/// parameters between runs.
#[derive(Debug, Clone)]
pub struct Deinterleaver {
    capabilities: Capabilities,
    cache: TuningCache,
}

impl Default for Deinterleaver {
    fn default() -> Self {
        Self::new(Capabilities::detect())
    }
}

impl Deinterleaver {
    pub fn new(capabilities: Capabilities) -> Self {
        Self::with_cache(capabilities, TuningCache::new())
    }

    /// Starts from parameters tuned in earlier runs.
    pub fn with_cache(capabilities: Capabilities, cache: TuningCache) -> Self {
        Self { capabilities, cache }
    }

    pub fn cache(&self) -> &TuningCache {
        &self.cache
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Drops tuned parameters of a source whose data was reloaded.
    pub fn invalidate(&mut self, source: &DataSource) {
        self.cache.invalidate(source);
    }

    pub fn run(
        &mut self,
        source: &DataSource,
        buffer: &StreamBuffer,
        request: &DeinterleaveRequest,
    ) -> Result<Deinterleaved> {
        let algorithm = request.algorithm;
        if !self.capabilities.supports(algorithm) {
            return Err(Error::Unavailable(algorithm));
        }
        if let Some(params) = &request.params {
            if params.algorithm() != algorithm {
                return Err(Error::InvalidParameters {
                    algorithm,
                    reason: format!("got parameters for {}", params.algorithm()),
                });
            }
        }

        let scaled = scaled_features(buffer, &request.features)?;

        let tuning = match request.known_emitters {
            Some(known) if request.auto_tune => {
                let fingerprint = buffer.fingerprint();
                match self.cache.get(source, algorithm, fingerprint, known) {
                    Some(cached) => Some(cached),
                    None => {
                        let result = tune(algorithm, scaled.view(), known, request.seed)?;
                        self.cache
                            .insert(source, algorithm, fingerprint, known, result);
                        Some(result)
                    }
                }
            }
            _ => None,
        };

        let params = match (request.params, tuning) {
            (Some(params), _) => params,
            (None, Some(tuned)) => tuned.best,
            (None, None) => ClusterParams::defaults(algorithm, request.known_emitters, request.seed)?,
        };

        let run = ClusteringRun::execute(&params, scaled.view())?;
        let summary = Summary::new(&run, request.known_emitters);
        let stats = cluster_statistics(
            buffer.pulses(),
            &run.labels,
            &reported_features(&scaled.features),
        );

        info!(
            %source,
            %params,
            pulses = summary.total_pulses,
            detected = summary.detected_emitters,
            noise = summary.noise_pulses,
            known = ?summary.known_emitters,
            "de-interleaving finished"
        );

        Ok(Deinterleaved {
            features: scaled.features,
            params,
            tuning,
            labels: run.labels,
            summary,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Storable;

    /// Three steady emitters with 40 pulses each.
    fn manual_buffer() -> (StreamBuffer, usize) {
        let emitters = [(9000.0, 2000.0), (9500.0, 3000.0), (11000.0, 4500.0)];
        let pulses = emitters.iter().enumerate().flat_map(|(e, &(freq_mhz, pri_us))| {
            (0..40).map(move |k| PulseRecord {
                freq_mhz,
                pri_us,
                pw_us: 10.0,
                doa_deg: 90.0 * e as Real,
                amp_db: -60.0,
                toa_us: 100.0 * e as Real + pri_us * k as Real,
            })
        });
        (StreamBuffer::from_pulses(pulses.collect()), emitters.len())
    }

    #[test]
    fn empty_buffer_reports_no_data() {
        let mut deinterleaver = Deinterleaver::default();
        let result = deinterleaver.run(&DataSource::Auto, &StreamBuffer::new(), &DeinterleaveRequest::default());
        assert!(matches!(result, Err(Error::NoData)));
    }

    #[test]
    fn no_features_rejected() {
        let (buffer, _) = manual_buffer();
        let request = DeinterleaveRequest {
            features: vec![],
            ..Default::default()
        };
        let result = Deinterleaver::default().run(&DataSource::Manual, &buffer, &request);
        assert!(matches!(result, Err(Error::NoFeatures)));
    }

    #[test]
    fn recovers_manual_emitters() {
        let (buffer, known) = manual_buffer();
        assert_eq!(known, 3);
        let request = DeinterleaveRequest {
            known_emitters: Some(known),
            auto_tune: false,
            ..Default::default()
        };
        let result = Deinterleaver::default()
            .run(&DataSource::Manual, &buffer, &request)
            .unwrap();
        assert_eq!(result.summary.detected_emitters, 3);
        assert_eq!(result.summary.noise_pulses, 0);
        assert_eq!(result.summary.matches_known(), Some(true));
        assert_eq!(result.labels.len(), buffer.len());
        for stats in &result.stats {
            assert_eq!(stats.feature(Feature::Frequency).unwrap().std, 0.0);
        }
    }

    #[test]
    fn rerun_gives_identical_labels() {
        let (buffer, known) = manual_buffer();
        let request = DeinterleaveRequest {
            algorithm: Algorithm::KMeans,
            known_emitters: Some(known),
            ..Default::default()
        };
        let mut deinterleaver = Deinterleaver::default();
        let first = deinterleaver.run(&DataSource::Manual, &buffer, &request).unwrap();
        let second = deinterleaver.run(&DataSource::Manual, &buffer, &request).unwrap();
        assert_eq!(first.labels, second.labels);
        assert_eq!(first.params, ClusterParams::KMeans { k: 3, seed: 42 });
    }

    #[test]
    fn tuned_parameters_are_cached_until_data_changes() {
        let (mut buffer, known) = manual_buffer();
        let request = DeinterleaveRequest {
            known_emitters: Some(known),
            ..Default::default()
        };
        let mut deinterleaver = Deinterleaver::default();
        let first = deinterleaver.run(&DataSource::Manual, &buffer, &request).unwrap();
        let tuning = first.tuning.unwrap();
        assert_eq!(tuning.error, 0);
        assert_eq!(tuning.evaluated, 1);
        assert_eq!(deinterleaver.cache.len(), 1);

        let again = deinterleaver.run(&DataSource::Manual, &buffer, &request).unwrap();
        assert_eq!(again.tuning, Some(tuning));

        buffer.clear();
        assert!(deinterleaver.run(&DataSource::Manual, &buffer, &request).is_err());
        deinterleaver.invalidate(&DataSource::Manual);
        assert!(deinterleaver.cache.is_empty());
    }

    #[test]
    fn stored_cache_skips_the_parameter_search() {
        let (buffer, known) = manual_buffer();
        let stored = TuningResult {
            best: ClusterParams::Dbscan {
                eps: 0.5,
                min_samples: 5,
            },
            error: 0,
            evaluated: 17,
        };
        let mut cache = TuningCache::new();
        cache.insert(&DataSource::Manual, Algorithm::Dbscan, buffer.fingerprint(), known, stored);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TuningCache::FILE);
        cache.to_file(&path).unwrap();

        let request = DeinterleaveRequest {
            known_emitters: Some(known),
            ..Default::default()
        };
        let mut deinterleaver =
            Deinterleaver::with_cache(Capabilities::detect(), TuningCache::from_file(&path).unwrap());
        let result = deinterleaver.run(&DataSource::Manual, &buffer, &request).unwrap();
        assert_eq!(result.tuning, Some(stored));
        assert_eq!(result.params, stored.best);

        let other = deinterleaver.run(&DataSource::Auto, &buffer, &request).unwrap();
        assert_eq!(other.tuning.map(|t| t.evaluated), Some(1));
        assert_eq!(deinterleaver.cache().len(), 2);
    }

    #[test]
    fn explicit_parameters_win_over_tuning() {
        let (buffer, known) = manual_buffer();
        let params = ClusterParams::Dbscan {
            eps: 2.5,
            min_samples: 5,
        };
        let request = DeinterleaveRequest {
            known_emitters: Some(known),
            params: Some(params),
            ..Default::default()
        };
        let result = Deinterleaver::default()
            .run(&DataSource::Manual, &buffer, &request)
            .unwrap();
        assert_eq!(result.params, params);
        assert!(result.tuning.is_some());
    }

    #[test]
    fn mismatched_parameters_rejected() {
        let (buffer, _) = manual_buffer();
        let request = DeinterleaveRequest {
            algorithm: Algorithm::Dbscan,
            params: Some(ClusterParams::KMeans { k: 2, seed: 1 }),
            ..Default::default()
        };
        assert!(matches!(
            Deinterleaver::default().run(&DataSource::Manual, &buffer, &request),
            Err(Error::InvalidParameters { .. })
        ));
    }

    #[test]
    fn unavailable_algorithm_rejected() {
        let (buffer, _) = manual_buffer();
        let mut deinterleaver =
            Deinterleaver::new(Capabilities::from_algorithms(vec![Algorithm::KMeans, Algorithm::Dbscan]));
        let request = DeinterleaveRequest {
            algorithm: Algorithm::Hdbscan,
            ..Default::default()
        };
        assert!(matches!(
            deinterleaver.run(&DataSource::Manual, &buffer, &request),
            Err(Error::Unavailable(Algorithm::Hdbscan))
        ));
    }

    #[test]
    fn output_table_appends_emitter_id() {
        let (buffer, known) = manual_buffer();
        let request = DeinterleaveRequest {
            known_emitters: Some(known),
            auto_tune: false,
            ..Default::default()
        };
        let result = Deinterleaver::default()
            .run(&DataSource::Manual, &buffer, &request)
            .unwrap();
        let mut out = Vec::new();
        result.to_writer(buffer.pulses(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("freq_MHz,pri_us,pw_us,doa_deg,amp_dB,toa_us,Emitter_ID\n"));
        assert_eq!(text.lines().count(), buffer.len() + 1);
        assert!(result.to_writer(&buffer.pulses()[1..], Vec::new()).is_err());
    }
}
