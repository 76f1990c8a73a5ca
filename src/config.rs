use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cluster::{Algorithm, ClusterParams};
use crate::common::{Feature, Real};
use crate::deinterleave::DeinterleaveRequest;
use crate::error::{Error, Result};
use crate::logging::LogConfig;
use crate::simulation::{AutoPopulation, ManualPopulation};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed seed for reproducible runs; fresh entropy when absent.
    pub seed: Option<u64>,
    pub auto: AutoPopulation,
    pub manual: ManualPopulation,
}

/// De-interleaving settings. Parameters left out fall back to tuned values
/// or the algorithm defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeinterleaveConfig {
    pub features: Vec<Feature>,
    pub algorithm: Algorithm,
    pub seed: u64,
    pub auto_tune: bool,
    pub eps: Option<Real>,
    pub min_samples: Option<usize>,
    pub min_cluster_size: Option<usize>,
    pub k: Option<usize>,
}

impl Default for DeinterleaveConfig {
    fn default() -> Self {
        let request = DeinterleaveRequest::default();
        Self {
            features: request.features,
            algorithm: request.algorithm,
            seed: request.seed,
            auto_tune: request.auto_tune,
            eps: None,
            min_samples: None,
            min_cluster_size: None,
            k: None,
        }
    }
}

impl DeinterleaveConfig {
    /// Explicit parameters, when any of the selected algorithm's knobs is set.
    /// Missing knobs take the algorithm defaults.
    pub fn overrides(&self, known_emitters: Option<usize>) -> Result<Option<ClusterParams>> {
        let given = match self.algorithm {
            Algorithm::KMeans => self.k.is_some(),
            Algorithm::Dbscan => self.eps.is_some() || self.min_samples.is_some(),
            Algorithm::Hdbscan => self.min_cluster_size.is_some() || self.min_samples.is_some(),
        };
        if !given {
            return Ok(None);
        }

        let params = match ClusterParams::defaults(self.algorithm, self.k.or(known_emitters), self.seed)? {
            ClusterParams::KMeans { k, seed } => ClusterParams::KMeans {
                k: self.k.unwrap_or(k),
                seed,
            },
            ClusterParams::Dbscan { eps, min_samples } => ClusterParams::Dbscan {
                eps: self.eps.unwrap_or(eps),
                min_samples: self.min_samples.unwrap_or(min_samples),
            },
            ClusterParams::Hdbscan {
                min_cluster_size,
                min_samples,
            } => ClusterParams::Hdbscan {
                min_cluster_size: self.min_cluster_size.unwrap_or(min_cluster_size),
                min_samples: self.min_samples.unwrap_or(min_samples),
            },
        };
        Ok(Some(params))
    }

    pub fn request(&self, known_emitters: Option<usize>) -> Result<DeinterleaveRequest> {
        Ok(DeinterleaveRequest {
            features: self.features.clone(),
            algorithm: self.algorithm,
            params: self.overrides(known_emitters)?,
            known_emitters,
            auto_tune: self.auto_tune,
            seed: self.seed,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub deinterleave: DeinterleaveConfig,
    pub logging: LogConfig,
    /// Parent of the per-user output directories.
    pub output_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            deinterleave: DeinterleaveConfig::default(),
            logging: LogConfig::default(),
            output_root: PathBuf::from("outputs"),
        }
    }
}

impl Config {
    /// Checks what can be checked before any pulse is generated.
    pub fn validate(&self) -> Result<()> {
        self.simulation.auto.mix.validate()?;
        for emitter in &self.simulation.manual.emitters {
            emitter.validate()?;
        }
        if self.deinterleave.features.is_empty() {
            return Err(Error::NoFeatures);
        }
        Ok(())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let text = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    fs::write(path, serde_yaml::to_string(config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::BehaviorMix;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.deinterleave.features, vec![Feature::Frequency, Feature::Pri]);
        assert_eq!(config.deinterleave.algorithm, Algorithm::Dbscan);
        assert_eq!(config.simulation.auto.num_emitters, 10);
        assert_eq!(config.output_root, PathBuf::from("outputs"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let yaml = "
simulation:
  seed: 7
  auto:
    num_emitters: 4
deinterleave:
  algorithm: hdbscan
  features: [freq_MHz, doa_deg]
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.simulation.seed, Some(7));
        assert_eq!(config.simulation.auto.num_emitters, 4);
        assert_eq!(config.simulation.auto.pulses_per_emitter, 20);
        assert_eq!(config.deinterleave.algorithm, Algorithm::Hdbscan);
        assert_eq!(config.deinterleave.features, vec![Feature::Frequency, Feature::Doa]);
        assert!(config.deinterleave.auto_tune);
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pdw.yaml");
        let mut config = Config::default();
        config.deinterleave.eps = Some(0.4);
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn load_rejects_bad_mix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pdw.yaml");
        let mut config = Config::default();
        config.simulation.auto.mix = BehaviorMix {
            fixed: 50,
            agile: 30,
            stagger: 30,
        };
        save_config(&config, &path).unwrap();
        assert!(matches!(load_config(&path), Err(Error::InvalidMix { .. })));
    }

    #[test]
    fn overrides_fill_missing_knobs() {
        let mut config = DeinterleaveConfig::default();
        assert_eq!(config.overrides(Some(3)).unwrap(), None);

        config.eps = Some(0.3);
        assert_eq!(
            config.overrides(None).unwrap(),
            Some(ClusterParams::Dbscan {
                eps: 0.3,
                min_samples: 5
            })
        );

        config.algorithm = Algorithm::KMeans;
        assert_eq!(config.overrides(Some(3)).unwrap(), None);
        config.k = Some(4);
        let request = config.request(Some(3)).unwrap();
        assert_eq!(request.params, Some(ClusterParams::KMeans { k: 4, seed: 42 }));
        assert_eq!(request.known_emitters, Some(3));
    }
}
