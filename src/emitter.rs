use std::fmt;
use std::ops::RangeInclusive;

use ndarray_rand::rand::seq::SliceRandom;
use ndarray_rand::rand::Rng;
use serde::{Deserialize, Serialize};

use crate::common::Real;
use crate::error::{Error, Result};

/// Number of frequency modes drawn for a generated agile emitter.
pub const AGILE_MODES: RangeInclusive<usize> = 2..=5;
/// Number of PRI values drawn for a generated staggered emitter.
pub const STAGGER_PRIS: RangeInclusive<usize> = 2..=3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    /// One frequency, one PRI
    Fixed,
    /// Frequency hops pulse-to-pulse, one PRI
    Agile,
    /// One frequency, PRI cycles pulse-to-pulse
    Stagger,
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Behavior::Fixed => write!(f, "fixed"),
            Behavior::Agile => write!(f, "agile"),
            Behavior::Stagger => write!(f, "stagger"),
        }
    }
}

/// A simulated radar source.
///
/// The behavior decides which of `frequency_modes` and `pri_values` may hold
/// more than one value; the other list always holds exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emitter {
    pub behavior: Behavior,
    pub frequency_modes: Vec<Real>,
    pub pri_values: Vec<Real>,
    pub pulse_width: Real,
    pub amplitude: Real,
    pub doa: Real,
}

impl Emitter {
    pub fn new(
        behavior: Behavior,
        frequency_modes: Vec<Real>,
        pri_values: Vec<Real>,
        pulse_width: Real,
        amplitude: Real,
        doa: Real,
    ) -> Result<Self> {
        let emitter = Self {
            behavior,
            frequency_modes,
            pri_values,
            pulse_width,
            amplitude,
            doa,
        };
        emitter.validate()?;
        Ok(emitter)
    }

    pub fn fixed(freq: Real, pri: Real, pulse_width: Real, amplitude: Real, doa: Real) -> Self {
        Self {
            behavior: Behavior::Fixed,
            frequency_modes: vec![freq],
            pri_values: vec![pri],
            pulse_width,
            amplitude,
            doa,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (n_freqs, n_pris) = (self.frequency_modes.len(), self.pri_values.len());
        let cardinality_ok = match self.behavior {
            Behavior::Fixed => n_freqs == 1 && n_pris == 1,
            Behavior::Agile => n_freqs >= 2 && n_pris == 1,
            Behavior::Stagger => n_freqs == 1 && n_pris >= 2,
        };
        if !cardinality_ok {
            return Err(Error::InvalidEmitter(format!(
                "{} emitter cannot have {} frequency mode(s) and {} PRI value(s)",
                self.behavior, n_freqs, n_pris
            )));
        }
        if let Some(pri) = self.pri_values.iter().find(|&&pri| !(pri > 0.0) || !pri.is_finite()) {
            return Err(Error::InvalidEmitter(format!("PRI must be positive, got {}", pri)));
        }
        let scalars = [self.pulse_width, self.amplitude, self.doa];
        if self
            .frequency_modes
            .iter()
            .chain(scalars.iter())
            .any(|value| !value.is_finite())
        {
            return Err(Error::InvalidEmitter("parameters must be finite".to_string()));
        }
        Ok(())
    }

    /// Carrier frequency of the `k`:th pulse in a train.
    pub fn frequency(&self, k: usize) -> Real {
        self.frequency_modes[k % self.frequency_modes.len()]
    }

    /// Interval following the `k`:th pulse in a train.
    pub fn pri(&self, k: usize) -> Real {
        self.pri_values[k % self.pri_values.len()]
    }
}

/// Share of each behavior in a generated population, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorMix {
    pub fixed: u32,
    pub agile: u32,
    pub stagger: u32,
}

impl Default for BehaviorMix {
    fn default() -> Self {
        Self {
            fixed: 60,
            agile: 25,
            stagger: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviorCounts {
    pub fixed: usize,
    pub agile: usize,
    pub stagger: usize,
}

impl BehaviorCounts {
    pub fn total(&self) -> usize {
        self.fixed + self.agile + self.stagger
    }
}

impl BehaviorMix {
    pub fn validate(&self) -> Result<()> {
        let total = u64::from(self.fixed) + u64::from(self.agile) + u64::from(self.stagger);
        if total != 100 {
            return Err(Error::InvalidMix {
                fixed: self.fixed,
                agile: self.agile,
                stagger: self.stagger,
                total,
            });
        }
        Ok(())
    }

    /// Splits `num_emitters` by percentage; staggered emitters take the remainder.
    pub fn counts(&self, num_emitters: usize) -> Result<BehaviorCounts> {
        self.validate()?;
        // Percentages are at most 100 once validated.
        let share = |pct: u32| (num_emitters as u128 * u128::from(pct) / 100) as usize;
        let fixed = share(self.fixed);
        let agile = share(self.agile);
        Ok(BehaviorCounts {
            fixed,
            agile,
            stagger: num_emitters - fixed - agile,
        })
    }

    pub fn assign<R: Rng + ?Sized>(&self, num_emitters: usize, rng: &mut R) -> Result<Vec<Behavior>> {
        let counts = self.counts(num_emitters)?;
        let mut behaviors: Vec<Behavior> = std::iter::repeat(Behavior::Fixed)
            .take(counts.fixed)
            .chain(std::iter::repeat(Behavior::Agile).take(counts.agile))
            .chain(std::iter::repeat(Behavior::Stagger).take(counts.stagger))
            .collect();
        behaviors.shuffle(rng);
        Ok(behaviors)
    }
}

/// Closed interval a parameter is drawn from. `min > max` is tolerated and
/// simply draws from the reversed interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: Real,
    pub max: Real,
}

impl ParameterRange {
    pub const fn new(min: Real, max: Real) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Real {
        self.min + (self.max - self.min) * rng.gen::<Real>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterRanges {
    pub frequency_mhz: ParameterRange,
    pub pri_us: ParameterRange,
    pub pulse_width_us: ParameterRange,
    pub amplitude_db: ParameterRange,
    pub doa_deg: ParameterRange,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        Self {
            frequency_mhz: ParameterRange::new(8000.0, 12000.0),
            pri_us: ParameterRange::new(2000.0, 6000.0),
            pulse_width_us: ParameterRange::new(1.0, 50.0),
            amplitude_db: ParameterRange::new(-80.0, -30.0),
            doa_deg: ParameterRange::new(0.0, 360.0),
        }
    }
}

impl ParameterRanges {
    /// Draws one emitter of the given behavior.
    pub fn draw<R: Rng + ?Sized>(&self, behavior: Behavior, rng: &mut R) -> Emitter {
        let freq = self.frequency_mhz.sample(rng);
        let pri = self.pri_us.sample(rng);
        let pulse_width = self.pulse_width_us.sample(rng);
        let amplitude = self.amplitude_db.sample(rng);
        let doa = self.doa_deg.sample(rng);

        let frequency_modes = match behavior {
            Behavior::Agile => {
                let n = rng.gen_range(AGILE_MODES);
                (0..n).map(|_| self.frequency_mhz.sample(rng)).collect()
            }
            _ => vec![freq],
        };
        let pri_values = match behavior {
            Behavior::Stagger => {
                let n = rng.gen_range(STAGGER_PRIS);
                (0..n).map(|_| self.pri_us.sample(rng)).collect()
            }
            _ => vec![pri],
        };

        Emitter {
            behavior,
            frequency_modes,
            pri_values,
            pulse_width,
            amplitude,
            doa,
        }
    }
}
