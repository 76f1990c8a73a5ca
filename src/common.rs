use std::fmt;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type Real = f64;

/// Length of one generation window in microseconds.
pub const WINDOW_US: Real = 2.0e6;

const FULL_TURN_DEG: Real = 360.0;

/// One received pulse.
///
/// Column names follow the tables exchanged with the outside world, so a
/// record serializes as `freq_MHz,pri_us,pw_us,doa_deg,amp_dB,toa_us`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseRecord {
    #[serde(rename = "freq_MHz")]
    pub freq_mhz: Real,
    pub pri_us: Real,
    #[serde(default)]
    pub pw_us: Real,
    #[serde(default)]
    pub doa_deg: Real,
    #[serde(rename = "amp_dB", default)]
    pub amp_db: Real,
    pub toa_us: Real,
}

impl PulseRecord {
    pub fn rounded(&self) -> Self {
        Self {
            freq_mhz: round2(self.freq_mhz),
            pri_us: round2(self.pri_us),
            pw_us: round2(self.pw_us),
            doa_deg: wrap_degrees(round2(self.doa_deg)),
            amp_db: round2(self.amp_db),
            toa_us: round2(self.toa_us),
        }
    }

    pub fn feature(&self, feature: Feature) -> Real {
        match feature {
            Feature::Frequency => self.freq_mhz,
            Feature::Pri => self.pri_us,
            Feature::PulseWidth => self.pw_us,
            Feature::Doa => self.doa_deg,
        }
    }
}

/// Pulse attributes that can be used to tell emitters apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Feature {
    #[serde(rename = "freq_MHz")]
    Frequency,
    #[serde(rename = "pri_us")]
    Pri,
    #[serde(rename = "pw_us")]
    PulseWidth,
    #[serde(rename = "doa_deg")]
    Doa,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Frequency,
        Feature::Pri,
        Feature::PulseWidth,
        Feature::Doa,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Feature::Frequency => "freq_MHz",
            Feature::Pri => "pri_us",
            Feature::PulseWidth => "pw_us",
            Feature::Doa => "doa_deg",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Feature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Feature::ALL
            .iter()
            .copied()
            .find(|feature| feature.column().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownFeature(s.to_string()))
    }
}

pub fn round2(value: Real) -> Real {
    (value * 100.0).round() / 100.0
}

pub fn wrap_degrees(angle: Real) -> Real {
    angle.rem_euclid(FULL_TURN_DEG)
}

pub trait Storable: Serialize + DeserializeOwned {
    fn to_file(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        let s = serde_json::to_string(self)?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
