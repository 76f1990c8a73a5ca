use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::fs::File;
use std::hash::Hasher;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{Feature, PulseRecord};
use crate::error::{Error, Result};

const REQUIRED_COLUMNS: [&str; 3] = ["freq_MHz", "pri_us", "toa_us"];

/// Time-ordered accumulation of pulses.
///
/// Both simulator sessions append to one of these, and the de-interleaver
/// reads from one. Pulses are kept sorted by TOA at all times.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamBuffer {
    pulses: Vec<PulseRecord>,
    /// Optional attributes the source table did not carry.
    #[serde(default)]
    absent: BTreeSet<Feature>,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pulses(pulses: Vec<PulseRecord>) -> Self {
        let mut buffer = Self {
            pulses,
            absent: BTreeSet::new(),
        };
        buffer.sort();
        buffer
    }

    /// Appends one window's worth of pulses, rounded to two decimals.
    pub fn extend<I: IntoIterator<Item = PulseRecord>>(&mut self, pulses: I) {
        self.pulses
            .extend(pulses.into_iter().map(|pulse| pulse.rounded()));
        self.sort();
    }

    pub fn clear(&mut self) {
        self.pulses.clear();
        self.absent.clear();
    }

    pub fn pulses(&self) -> &[PulseRecord] {
        &self.pulses
    }

    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    pub fn has(&self, feature: Feature) -> bool {
        !self.absent.contains(&feature)
    }

    pub fn available_features(&self) -> Vec<Feature> {
        Feature::ALL
            .iter()
            .copied()
            .filter(|&feature| self.has(feature))
            .collect()
    }

    /// Content hash; changes whenever the buffer is extended, cleared or replaced.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        hasher.write_usize(self.pulses.len());
        for pulse in &self.pulses {
            for value in [
                pulse.freq_mhz,
                pulse.pri_us,
                pulse.pw_us,
                pulse.doa_deg,
                pulse.amp_db,
                pulse.toa_us,
            ] {
                hasher.write_u64(value.to_bits());
            }
        }
        for feature in &self.absent {
            hasher.write_u8(*feature as u8);
        }
        hasher.finish()
    }

    fn sort(&mut self) {
        self.pulses.sort_by(|a, b| a.toa_us.total_cmp(&b.toa_us));
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        let has_column = |name: &str| headers.iter().any(|h| h.trim() == name);

        if let Some(missing) = REQUIRED_COLUMNS.iter().find(|&&name| !has_column(name)) {
            return Err(Error::InvalidConfig(format!(
                "pulse table is missing required column '{}'",
                missing
            )));
        }

        let absent = Feature::ALL
            .iter()
            .copied()
            .filter(|feature| !has_column(feature.column()))
            .collect();

        let pulses = rdr
            .deserialize()
            .collect::<std::result::Result<Vec<PulseRecord>, csv::Error>>()?;

        let mut buffer = Self { pulses, absent };
        buffer.sort();
        Ok(buffer)
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for pulse in &self.pulses {
            wtr.serialize(pulse)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        self.to_writer(File::create(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(toa_us: f64, freq_mhz: f64) -> PulseRecord {
        PulseRecord {
            freq_mhz,
            pri_us: 2000.0,
            pw_us: 10.0,
            doa_deg: 90.0,
            amp_db: -60.0,
            toa_us,
        }
    }

    #[test]
    fn extend_keeps_toa_order_and_rounds() {
        let mut buffer = StreamBuffer::new();
        buffer.extend(vec![pulse(30.0, 9000.123), pulse(10.0, 9100.0)]);
        buffer.extend(vec![pulse(20.0, 9200.0), pulse(5.004, 9300.0)]);

        let toas: Vec<f64> = buffer.pulses().iter().map(|p| p.toa_us).collect();
        assert_eq!(toas, vec![5.0, 10.0, 20.0, 30.0]);
        assert_eq!(buffer.pulses()[3].freq_mhz, 9000.12);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let mut buffer = StreamBuffer::new();
        let empty = buffer.fingerprint();
        buffer.extend(vec![pulse(1.0, 9000.0)]);
        let one = buffer.fingerprint();
        assert_ne!(empty, one);
        assert_eq!(one, buffer.clone().fingerprint());
        buffer.clear();
        assert_eq!(buffer.fingerprint(), empty);
    }

    #[test]
    fn reads_minimal_table() {
        let table = "freq_MHz,pri_us,toa_us\n9000,2000,50\n9500,2500,10\n";
        let buffer = StreamBuffer::from_reader(table.as_bytes()).unwrap();
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pulses()[0].toa_us, 10.0);
        assert_eq!(
            buffer.available_features(),
            vec![Feature::Frequency, Feature::Pri]
        );
    }

    #[test]
    fn rejects_table_without_toa() {
        let table = "freq_MHz,pri_us\n9000,2000\n";
        assert!(matches!(
            StreamBuffer::from_reader(table.as_bytes()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn writes_all_columns() {
        let buffer = StreamBuffer::from_pulses(vec![pulse(1.5, 9000.0)]);
        let mut out = Vec::new();
        buffer.to_writer(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("freq_MHz,pri_us,pw_us,doa_deg,amp_dB,toa_us")
        );
        assert_eq!(lines.next(), Some("9000.0,2000.0,10.0,90.0,-60.0,1.5"));

        let reread = StreamBuffer::from_reader(text.as_bytes()).unwrap();
        assert_eq!(reread, buffer);
    }
}
