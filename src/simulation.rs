use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_rand::rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::{round2, wrap_degrees, PulseRecord, Real, Storable, WINDOW_US};
use crate::emitter::{BehaviorMix, Emitter, ParameterRanges};
use crate::error::{Error, Result};
use crate::stream::StreamBuffer;

/// Standard deviations of the per-pulse measurement noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Jitter {
    pub freq_mhz: Real,
    pub doa_deg: Real,
    pub amp_db: Real,
}

impl Jitter {
    pub const AUTO: Jitter = Jitter {
        freq_mhz: 0.5,
        doa_deg: 1.0,
        amp_db: 1.0,
    };

    pub const MANUAL: Jitter = Jitter {
        freq_mhz: 0.0,
        doa_deg: 0.0,
        amp_db: 1.0,
    };

    pub const NONE: Jitter = Jitter {
        freq_mhz: 0.0,
        doa_deg: 0.0,
        amp_db: 0.0,
    };
}

fn jittered<R: Rng + ?Sized>(value: Real, sigma: Real, rng: &mut R) -> Real {
    if sigma > 0.0 {
        value + sigma * rng.sample::<Real, _>(StandardNormal)
    } else {
        value
    }
}

/// Half-open interval `[start, end)` on the simulation clock, in µs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: Real,
    pub end: Real,
}

impl Window {
    pub fn contains(&self, toa_us: Real) -> bool {
        toa_us >= self.start && toa_us < self.end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationClock {
    now_us: Real,
}

impl SimulationClock {
    pub fn now(&self) -> Real {
        self.now_us
    }

    pub fn next_window(&self) -> Window {
        Window {
            start: self.now_us,
            end: self.now_us + WINDOW_US,
        }
    }

    pub fn windows_elapsed(&self) -> u64 {
        (self.now_us / WINDOW_US).round() as u64
    }

    fn advance(&mut self) {
        self.now_us += WINDOW_US;
    }

    fn reset(&mut self) {
        self.now_us = 0.0;
    }
}

/// Pulses every emitter puts out during `window`, sorted by TOA.
///
/// Each emitter starts at a uniformly drawn TOA inside the window and cycles
/// through its frequency modes and PRI values pulse by pulse, until either
/// `pulses_per_emitter` pulses have been emitted or the window has passed.
pub fn generate_window<R: Rng + ?Sized>(
    emitters: &[Emitter],
    pulses_per_emitter: usize,
    jitter: &Jitter,
    window: Window,
    rng: &mut R,
) -> Vec<PulseRecord> {
    let mut pulses = Vec::with_capacity(emitters.len() * pulses_per_emitter);

    for emitter in emitters {
        let mut toa = rng.gen_range(window.start..window.end);
        for k in 0..pulses_per_emitter {
            // The buffer stores TOAs rounded to 2 decimals.
            if round2(toa) >= window.end {
                break;
            }
            let pri = emitter.pri(k);
            pulses.push(PulseRecord {
                freq_mhz: jittered(emitter.frequency(k), jitter.freq_mhz, rng),
                pri_us: pri,
                pw_us: emitter.pulse_width,
                doa_deg: wrap_degrees(jittered(emitter.doa, jitter.doa_deg, rng)),
                amp_db: jittered(emitter.amplitude, jitter.amp_db, rng),
                toa_us: toa,
            });
            toa += pri;
        }
    }

    pulses.sort_by(|a, b| a.toa_us.total_cmp(&b.toa_us));
    pulses
}

/// How emitter identities carry over from one window to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// Every window brings a new set of emitters
    PerWindow,
    /// The same emitters transmit in every window
    Persistent,
}

/// Source of the emitters that transmit during a window.
pub trait Population {
    fn mode(&self) -> Mode;

    fn pulses_per_emitter(&self) -> usize;

    fn jitter(&self) -> Jitter;

    fn identity(&self) -> Identity;

    /// Emitters for the next window. Fails without side effects on invalid
    /// configuration.
    fn emitters<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Emitter>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Auto,
    Manual,
}

impl Mode {
    pub fn interleaved_file(self) -> &'static str {
        match self {
            Mode::Auto => "pdw_interleaved.csv",
            Mode::Manual => "manual_interleaved.csv",
        }
    }

    pub fn session_file(self) -> &'static str {
        match self {
            Mode::Auto => "auto_session.json",
            Mode::Manual => "manual_session.json",
        }
    }
}

/// Randomly drawn population following a behavior mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoPopulation {
    pub num_emitters: usize,
    pub pulses_per_emitter: usize,
    pub mix: BehaviorMix,
    pub ranges: ParameterRanges,
}

impl Default for AutoPopulation {
    fn default() -> Self {
        Self {
            num_emitters: 10,
            pulses_per_emitter: 20,
            mix: BehaviorMix::default(),
            ranges: ParameterRanges::default(),
        }
    }
}

impl Population for AutoPopulation {
    fn mode(&self) -> Mode {
        Mode::Auto
    }

    fn pulses_per_emitter(&self) -> usize {
        self.pulses_per_emitter
    }

    fn jitter(&self) -> Jitter {
        Jitter::AUTO
    }

    fn identity(&self) -> Identity {
        Identity::PerWindow
    }

    fn emitters<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Emitter>> {
        if self.num_emitters == 0 || self.pulses_per_emitter == 0 {
            return Err(Error::InvalidConfig(
                "number of emitters and pulses per emitter must be at least 1".to_string(),
            ));
        }
        let behaviors = self.mix.assign(self.num_emitters, rng)?;
        Ok(behaviors
            .into_iter()
            .map(|behavior| self.ranges.draw(behavior, rng))
            .collect())
    }
}

/// Emitters described one by one in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualPopulation {
    pub pulses_per_emitter: usize,
    pub emitters: Vec<Emitter>,
}

impl Default for ManualPopulation {
    fn default() -> Self {
        Self {
            pulses_per_emitter: 20,
            emitters: vec![
                Emitter::fixed(9000.0, 2000.0, 10.0, -60.0, 90.0),
                Emitter::fixed(9500.0, 3000.0, 20.0, -55.0, 180.0),
                Emitter::fixed(10000.0, 4000.0, 5.0, -65.0, 270.0),
            ],
        }
    }
}

impl Population for ManualPopulation {
    fn mode(&self) -> Mode {
        Mode::Manual
    }

    fn pulses_per_emitter(&self) -> usize {
        self.pulses_per_emitter
    }

    fn jitter(&self) -> Jitter {
        Jitter::MANUAL
    }

    fn identity(&self) -> Identity {
        Identity::Persistent
    }

    fn emitters<R: Rng + ?Sized>(&self, _rng: &mut R) -> Result<Vec<Emitter>> {
        if self.emitters.is_empty() || self.pulses_per_emitter == 0 {
            return Err(Error::InvalidConfig(
                "at least one emitter and one pulse per emitter are required".to_string(),
            ));
        }
        for emitter in &self.emitters {
            emitter.validate()?;
        }
        Ok(self.emitters.clone())
    }
}

/// Clock, accumulated pulses and ground truth of one simulation mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSession {
    pub clock: SimulationClock,
    pub buffer: StreamBuffer,
    /// Distinct emitters that contributed to `buffer`.
    pub known_emitters: usize,
}

impl Storable for SimulationSession {}

impl SimulationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates the next window and advances the clock. On error the
    /// session is left untouched.
    pub fn step<P, R>(&mut self, population: &P, rng: &mut R) -> Result<Vec<PulseRecord>>
    where
        P: Population,
        R: Rng + ?Sized,
    {
        let emitters = population.emitters(rng)?;
        let window = self.clock.next_window();
        let pulses = generate_window(
            &emitters,
            population.pulses_per_emitter(),
            &population.jitter(),
            window,
            rng,
        );

        self.clock.advance();
        self.buffer.extend(pulses.iter().copied());
        self.known_emitters = match population.identity() {
            Identity::PerWindow => self.known_emitters + emitters.len(),
            Identity::Persistent => self.known_emitters.max(emitters.len()),
        };

        info!(
            mode = ?population.mode(),
            window_start_us = window.start,
            emitters = emitters.len(),
            new_pulses = pulses.len(),
            total_pulses = self.buffer.len(),
            "generated window"
        );
        Ok(pulses)
    }

    /// Discards all history.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.buffer.clear();
        self.known_emitters = 0;
    }
}

/// A population, its random source and the session it feeds.
pub struct Simulator<P> {
    population: P,
    rng: StdRng,
    session: SimulationSession,
}

impl<P: Population> Simulator<P> {
    pub fn new(population: P, seed: Option<u64>) -> Self {
        Self::resume(population, seed, SimulationSession::new())
    }

    /// Continues `session`. A seeded generator is offset by the windows
    /// already elapsed so that a resumed session does not replay them.
    pub fn resume(population: P, seed: Option<u64>, session: SimulationSession) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(session.clock.windows_elapsed())),
            None => StdRng::from_entropy(),
        };
        Self {
            population,
            rng,
            session,
        }
    }

    pub fn step(&mut self) -> Result<Vec<PulseRecord>> {
        self.session.step(&self.population, &mut self.rng)
    }

    pub fn reset(&mut self) {
        self.session.reset();
        info!(mode = ?self.population.mode(), "session reset");
    }

    pub fn session(&self) -> &SimulationSession {
        &self.session
    }

    pub fn into_session(self) -> SimulationSession {
        self.session
    }
}
