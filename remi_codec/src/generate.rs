// Random test-data synthesis.
//
// Builds a single-instrument MIDI file whose notes all sit on the 12-steps-
// per-beat grid, so it always encodes without a quantization error. Notes
// are laid out by drawing a duration and a gap (both in steps) per note;
// each note starts one gap after the previous note's start, so notes may
// overlap. Pitches are drawn uniformly from the configured range.
//
// All randomness comes from the caller's `rand::Rng`, so a seeded `StdRng`
// gives reproducible files.

use crate::bins::SUBDIVISION;
use crate::error::{RemiError, Result};
use crate::midi::{Instrument, MidiFile, MidiNote, TempoChange};
use crate::sequence::EventSeq;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub ticks_per_beat: u16,
    pub tempo: f64,
    pub program: u8,
    pub velocity: u8,
    pub num_notes: usize,
    pub min_pitch: u8,
    pub max_pitch: u8,
    /// Note length bounds, in time steps.
    pub min_duration: u32,
    pub max_duration: u32,
    /// Bounds on the step distance between consecutive note starts.
    pub min_gap: u32,
    pub max_gap: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            ticks_per_beat: 96,
            tempo: 120.0,
            program: 0,
            velocity: 60,
            num_notes: 100,
            min_pitch: 0,
            max_pitch: 127,
            min_duration: 1,
            max_duration: 48,
            min_gap: 0,
            max_gap: 48,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(RemiError::InvalidConfig(msg));
        if self.ticks_per_beat == 0 || self.ticks_per_beat as u32 % SUBDIVISION != 0 {
            return invalid(format!(
                "ticks_per_beat must be a positive multiple of {SUBDIVISION}, got {}",
                self.ticks_per_beat
            ));
        }
        if !(self.tempo.is_finite() && self.tempo > 0.0) {
            return invalid(format!("tempo must be positive, got {}", self.tempo));
        }
        if self.program > 127 {
            return invalid(format!("program out of range: {}", self.program));
        }
        if !(1..=127).contains(&self.velocity) {
            return invalid(format!("velocity out of range: {}", self.velocity));
        }
        if self.min_pitch > self.max_pitch || self.max_pitch > 127 {
            return invalid(format!(
                "bad pitch range {}..={}",
                self.min_pitch, self.max_pitch
            ));
        }
        if self.min_duration == 0 || self.min_duration > self.max_duration {
            return invalid(format!(
                "bad duration range {}..={}",
                self.min_duration, self.max_duration
            ));
        }
        if self.min_gap > self.max_gap {
            return invalid(format!("bad gap range {}..={}", self.min_gap, self.max_gap));
        }
        Ok(())
    }

    /// Ticks per time step.
    fn time_unit(&self) -> u32 {
        self.ticks_per_beat as u32 / SUBDIVISION
    }
}

/// Generate a random grid-aligned MIDI file.
pub fn generate_midi(config: &GeneratorConfig, rng: &mut impl Rng) -> Result<MidiFile> {
    config.validate()?;
    let unit = config.time_unit();

    let mut instrument = Instrument::new(config.program, false);
    instrument.name = "Piano".to_string();

    let mut position: u32 = 0;
    for i in 0..config.num_notes {
        if i > 0 {
            position += rng.random_range(config.min_gap..=config.max_gap);
        }
        let pitch = rng.random_range(config.min_pitch..=config.max_pitch);
        let duration = rng.random_range(config.min_duration..=config.max_duration);
        instrument.notes.push(MidiNote {
            pitch,
            velocity: config.velocity,
            start: position * unit,
            end: (position + duration) * unit,
        });
    }

    let mut midi = MidiFile::new(config.ticks_per_beat);
    midi.instruments.push(instrument);
    midi.tempo_changes.push(TempoChange {
        tick: 0,
        bpm: config.tempo,
    });
    debug!(
        notes = config.num_notes,
        ticks = midi.max_tick(),
        "generated midi"
    );
    Ok(midi)
}

/// Generate a random file and encode it straight into an event sequence.
pub fn generate_sequence(config: &GeneratorConfig, rng: &mut impl Rng) -> Result<EventSeq> {
    EventSeq::from_midi(&generate_midi(config, rng)?)
}
