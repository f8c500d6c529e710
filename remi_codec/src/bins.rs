// Quantization tables and the chord vocabulary.
//
// Everything the token and compound encodings index into lives here: the
// 64 tempo bins (42..=296 BPM), the 30 velocity bins (9..=127), the time grid
// constants (12 steps per beat, 4 beats per bar), and the 132-entry chord
// vocabulary (12 roots x 11 qualities, root-major order).
//
// Bin values are generated at compile time the same way an evenly spaced
// integer linspace truncates, and each table carries a reverse index
// (value -> bin) so exact-membership lookups never scan.

use crate::error::{RemiError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Time steps per quarter-note beat. Note starts must land on this grid.
pub const SUBDIVISION: u32 = 12;

/// Beats per bar (every bar is 4/4).
pub const BEATS_PER_BAR: u32 = 4;

/// Time steps per bar at any resolution divisible by `SUBDIVISION`.
pub const STEPS_PER_BAR: u32 = SUBDIVISION * BEATS_PER_BAR;

/// Longest note duration in steps; longer notes are clamped.
pub const MAX_DURATION: u8 = STEPS_PER_BAR as u8;

/// Canonical ticks per beat used when rendering back to MIDI.
pub const DEFAULT_TICKS_PER_BEAT: u16 = 120;

/// Instrument-family bucket reserved for percussion tracks.
pub const PERCUSSION_FAMILY: u8 = 16;

pub const NUM_TEMPO_BINS: usize = 64;
pub const NUM_VELOCITY_BINS: usize = 30;
pub const NUM_CHORDS: usize = 12 * ChordQuality::ALL.len();
pub const NUM_POSITIONS: usize = 96;
pub const NUM_PITCHES: usize = 128;
pub const NUM_DURATIONS: usize = 96;
pub const NUM_INST_FAMILIES: usize = PERCUSSION_FAMILY as usize + 1;

const MIN_TEMPO: u32 = 42;
const MAX_TEMPO: u32 = 296;
const MIN_VELOCITY: u32 = 9;
const MAX_VELOCITY: u32 = 127;

/// Marks "no bin" in the reverse index tables.
const NO_BIN: u8 = u8::MAX;

/// Tempo bins in BPM, ascending.
pub const TEMPO_BINS: [u16; NUM_TEMPO_BINS] = linspace(MIN_TEMPO, MAX_TEMPO);

const VELOCITY_BINS_WIDE: [u16; NUM_VELOCITY_BINS] = linspace(MIN_VELOCITY, MAX_VELOCITY);

/// Velocity bins, ascending.
pub const VELOCITY_BINS: [u8; NUM_VELOCITY_BINS] = narrow(&VELOCITY_BINS_WIDE);

const TEMPO_INDEX: [u8; MAX_TEMPO as usize + 1] = reverse_index(&TEMPO_BINS);
const VELOCITY_INDEX: [u8; MAX_VELOCITY as usize + 1] = reverse_index(&VELOCITY_BINS_WIDE);

/// `N` evenly spaced integers from `start` to `stop` inclusive, each
/// truncated toward zero.
const fn linspace<const N: usize>(start: u32, stop: u32) -> [u16; N] {
    let mut bins = [0u16; N];
    let mut i = 0;
    while i < N {
        bins[i] = (start + (stop - start) * i as u32 / (N as u32 - 1)) as u16;
        i += 1;
    }
    bins
}

const fn narrow<const N: usize>(wide: &[u16; N]) -> [u8; N] {
    let mut out = [0u8; N];
    let mut i = 0;
    while i < N {
        out[i] = wide[i] as u8;
        i += 1;
    }
    out
}

const fn reverse_index<const N: usize, const M: usize>(bins: &[u16; N]) -> [u8; M] {
    let mut index = [NO_BIN; M];
    let mut i = 0;
    while i < N {
        index[bins[i] as usize] = i as u8;
        i += 1;
    }
    index
}

fn lookup(index: &[u8], value: usize) -> Option<usize> {
    match index.get(value) {
        Some(&bin) if bin != NO_BIN => Some(bin as usize),
        _ => None,
    }
}

/// Index of the bin nearest to `value`. Ties go to the lower index.
fn nearest_bin(bins: impl Iterator<Item = f64>, value: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, bin) in bins.enumerate() {
        let dist = (bin - value).abs();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

/// Bin index of an exact tempo bin value, or `None` if `bpm` is not a bin.
pub fn tempo_bin_index(bpm: u16) -> Option<usize> {
    lookup(&TEMPO_INDEX, bpm as usize)
}

/// Bin index of an exact velocity bin value, or `None` if not a bin.
pub fn velocity_bin_index(velocity: u8) -> Option<usize> {
    lookup(&VELOCITY_INDEX, velocity as usize)
}

pub fn tempo_bin(index: usize) -> Result<u16> {
    TEMPO_BINS
        .get(index)
        .copied()
        .ok_or(RemiError::IndexOutOfRange { table: "tempo", index })
}

pub fn velocity_bin(index: usize) -> Result<u8> {
    VELOCITY_BINS
        .get(index)
        .copied()
        .ok_or(RemiError::IndexOutOfRange { table: "velocity", index })
}

/// Snap a BPM to the nearest tempo bin value. Fractional tempos are
/// compared as-is, so 120.4 lands on 122 and exactly 120.0 on 118.
pub fn snap_tempo(bpm: f64) -> u16 {
    TEMPO_BINS[nearest_bin(TEMPO_BINS.iter().map(|&b| b as f64), bpm)]
}

/// Snap an arbitrary MIDI velocity to the nearest velocity bin value.
pub fn snap_velocity(velocity: u32) -> u8 {
    VELOCITY_BINS[nearest_bin(VELOCITY_BINS.iter().map(|&b| b as f64), velocity as f64)]
}

// ---------------------------------------------------------------------------
// Chord vocabulary
// ---------------------------------------------------------------------------

/// Pitch-class names, indexed by pitch class (C = 0).
pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// The eleven chord qualities, in vocabulary order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Dominant7,
    Major7,
    Minor7,
    Diminished7,
    HalfDiminished7,
    Sus2,
    Sus4,
}

impl ChordQuality {
    pub const ALL: [ChordQuality; 11] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::Diminished,
        ChordQuality::Augmented,
        ChordQuality::Dominant7,
        ChordQuality::Major7,
        ChordQuality::Minor7,
        ChordQuality::Diminished7,
        ChordQuality::HalfDiminished7,
        ChordQuality::Sus2,
        ChordQuality::Sus4,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The label suffix used in chord strings and MIDI markers.
    pub fn symbol(self) -> &'static str {
        match self {
            ChordQuality::Major => "M",
            ChordQuality::Minor => "m",
            ChordQuality::Diminished => "o",
            ChordQuality::Augmented => "+",
            ChordQuality::Dominant7 => "7",
            ChordQuality::Major7 => "M7",
            ChordQuality::Minor7 => "m7",
            ChordQuality::Diminished7 => "o7",
            ChordQuality::HalfDiminished7 => "/o7",
            ChordQuality::Sus2 => "sus2",
            ChordQuality::Sus4 => "sus4",
        }
    }

    pub fn from_symbol(symbol: &str) -> Result<Self> {
        ChordQuality::ALL
            .into_iter()
            .find(|q| q.symbol() == symbol)
            .ok_or_else(|| RemiError::UnknownQuality(symbol.to_string()))
    }
}

/// Parse a pitch-class name (`"C"`, `"F#"`, ...) to its pitch class.
pub fn pitch_class(name: &str) -> Result<u8> {
    PITCH_CLASS_NAMES
        .iter()
        .position(|&n| n == name)
        .map(|pc| pc as u8)
        .ok_or_else(|| RemiError::UnknownRoot(name.to_string()))
}

/// A chord label: root pitch class plus quality.
///
/// Serializes as its label string, e.g. `"A#_m7"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Chord {
    /// Root pitch class, 0-11.
    pub root: u8,
    pub quality: ChordQuality,
}

impl Chord {
    pub fn new(root: u8, quality: ChordQuality) -> Result<Self> {
        if root as usize >= PITCH_CLASS_NAMES.len() {
            return Err(RemiError::UnknownRoot(root.to_string()));
        }
        Ok(Chord { root, quality })
    }

    /// Position in the 132-entry chord vocabulary.
    pub fn index(&self) -> usize {
        self.root as usize * ChordQuality::ALL.len() + self.quality.index()
    }

    pub fn from_index(index: usize) -> Result<Self> {
        if index >= NUM_CHORDS {
            return Err(RemiError::IndexOutOfRange { table: "chord", index });
        }
        let n = ChordQuality::ALL.len();
        Ok(Chord {
            root: (index / n) as u8,
            quality: ChordQuality::ALL[index % n],
        })
    }

    pub fn root_name(&self) -> &'static str {
        PITCH_CLASS_NAMES[self.root as usize % 12]
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.root_name(), self.quality.symbol())
    }
}

impl FromStr for Chord {
    type Err = RemiError;

    fn from_str(label: &str) -> Result<Self> {
        let (root, quality) = label
            .split_once('_')
            .ok_or_else(|| RemiError::MalformedChord(label.to_string()))?;
        Ok(Chord {
            root: pitch_class(root)?,
            quality: ChordQuality::from_symbol(quality)?,
        })
    }
}

impl TryFrom<String> for Chord {
    type Error = RemiError;

    fn try_from(label: String) -> Result<Self> {
        label.parse()
    }
}

impl From<Chord> for String {
    fn from(chord: Chord) -> String {
        chord.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_table_endpoints_and_spacing() {
        assert_eq!(TEMPO_BINS[0], 42);
        assert_eq!(TEMPO_BINS[1], 46);
        assert_eq!(TEMPO_BINS[19], 118);
        assert_eq!(TEMPO_BINS[20], 122);
        assert_eq!(TEMPO_BINS[32], 171);
        assert_eq!(TEMPO_BINS[63], 296);
        assert!(TEMPO_BINS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn velocity_table_endpoints_and_spacing() {
        assert_eq!(VELOCITY_BINS[0], 9);
        assert_eq!(VELOCITY_BINS[13], 61);
        assert_eq!(VELOCITY_BINS[15], 70);
        assert_eq!(VELOCITY_BINS[29], 127);
        assert!(VELOCITY_BINS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn reverse_index_matches_tables() {
        for (i, &bpm) in TEMPO_BINS.iter().enumerate() {
            assert_eq!(tempo_bin_index(bpm), Some(i));
        }
        for (i, &vel) in VELOCITY_BINS.iter().enumerate() {
            assert_eq!(velocity_bin_index(vel), Some(i));
        }
        assert_eq!(tempo_bin_index(120), None);
        assert_eq!(tempo_bin_index(1000), None);
        assert_eq!(velocity_bin_index(60), None);
    }

    #[test]
    fn snapping_breaks_ties_toward_lower_bin() {
        // 120 sits exactly between 118 and 122.
        assert_eq!(snap_tempo(120.0), 118);
        assert_eq!(snap_tempo(121.0), 122);
        assert_eq!(snap_tempo(0.0), 42);
        assert_eq!(snap_tempo(500.0), 296);
        // 100 sits exactly between 98 and 102.
        assert_eq!(snap_velocity(100), 98);
        assert_eq!(snap_velocity(60), 61);
        assert_eq!(snap_velocity(0), 9);
        assert_eq!(snap_velocity(127), 127);
    }

    #[test]
    fn fractional_tempo_snaps_to_true_nearest() {
        // The 118/122 midpoint is 120.0.
        assert_eq!(snap_tempo(119.9), 118);
        assert_eq!(snap_tempo(120.4), 122);
        assert_eq!(snap_tempo(120.6), 122);
        // 500000 us per beat read back through a float is not always exact.
        assert_eq!(snap_tempo(118.0000001), 118);
        assert_eq!(snap_tempo(121.9999999), 122);
    }

    #[test]
    fn bin_lookup_out_of_range() {
        assert_eq!(tempo_bin(63).unwrap(), 296);
        assert!(matches!(
            tempo_bin(64),
            Err(RemiError::IndexOutOfRange { table: "tempo", index: 64 })
        ));
        assert!(velocity_bin(30).is_err());
    }

    #[test]
    fn chord_labels_parse_and_display() {
        let chord: Chord = "A_m".parse().unwrap();
        assert_eq!(chord.root, 9);
        assert_eq!(chord.quality, ChordQuality::Minor);
        assert_eq!(chord.to_string(), "A_m");

        let half_dim: Chord = "F#_/o7".parse().unwrap();
        assert_eq!(half_dim.quality, ChordQuality::HalfDiminished7);
        assert_eq!(half_dim.to_string(), "F#_/o7");
    }

    #[test]
    fn chord_label_errors() {
        assert!(matches!("H_M".parse::<Chord>(), Err(RemiError::UnknownRoot(_))));
        assert!(matches!("C_maj".parse::<Chord>(), Err(RemiError::UnknownQuality(_))));
        assert!(matches!("CM".parse::<Chord>(), Err(RemiError::MalformedChord(_))));
        assert!(Chord::new(12, ChordQuality::Major).is_err());
    }

    #[test]
    fn chord_vocabulary_order() {
        assert_eq!(NUM_CHORDS, 132);
        assert_eq!("C_M".parse::<Chord>().unwrap().index(), 0);
        assert_eq!("C_m".parse::<Chord>().unwrap().index(), 1);
        assert_eq!("A_m".parse::<Chord>().unwrap().index(), 100);
        assert_eq!("B_sus4".parse::<Chord>().unwrap().index(), 131);
        for i in 0..NUM_CHORDS {
            assert_eq!(Chord::from_index(i).unwrap().index(), i);
        }
        assert!(Chord::from_index(NUM_CHORDS).is_err());
    }

    #[test]
    fn chord_serializes_as_label() {
        let chord: Chord = "D#_sus2".parse().unwrap();
        let json = serde_json::to_string(&chord).unwrap();
        assert_eq!(json, "\"D#_sus2\"");
        let back: Chord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chord);
        assert!(serde_json::from_str::<Chord>("\"Q_M\"").is_err());
    }
}
