// Chord-implied scales for pitch correction.
//
// Each chord quality selects one of six 12-step scale templates (suspended
// and major-seventh chords share the major template). A template is rotated
// so its first step sits on the chord root, then tiled across the whole MIDI
// range; the "scale set" of a chord is every pitch 0..=127 that lands on a
// template step.
//
// Used by correct.rs to snap melodic pitches onto the nearest admissible
// pitch.

use crate::bins::{Chord, ChordQuality, NUM_PITCHES};

/// The distinct scale shapes a chord quality can imply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleTemplate {
    /// Ionian: C D E F G A B
    Major,
    /// Aeolian: C D Eb F G Ab Bb
    Minor,
    /// Mixolydian: C D E F G A Bb
    Dominant,
    /// Whole-half octatonic: C D Eb F Gb Ab A B
    Diminished,
    /// Locrian natural 2: C D Eb F Gb Ab Bb
    HalfDiminished,
    /// Augmented hexatonic: C Eb E G Ab B
    Augmented,
}

impl ScaleTemplate {
    /// Template steps as a 12-entry mask indexed by semitones above the root.
    pub fn mask(self) -> [bool; 12] {
        let bits: [u8; 12] = match self {
            ScaleTemplate::Major => [1, 0, 1, 0, 1, 1, 0, 1, 0, 1, 0, 1],
            ScaleTemplate::Minor => [1, 0, 1, 1, 0, 1, 0, 1, 1, 0, 1, 0],
            ScaleTemplate::Dominant => [1, 0, 1, 0, 1, 1, 0, 1, 0, 1, 1, 0],
            ScaleTemplate::Diminished => [1, 0, 1, 1, 0, 1, 1, 0, 1, 1, 0, 1],
            ScaleTemplate::HalfDiminished => [1, 0, 1, 1, 0, 1, 1, 0, 1, 0, 1, 0],
            ScaleTemplate::Augmented => [1, 0, 0, 1, 1, 0, 0, 1, 1, 0, 0, 1],
        };
        bits.map(|b| b == 1)
    }

    pub fn for_quality(quality: ChordQuality) -> Self {
        match quality {
            ChordQuality::Major
            | ChordQuality::Major7
            | ChordQuality::Sus2
            | ChordQuality::Sus4 => ScaleTemplate::Major,
            ChordQuality::Minor | ChordQuality::Minor7 => ScaleTemplate::Minor,
            ChordQuality::Diminished | ChordQuality::Diminished7 => ScaleTemplate::Diminished,
            ChordQuality::HalfDiminished7 => ScaleTemplate::HalfDiminished,
            ChordQuality::Augmented => ScaleTemplate::Augmented,
            ChordQuality::Dominant7 => ScaleTemplate::Dominant,
        }
    }
}

impl Chord {
    pub fn scale_template(&self) -> ScaleTemplate {
        ScaleTemplate::for_quality(self.quality)
    }

    /// Check if a MIDI pitch is in this chord's scale.
    pub fn contains_pitch(&self, pitch: u8) -> bool {
        let degree = (pitch as usize + 12 - self.root as usize % 12) % 12;
        self.scale_template().mask()[degree]
    }

    /// Every admissible MIDI pitch for this chord, ascending.
    pub fn scale_set(&self) -> Vec<u8> {
        (0..NUM_PITCHES as u8)
            .filter(|&p| self.contains_pitch(p))
            .collect()
    }
}
