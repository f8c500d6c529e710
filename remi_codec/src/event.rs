// The event model: bars, notes, REMI tokens, and compound-word records.
//
// A piece is a flat list of `Event`s (see sequence.rs). Each `Bar` opens a
// new measure and may carry a tempo and a chord; each `Note` belongs to the
// most recent bar and is positioned relative to its start.
//
// This module owns the per-event halves of both token encodings:
// - REMI tokens: a bar expands to `Bar [Tempo_i] [Chord_j]`, a note to five
//   tokens (position, pitch, duration-1, instrument family, velocity bin).
//   Every token maps to a slot in a closed 565-entry vocabulary.
// - Compound words: one fixed 8-field record per event. Table indices are
//   shifted by one so that 0 means "field unused"; that shift exists only in
//   `to_compound`/`from_compound` and never in the in-memory model.
//
// Tempo and velocity are stored as bin values, not indices, so they must be
// exact members of the tables in bins.rs.

use crate::bins::{
    self, Chord, MAX_DURATION, NUM_CHORDS, NUM_DURATIONS, NUM_INST_FAMILIES, NUM_PITCHES,
    NUM_POSITIONS, NUM_TEMPO_BINS, NUM_VELOCITY_BINS,
};
use crate::error::{RemiError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A measure header. Both fields are optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Tempo in BPM; always one of `bins::TEMPO_BINS`.
    pub tempo: Option<u16>,
    pub chord: Option<Chord>,
}

impl Bar {
    /// Build a bar, checking that `tempo` is an exact tempo bin.
    pub fn new(tempo: Option<u16>, chord: Option<Chord>) -> Result<Self> {
        if let Some(bpm) = tempo {
            tempo_index(bpm)?;
        }
        Ok(Bar { tempo, chord })
    }

    pub fn with_chord(chord: Chord) -> Self {
        Bar {
            tempo: None,
            chord: Some(chord),
        }
    }

    pub fn to_tokens(&self) -> Result<Vec<Token>> {
        let mut tokens = vec![Token::bare(TokenKind::Bar)];
        if let Some(bpm) = self.tempo {
            tokens.push(Token::new(TokenKind::Tempo, tempo_index(bpm)?));
        }
        if let Some(chord) = self.chord {
            tokens.push(Token::new(TokenKind::Chord, chord.index()));
        }
        Ok(tokens)
    }

    pub fn to_compound(&self) -> Result<CompoundRecord> {
        let tempo = match self.tempo {
            Some(bpm) => shift(tempo_index(bpm)?),
            None => 0,
        };
        let chord = self.chord.map_or(0, |c| shift(c.index()));
        Ok([RECORD_BAR, tempo, chord, 0, 0, 0, 0, 0])
    }

    fn from_compound(record: &CompoundRecord) -> Result<Self> {
        let tempo = match record[1] {
            0 => None,
            raw => Some(bins::tempo_bin(raw as usize - 1)?),
        };
        let chord = match record[2] {
            0 => None,
            raw => Some(Chord::from_index(raw as usize - 1)?),
        };
        Ok(Bar { tempo, chord })
    }
}

/// A note inside a bar, on the 1/12-beat grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Steps since the start of the owning bar.
    pub position: u8,
    /// MIDI pitch, 0-127.
    pub pitch: u8,
    /// Length in steps, 1..=48.
    pub duration: u8,
    /// `program / 8` for melodic tracks, 16 for percussion.
    pub inst_family: u8,
    /// Velocity; always one of `bins::VELOCITY_BINS`.
    pub velocity: u8,
}

impl Note {
    /// Build a note, clamping `duration` to `1..=MAX_DURATION` and checking
    /// every other field against its vocabulary range.
    pub fn new(position: u32, pitch: u8, duration: u32, inst_family: u8, velocity: u8) -> Result<Self> {
        check_range("position", position as usize, NUM_POSITIONS)?;
        check_range("pitch", pitch as usize, NUM_PITCHES)?;
        check_range("instrument family", inst_family as usize, NUM_INST_FAMILIES)?;
        velocity_index(velocity)?;
        Ok(Note {
            position: position as u8,
            pitch,
            duration: duration.clamp(1, MAX_DURATION as u32) as u8,
            inst_family,
            velocity,
        })
    }

    pub fn to_tokens(&self) -> Result<Vec<Token>> {
        Ok(vec![
            Token::new(TokenKind::NotePosition, self.position as usize),
            Token::new(TokenKind::NotePitch, self.pitch as usize),
            Token::new(TokenKind::NoteDuration, self.duration.saturating_sub(1) as usize),
            Token::new(TokenKind::NoteInstFamily, self.inst_family as usize),
            Token::new(TokenKind::NoteVelocity, velocity_index(self.velocity)?),
        ])
    }

    /// Rebuild a note from its five tokens, in encoding order.
    pub fn from_tokens(tokens: &[Token]) -> Result<Self> {
        let [position, pitch, duration, family, velocity] = tokens else {
            return Err(RemiError::MalformedSequence(format!(
                "a note needs 5 tokens, got {}",
                tokens.len()
            )));
        };
        let field = |token: &Token, kind: TokenKind| -> Result<usize> {
            match (token.kind == kind, token.value) {
                (true, Some(value)) if value < kind.cardinality() => Ok(value),
                _ => Err(RemiError::MalformedSequence(format!(
                    "expected a valid {} token, found {token}",
                    kind.name()
                ))),
            }
        };
        Note::new(
            field(position, TokenKind::NotePosition)? as u32,
            field(pitch, TokenKind::NotePitch)? as u8,
            field(duration, TokenKind::NoteDuration)? as u32 + 1,
            field(family, TokenKind::NoteInstFamily)? as u8,
            bins::velocity_bin(field(velocity, TokenKind::NoteVelocity)?)?,
        )
    }

    pub fn to_compound(&self) -> Result<CompoundRecord> {
        Ok([
            RECORD_NOTE,
            0,
            0,
            shift(self.position as usize),
            shift(self.pitch as usize),
            self.duration as u16,
            shift(self.inst_family as usize),
            shift(velocity_index(self.velocity)?),
        ])
    }

    fn from_compound(record: &CompoundRecord) -> Result<Self> {
        let velocity = match record[7] {
            0 => {
                return Err(RemiError::MalformedSequence(
                    "note record has no velocity".to_string(),
                ));
            }
            raw => bins::velocity_bin(raw as usize - 1)?,
        };
        Note::new(
            record[3].saturating_sub(1) as u32,
            narrow_field("pitch", record[4].saturating_sub(1))?,
            record[5] as u32,
            narrow_field("instrument family", record[6].saturating_sub(1))?,
            velocity,
        )
    }
}

/// One element of an event sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Bar(Bar),
    Note(Note),
}

impl Event {
    pub fn to_tokens(&self) -> Result<Vec<Token>> {
        match self {
            Event::Bar(bar) => bar.to_tokens(),
            Event::Note(note) => note.to_tokens(),
        }
    }

    pub fn to_compound(&self) -> Result<CompoundRecord> {
        match self {
            Event::Bar(bar) => bar.to_compound(),
            Event::Note(note) => note.to_compound(),
        }
    }

    /// Decode one bar or note record. End-of-sequence records yield `None`.
    pub fn from_compound(record: &CompoundRecord) -> Result<Option<Self>> {
        match record[0] {
            RECORD_BAR => Ok(Some(Event::Bar(Bar::from_compound(record)?))),
            RECORD_NOTE => Ok(Some(Event::Note(Note::from_compound(record)?))),
            RECORD_EOS => Ok(None),
            other => Err(RemiError::MalformedSequence(format!(
                "unknown compound record type {other}"
            ))),
        }
    }
}

impl From<Bar> for Event {
    fn from(bar: Bar) -> Self {
        Event::Bar(bar)
    }
}

impl From<Note> for Event {
    fn from(note: Note) -> Self {
        Event::Note(note)
    }
}

fn tempo_index(bpm: u16) -> Result<usize> {
    bins::tempo_bin_index(bpm).ok_or(RemiError::NotABin {
        table: "tempo",
        value: bpm as u32,
    })
}

fn velocity_index(velocity: u8) -> Result<usize> {
    bins::velocity_bin_index(velocity).ok_or(RemiError::NotABin {
        table: "velocity",
        value: velocity as u32,
    })
}

fn check_range(table: &'static str, index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(RemiError::IndexOutOfRange { table, index });
    }
    Ok(())
}

fn narrow_field(table: &'static str, raw: u16) -> Result<u8> {
    u8::try_from(raw).map_err(|_| RemiError::IndexOutOfRange {
        table,
        index: raw as usize,
    })
}

// ---------------------------------------------------------------------------
// Compound words
// ---------------------------------------------------------------------------

/// Fixed-width compound word: `[type, tempo, chord, position, pitch,
/// duration, inst_family, velocity]`.
pub type CompoundRecord = [u16; 8];

pub const RECORD_BAR: u16 = 0;
pub const RECORD_NOTE: u16 = 1;
pub const RECORD_EOS: u16 = 2;

/// The terminal record of every compound matrix.
pub const EOS_RECORD: CompoundRecord = [RECORD_EOS, 0, 0, 0, 0, 0, 0, 0];

/// Table index to compound field; 0 stays free to mean "unused".
fn shift(index: usize) -> u16 {
    index as u16 + 1
}

// ---------------------------------------------------------------------------
// REMI tokens
// ---------------------------------------------------------------------------

/// Token types, in vocabulary order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Eos,
    Bar,
    Tempo,
    Chord,
    NotePosition,
    NotePitch,
    NoteDuration,
    NoteInstFamily,
    NoteVelocity,
}

impl TokenKind {
    pub const ALL: [TokenKind; 9] = [
        TokenKind::Eos,
        TokenKind::Bar,
        TokenKind::Tempo,
        TokenKind::Chord,
        TokenKind::NotePosition,
        TokenKind::NotePitch,
        TokenKind::NoteDuration,
        TokenKind::NoteInstFamily,
        TokenKind::NoteVelocity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Eos => "EOS",
            TokenKind::Bar => "Bar",
            TokenKind::Tempo => "Tempo",
            TokenKind::Chord => "Chord",
            TokenKind::NotePosition => "NotePosition",
            TokenKind::NotePitch => "NotePitch",
            TokenKind::NoteDuration => "NoteDuration",
            TokenKind::NoteInstFamily => "NoteInstFamily",
            TokenKind::NoteVelocity => "NoteVelocity",
        }
    }

    /// Whether tokens of this kind carry a value.
    pub fn has_value(self) -> bool {
        !matches!(self, TokenKind::Eos | TokenKind::Bar)
    }

    /// Number of vocabulary slots this kind occupies.
    pub fn cardinality(self) -> usize {
        match self {
            TokenKind::Eos | TokenKind::Bar => 1,
            TokenKind::Tempo => NUM_TEMPO_BINS,
            TokenKind::Chord => NUM_CHORDS,
            TokenKind::NotePosition => NUM_POSITIONS,
            TokenKind::NotePitch => NUM_PITCHES,
            TokenKind::NoteDuration => NUM_DURATIONS,
            TokenKind::NoteInstFamily => NUM_INST_FAMILIES,
            TokenKind::NoteVelocity => NUM_VELOCITY_BINS,
        }
    }

    /// First vocabulary slot of this kind.
    pub fn offset(self) -> usize {
        TokenKind::ALL
            .iter()
            .take_while(|&&k| k != self)
            .map(|k| k.cardinality())
            .sum()
    }

    fn from_name(name: &str) -> Option<Self> {
        TokenKind::ALL.into_iter().find(|k| k.name() == name)
    }
}

/// Total number of distinct tokens.
pub fn vocab_size() -> usize {
    TokenKind::ALL.iter().map(|k| k.cardinality()).sum()
}

/// A single REMI token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Table index; `None` for `Bar` and `EOS`.
    pub value: Option<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, value: usize) -> Self {
        Token {
            kind,
            value: Some(value),
        }
    }

    pub fn bare(kind: TokenKind) -> Self {
        Token { kind, value: None }
    }

    pub fn eos() -> Self {
        Token::bare(TokenKind::Eos)
    }

    /// Position of this token in the closed vocabulary.
    pub fn vocab_index(&self) -> Result<usize> {
        let slot = match (self.kind.has_value(), self.value) {
            (false, None) => 0,
            (true, Some(value)) if value < self.kind.cardinality() => value,
            _ => return Err(RemiError::UnknownToken(self.to_string())),
        };
        Ok(self.kind.offset() + slot)
    }

    pub fn from_vocab_index(index: usize) -> Result<Self> {
        let mut start = 0;
        for kind in TokenKind::ALL {
            let end = start + kind.cardinality();
            if index < end {
                return Ok(if kind.has_value() {
                    Token::new(kind, index - start)
                } else {
                    Token::bare(kind)
                });
            }
            start = end;
        }
        Err(RemiError::IndexOutOfRange {
            table: "token vocabulary",
            index,
        })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(value) => write!(f, "{}_{}", self.kind.name(), value),
            None => f.write_str(self.kind.name()),
        }
    }
}

impl FromStr for Token {
    type Err = RemiError;

    fn from_str(text: &str) -> Result<Self> {
        let unknown = || RemiError::UnknownToken(text.to_string());
        let token = match text.split_once('_') {
            Some((name, value)) => {
                let kind = TokenKind::from_name(name).ok_or_else(unknown)?;
                Token::new(kind, value.parse().map_err(|_| unknown())?)
            }
            None => Token::bare(TokenKind::from_name(text).ok_or_else(unknown)?),
        };
        // Rejects bare valued kinds, valued bare kinds, and out-of-range values.
        token.vocab_index().map_err(|_| unknown())?;
        Ok(token)
    }
}
