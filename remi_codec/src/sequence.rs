// The event sequence: a whole piece as an ordered list of bars and notes.
//
// The list is split into segments, each one `Bar` followed by that bar's
// notes in non-decreasing position order. `push_bar`/`push_note` and
// `from_events` enforce this, so every decoder builds through them and every
// encoder can assume it.
//
// This module holds the token and compound codecs; MIDI decoding and
// rendering live in midi_codec.rs. All decoders allocate a fresh sequence.
//
// Encodings:
// - tokens: the REMI stream of every event followed by `EOS`, as `Token`s,
//   strings, or vocabulary indices.
// - compound: one 8-field record per event followed by `EOS_RECORD`. Decoding
//   the encoding of a sequence returns an identical sequence.

use crate::bins::{self, Chord};
use crate::error::{RemiError, Result};
use crate::event::{Bar, CompoundRecord, EOS_RECORD, Event, Note, Token, TokenKind};
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Event>", into = "Vec<Event>")]
pub struct EventSeq {
    events: Vec<Event>,
}

/// One bar and the events that belong to it.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub bar: &'a Bar,
    notes: &'a [Event],
}

impl<'a> Segment<'a> {
    pub fn notes(self) -> impl Iterator<Item = &'a Note> {
        self.notes.iter().filter_map(|e| match e {
            Event::Note(note) => Some(note),
            Event::Bar(_) => None,
        })
    }

    pub fn num_notes(&self) -> usize {
        self.notes.len()
    }
}

impl EventSeq {
    pub fn new() -> Self {
        EventSeq { events: Vec::new() }
    }

    /// Build a sequence from a raw event list, checking the segment invariant.
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Result<Self> {
        let mut seq = EventSeq::new();
        for event in events {
            match event {
                Event::Bar(bar) => seq.push_bar(bar),
                Event::Note(note) => seq.push_note(note)?,
            }
        }
        Ok(seq)
    }

    /// Open a new bar.
    pub fn push_bar(&mut self, bar: Bar) {
        self.events.push(Event::Bar(bar));
    }

    /// Append a note to the current bar.
    ///
    /// Fails if no bar has been opened yet, or if the note would start
    /// before the previous note of the same bar.
    pub fn push_note(&mut self, note: Note) -> Result<()> {
        match self.events.last() {
            None => {
                return Err(RemiError::MalformedSequence(
                    "note before the first bar".to_string(),
                ));
            }
            Some(Event::Note(prev)) if prev.position > note.position => {
                return Err(RemiError::MalformedSequence(format!(
                    "note at position {} follows a note at position {}",
                    note.position, prev.position
                )));
            }
            Some(_) => {}
        }
        self.events.push(Event::Note(note));
        Ok(())
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn num_bars(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Bar(_)))
            .count()
    }

    /// Iterate over bars, each with its notes.
    pub fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        self.events
            .chunk_by(|_, next| matches!(next, Event::Note(_)))
            .filter_map(|chunk| match chunk.split_first() {
                Some((Event::Bar(bar), notes)) => Some(Segment { bar, notes }),
                _ => None,
            })
    }

    /// The chord annotation of every bar, in order.
    pub fn chords(&self) -> Vec<Option<Chord>> {
        self.segments().map(|s| s.bar.chord).collect()
    }

    /// A new sequence holding whole bars `range` (clamped to the bar count).
    pub fn slice_bars(&self, range: Range<usize>) -> EventSeq {
        let mut events = Vec::new();
        for segment in self
            .segments()
            .skip(range.start)
            .take(range.end.saturating_sub(range.start))
        {
            events.push(Event::Bar(*segment.bar));
            events.extend(segment.notes.iter().copied());
        }
        EventSeq { events }
    }

    // -----------------------------------------------------------------------
    // Token stream
    // -----------------------------------------------------------------------

    /// Encode as REMI tokens, terminated by `EOS`.
    pub fn to_tokens(&self) -> Result<Vec<Token>> {
        let mut tokens = Vec::with_capacity(self.events.len() * 5 + 1);
        for event in &self.events {
            tokens.extend(event.to_tokens()?);
        }
        tokens.push(Token::eos());
        Ok(tokens)
    }

    pub fn to_token_strings(&self) -> Result<Vec<String>> {
        Ok(self.to_tokens()?.iter().map(Token::to_string).collect())
    }

    /// Encode as indices into the closed token vocabulary.
    pub fn to_token_indices(&self) -> Result<Vec<usize>> {
        self.to_tokens()?.iter().map(Token::vocab_index).collect()
    }

    /// Decode a REMI token stream. Decoding stops at the first `EOS`; a
    /// stream without one is accepted up to its end.
    pub fn from_tokens(tokens: &[Token]) -> Result<Self> {
        let mut seq = EventSeq::new();
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            match token.kind {
                TokenKind::Eos => break,
                TokenKind::Bar => seq.push_bar(Bar::default()),
                TokenKind::Tempo => {
                    let tempo = bins::tempo_bin(token_value(token)?)?;
                    set_once(&mut seq.last_bar_mut(token)?.tempo, tempo, token)?;
                }
                TokenKind::Chord => {
                    let chord = Chord::from_index(token_value(token)?)?;
                    set_once(&mut seq.last_bar_mut(token)?.chord, chord, token)?;
                }
                TokenKind::NotePosition => {
                    let end = (i + 5).min(tokens.len());
                    seq.push_note(Note::from_tokens(&tokens[i..end])?)?;
                    i = end;
                    continue;
                }
                _ => {
                    return Err(RemiError::MalformedSequence(format!(
                        "unexpected token {token} at index {i}"
                    )));
                }
            }
            i += 1;
        }
        Ok(seq)
    }

    /// Decode whitespace-separated token strings.
    pub fn from_token_str(text: &str) -> Result<Self> {
        let tokens = text
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<Vec<Token>>>()?;
        EventSeq::from_tokens(&tokens)
    }

    pub fn from_token_indices(indices: &[usize]) -> Result<Self> {
        let tokens = indices
            .iter()
            .map(|&i| Token::from_vocab_index(i))
            .collect::<Result<Vec<Token>>>()?;
        EventSeq::from_tokens(&tokens)
    }

    /// The bar a tempo or chord token attaches to: the immediately
    /// preceding event, which must be a bar.
    fn last_bar_mut(&mut self, token: &Token) -> Result<&mut Bar> {
        match self.events.last_mut() {
            Some(Event::Bar(bar)) => Ok(bar),
            _ => Err(RemiError::MalformedSequence(format!(
                "{token} must directly follow a bar"
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Compound matrix
    // -----------------------------------------------------------------------

    /// Encode as compound records, terminated by `EOS_RECORD`.
    pub fn to_compound(&self) -> Result<Vec<CompoundRecord>> {
        let mut records = Vec::with_capacity(self.events.len() + 1);
        for event in &self.events {
            records.push(event.to_compound()?);
        }
        records.push(EOS_RECORD);
        Ok(records)
    }

    /// Decode compound records up to the first end-of-sequence record.
    pub fn from_compound(records: &[CompoundRecord]) -> Result<Self> {
        let mut seq = EventSeq::new();
        for record in records {
            match Event::from_compound(record)? {
                Some(Event::Bar(bar)) => seq.push_bar(bar),
                Some(Event::Note(note)) => seq.push_note(note)?,
                None => break,
            }
        }
        Ok(seq)
    }
}

/// Fill a bar attribute, refusing a second value for the same bar.
fn set_once<T>(slot: &mut Option<T>, value: T, token: &Token) -> Result<()> {
    if slot.is_some() {
        return Err(RemiError::MalformedSequence(format!(
            "{token} repeats an attribute the bar already has"
        )));
    }
    *slot = Some(value);
    Ok(())
}

fn token_value(token: &Token) -> Result<usize> {
    token
        .value
        .ok_or_else(|| RemiError::UnknownToken(token.to_string()))
}

impl TryFrom<Vec<Event>> for EventSeq {
    type Error = RemiError;

    fn try_from(events: Vec<Event>) -> Result<Self> {
        EventSeq::from_events(events)
    }
}

impl From<EventSeq> for Vec<Event> {
    fn from(seq: EventSeq) -> Vec<Event> {
        seq.events
    }
}

impl<'a> IntoIterator for &'a EventSeq {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
