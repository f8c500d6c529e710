// REMI Codec
//
// Converts multi-instrument MIDI into a bar-structured symbolic event
// sequence and serializes that sequence either as a flat token stream
// (REMI) or as a compound matrix of fixed-width records, one per bar or
// note. Also provides a chord-aware pitch corrector that snaps notes into
// the scale implied by each bar's chord.
//
// Architecture:
// - bins.rs: Time grid constants, tempo/velocity bin tables, chord labels
// - scale.rs: Chord-quality scale templates and admissible pitch sets
// - event.rs: Bar/Note events, token kinds, vocabulary, compound records
// - sequence.rs: EventSeq container, token and compound encode/decode
// - midi.rs: MIDI file model plus Standard MIDI File read/write via midly
// - midi_codec.rs: Quantized MIDI <-> EventSeq conversion
// - correct.rs: Chord resolution and pitch correction
// - config.rs: JSON-loadable codec settings
// - generate.rs: Random grid-aligned MIDI for testing
// - error.rs: Crate-wide error type
//
// Bars are four beats of twelve steps each. Everything in the token
// vocabulary is defined on that grid, independent of the MIDI resolution.

pub mod bins;
pub mod config;
pub mod correct;
pub mod error;
pub mod event;
pub mod generate;
pub mod midi;
pub mod midi_codec;
pub mod scale;
pub mod sequence;

pub use error::{RemiError, Result};
pub use sequence::EventSeq;
