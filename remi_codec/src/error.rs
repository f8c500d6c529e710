// Error type shared by every codec, the corrector, and the MIDI boundary.
//
// Failures fall into three groups: misaligned input (a note that does not sit
// on the 1/12-beat grid), unresolved chords (pitch correction with no chord
// context), and unknown vocabulary (labels, bins, tokens, or records that do
// not belong to the closed tables in `bins.rs`). All of them are fatal for the
// call that raised them; nothing is retried or defaulted. The remaining
// variants wrap errors from the MIDI parser, the filesystem, and JSON config
// loading.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemiError {
    /// A note's start tick is not a multiple of the subdivision step.
    #[error("this file is not quantized: note starts at tick {tick}, step is {step} ticks")]
    NotQuantized { tick: u32, step: u32 },

    /// Pitch correction was requested for a bar with no chord, explicit or
    /// carried forward.
    #[error("no chord available for bar {bar}")]
    UnresolvedChord { bar: usize },

    /// An explicit chord override list does not line up with the bars.
    #[error("chord override has {chords} entries but the sequence has {bars} bars")]
    ChordCountMismatch { bars: usize, chords: usize },

    #[error("unknown pitch class '{0}'")]
    UnknownRoot(String),

    #[error("unknown chord quality '{0}'")]
    UnknownQuality(String),

    /// A chord label that is not of the form `<root>_<quality>`.
    #[error("malformed chord label '{0}'")]
    MalformedChord(String),

    /// A value that must be an exact member of a bin table is not.
    #[error("{value} is not a {table} bin")]
    NotABin { table: &'static str, value: u32 },

    /// An index past the end of a table or token range.
    #[error("{table} index {index} is out of range")]
    IndexOutOfRange { table: &'static str, index: usize },

    #[error("unknown token '{0}'")]
    UnknownToken(String),

    /// Structurally invalid token stream, compound matrix, or event list.
    #[error("malformed sequence: {0}")]
    MalformedSequence(String),

    #[error("unsupported MIDI timing: {0}")]
    UnsupportedTiming(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("MIDI parse error: {0}")]
    Midi(#[from] midly::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RemiError>;
