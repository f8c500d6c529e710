// MIDI file boundary: an absolute-tick view of a Standard MIDI File.
//
// `MidiFile` is the shape the codec reads from and renders to: ticks per
// beat, instrument tracks holding notes with absolute start/end ticks, tempo
// changes in BPM, and text markers. Converting to and from SMF bytes goes
// through the `midly` crate.
//
// Reading pairs note-on/note-off events first-in first-out per (channel,
// key), treats a note-on with velocity 0 as a note-off, and starts a new
// instrument for every distinct (track, channel, program). Channel 10
// (index 9) is percussion. Notes still sounding at the end of a track are
// dropped.
//
// Writing produces SMF format 1: a conductor track with tempo and marker
// meta events, then one track per instrument. Melodic instruments take
// channels in order, skipping the percussion channel.

use crate::error::{RemiError, Result};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

/// MIDI channel reserved for percussion (channel 10, zero-based).
const PERCUSSION_CHANNEL: u8 = 9;

/// Largest resolution an SMF header can hold (15 bits).
pub const MAX_TICKS_PER_BEAT: u16 = 0x7FFF;

/// Largest delta time an SMF event can carry (28 bits).
const MAX_DELTA: u32 = 0x0FFF_FFFF;

/// One sounding note, in absolute ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MidiNote {
    pub pitch: u8,
    pub velocity: u8,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Instrument {
    /// General MIDI program, 0-127. Ignored for percussion.
    pub program: u8,
    pub is_drum: bool,
    pub name: String,
    pub notes: Vec<MidiNote>,
}

impl Instrument {
    pub fn new(program: u8, is_drum: bool) -> Self {
        Instrument {
            program,
            is_drum,
            name: String::new(),
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub tick: u32,
    pub bpm: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub tick: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiFile {
    pub ticks_per_beat: u16,
    pub instruments: Vec<Instrument>,
    pub tempo_changes: Vec<TempoChange>,
    pub markers: Vec<Marker>,
}

impl MidiFile {
    pub fn new(ticks_per_beat: u16) -> Self {
        MidiFile {
            ticks_per_beat,
            instruments: Vec::new(),
            tempo_changes: Vec::new(),
            markers: Vec::new(),
        }
    }

    /// Latest tick touched by any note, tempo change, or marker.
    pub fn max_tick(&self) -> u32 {
        let notes = self.instruments.iter().flat_map(|i| i.notes.iter().map(|n| n.end));
        let tempos = self.tempo_changes.iter().map(|t| t.tick);
        let markers = self.markers.iter().map(|m| m.tick);
        notes.chain(tempos).chain(markers).max().unwrap_or(0)
    }

    /// Read a MIDI file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        MidiFile::parse(&bytes)
    }

    /// Parse SMF bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let smf = Smf::parse(bytes)?;
        MidiFile::from_smf(&smf)
    }

    pub fn from_smf(smf: &Smf<'_>) -> Result<Self> {
        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(tpb) => tpb.as_int(),
            Timing::Timecode(fps, subframes) => {
                return Err(RemiError::UnsupportedTiming(format!(
                    "SMPTE timecode ({fps:?}, {subframes} subframes per frame)"
                )));
            }
        };
        let mut midi = MidiFile::new(ticks_per_beat);

        for (track_idx, track) in smf.tracks.iter().enumerate() {
            let mut tick: u32 = 0;
            let mut programs = [0u8; 16];
            let mut track_name = String::new();
            // (channel, program) -> index into midi.instruments
            let mut instruments: HashMap<(u8, u8), usize> = HashMap::new();
            // (channel, key) -> queued (start tick, velocity)
            let mut sounding: HashMap<(u8, u8), VecDeque<(u32, u8)>> = HashMap::new();

            for event in track {
                tick = tick.checked_add(event.delta.as_int()).ok_or_else(|| {
                    RemiError::UnsupportedTiming(format!(
                        "track {track_idx} runs past tick {}",
                        u32::MAX
                    ))
                })?;
                match event.kind {
                    TrackEventKind::Meta(MetaMessage::Tempo(us_per_beat)) => {
                        midi.tempo_changes.push(TempoChange {
                            tick,
                            bpm: 60_000_000.0 / us_per_beat.as_int().max(1) as f64,
                        });
                    }
                    TrackEventKind::Meta(MetaMessage::Marker(text)) => {
                        midi.markers.push(Marker {
                            tick,
                            text: String::from_utf8_lossy(text).into_owned(),
                        });
                    }
                    TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                        track_name = String::from_utf8_lossy(name).into_owned();
                    }
                    TrackEventKind::Midi { channel, message } => {
                        let channel = channel.as_int();
                        match message {
                            MidiMessage::ProgramChange { program } => {
                                programs[channel as usize] = program.as_int();
                            }
                            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                                sounding
                                    .entry((channel, key.as_int()))
                                    .or_default()
                                    .push_back((tick, vel.as_int()));
                            }
                            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                                let Some((start, velocity)) = sounding
                                    .get_mut(&(channel, key.as_int()))
                                    .and_then(VecDeque::pop_front)
                                else {
                                    continue;
                                };
                                let program = programs[channel as usize];
                                let idx = *instruments.entry((channel, program)).or_insert_with(|| {
                                    let mut inst = Instrument::new(program, channel == PERCUSSION_CHANNEL);
                                    inst.name = track_name.clone();
                                    midi.instruments.push(inst);
                                    midi.instruments.len() - 1
                                });
                                midi.instruments[idx].notes.push(MidiNote {
                                    pitch: key.as_int(),
                                    velocity,
                                    start,
                                    end: tick,
                                });
                            }
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }
            tracing::trace!(track = track_idx, end_tick = tick, "read MIDI track");
        }

        for inst in &mut midi.instruments {
            inst.notes.sort_by_key(|n| (n.start, n.pitch));
        }
        midi.tempo_changes.sort_by_key(|t| t.tick);
        midi.markers.sort_by_key(|m| m.tick);
        Ok(midi)
    }

    /// Build an in-memory SMF borrowing marker and name text from `self`.
    ///
    /// Fails if the resolution or a gap between events does not fit the
    /// SMF field widths.
    pub fn to_smf(&self) -> Result<Smf<'_>> {
        if self.ticks_per_beat == 0 || self.ticks_per_beat > MAX_TICKS_PER_BEAT {
            return Err(RemiError::UnsupportedTiming(format!(
                "{} ticks per beat does not fit an SMF header",
                self.ticks_per_beat
            )));
        }
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(self.ticks_per_beat)),
        ));

        // Track 0: tempo and markers
        let mut conductor: Vec<(u32, TrackEventKind<'_>)> = Vec::new();
        for tempo in &self.tempo_changes {
            let us_per_beat = (60_000_000.0 / tempo.bpm.max(1.0)).round() as u32;
            conductor.push((
                tempo.tick,
                TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us_per_beat.min(0xFF_FFFF)))),
            ));
        }
        for marker in &self.markers {
            conductor.push((
                marker.tick,
                TrackEventKind::Meta(MetaMessage::Marker(marker.text.as_bytes())),
            ));
        }
        conductor.sort_by_key(|(tick, _)| *tick);
        smf.tracks.push(delta_encode(conductor)?);

        let mut melodic_channels = (0u8..16).filter(|&c| c != PERCUSSION_CHANNEL).cycle();
        for inst in &self.instruments {
            let channel = if inst.is_drum {
                PERCUSSION_CHANNEL
            } else {
                melodic_channels.next().unwrap_or(0)
            };
            let channel = u4::new(channel);

            let mut events: Vec<(u32, TrackEventKind<'_>)> = Vec::new();
            if !inst.name.is_empty() {
                events.push((0, TrackEventKind::Meta(MetaMessage::TrackName(inst.name.as_bytes()))));
            }
            events.push((
                0,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::ProgramChange {
                        program: u7::new(inst.program.min(127)),
                    },
                },
            ));

            // Note-offs sort ahead of note-ons at the same tick so repeated
            // pitches re-attack cleanly.
            let mut notes: Vec<(u32, bool, TrackEventKind<'_>)> = Vec::new();
            for note in &inst.notes {
                let key = u7::new(note.pitch.min(127));
                notes.push((
                    note.start,
                    true,
                    TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOn {
                            key,
                            vel: u7::new(note.velocity.clamp(1, 127)),
                        },
                    },
                ));
                notes.push((
                    note.end,
                    false,
                    TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOff { key, vel: u7::new(0) },
                    },
                ));
            }
            notes.sort_by_key(|(tick, is_on, _)| (*tick, *is_on));
            events.extend(notes.into_iter().map(|(tick, _, kind)| (tick, kind)));
            smf.tracks.push(delta_encode(events)?);
        }

        Ok(smf)
    }

    /// Encode as SMF bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_smf()?
            .write(&mut buf)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(buf)
    }

    /// Write as a MIDI file on disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

/// Turn absolute-tick events (already in order) into a delta-timed track
/// closed by an end-of-track event.
fn delta_encode(events: Vec<(u32, TrackEventKind<'_>)>) -> Result<Track<'_>> {
    let mut track: Track<'_> = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0;
    for (tick, kind) in events {
        let delta = tick - last_tick;
        if delta > MAX_DELTA {
            return Err(RemiError::UnsupportedTiming(format!(
                "gap of {delta} ticks before tick {tick} exceeds the SMF delta limit"
            )));
        }
        track.push(TrackEvent {
            delta: u28::new(delta),
            kind,
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    Ok(track)
}
