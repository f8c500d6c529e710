// Conversion between MIDI files and event sequences.
//
// Decoding quantizes a `MidiFile` onto the bar/step grid:
// - step = ticks_per_beat / 12, bar = 4 beats. Every note start must be a
//   multiple of step, otherwise the whole file is rejected.
// - notes, tempo changes and chord markers are grouped by bar index; only
//   bars that hold at least one of them are emitted, in ascending order.
// - velocities and tempos snap to the nearest bin, durations clamp to
//   1..=48 steps, instruments collapse to `program / 8` (16 for drums).
// - within a bar, notes sort by position; equal positions keep track order.
//
// Rendering walks the bars at the configured resolution (120 ticks per beat
// by default), writing one instrument per family bucket. It is the inverse
// of decoding for sequences with no empty bars.

use crate::bins::{self, BEATS_PER_BAR, PERCUSSION_FAMILY, SUBDIVISION};
use crate::config::CodecConfig;
use crate::error::{RemiError, Result};
use crate::event::{Bar, Note};
use crate::midi::{Instrument, Marker, MidiFile, MidiNote, TempoChange};
use crate::sequence::EventSeq;
use std::collections::BTreeMap;
use tracing::debug;

/// Everything that landed in one bar while scanning a file.
#[derive(Default)]
struct PendingBar {
    bar: Bar,
    notes: Vec<Note>,
}

/// Instrument-family bucket for a MIDI instrument.
pub fn inst_family(program: u8, is_drum: bool) -> u8 {
    if is_drum { PERCUSSION_FAMILY } else { program / 8 }
}

/// Representative (program, is_drum) for a family bucket.
pub fn family_program(family: u8) -> (u8, bool) {
    if family >= PERCUSSION_FAMILY {
        (0, true)
    } else {
        (family * 8, false)
    }
}

impl EventSeq {
    /// Decode a MIDI file with the default chord marker tag.
    pub fn from_midi(midi: &MidiFile) -> Result<Self> {
        EventSeq::from_midi_with(midi, &CodecConfig::default())
    }

    pub fn from_midi_with(midi: &MidiFile, config: &CodecConfig) -> Result<Self> {
        let ticks_per_beat = midi.ticks_per_beat as u32;
        let step = ticks_per_beat / SUBDIVISION;
        if step == 0 {
            return Err(RemiError::UnsupportedTiming(format!(
                "{ticks_per_beat} ticks per beat is coarser than the {SUBDIVISION}-step grid"
            )));
        }
        let bar_length = ticks_per_beat * BEATS_PER_BAR;
        let mut bars: BTreeMap<u32, PendingBar> = BTreeMap::new();

        for inst in &midi.instruments {
            let family = inst_family(inst.program, inst.is_drum);
            for note in &inst.notes {
                if note.start % step != 0 {
                    return Err(RemiError::NotQuantized {
                        tick: note.start,
                        step,
                    });
                }
                let bar_idx = note.start / bar_length;
                let note = Note::new(
                    (note.start - bar_idx * bar_length) / step,
                    note.pitch,
                    note.end.saturating_sub(note.start) / step,
                    family,
                    bins::snap_velocity(note.velocity as u32),
                )?;
                bars.entry(bar_idx).or_default().notes.push(note);
            }
        }

        for tempo in &midi.tempo_changes {
            bars.entry(tempo.tick / bar_length).or_default().bar.tempo =
                Some(bins::snap_tempo(tempo.bpm));
        }

        for marker in &midi.markers {
            if let Some(label) = marker.text.strip_prefix(config.chord_marker_tag.as_str()) {
                bars.entry(marker.tick / bar_length).or_default().bar.chord = Some(label.parse()?);
            }
        }

        let mut seq = EventSeq::new();
        for (_, mut pending) in bars {
            seq.push_bar(pending.bar);
            pending.notes.sort_by_key(|n| n.position);
            for note in pending.notes {
                seq.push_note(note)?;
            }
        }
        debug!(
            ticks_per_beat,
            bars = seq.num_bars(),
            events = seq.len(),
            "decoded MIDI into event sequence"
        );
        Ok(seq)
    }

    /// Render at the canonical 120 ticks per beat.
    pub fn to_midi(&self) -> Result<MidiFile> {
        self.to_midi_with(&CodecConfig::default())
    }

    pub fn to_midi_with(&self, config: &CodecConfig) -> Result<MidiFile> {
        config.validate()?;
        let step = config.step();
        let bar_length = config.ticks_per_beat as u32 * BEATS_PER_BAR;
        let mut midi = MidiFile::new(config.ticks_per_beat);

        for (bar_idx, segment) in self.segments().enumerate() {
            let bar_start = bar_idx as u32 * bar_length;
            if let Some(bpm) = segment.bar.tempo {
                midi.tempo_changes.push(TempoChange {
                    tick: bar_start,
                    bpm: bpm as f64,
                });
            }
            if let Some(chord) = segment.bar.chord {
                midi.markers.push(Marker {
                    tick: bar_start,
                    text: format!("{}{chord}", config.chord_marker_tag),
                });
            }
            for note in segment.notes() {
                let start = bar_start + note.position as u32 * step;
                family_instrument(&mut midi.instruments, note.inst_family)
                    .notes
                    .push(MidiNote {
                        pitch: note.pitch,
                        velocity: note.velocity,
                        start,
                        end: start + note.duration as u32 * step,
                    });
            }
        }

        for inst in &mut midi.instruments {
            inst.notes.sort_by_key(|n| n.start);
        }
        midi.tempo_changes.sort_by_key(|t| t.tick);
        midi.markers.sort_by_key(|m| m.tick);
        debug!(
            ticks_per_beat = config.ticks_per_beat,
            instruments = midi.instruments.len(),
            end_tick = midi.max_tick(),
            "rendered event sequence to MIDI"
        );
        Ok(midi)
    }
}

/// The instrument for `family`, created on first use.
fn family_instrument(instruments: &mut Vec<Instrument>, family: u8) -> &mut Instrument {
    let (program, is_drum) = family_program(family);
    let idx = match instruments
        .iter()
        .position(|i| i.program == program && i.is_drum == is_drum)
    {
        Some(idx) => idx,
        None => {
            instruments.push(Instrument::new(program, is_drum));
            instruments.len() - 1
        }
    };
    &mut instruments[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::Chord;

    fn midi_note(pitch: u8, start: u32, end: u32) -> MidiNote {
        MidiNote {
            pitch,
            velocity: 100,
            start,
            end,
        }
    }

    fn instrument(program: u8, is_drum: bool, notes: Vec<MidiNote>) -> Instrument {
        let mut inst = Instrument::new(program, is_drum);
        inst.notes = notes;
        inst
    }

    fn chord(label: &str) -> Chord {
        label.parse().unwrap()
    }

    #[test]
    fn family_buckets() {
        assert_eq!(inst_family(0, false), 0);
        assert_eq!(inst_family(33, false), 4);
        assert_eq!(inst_family(127, false), 15);
        assert_eq!(inst_family(40, true), 16);
        assert_eq!(family_program(4), (32, false));
        assert_eq!(family_program(16), (0, true));
    }

    #[test]
    fn unquantized_note_is_rejected() {
        let mut midi = MidiFile::new(120);
        midi.instruments.push(instrument(0, false, vec![midi_note(60, 7, 27)]));
        assert!(matches!(
            EventSeq::from_midi(&midi),
            Err(RemiError::NotQuantized { tick: 7, step: 10 })
        ));
    }

    #[test]
    fn notes_are_grouped_by_bar_and_sorted() {
        let mut midi = MidiFile::new(120);
        midi.instruments.push(instrument(
            0,
            false,
            vec![midi_note(60, 240, 360), midi_note(62, 480 + 10, 480 + 130)],
        ));
        midi.instruments.push(instrument(33, false, vec![midi_note(40, 0, 480), midi_note(43, 240, 300)]));
        let seq = EventSeq::from_midi(&midi).unwrap();

        let segments: Vec<_> = seq.segments().collect();
        assert_eq!(segments.len(), 2);
        let first: Vec<(u8, u8, u8, u8)> = segments[0]
            .notes()
            .map(|n| (n.position, n.pitch, n.duration, n.inst_family))
            .collect();
        // Position 24 appears in both instruments; the first instrument's note
        // stays first.
        assert_eq!(first, [(0, 40, 48, 4), (24, 60, 12, 0), (24, 43, 6, 4)]);
        let second: Vec<(u8, u8)> = segments[1].notes().map(|n| (n.position, n.duration)).collect();
        assert_eq!(second, [(1, 12)]);
    }

    #[test]
    fn empty_bars_are_not_emitted() {
        let mut midi = MidiFile::new(120);
        midi.instruments.push(instrument(0, false, vec![midi_note(60, 0, 10), midi_note(60, 3 * 480, 3 * 480 + 10)]));
        let seq = EventSeq::from_midi(&midi).unwrap();
        assert_eq!(seq.num_bars(), 2);
        assert_eq!(seq.len(), 4);
    }

    #[test]
    fn velocity_and_duration_are_quantized() {
        let mut midi = MidiFile::new(120);
        midi.instruments.push(instrument(
            0,
            false,
            vec![
                MidiNote { pitch: 60, velocity: 100, start: 0, end: 5 },
                MidiNote { pitch: 62, velocity: 1, start: 10, end: 10 + 60 * 10 },
            ],
        ));
        let seq = EventSeq::from_midi(&midi).unwrap();
        let notes: Vec<(u8, u8)> = seq.segments().flat_map(|s| s.notes()).map(|n| (n.duration, n.velocity)).collect();
        assert_eq!(notes, [(1, 98), (48, 9)]);
    }

    #[test]
    fn tempo_and_chord_markers_attach_to_bars() {
        let mut midi = MidiFile::new(120);
        midi.instruments.push(instrument(0, false, vec![midi_note(60, 0, 10)]));
        midi.tempo_changes = vec![
            TempoChange { tick: 0, bpm: 120.0 },
            TempoChange { tick: 960, bpm: 139.6 },
        ];
        midi.markers = vec![
            Marker { tick: 0, text: "Chord_C_M".to_string() },
            Marker { tick: 500, text: "Verse".to_string() },
            Marker { tick: 960, text: "Chord_A_m".to_string() },
        ];
        let seq = EventSeq::from_midi(&midi).unwrap();
        let bars: Vec<Bar> = seq.segments().map(|s| *s.bar).collect();
        assert_eq!(
            bars,
            [
                Bar { tempo: Some(118), chord: Some(chord("C_M")) },
                Bar { tempo: Some(138), chord: Some(chord("A_m")) },
            ]
        );
    }

    #[test]
    fn fractional_tempos_snap_to_nearest_bin() {
        let mut midi = MidiFile::new(120);
        // One tempo per bar, straddling the 118/122 midpoint at 120.
        midi.tempo_changes = [119.6, 120.0, 120.4, 121.7]
            .iter()
            .enumerate()
            .map(|(bar, &bpm)| TempoChange { tick: bar as u32 * 480, bpm })
            .collect();
        let seq = EventSeq::from_midi(&midi).unwrap();
        let tempos: Vec<Option<u16>> = seq.segments().map(|s| s.bar.tempo).collect();
        assert_eq!(tempos, [Some(118), Some(118), Some(122), Some(122)]);
    }

    #[test]
    fn custom_marker_tag() {
        let mut midi = MidiFile::new(120);
        midi.markers = vec![Marker { tick: 0, text: "harmony:G_7".to_string() }];
        let config = CodecConfig {
            chord_marker_tag: "harmony:".to_string(),
            ..CodecConfig::default()
        };
        let seq = EventSeq::from_midi_with(&midi, &config).unwrap();
        assert_eq!(seq.chords(), [Some(chord("G_7"))]);
        assert!(EventSeq::from_midi(&midi).unwrap().is_empty());
    }

    #[test]
    fn bad_chord_marker_is_rejected() {
        let mut midi = MidiFile::new(120);
        midi.markers = vec![Marker { tick: 0, text: "Chord_C_dim".to_string() }];
        assert!(matches!(EventSeq::from_midi(&midi), Err(RemiError::UnknownQuality(_))));
    }

    #[test]
    fn coarse_resolution_is_rejected() {
        let midi = MidiFile::new(8);
        assert!(matches!(EventSeq::from_midi(&midi), Err(RemiError::UnsupportedTiming(_))));
    }

    #[test]
    fn other_resolutions_map_to_the_same_grid() {
        let mut midi = MidiFile::new(96);
        midi.instruments.push(instrument(0, false, vec![midi_note(60, 384 + 8, 384 + 8 + 96)]));
        let seq = EventSeq::from_midi(&midi).unwrap();
        let note = *seq.segments().next().unwrap().notes().next().unwrap();
        assert_eq!((note.position, note.duration), (1, 12));
    }

    #[test]
    fn render_layout() {
        let mut seq = EventSeq::new();
        seq.push_bar(Bar::new(Some(118), Some(chord("C_M"))).unwrap());
        seq.push_note(Note::new(0, 60, 12, 0, 61).unwrap()).unwrap();
        seq.push_note(Note::new(6, 36, 1, 16, 127).unwrap()).unwrap();
        seq.push_bar(Bar::with_chord(chord("A_m")));
        seq.push_note(Note::new(24, 64, 48, 0, 61).unwrap()).unwrap();

        let midi = seq.to_midi().unwrap();
        assert_eq!(midi.ticks_per_beat, 120);
        assert_eq!(midi.tempo_changes, [TempoChange { tick: 0, bpm: 118.0 }]);
        assert_eq!(
            midi.markers,
            [
                Marker { tick: 0, text: "Chord_C_M".to_string() },
                Marker { tick: 480, text: "Chord_A_m".to_string() },
            ]
        );
        assert_eq!(midi.instruments.len(), 2);
        assert_eq!((midi.instruments[0].program, midi.instruments[0].is_drum), (0, false));
        assert_eq!(
            midi.instruments[0].notes,
            [
                MidiNote { pitch: 60, velocity: 61, start: 0, end: 120 },
                MidiNote { pitch: 64, velocity: 61, start: 720, end: 1200 },
            ]
        );
        assert!(midi.instruments[1].is_drum);
        assert_eq!(
            midi.instruments[1].notes,
            [MidiNote { pitch: 36, velocity: 127, start: 60, end: 70 }]
        );
    }

    #[test]
    fn render_at_higher_resolution() {
        let mut seq = EventSeq::new();
        seq.push_bar(Bar::default());
        seq.push_bar(Bar::default());
        seq.push_note(Note::new(3, 60, 2, 5, 61).unwrap()).unwrap();
        let config = CodecConfig {
            ticks_per_beat: 480,
            ..CodecConfig::default()
        };
        let midi = seq.to_midi_with(&config).unwrap();
        assert_eq!(midi.instruments[0].program, 40);
        assert_eq!(
            midi.instruments[0].notes,
            [MidiNote { pitch: 60, velocity: 61, start: 1920 + 120, end: 1920 + 200 }]
        );
        assert_eq!(EventSeq::from_midi(&midi).unwrap().len(), 2);
    }

    #[test]
    fn decode_then_render_reproduces_notes() {
        let mut midi = MidiFile::new(120);
        midi.instruments.push(instrument(
            0,
            false,
            vec![midi_note(60, 0, 120), midi_note(67, 470, 520), midi_note(72, 480, 960)],
        ));
        midi.instruments.push(instrument(0, true, vec![midi_note(36, 0, 10), midi_note(38, 240, 250)]));
        midi.tempo_changes = vec![TempoChange { tick: 0, bpm: 118.0 }];
        midi.markers = vec![Marker { tick: 0, text: "Chord_C_M".to_string() }];

        let rendered = EventSeq::from_midi(&midi).unwrap().to_midi().unwrap();
        let expected: Vec<MidiNote> = midi.instruments[0]
            .notes
            .iter()
            .map(|n| MidiNote { velocity: 98, ..*n })
            .collect();
        assert_eq!(rendered.instruments[0].notes, expected);
        assert!(rendered.instruments[1].is_drum);
        assert_eq!(rendered.instruments[1].notes.len(), 2);
        assert_eq!(rendered.tempo_changes, midi.tempo_changes);
        assert_eq!(rendered.markers, midi.markers);
    }
}
