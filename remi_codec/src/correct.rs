// Chord-aware pitch correction.
//
// Snaps every note of a bar to the nearest pitch in the scale implied by
// that bar's chord (see scale.rs). Equidistant candidates resolve to the
// lower pitch. Only pitches change; position, duration, instrument family
// and velocity are carried over untouched.
//
// Chords per bar come either from an explicit override list or from the
// sequence's own bar annotations, where an unannotated bar inherits the
// chord of the nearest annotated bar before it. A bar with no chord from
// either source is an error.
//
// Correction builds a new sequence. Its bars carry only the resolved chord:
// tempo annotations are not copied across.

use crate::bins::Chord;
use crate::error::{RemiError, Result};
use crate::event::{Bar, Note};
use crate::sequence::EventSeq;
use tracing::trace;

/// The admissible pitches for a chord label such as `"F#_m7"`.
pub fn scale_set(label: &str) -> Result<Vec<u8>> {
    Ok(label.parse::<Chord>()?.scale_set())
}

/// Nearest member of an ascending `scale` to `pitch`; ties go to the lower.
fn nearest_pitch(scale: &[u8], pitch: u8) -> u8 {
    let mut best = pitch;
    let mut best_dist = u8::MAX;
    for &candidate in scale {
        let dist = candidate.abs_diff(pitch);
        if dist < best_dist {
            best = candidate;
            best_dist = dist;
        }
    }
    best
}

/// Copies of `notes` with every pitch snapped into `chord`'s scale.
pub fn correct_pitches(notes: &[Note], chord: &Chord) -> Vec<Note> {
    let scale = chord.scale_set();
    notes
        .iter()
        .map(|note| Note {
            pitch: nearest_pitch(&scale, note.pitch),
            ..*note
        })
        .collect()
}

/// The chord in effect for every bar, carrying the last annotation forward
/// over bars that have none.
pub fn resolve_chords(seq: &EventSeq) -> Result<Vec<Chord>> {
    let mut resolved = Vec::with_capacity(seq.num_bars());
    let mut current: Option<Chord> = None;
    for (bar, chord) in seq.chords().into_iter().enumerate() {
        current = chord.or(current);
        resolved.push(current.ok_or(RemiError::UnresolvedChord { bar })?);
    }
    Ok(resolved)
}

/// Pitch-correct a whole sequence.
///
/// `chords`, when given, must hold exactly one chord per bar and replaces
/// the sequence's own annotations.
pub fn correct_sequence(seq: &EventSeq, chords: Option<&[Chord]>) -> Result<EventSeq> {
    let chords = match chords {
        Some(chords) if chords.len() != seq.num_bars() => {
            return Err(RemiError::ChordCountMismatch {
                bars: seq.num_bars(),
                chords: chords.len(),
            });
        }
        Some(chords) => chords.to_vec(),
        None => resolve_chords(seq)?,
    };

    let mut corrected = EventSeq::new();
    for (bar_idx, (segment, chord)) in seq.segments().zip(chords).enumerate() {
        let before: Vec<Note> = segment.notes().copied().collect();
        let notes = correct_pitches(&before, &chord);
        let moved = before
            .iter()
            .zip(&notes)
            .filter(|(old, new)| old.pitch != new.pitch)
            .count();
        trace!(bar = bar_idx, %chord, notes = notes.len(), moved, "corrected bar");

        corrected.push_bar(Bar::with_chord(chord));
        for note in notes {
            corrected.push_note(note)?;
        }
    }
    Ok(corrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(label: &str) -> Chord {
        label.parse().unwrap()
    }

    fn note(position: u32, pitch: u8) -> Note {
        Note::new(position, pitch, 6, 0, 61).unwrap()
    }

    fn pitches(notes: &[Note]) -> Vec<u8> {
        notes.iter().map(|n| n.pitch).collect()
    }

    #[test]
    fn scale_set_from_label() {
        let set = scale_set("C_M").unwrap();
        assert_eq!(set.len(), 75);
        assert!(set.contains(&60) && !set.contains(&61));
        assert!(matches!(scale_set("X_M"), Err(RemiError::UnknownRoot(_))));
        assert!(matches!(scale_set("C_q"), Err(RemiError::UnknownQuality(_))));
    }

    #[test]
    fn nearest_pitch_prefers_lower_on_ties() {
        assert_eq!(nearest_pitch(&[60, 62], 61), 60);
        assert_eq!(nearest_pitch(&[60, 62], 62), 62);
        assert_eq!(nearest_pitch(&[60, 64], 63), 64);
        assert_eq!(nearest_pitch(&[60, 64], 0), 60);
    }

    #[test]
    fn in_scale_notes_are_unchanged() {
        let notes = [note(0, 60), note(6, 62), note(12, 64), note(18, 127)];
        let corrected = correct_pitches(&notes, &chord("C_M"));
        assert_eq!(corrected, notes);
    }

    #[test]
    fn out_of_scale_notes_snap() {
        let notes = [note(0, 61), note(6, 66), note(12, 126), note(18, 70)];
        let corrected = correct_pitches(&notes, &chord("C_M"));
        assert_eq!(pitches(&corrected), [60, 65, 125, 69]);
        // Everything but the pitch is carried over.
        for (before, after) in notes.iter().zip(&corrected) {
            assert_eq!(
                (before.position, before.duration, before.inst_family, before.velocity),
                (after.position, after.duration, after.inst_family, after.velocity)
            );
        }
        // The input is untouched.
        assert_eq!(pitches(&notes), [61, 66, 126, 70]);
    }

    #[test]
    fn minor_chord_correction() {
        // A minor shares C major's pitches; Bb snaps down to A.
        let corrected = correct_pitches(&[note(0, 70), note(0, 57)], &chord("A_m"));
        assert_eq!(pitches(&corrected), [69, 57]);
    }

    fn three_bars(first: Option<Chord>) -> EventSeq {
        let mut seq = EventSeq::new();
        seq.push_bar(Bar::new(Some(118), first).unwrap());
        seq.push_note(note(0, 61)).unwrap();
        seq.push_bar(Bar::default());
        seq.push_note(note(0, 63)).unwrap();
        seq.push_note(note(12, 66)).unwrap();
        seq.push_bar(Bar::default());
        seq
    }

    #[test]
    fn chords_carry_forward() {
        let seq = three_bars(Some(chord("C_M")));
        assert_eq!(resolve_chords(&seq).unwrap(), vec![chord("C_M"); 3]);
    }

    #[test]
    fn carry_forward_switches_at_new_annotation() {
        let mut seq = three_bars(Some(chord("C_M")));
        seq.push_bar(Bar::with_chord(chord("E_M")));
        seq.push_bar(Bar::default());
        assert_eq!(
            resolve_chords(&seq).unwrap(),
            [chord("C_M"), chord("C_M"), chord("C_M"), chord("E_M"), chord("E_M")]
        );
    }

    #[test]
    fn first_bar_without_chord_fails() {
        let seq = three_bars(None);
        assert!(matches!(
            resolve_chords(&seq),
            Err(RemiError::UnresolvedChord { bar: 0 })
        ));
        assert!(correct_sequence(&seq, None).is_err());
    }

    #[test]
    fn correct_sequence_with_annotations() {
        let seq = three_bars(Some(chord("C_M")));
        let corrected = correct_sequence(&seq, None).unwrap();
        assert_eq!(corrected.num_bars(), 3);
        let bars: Vec<Bar> = corrected.segments().map(|s| *s.bar).collect();
        // Tempo is dropped; every bar states its chord.
        assert!(bars.iter().all(|b| b.tempo.is_none() && b.chord == Some(chord("C_M"))));
        let notes: Vec<u8> = corrected.segments().flat_map(|s| s.notes()).map(|n| n.pitch).collect();
        assert_eq!(notes, [60, 62, 65]);
        // The source sequence is not modified.
        assert_eq!(seq.segments().next().unwrap().bar.tempo, Some(118));
    }

    #[test]
    fn override_chords_replace_annotations() {
        let seq = three_bars(None);
        let chords = [chord("C_M"), chord("E_M"), chord("E_M")];
        let corrected = correct_sequence(&seq, Some(&chords[..])).unwrap();
        assert_eq!(corrected.chords(), chords.map(Some));
        let notes: Vec<u8> = corrected.segments().flat_map(|s| s.notes()).map(|n| n.pitch).collect();
        // 63 (D#) and 66 (F#) are both in E major.
        assert_eq!(notes, [60, 63, 66]);
    }

    #[test]
    fn override_must_cover_every_bar() {
        let seq = three_bars(Some(chord("C_M")));
        assert!(matches!(
            correct_sequence(&seq, Some(&[chord("C_M")][..])),
            Err(RemiError::ChordCountMismatch { bars: 3, chords: 1 })
        ));
    }
}
