// Codec configuration.
//
// `CodecConfig` holds the few knobs of the MIDI boundary that are not fixed
// by the token vocabulary: the resolution used when rendering a sequence
// back to MIDI, and the marker prefix that identifies chord annotations.
// It loads from JSON; missing fields take their defaults, so `{}` is a valid
// config.
//
// The time grid itself (12 steps per beat, 4 beats per bar) and the bin
// tables are not configurable: the token vocabulary is defined in terms of
// them. See bins.rs.

use crate::bins::{DEFAULT_TICKS_PER_BEAT, SUBDIVISION};
use crate::error::{RemiError, Result};
use crate::midi::MAX_TICKS_PER_BEAT;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Ticks per beat of rendered MIDI. Must be a multiple of 12.
    pub ticks_per_beat: u16,
    /// Marker text prefix for chord labels, e.g. `"Chord_"` in `"Chord_A_m"`.
    pub chord_marker_tag: String,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
            chord_marker_tag: "Chord_".to_string(),
        }
    }
}

impl CodecConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CodecConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        CodecConfig::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        let tpb = self.ticks_per_beat;
        if tpb == 0 || tpb > MAX_TICKS_PER_BEAT || tpb as u32 % SUBDIVISION != 0 {
            return Err(RemiError::InvalidConfig(format!(
                "ticks_per_beat must be a positive multiple of {SUBDIVISION} up to {MAX_TICKS_PER_BEAT}, got {tpb}"
            )));
        }
        if self.chord_marker_tag.is_empty() {
            return Err(RemiError::InvalidConfig(
                "chord_marker_tag must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Ticks per time step at the rendering resolution.
    pub fn step(&self) -> u32 {
        self.ticks_per_beat as u32 / SUBDIVISION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_canonical() {
        let config = CodecConfig::default();
        assert_eq!(config.ticks_per_beat, 120);
        assert_eq!(config.step(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_json_uses_defaults() {
        assert_eq!(CodecConfig::from_json("{}").unwrap(), CodecConfig::default());
    }

    #[test]
    fn partial_json_overrides() {
        let config = CodecConfig::from_json(r#"{"ticks_per_beat": 480}"#).unwrap();
        assert_eq!(config.ticks_per_beat, 480);
        assert_eq!(config.step(), 40);
        assert_eq!(config.chord_marker_tag, "Chord_");
    }

    #[test]
    fn rejects_off_grid_resolution() {
        assert!(matches!(
            CodecConfig::from_json(r#"{"ticks_per_beat": 100}"#),
            Err(RemiError::InvalidConfig(_))
        ));
        assert!(CodecConfig::from_json(r#"{"ticks_per_beat": 0}"#).is_err());
        assert!(CodecConfig::from_json(r#"{"chord_marker_tag": ""}"#).is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(CodecConfig::from_json("{"), Err(RemiError::Json(_))));
    }
}
