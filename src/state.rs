//! Persisted plugin state: the handful of control values a host needs to
//! save and restore across sessions.
//!
//! The on-disk layout is a fixed, versionless 20-byte record — three
//! little-endian `f32` controls followed by two little-endian `i32`
//! fields — so a host can round-trip it without pulling in this crate's
//! dependency graph. [`serde`]/[`bincode`] are used for the richer,
//! self-describing encoding the `render` demo binary uses when saving a
//! preset alongside a rendered WAV file.

use serde::{Deserialize, Serialize};

/// The full set of controls [`crate::controller::ReverbController::process`]
/// takes, minus the audio itself and the block/sample-rate parameters a
/// host already tracks on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbState {
    pub decay: f32,
    pub color: f32,
    pub dry_wet: f32,
    pub ir_index: i32,
    pub bypass: bool,
}

impl Default for ReverbState {
    fn default() -> Self {
        Self {
            decay: 0.5,
            color: 0.0,
            dry_wet: 0.0,
            ir_index: 0,
            bypass: false,
        }
    }
}

const ENCODED_LEN: usize = 4 + 4 + 4 + 4 + 4;

impl ReverbState {
    /// Encodes this state as the fixed 20-byte little-endian record a
    /// host persists directly.
    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        let mut out = [0u8; ENCODED_LEN];
        out[0..4].copy_from_slice(&self.decay.to_le_bytes());
        out[4..8].copy_from_slice(&self.color.to_le_bytes());
        out[8..12].copy_from_slice(&self.dry_wet.to_le_bytes());
        out[12..16].copy_from_slice(&self.ir_index.to_le_bytes());
        out[16..20].copy_from_slice(&(self.bypass as i32).to_le_bytes());
        out
    }

    /// Decodes a record written by [`Self::to_bytes`]. Returns `None` if
    /// `bytes` is not exactly [`ENCODED_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ENCODED_LEN {
            return None;
        }

        let decay = f32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let color = f32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let dry_wet = f32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let ir_index = i32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let bypass = i32::from_le_bytes(bytes[16..20].try_into().unwrap()) != 0;

        Some(Self {
            decay,
            color,
            dry_wet,
            ir_index,
            bypass,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let state = ReverbState {
            decay: 0.73,
            color: -0.2,
            dry_wet: 0.5,
            ir_index: 3,
            bypass: true,
        };
        let bytes = state.to_bytes();
        assert_eq!(bytes.len(), ENCODED_LEN);
        let decoded = ReverbState::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(ReverbState::from_bytes(&[0u8; 19]).is_none());
        assert!(ReverbState::from_bytes(&[0u8; 21]).is_none());
    }

    #[test]
    fn default_is_unity_dry_no_color() {
        let state = ReverbState::default();
        assert_eq!(state.dry_wet, 0.0);
        assert_eq!(state.ir_index, 0);
        assert!(!state.bypass);
    }
}
