//! Remote input events.
//!
//! Keyboard and button events travel reliably so a press is never lost
//! without its release. Pointer motion is sent as an unsequenced datagram:
//! a newer position supersedes a lost one.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, VidlinkError};

/// Pointer button identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

impl std::str::FromStr for PointerButton {
    type Err = VidlinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Self::Left),
            "right" | "r" => Ok(Self::Right),
            "middle" | "m" => Ok(Self::Middle),
            other => Err(VidlinkError::Encoding(format!("unknown button: {other}"))),
        }
    }
}

/// One input event forwarded to the remote side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum InputEvent {
    /// Key pressed, by platform key code.
    KeyDown(u32),
    /// Key released.
    KeyUp(u32),
    /// Pointer position, normalized to `0.0..=1.0` on each axis.
    PointerMove { x: f32, y: f32 },
    ButtonDown(PointerButton),
    ButtonUp(PointerButton),
}

impl InputEvent {
    /// Pointer move with coordinates clamped into the unit square.
    pub fn pointer(x: f32, y: f32) -> Self {
        let clamp = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        Self::PointerMove {
            x: clamp(x),
            y: clamp(y),
        }
    }

    /// Whether a lost copy is superseded by the next event.
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::PointerMove { .. })
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VidlinkError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_roundtrip() {
        let events = [
            InputEvent::KeyDown(65),
            InputEvent::KeyUp(65),
            InputEvent::pointer(0.5, 0.25),
            InputEvent::ButtonDown(PointerButton::Left),
            InputEvent::ButtonUp(PointerButton::Right),
        ];
        for ev in events {
            let bytes = ev.to_bytes().unwrap();
            assert_eq!(InputEvent::from_bytes(&bytes).unwrap(), ev);
        }
    }

    #[test]
    fn only_motion_is_lossy() {
        assert!(InputEvent::pointer(0.1, 0.1).is_lossy());
        assert!(!InputEvent::KeyDown(1).is_lossy());
        assert!(!InputEvent::ButtonUp(PointerButton::Middle).is_lossy());
    }

    #[test]
    fn pointer_is_clamped() {
        assert_eq!(
            InputEvent::pointer(-1.0, 7.0),
            InputEvent::PointerMove { x: 0.0, y: 1.0 }
        );
        assert_eq!(
            InputEvent::pointer(f32::NAN, 0.5),
            InputEvent::PointerMove { x: 0.0, y: 0.5 }
        );
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            InputEvent::from_bytes(&[0xff, 0xff, 0xff, 0xff, 0xff]),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn button_names_parse() {
        assert_eq!("Left".parse::<PointerButton>().unwrap(), PointerButton::Left);
        assert_eq!("m".parse::<PointerButton>().unwrap(), PointerButton::Middle);
        assert!("side".parse::<PointerButton>().is_err());
    }
}
