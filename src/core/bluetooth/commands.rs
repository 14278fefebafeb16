//! Wheelchair command encoding
//! This module converts signed drive/turn values into the two-byte packet
//! the receiver expects.
//!
//! Each axis is clamped to `-127..=127`. Negative values map to `value + 127`
//! (`0..=126`) and non-negative values to `value + 128` (`128..=255`), so the
//! neutral input encodes to `128` and byte `127` is never produced.

use serde::Serialize;

use crate::core::bluetooth::constants::{AXIS_LIMIT, COMMAND_PACKET_SIZE};

/// Movement command produced by an input controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Command {
    /// Forward (positive) or backward (negative) speed
    pub drive: i32,
    /// Right (positive) or left (negative) turn
    pub turn: i32,
}

impl Command {
    pub fn new(drive: i32, turn: i32) -> Self {
        Self { drive, turn }
    }

    /// Convert the command to its wire representation
    pub fn encode(&self) -> EncodedCommand {
        encode(self.drive, self.turn)
    }
}

/// Two-byte wire representation of a [`Command`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedCommand {
    pub drive: u8,
    pub turn: u8,
}

impl EncodedCommand {
    /// Bytes in wire order: drive first, then turn
    pub fn to_bytes(&self) -> [u8; COMMAND_PACKET_SIZE] {
        [self.drive, self.turn]
    }

    /// Recover the clamped command, if both bytes are valid encodings
    pub fn decode(&self) -> Option<Command> {
        Some(Command::new(decode_axis(self.drive)?, decode_axis(self.turn)?))
    }

    /// Percentages (0..=100) of full deflection in each direction, for
    /// drawing the command bars.
    pub fn bar_levels(&self) -> BarLevels {
        let drive = decode_axis(self.drive).unwrap_or(0);
        let turn = decode_axis(self.turn).unwrap_or(0);
        let percent = |value: i32| value as f32 * 100.0 / AXIS_LIMIT as f32;
        BarLevels {
            forward: percent(drive.max(0)),
            backward: percent((-drive).max(0)),
            right: percent(turn.max(0)),
            left: percent((-turn).max(0)),
        }
    }
}

/// Deflection of a sent command split by direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BarLevels {
    pub forward: f32,
    pub backward: f32,
    pub left: f32,
    pub right: f32,
}

/// Encode a drive/turn pair into the receiver's byte format
pub fn encode(drive: i32, turn: i32) -> EncodedCommand {
    EncodedCommand {
        drive: encode_axis(drive),
        turn: encode_axis(turn),
    }
}

/// Clamp and shift a single axis value
pub fn encode_axis(value: i32) -> u8 {
    let limit = i32::from(AXIS_LIMIT);
    let value = value.clamp(-limit, limit);
    if value < 0 {
        (value + limit) as u8
    } else {
        (value + limit + 1) as u8
    }
}

/// Inverse of [`encode_axis`]. Returns `None` for 127, which no input maps to.
pub fn decode_axis(byte: u8) -> Option<i32> {
    let limit = i32::from(AXIS_LIMIT);
    let byte = i32::from(byte);
    if byte < limit {
        Some(byte - limit)
    } else if byte > limit {
        Some(byte - limit - 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn neutral_encodes_to_128() {
        assert_eq!(encode(0, 0).to_bytes(), [128, 128]);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        assert_eq!(encode(200, 0).to_bytes(), [255, 128]);
        assert_eq!(encode(-200, 50).to_bytes(), [0, 178]);
        assert_eq!(encode(i32::MIN, i32::MAX).to_bytes(), [0, 255]);
    }

    #[test]
    fn branch_edges() {
        assert_eq!(encode_axis(-1), 126);
        assert_eq!(encode_axis(-127), 0);
        assert_eq!(encode_axis(127), 255);
        assert_eq!(decode_axis(127), None);
    }

    #[test]
    fn bar_levels_follow_direction() {
        let bars = encode(127, -127).bar_levels();
        assert_eq!(bars.forward, 100.0);
        assert_eq!(bars.backward, 0.0);
        assert_eq!(bars.left, 100.0);
        assert_eq!(bars.right, 0.0);

        let idle = encode(0, 0).bar_levels();
        assert_eq!(idle.forward + idle.backward + idle.left + idle.right, 0.0);
    }

    proptest! {
        #[test]
        fn decode_recovers_clamped_input(drive in -127i32..=127, turn in -127i32..=127) {
            let encoded = encode(drive, turn);
            prop_assert_eq!(encoded.decode(), Some(Command::new(drive, turn)));
        }

        #[test]
        fn negative_and_non_negative_ranges_never_overlap(value in -127i32..=127) {
            let byte = encode_axis(value);
            if value < 0 {
                prop_assert!(byte <= 126);
            } else {
                prop_assert!(byte >= 128);
            }
        }
    }
}
