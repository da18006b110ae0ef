//! One tick of player input

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::game::constants::net::{MAX_MOVE_TIME, MOVE_ANGLE_BITS, MOVE_AXIS_BITS};
use crate::game::modules::SHIP_MODULE_COUNT;
use crate::net::bitstream::{BitReader, BitStreamError, BitWriter};
use crate::util::vec2::Vec2;

/// Steps per unit of x/y intent on the wire; zero stays exactly representable
const AXIS_STEPS: f32 = ((1u32 << (MOVE_AXIS_BITS - 1)) - 1) as f32;

/// Player input captured for one tick.
///
/// `x`/`y` are the requested thrust in `[-1, 1]`, `angle` the facing in
/// radians, `module` the per-slot activation requests and `time` the tick
/// length in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub fire: bool,
    pub module: [bool; SHIP_MODULE_COUNT],
    pub time: u32,
}

impl MoveRecord {
    pub fn new(x: f32, y: f32, angle: f32, time: u32) -> Self {
        Self {
            x,
            y,
            angle,
            time,
            ..Default::default()
        }
    }

    /// Compares every field, including the time slice
    #[inline]
    pub fn is_equal_move(&self, other: &MoveRecord) -> bool {
        self == other
    }

    #[inline]
    pub fn intent(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// True when the player asks for any thrust at all
    #[inline]
    pub fn has_intent(&self) -> bool {
        self.x != 0.0 || self.y != 0.0
    }

    #[inline]
    pub fn seconds(&self) -> f32 {
        self.time as f32 * 0.001
    }

    pub fn pack(&self, stream: &mut BitWriter) {
        write_axis(stream, self.x);
        write_axis(stream, self.y);
        stream.write_float(self.angle.rem_euclid(TAU) / TAU, MOVE_ANGLE_BITS);
        stream.write_flag(self.fire);
        for &active in &self.module {
            stream.write_flag(active);
        }
        stream.write_ranged_u32(self.time, 0, MAX_MOVE_TIME);
    }

    pub fn unpack(stream: &mut BitReader<'_>) -> Result<Self, BitStreamError> {
        let x = read_axis(stream)?;
        let y = read_axis(stream)?;
        let angle = stream.read_float(MOVE_ANGLE_BITS)? * TAU;
        let fire = stream.read_flag()?;
        let mut module = [false; SHIP_MODULE_COUNT];
        for active in module.iter_mut() {
            *active = stream.read_flag()?;
        }
        let time = stream.read_ranged_u32(0, MAX_MOVE_TIME)?;
        Ok(Self {
            x,
            y,
            angle,
            fire,
            module,
            time,
        })
    }

    /// Round the move to wire precision.
    ///
    /// The controlling client runs this before simulating so its prediction,
    /// the server and every observer step the exact same numbers.
    pub fn prepare(&mut self) {
        let mut writer = BitWriter::with_capacity(64);
        self.pack(&mut writer);
        let bytes = writer.into_bytes();
        if let Ok(prepared) = Self::unpack(&mut BitReader::new(&bytes)) {
            *self = prepared;
        }
    }
}

fn write_axis(stream: &mut BitWriter, value: f32) {
    let steps = (value.clamp(-1.0, 1.0) * AXIS_STEPS).round() as i32;
    stream.write_ranged_u32((steps + AXIS_STEPS as i32) as u32, 0, 2 * AXIS_STEPS as u32);
}

fn read_axis(stream: &mut BitReader<'_>) -> Result<f32, BitStreamError> {
    let raw = stream.read_ranged_u32(0, 2 * AXIS_STEPS as u32)? as i32;
    Ok((raw - AXIS_STEPS as i32) as f32 / AXIS_STEPS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_move_compares_all_fields() {
        let a = MoveRecord::new(1.0, 0.0, 0.5, 33);
        let mut b = a;
        assert!(a.is_equal_move(&b));

        b.time = 34;
        assert!(!a.is_equal_move(&b));

        b = a;
        b.module[1] = true;
        assert!(!a.is_equal_move(&b));
    }

    #[test]
    fn test_prepare_keeps_zero_intent_exact() {
        let mut mv = MoveRecord::new(0.0, 0.0, 0.0, 33);
        mv.prepare();
        assert!(!mv.has_intent());
        assert_eq!(mv.angle, 0.0);
        assert_eq!(mv.time, 33);
    }

    #[test]
    fn test_prepare_is_stable() {
        let mut mv = MoveRecord::new(0.3333, -0.71, 2.2, 40);
        mv.fire = true;
        mv.module = [true, false];
        mv.prepare();
        let once = mv;
        mv.prepare();
        assert_eq!(mv, once);
        assert!((once.x - 0.3333).abs() <= 0.5 / AXIS_STEPS);
        assert!((once.angle - 2.2).abs() <= TAU / 4095.0);
        assert!(once.fire);
    }

    #[test]
    fn test_pack_unpack() {
        let mut mv = MoveRecord::new(-1.0, 1.0, -0.5, 1000);
        mv.module = [false, true];
        mv.prepare();

        let mut writer = BitWriter::new();
        mv.pack(&mut writer);
        let bytes = writer.into_bytes();
        let decoded = MoveRecord::unpack(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(decoded, mv);
        // Negative angles are stored as their positive equivalent
        assert!(decoded.angle > 0.0);
    }

    #[test]
    fn test_time_is_clamped_to_wire_range() {
        let mut mv = MoveRecord::new(0.0, 0.0, 0.0, 5000);
        mv.prepare();
        assert_eq!(mv.time, MAX_MOVE_TIME);
    }
}
