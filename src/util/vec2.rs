use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// 2D point/vector used for ship positions and velocities
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    #[inline]
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self {
                x: self.x / len,
                y: self.y / len,
            }
        } else {
            Self::ZERO
        }
    }

    #[inline]
    pub fn dot(&self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    #[inline]
    pub fn distance_to(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    pub fn clamp_length(&self, max: f32) -> Self {
        let len = self.length();
        if len > max && len > 0.0 {
            *self * (max / len)
        } else {
            *self
        }
    }

    /// Returns angle in radians
    pub fn angle(&self) -> f32 {
        self.y.atan2(self.x)
    }

    /// Snap both components onto a `1 / multiplier` grid, rounding toward negative infinity.
    ///
    /// Client prediction and the server run this after every controlled step so the
    /// low mantissa bits cannot drift apart between platforms.
    #[inline]
    pub fn scale_floor_div(&mut self, multiplier: f32, fraction: f32) {
        self.x = (self.x * multiplier).floor() * fraction;
        self.y = (self.y * multiplier).floor() * fraction;
    }

    /// Check if vector is approximately equal to another
    pub fn approx_eq(&self, other: Vec2, epsilon: f32) -> bool {
        (self.x - other.x).abs() < epsilon && (self.y - other.y).abs() < epsilon
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl Div<f32> for Vec2 {
    type Output = Self;
    fn div(self, rhs: f32) -> Self {
        Self {
            x: self.x / rhs,
            y: self.y / rhs,
        }
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl MulAssign<f32> for Vec2 {
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const EPSILON: f32 = 1e-5;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_length() {
        let v = Vec2::new(3.0, 4.0);
        assert!(approx_eq(v.length(), 5.0));
        assert!(approx_eq(v.length_sq(), 25.0));
    }

    #[test]
    fn test_normalize_zero() {
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
    }

    #[test]
    fn test_clamp_length() {
        let v = Vec2::new(30.0, 40.0).clamp_length(5.0);
        assert!(approx_eq(v.length(), 5.0));
        assert_eq!(Vec2::new(1.0, 1.0).clamp_length(5.0), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_angle() {
        assert!(approx_eq(Vec2::new(1.0, 0.0).angle(), 0.0));
        assert!(approx_eq(Vec2::new(0.0, 1.0).angle(), PI / 2.0));
        assert!(approx_eq(Vec2::from_angle(PI).x, -1.0));
    }

    #[test]
    fn test_scale_floor_div_snaps_to_grid() {
        let mut v = Vec2::new(10.0 + 1.0 / 300.0, -3.0 - 1.0 / 300.0);
        v.scale_floor_div(128.0, 1.0 / 128.0);
        assert_eq!(v.x, 10.0);
        assert_eq!(v.y, -3.0 - 1.0 / 128.0);
    }

    #[test]
    fn test_scale_floor_div_is_idempotent() {
        let mut v = Vec2::new(123.456, -78.9);
        v.scale_floor_div(128.0, 1.0 / 128.0);
        let once = v;
        v.scale_floor_div(128.0, 1.0 / 128.0);
        assert_eq!(v, once);
    }

    #[test]
    fn test_operators() {
        let mut a = Vec2::new(1.0, 2.0);
        a += Vec2::new(3.0, 4.0);
        assert_eq!(a, Vec2::new(4.0, 6.0));
        a -= Vec2::new(1.0, 1.0);
        assert_eq!(a, Vec2::new(3.0, 5.0));
        a *= 2.0;
        assert_eq!(a, Vec2::new(6.0, 10.0));
        assert_eq!(a / 2.0, Vec2::new(3.0, 5.0));
        assert_eq!(-a, Vec2::new(-6.0, -10.0));
    }

    #[test]
    fn test_serde() {
        let v = Vec2::new(1.5, 2.5);
        let encoded =
            bincode::serde::encode_to_vec(&v, bincode::config::standard()).unwrap();
        let (decoded, _): (Vec2, usize) =
            bincode::serde::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(v, decoded);
    }
}
