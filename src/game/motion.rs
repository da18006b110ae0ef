//! Motion snapshots and render-side interpolation
//!
//! Every ship carries three snapshots of position, velocity and angle:
//! - `Actual`: server truth, or the client's prediction for its own ship
//! - `Render`: what is displayed; eases toward `Actual` unless warped
//! - `LastProcess`: the slot as it was before the latest physics step

use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};
use std::ops::{Index, IndexMut};

use crate::game::constants::prediction::{INTERP_CATCH_UP_RATE, SNAP_EPSILON};
use crate::game::moves::MoveRecord;
use crate::util::vec2::Vec2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionState {
    pub pos: Vec2,
    pub vel: Vec2,
    pub angle: f32,
}

impl MotionState {
    pub fn at(pos: Vec2) -> Self {
        Self {
            pos,
            ..Default::default()
        }
    }

    /// Integrate position over `seconds` at the current velocity
    #[inline]
    pub fn advance(&mut self, seconds: f32) {
        self.pos += self.vel * seconds;
    }

    /// Unit vector along the facing angle
    #[inline]
    pub fn facing(&self) -> Vec2 {
        Vec2::from_angle(self.angle)
    }
}

/// Names the three snapshot slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateSlot {
    Actual = 0,
    Render = 1,
    LastProcess = 2,
}

#[derive(Debug, Clone, Default)]
pub struct MotionStateSet {
    states: [MotionState; 3],
    /// Render is easing toward Actual
    interpolating: bool,
}

impl MotionStateSet {
    /// All three slots start at `pos`, at rest, facing angle 0
    pub fn new(pos: Vec2) -> Self {
        Self {
            states: [MotionState::at(pos); 3],
            interpolating: false,
        }
    }

    #[inline]
    pub fn actual(&self) -> &MotionState {
        &self.states[StateSlot::Actual as usize]
    }

    #[inline]
    pub fn actual_mut(&mut self) -> &mut MotionState {
        &mut self.states[StateSlot::Actual as usize]
    }

    #[inline]
    pub fn render(&self) -> &MotionState {
        &self.states[StateSlot::Render as usize]
    }

    #[inline]
    pub fn render_mut(&mut self) -> &mut MotionState {
        &mut self.states[StateSlot::Render as usize]
    }

    #[inline]
    pub fn last_process(&self) -> &MotionState {
        &self.states[StateSlot::LastProcess as usize]
    }

    #[inline]
    pub fn is_interpolating(&self) -> bool {
        self.interpolating
    }

    #[inline]
    pub fn set_interpolating(&mut self, interpolating: bool) {
        self.interpolating = interpolating;
    }

    /// Copy `slot` into LastProcess ahead of a physics step
    #[inline]
    pub fn remember(&mut self, slot: StateSlot) {
        self.states[StateSlot::LastProcess as usize] = self.states[slot as usize];
    }

    /// Warp: Render jumps to Actual and interpolation stops
    pub fn snap_render(&mut self) {
        self.states[StateSlot::Render as usize] = self.states[StateSlot::Actual as usize];
        self.interpolating = false;
    }

    /// Distance between what is shown and what is true
    #[inline]
    pub fn render_error(&self) -> f32 {
        self.actual().pos.distance_to(self.render().pos)
    }

    /// Advance Render one client tick.
    ///
    /// Render moves with Actual's velocity and then closes a share of the
    /// remaining gap proportional to the elapsed time. Once the gap is within
    /// the snap epsilon Render lands exactly on Actual.
    pub fn update_interpolation(&mut self, time_ms: u32) {
        let seconds = time_ms as f32 * 0.001;
        let actual = *self.actual();

        if !self.interpolating {
            *self.render_mut() = actual;
            return;
        }

        let render = self.render_mut();
        render.angle = actual.angle;
        render.vel = actual.vel;
        render.pos += actual.vel * seconds;

        let gap = actual.pos - render.pos;
        let catch_up = (INTERP_CATCH_UP_RATE * seconds).min(1.0);
        render.pos += gap * catch_up;

        if render.pos.distance_to(actual.pos) <= SNAP_EPSILON {
            render.pos = actual.pos;
            self.interpolating = false;
        }
    }
}

impl Index<StateSlot> for MotionStateSet {
    type Output = MotionState;

    fn index(&self, slot: StateSlot) -> &MotionState {
        &self.states[slot as usize]
    }
}

impl IndexMut<StateSlot> for MotionStateSet {
    fn index_mut(&mut self, slot: StateSlot) -> &mut MotionState {
        &mut self.states[slot as usize]
    }
}

/// Shortest signed rotation from `from` to `to`, in `[-PI, PI]`
pub fn angle_diff(from: f32, to: f32) -> f32 {
    let diff = (to - from).rem_euclid(TAU);
    if diff > PI {
        diff - TAU
    } else {
        diff
    }
}

/// Thruster intensities for the visual exhaust: forward, back, right, left.
///
/// Each entry is the projection of the move intent onto that thruster's
/// direction; a side thruster gets an extra quarter while the ship turns and
/// everything is boosted by 30% while the boost module runs.
pub fn calc_thrust_components(
    mv: &MoveRecord,
    states: &MotionStateSet,
    boosting: bool,
) -> [f32; 4] {
    let mut thrusts = [0.0f32; 4];

    let mut intent = mv.intent();
    let len = intent.length();
    if len > 0.0 {
        if len > 1.0 {
            intent = intent / len;
        }
        let forward = states.render().facing();
        let dirs = [
            forward,
            -forward,
            Vec2::new(forward.y, -forward.x),
            Vec2::new(-forward.y, forward.x),
        ];
        for (thrust, dir) in thrusts.iter_mut().zip(dirs) {
            *thrust = dir.dot(intent);
        }
    }

    let rotation = angle_diff(states.last_process().angle, states.render().angle);
    if rotation > 0.001 {
        thrusts[3] += 0.25;
    } else if rotation < -0.001 {
        thrusts[2] += 0.25;
    }

    if boosting {
        for thrust in &mut thrusts {
            *thrust *= 1.3;
        }
    }
    thrusts
}
