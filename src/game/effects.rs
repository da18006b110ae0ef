//! Fire-and-forget hooks for visuals and audio
//!
//! The simulation never reads anything back from these calls.

use parking_lot::Mutex;
use tracing::trace;

use crate::game::modules::{ShipModule, WeaponType};
use crate::util::vec2::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEffect {
    TeleportIn,
    ShipExplode,
    SpeedZone,
    ModuleOn(ShipModule),
    ModuleOff(ShipModule),
    WeaponFire(WeaponType),
}

pub trait Effects: Send + Sync {
    fn emit_explosion(&self, pos: Vec2);
    fn emit_teleport_in(&self, pos: Vec2);
    fn emit_sparks(&self, pos: Vec2, vel: Vec2, intensity: f32);
    fn play_sound(&self, sound: SoundEffect, pos: Vec2, vel: Vec2);
}

/// Headless sink that only traces
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEffects;

impl Effects for TracingEffects {
    fn emit_explosion(&self, pos: Vec2) {
        trace!(x = pos.x, y = pos.y, "explosion");
    }

    fn emit_teleport_in(&self, pos: Vec2) {
        trace!(x = pos.x, y = pos.y, "teleport in");
    }

    fn emit_sparks(&self, pos: Vec2, _vel: Vec2, intensity: f32) {
        trace!(x = pos.x, y = pos.y, intensity, "sparks");
    }

    fn play_sound(&self, sound: SoundEffect, pos: Vec2, _vel: Vec2) {
        trace!(?sound, x = pos.x, y = pos.y, "sound");
    }
}

/// One recorded call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectEvent {
    Explosion(Vec2),
    TeleportIn(Vec2),
    Sparks(Vec2),
    Sound(SoundEffect),
}

/// Sink that remembers every call; handy for checking what a client would show
#[derive(Debug, Default)]
pub struct RecordingEffects {
    events: Mutex<Vec<EffectEvent>>,
}

impl RecordingEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EffectEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<EffectEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn count(&self, pred: impl Fn(&EffectEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    pub fn explosions(&self) -> usize {
        self.count(|e| matches!(e, EffectEvent::Explosion(_)))
    }
}

impl Effects for RecordingEffects {
    fn emit_explosion(&self, pos: Vec2) {
        self.events.lock().push(EffectEvent::Explosion(pos));
    }

    fn emit_teleport_in(&self, pos: Vec2) {
        self.events.lock().push(EffectEvent::TeleportIn(pos));
    }

    fn emit_sparks(&self, pos: Vec2, _vel: Vec2, _intensity: f32) {
        self.events.lock().push(EffectEvent::Sparks(pos));
    }

    fn play_sound(&self, sound: SoundEffect, _pos: Vec2, _vel: Vec2) {
        self.events.lock().push(EffectEvent::Sound(sound));
    }
}
