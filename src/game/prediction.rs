//! Client-side prediction and reconciliation
//!
//! The controlling client advances Actual with its own moves as soon as they
//! are made. When the server's control state arrives, Actual is reset to it,
//! the unacknowledged moves are replayed, and [`control_move_replay_complete`]
//! decides whether Render jumps to the corrected Actual or eases toward it.
//! Observed ships take the same decision on every decoded position.

use tracing::debug;

use crate::game::constants::prediction::{MAX_CONTROL_OBJECT_INTERP_DISTANCE, SNAP_EPSILON};
use crate::game::constants::timing::{CLOAK_FADE_TIME, SENSOR_ZOOM_TIME, WARP_FADE_IN_TIME};
use crate::game::effects::SoundEffect;
use crate::game::modules::{ShipModule, SHIP_WEAPON_COUNT};
use crate::game::motion::StateSlot;
use crate::game::ship::{Ship, TickContext};
use crate::game::systems::physics;
use crate::net::ship_update::{ControlState, ShipUpdate};

/// How Render was brought in line with Actual
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconcile {
    /// Render jumped straight to Actual
    Snapped { delta: f32 },
    /// Render will ease toward Actual over the next ticks
    Interpolating { delta: f32 },
}

impl Reconcile {
    pub fn delta(self) -> f32 {
        match self {
            Reconcile::Snapped { delta } | Reconcile::Interpolating { delta } => delta,
        }
    }

    #[inline]
    pub fn is_interpolating(self) -> bool {
        matches!(self, Reconcile::Interpolating { .. })
    }
}

/// What decoding an update did to a replica
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedUpdate {
    pub position_changed: bool,
    /// Render was snapped instead of interpolated
    pub warped: bool,
    pub exploded: bool,
    pub respawned: bool,
}

/// Decide between snapping and easing once replay has produced a new Actual.
///
/// Tiny corrections are not worth animating and huge ones are teleports that
/// must not be animated; everything in between eases.
pub fn control_move_replay_complete(ship: &mut Ship) -> Reconcile {
    let delta = ship.motion.render_error();
    if delta <= SNAP_EPSILON || delta > MAX_CONTROL_OBJECT_INTERP_DISTANCE {
        ship.motion.snap_render();
        Reconcile::Snapped { delta }
    } else {
        ship.motion.set_interpolating(true);
        Reconcile::Interpolating { delta }
    }
}

/// Adopt the server's view of the controlled ship ahead of replay
pub fn apply_control_state(ship: &mut Ship, state: &ControlState) {
    let actual = ship.motion.actual_mut();
    actual.pos = state.pos;
    actual.vel = state.vel;
    ship.energy = state.energy;
    ship.cooldown = state.cooldown;
    ship.fire_timer = state.fire_timer;
    ship.active_weapon = state.active_weapon % SHIP_WEAPON_COUNT;
}

/// Apply a decoded update to a replica.
///
/// A fresh position is pushed forward by `one_way_ms` with the carried move
/// so the replica shows where the ship is now rather than where it was when
/// the packet left. Warps, teleports and respawns snap Render; anything else
/// interpolates.
pub fn apply_update(
    ship: &mut Ship,
    update: &ShipUpdate,
    ctx: &TickContext<'_>,
    one_way_ms: u32,
    is_initial: bool,
) -> AppliedUpdate {
    let mut applied = AppliedUpdate::default();
    let mut warped = false;
    let mut play_spawn_effect = false;

    if let Some(team) = update.team {
        ship.team = team;
    }
    if let Some((name, authenticated)) = &update.identity {
        ship.name.clone_from(name);
        ship.authenticated = *authenticated;
    }

    if let Some(loadout) = update.loadout {
        let had_sensor = ship.has_module(ShipModule::Sensor);
        ship.loadout = loadout;
        if !is_initial && had_sensor != ship.has_module(ShipModule::Sensor) {
            let remaining = ship.sensor_zoom_timer.current();
            ship.sensor_zoom_timer
                .reset_with_period(SENSOR_ZOOM_TIME - remaining, SENSOR_ZOOM_TIME);
        }
    }

    if update.exploded {
        ship.health = 0.0;
        if !ship.exploded {
            ship.exploded = true;
            ship.collision_enabled = false;
            applied.exploded = true;
            if !is_initial {
                let pos = ship.render_pos();
                ctx.effects.emit_explosion(pos);
                ctx.effects
                    .play_sound(SoundEffect::ShipExplode, pos, ship.motion.render().vel);
            }
        }
    } else {
        if let Some(respawn) = update.respawn {
            if ship.exploded {
                debug!(ship = %ship.name, "Replica respawned");
            }
            ship.exploded = false;
            ship.collision_enabled = true;
            play_spawn_effect = respawn.play_effect;
            warped = true;
            applied.respawned = true;
            // Replicas only need to know whether the shield is up
            ship.spawn_shield.reset(u32::from(respawn.spawn_shield));
        }
        if let Some(health) = update.health {
            ship.health = health;
        }
    }

    ship.busy = update.busy;

    if update.warped {
        warped = true;
    }
    if update.teleported {
        warped = true;
        ship.warp_in_timer.reset(WARP_FADE_IN_TIME);
    }

    if let Some((pos, vel)) = update.position {
        let actual = ship.motion.actual_mut();
        actual.pos = pos;
        actual.vel = vel;
        applied.position_changed = true;
    }

    if let Some(mv) = update.mv {
        ship.current_move = mv;
    }

    if let Some(modules) = update.modules {
        let sensor = ShipModule::Sensor.index();
        let cloak = ShipModule::Cloak.index();
        if modules[sensor] && !ship.module_active[sensor] {
            ship.sensor_start_ms = ctx.now_ms;
        }
        if modules[cloak] != ship.module_active[cloak] {
            let remaining = ship.cloak_timer.current();
            ship.cloak_timer
                .reset_with_period(CLOAK_FADE_TIME - remaining, CLOAK_FADE_TIME);
        }
        ship.module_active = modules;
    }

    ship.motion.actual_mut().angle = ship.current_move.angle;

    if applied.position_changed && !ship.is_robot {
        ship.current_move.time = one_way_ms;
        physics::process_move(ship, StateSlot::Actual, ctx.world);
    }

    if warped {
        ship.motion.snap_render();
        applied.warped = true;
    } else if applied.position_changed {
        ship.motion.set_interpolating(true);
    }

    if play_spawn_effect {
        ship.warp_in_timer.reset(WARP_FADE_IN_TIME);
        let pos = ship.actual_pos();
        ctx.effects.emit_teleport_in(pos);
        ctx.effects
            .play_sound(SoundEffect::TeleportIn, pos, ship.actual_vel());
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::effects::EffectEvent;
    use crate::game::loadout::Loadout;
    use crate::game::moves::MoveRecord;
    use crate::game::ship::tests::Harness;
    use crate::game::modules::WeaponType;
    use crate::net::ship_update::RespawnInfo;
    use crate::util::vec2::Vec2;

    fn predicted(render_x: f32, actual_x: f32) -> Ship {
        let mut ship = Ship::ghost();
        ship.motion.render_mut().pos = Vec2::new(render_x, 0.0);
        ship.motion.actual_mut().pos = Vec2::new(actual_x, 0.0);
        ship
    }

    #[test]
    fn test_small_correction_snaps() {
        let mut ship = predicted(100.0, 100.4);
        let outcome = control_move_replay_complete(&mut ship);
        assert!(matches!(outcome, Reconcile::Snapped { .. }));
        assert!((outcome.delta() - 0.4).abs() < 1e-3);
        assert_eq!(ship.motion.render(), ship.motion.actual());
        assert!(!ship.motion.is_interpolating());
    }

    #[test]
    fn test_exact_epsilon_snaps() {
        let mut ship = predicted(0.0, SNAP_EPSILON);
        assert!(!control_move_replay_complete(&mut ship).is_interpolating());
        assert_eq!(ship.render_pos(), ship.actual_pos());
    }

    #[test]
    fn test_medium_correction_interpolates() {
        let mut ship = predicted(0.0, 50.0);
        let outcome = control_move_replay_complete(&mut ship);
        assert!(outcome.is_interpolating());
        assert_eq!(outcome.delta(), 50.0);
        assert!(ship.motion.is_interpolating());
        // Render has not moved yet
        assert_eq!(ship.render_pos(), Vec2::ZERO);
    }

    #[test]
    fn test_threshold_boundaries() {
        let mut at_max = predicted(0.0, MAX_CONTROL_OBJECT_INTERP_DISTANCE);
        assert!(control_move_replay_complete(&mut at_max).is_interpolating());

        let mut past_max = predicted(0.0, MAX_CONTROL_OBJECT_INTERP_DISTANCE + 0.5);
        assert!(!control_move_replay_complete(&mut past_max).is_interpolating());
        assert_eq!(past_max.render_pos(), past_max.actual_pos());
    }

    #[test]
    fn test_apply_control_state() {
        let mut ship = Ship::ghost();
        let state = ControlState {
            pos: Vec2::new(5.0, 6.0),
            vel: Vec2::new(-1.0, 0.0),
            energy: 1234,
            cooldown: true,
            fire_timer: -40,
            active_weapon: 4,
        };
        apply_control_state(&mut ship, &state);
        assert_eq!(ship.actual_pos(), Vec2::new(5.0, 6.0));
        assert_eq!(ship.energy, 1234);
        assert!(ship.cooldown);
        assert_eq!(ship.fire_timer, -40);
        assert_eq!(ship.active_weapon, 1);
    }

    #[test]
    fn test_position_update_interpolates_and_leads() {
        let h = Harness::new();
        let mut ship = Ship::ghost();
        let update = ShipUpdate {
            position: Some((Vec2::new(10.0, 0.0), Vec2::new(300.0, 0.0))),
            mv: Some(MoveRecord::new(0.0, 0.0, 0.0, 33)),
            ..Default::default()
        };
        let applied = apply_update(&mut ship, &update, &h.ctx(), 100, false);

        assert!(applied.position_changed);
        assert!(!applied.warped);
        assert!(ship.motion.is_interpolating());
        // No input: decelerates from 300 by 250 over 100 ms, then coasts
        assert!((ship.actual_vel().x - 50.0).abs() < 1e-3);
        assert!((ship.actual_pos().x - 15.0).abs() < 1e-3);
        assert_eq!(ship.current_move.time, 100);
    }

    #[test]
    fn test_robots_are_not_led() {
        let h = Harness::new();
        let mut ship = Ship::ghost();
        ship.is_robot = true;
        let update = ShipUpdate {
            position: Some((Vec2::new(10.0, 0.0), Vec2::new(300.0, 0.0))),
            ..Default::default()
        };
        apply_update(&mut ship, &update, &h.ctx(), 100, false);
        assert_eq!(ship.actual_pos(), Vec2::new(10.0, 0.0));
    }

    #[test]
    fn test_teleport_snaps_and_starts_warp_in() {
        let h = Harness::new();
        let mut ship = Ship::ghost();
        let update = ShipUpdate {
            teleported: true,
            position: Some((Vec2::new(900.0, 900.0), Vec2::ZERO)),
            ..Default::default()
        };
        let applied = apply_update(&mut ship, &update, &h.ctx(), 0, false);
        assert!(applied.warped);
        assert_eq!(ship.render_pos(), Vec2::new(900.0, 900.0));
        assert!(!ship.motion.is_interpolating());
        assert_eq!(ship.warp_in_timer.current(), WARP_FADE_IN_TIME);
    }

    #[test]
    fn test_explosion_effect_once_and_not_on_scope_entry() {
        let h = Harness::new();
        let update = ShipUpdate {
            exploded: true,
            ..Default::default()
        };

        let mut ship = Ship::ghost();
        let applied = apply_update(&mut ship, &update, &h.ctx(), 0, false);
        assert!(applied.exploded);
        assert_eq!(ship.health, 0.0);
        assert!(!ship.collision_enabled);
        apply_update(&mut ship, &update, &h.ctx(), 0, false);
        assert_eq!(h.effects.explosions(), 1);

        let mut late = Ship::ghost();
        apply_update(&mut late, &update, &h.ctx(), 0, true);
        assert!(late.exploded);
        assert_eq!(h.effects.explosions(), 1);
    }

    #[test]
    fn test_respawn_revives_and_plays_arrival() {
        let h = Harness::new();
        let mut ship = Ship::ghost();
        ship.exploded = true;
        ship.collision_enabled = false;
        let update = ShipUpdate {
            respawn: Some(RespawnInfo {
                play_effect: true,
                spawn_shield: true,
            }),
            health: Some(1.0),
            position: Some((Vec2::new(40.0, 40.0), Vec2::ZERO)),
            ..Default::default()
        };
        let applied = apply_update(&mut ship, &update, &h.ctx(), 0, false);

        assert!(applied.respawned && applied.warped);
        assert!(!ship.exploded);
        assert!(ship.collision_enabled);
        assert!(ship.spawn_shield.is_running());
        assert_eq!(ship.render_pos(), Vec2::new(40.0, 40.0));
        assert_eq!(h.effects.count(|e| matches!(e, EffectEvent::TeleportIn(_))), 1);
        assert_eq!(
            h.effects.count(|e| *e == EffectEvent::Sound(SoundEffect::TeleportIn)),
            1
        );
    }

    #[test]
    fn test_module_edges_reset_fades() {
        let h = Harness::new();
        let mut ship = Ship::ghost();
        let mut modules = [false; ShipModule::COUNT];
        modules[ShipModule::Sensor.index()] = true;
        modules[ShipModule::Cloak.index()] = true;
        let update = ShipUpdate {
            modules: Some(modules),
            ..Default::default()
        };
        apply_update(&mut ship, &update, &h.ctx(), 0, false);
        assert_eq!(ship.sensor_start_ms, 1_000);
        assert_eq!(ship.cloak_timer.current(), CLOAK_FADE_TIME);
        assert!(ship.is_module_active(ShipModule::Cloak));
    }

    #[test]
    fn test_sensor_loadout_change_zooms_except_initially() {
        let h = Harness::new();
        let sensor = Loadout::new(
            [ShipModule::Sensor, ShipModule::Shield],
            [WeaponType::Phaser, WeaponType::Bounce, WeaponType::Triple],
        );
        let update = ShipUpdate {
            loadout: Some(sensor),
            ..Default::default()
        };

        let mut ship = Ship::ghost();
        apply_update(&mut ship, &update, &h.ctx(), 0, true);
        assert!(!ship.sensor_zoom_timer.is_running());

        let mut ship = Ship::ghost();
        apply_update(&mut ship, &update, &h.ctx(), 0, false);
        assert_eq!(ship.sensor_zoom_timer.current(), SENSOR_ZOOM_TIME);
        assert_eq!(ship.loadout, sensor);
    }
}
