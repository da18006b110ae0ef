//! Repair beam targeting

use crate::game::constants::ship::{
    COLLISION_RADIUS, NEUTRAL_TEAM, REPAIR_HUNDREDTHS_PER_SECOND, REPAIR_RADIUS,
};
use crate::game::ship::Ship;
use crate::game::spatial::WorldQuery;

/// Refill `ship.repair_targets` with damaged friendlies in reach, the ship
/// itself included. Returns true when there is anyone to heal.
pub fn find_repair_targets(ship: &mut Ship, world: &dyn WorldQuery) -> bool {
    ship.repair_targets.clear();

    let center = ship.render_pos();
    let reach = REPAIR_RADIUS + COLLISION_RADIUS;
    let reach_sq = reach * reach;

    for near in world.ships_near(center, reach) {
        if near.destroyed || near.health >= 1.0 {
            continue;
        }
        if near.team != ship.team && near.team != NEUTRAL_TEAM {
            continue;
        }
        if (near.pos - center).length_sq() > reach_sq {
            continue;
        }
        ship.repair_targets.push(near.ship);
    }

    // The grid may not hold us, e.g. before the first rebuild
    if let Some(me) = ship.handle {
        if !ship.is_destroyed() && ship.health < 1.0 && !ship.repair_targets.contains(&me) {
            ship.repair_targets.push(me);
        }
    }

    !ship.repair_targets.is_empty()
}

/// Health restored to each target over `time_ms`
#[inline]
pub fn repair_amount(time_ms: u32) -> f32 {
    REPAIR_HUNDREDTHS_PER_SECOND * 0.01 * time_ms as f32 * 0.001
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ship::ShipHandle;
    use crate::game::spatial::{ShipSnapshot, SpatialGrid, WorldView, ZoneMap, SHIP_GRID_CELL_SIZE};
    use crate::util::vec2::Vec2;

    fn snap(index: u32, x: f32, health: f32, team: i32) -> ShipSnapshot {
        ShipSnapshot {
            ship: ShipHandle::new(index, 0),
            pos: Vec2::new(x, 0.0),
            health,
            team,
            destroyed: false,
        }
    }

    #[test]
    fn test_targets_damaged_friendlies_in_reach() {
        let zones = ZoneMap::default();
        let mut grid = SpatialGrid::new(SHIP_GRID_CELL_SIZE);
        grid.rebuild(
            [
                snap(1, 50.0, 0.5, 0),         // teammate, hurt
                snap(2, 60.0, 1.0, 0),         // teammate, healthy
                snap(3, 70.0, 0.5, 1),         // enemy
                snap(4, 80.0, 0.5, NEUTRAL_TEAM),
                snap(5, 95.0, 0.5, 0),         // just out of reach
            ]
            .into_iter(),
        );
        let view = WorldView { zones: &zones, grid: &grid };

        let mut ship = Ship::new("Medic", 0, Vec2::ZERO);
        ship.handle = Some(ShipHandle::new(0, 0));
        assert!(find_repair_targets(&mut ship, &view));

        let found: Vec<u32> = ship.repair_targets.iter().map(|h| h.index).collect();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&1));
        assert!(found.contains(&4));
    }

    #[test]
    fn test_includes_self_when_hurt() {
        let zones = ZoneMap::default();
        let mut ship = Ship::new("Medic", 0, Vec2::ZERO);
        ship.handle = Some(ShipHandle::new(9, 2));
        assert!(!find_repair_targets(&mut ship, &zones));

        ship.health = 0.6;
        assert!(find_repair_targets(&mut ship, &zones));
        assert_eq!(ship.repair_targets.as_slice(), &[ShipHandle::new(9, 2)]);
    }

    #[test]
    fn test_skips_destroyed() {
        let zones = ZoneMap::default();
        let mut grid = SpatialGrid::new(SHIP_GRID_CELL_SIZE);
        let mut wreck = snap(1, 10.0, 0.0, 0);
        wreck.destroyed = true;
        grid.insert(wreck);
        let view = WorldView { zones: &zones, grid: &grid };

        let mut ship = Ship::new("Medic", 0, Vec2::ZERO);
        assert!(!find_repair_targets(&mut ship, &view));
    }

    #[test]
    fn test_repair_rate() {
        assert!((repair_amount(1000) - 0.16).abs() < 1e-6);
        assert!((repair_amount(100) - 0.016).abs() < 1e-6);
    }
}
