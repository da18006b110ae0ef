//! Spatial queries used by the ship simulation
//!
//! A hash grid of per-tick ship snapshots answers "who is near this point"
//! (repair target discovery) and a small set of polygon zones answers "what
//! zone is this point in" (slip zones, speed zones). Both are rebuilt or
//! configured by their owner; ships only ever read them through
//! [`WorldQuery`].

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::game::ship::ShipHandle;
use crate::util::vec2::Vec2;

// ============================================================================
// World query seam
// ============================================================================

/// What a ship may ask about its surroundings
pub trait WorldQuery {
    /// Acceleration multiplier of the slip zone containing `pos`, 1.0 outside
    fn slip_factor(&self, pos: Vec2) -> f32;

    /// Speed zone overlapped by a circle at `pos`
    fn speed_zone_at(&self, pos: Vec2, radius: f32) -> Option<SpeedZoneHit>;

    /// Ships whose snapshot lies in the cells around `center`
    fn ships_near(&self, center: Vec2, radius: f32) -> SmallVec<[ShipSnapshot; 8]>;
}

/// Per-tick copy of the fields repair logic looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShipSnapshot {
    pub ship: ShipHandle,
    pub pos: Vec2,
    pub health: f32,
    pub team: i32,
    pub destroyed: bool,
}

// ============================================================================
// Ship Spatial Grid
// ============================================================================

/// Default cell size for the ship grid (world units)
/// Repair reach plus a ship radius fits inside two cells
pub const SHIP_GRID_CELL_SIZE: f32 = 64.0;

/// Initial capacity for grid cells (number of expected non-empty cells)
const SHIP_GRID_INITIAL_CAPACITY: usize = 256;

/// Initial capacity for snapshot vectors within cells
const SHIP_CELL_INITIAL_CAPACITY: usize = 8;

/// Grid cell key - (x, y) cell coordinates
pub type CellKey = (i32, i32);

/// Spatial hash grid of ship snapshots
pub struct SpatialGrid {
    /// Inverse cell size for fast position-to-cell conversion
    inv_cell_size: f32,
    /// Map from cell key to snapshots in that cell
    cells: HashMap<CellKey, Vec<ShipSnapshot>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::with_capacity(SHIP_GRID_INITIAL_CAPACITY),
        }
    }

    /// Clear all snapshots, keeping cell allocations
    #[inline]
    pub fn clear(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
    }

    #[inline]
    fn position_to_cell(&self, position: Vec2) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
        )
    }

    #[inline]
    pub fn insert(&mut self, snapshot: ShipSnapshot) {
        let cell_key = self.position_to_cell(snapshot.pos);
        self.cells
            .entry(cell_key)
            .or_insert_with(|| Vec::with_capacity(SHIP_CELL_INITIAL_CAPACITY))
            .push(snapshot);
    }

    /// Rebuild the grid from this tick's snapshots
    pub fn rebuild(&mut self, snapshots: impl Iterator<Item = ShipSnapshot>) {
        self.clear();
        for snapshot in snapshots {
            self.insert(snapshot);
        }
    }

    /// Replace a ship's stored health and state after a mid-tick change.
    /// Position is left as recorded at the last rebuild.
    pub fn refresh(&mut self, snapshot: ShipSnapshot) {
        let stored = self
            .cells
            .values_mut()
            .flat_map(|cell| cell.iter_mut())
            .find(|s| s.ship == snapshot.ship);
        if let Some(stored) = stored {
            stored.health = snapshot.health;
            stored.destroyed = snapshot.destroyed;
        }
    }

    /// Every snapshot in the cells overlapping a square of half-size `radius`.
    /// Callers do their own exact distance test.
    pub fn query_radius(&self, position: Vec2, radius: f32) -> impl Iterator<Item = &ShipSnapshot> {
        let (cx, cy) = self.position_to_cell(position);
        let cell_radius = (radius * self.inv_cell_size).ceil() as i32;

        (-cell_radius..=cell_radius).flat_map(move |dx| {
            (-cell_radius..=cell_radius).flat_map(move |dy| {
                self.cells
                    .get(&(cx + dx, cy + dy))
                    .into_iter()
                    .flat_map(|cell| cell.iter())
            })
        })
    }

    pub fn stats(&self) -> SpatialGridStats {
        SpatialGridStats {
            non_empty_cells: self.cells.values().filter(|c| !c.is_empty()).count(),
            total_entities: self.cells.values().map(|c| c.len()).sum(),
            max_per_cell: self.cells.values().map(|c| c.len()).max().unwrap_or(0),
        }
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(SHIP_GRID_CELL_SIZE)
    }
}

#[derive(Debug, Clone)]
pub struct SpatialGridStats {
    pub non_empty_cells: usize,
    pub total_entities: usize,
    pub max_per_cell: usize,
}

// ============================================================================
// Zones
// ============================================================================

/// Closed polygon with a cached bounding box
#[derive(Debug, Clone)]
pub struct Polygon {
    points: Vec<Vec2>,
    min: Vec2,
    max: Vec2,
}

impl Polygon {
    pub fn new(points: Vec<Vec2>) -> Self {
        let mut min = Vec2::new(f32::MAX, f32::MAX);
        let mut max = Vec2::new(f32::MIN, f32::MIN);
        for p in &points {
            min = Vec2::new(min.x.min(p.x), min.y.min(p.y));
            max = Vec2::new(max.x.max(p.x), max.y.max(p.y));
        }
        Self { points, min, max }
    }

    /// Axis-aligned rectangle from two corners
    pub fn rect(a: Vec2, b: Vec2) -> Self {
        Self::new(vec![
            Vec2::new(a.x, a.y),
            Vec2::new(b.x, a.y),
            Vec2::new(b.x, b.y),
            Vec2::new(a.x, b.y),
        ])
    }

    #[inline]
    fn bounds_overlap(&self, center: Vec2, radius: f32) -> bool {
        center.x + radius >= self.min.x
            && center.x - radius <= self.max.x
            && center.y + radius >= self.min.y
            && center.y - radius <= self.max.y
    }

    /// Even-odd point containment
    pub fn contains(&self, p: Vec2) -> bool {
        if self.points.len() < 3 || !self.bounds_overlap(p, 0.0) {
            return false;
        }
        let mut inside = false;
        let mut j = self.points.len() - 1;
        for i in 0..self.points.len() {
            let (a, b) = (self.points[i], self.points[j]);
            if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Does a circle touch the polygon
    pub fn intersects_circle(&self, center: Vec2, radius: f32) -> bool {
        if !self.bounds_overlap(center, radius) {
            return false;
        }
        if self.contains(center) {
            return true;
        }
        let r_sq = radius * radius;
        let mut j = self.points.len().saturating_sub(1);
        for i in 0..self.points.len() {
            if segment_distance_sq(center, self.points[j], self.points[i]) <= r_sq {
                return true;
            }
            j = i;
        }
        false
    }
}

fn segment_distance_sq(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    let t = if len_sq > 0.0 {
        ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (a + ab * t - p).length_sq()
}

/// Region that scales ship acceleration
#[derive(Debug, Clone)]
pub struct SlipZone {
    pub area: Polygon,
    pub slip_amount: f32,
}

/// Region that flings ships along a direction
#[derive(Debug, Clone)]
pub struct SpeedZone {
    pub area: Polygon,
    pub direction: Vec2,
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedZoneHit {
    pub direction: Vec2,
    pub speed: f32,
}

impl SpeedZoneHit {
    /// Velocity a ship leaves the zone with
    #[inline]
    pub fn launch_velocity(&self) -> Vec2 {
        self.direction.normalize() * self.speed
    }
}

#[derive(Debug, Clone, Default)]
pub struct ZoneMap {
    pub slip_zones: Vec<SlipZone>,
    pub speed_zones: Vec<SpeedZone>,
}

impl ZoneMap {
    pub fn add_slip_zone(&mut self, area: Polygon, slip_amount: f32) {
        self.slip_zones.push(SlipZone { area, slip_amount });
    }

    pub fn add_speed_zone(&mut self, area: Polygon, direction: Vec2, speed: f32) {
        self.speed_zones.push(SpeedZone {
            area,
            direction,
            speed,
        });
    }

    pub fn slip_factor(&self, pos: Vec2) -> f32 {
        self.slip_zones
            .iter()
            .find(|zone| zone.area.contains(pos))
            .map_or(1.0, |zone| zone.slip_amount)
    }

    pub fn speed_zone_at(&self, pos: Vec2, radius: f32) -> Option<SpeedZoneHit> {
        self.speed_zones
            .iter()
            .find(|zone| zone.area.intersects_circle(pos, radius))
            .map(|zone| SpeedZoneHit {
                direction: zone.direction,
                speed: zone.speed,
            })
    }
}

/// Borrowed view combining zones and the ship grid
pub struct WorldView<'a> {
    pub zones: &'a ZoneMap,
    pub grid: &'a SpatialGrid,
}

impl WorldQuery for WorldView<'_> {
    fn slip_factor(&self, pos: Vec2) -> f32 {
        self.zones.slip_factor(pos)
    }

    fn speed_zone_at(&self, pos: Vec2, radius: f32) -> Option<SpeedZoneHit> {
        self.zones.speed_zone_at(pos, radius)
    }

    fn ships_near(&self, center: Vec2, radius: f32) -> SmallVec<[ShipSnapshot; 8]> {
        self.grid.query_radius(center, radius).copied().collect()
    }
}

/// Zones only, no neighbours
impl WorldQuery for ZoneMap {
    fn slip_factor(&self, pos: Vec2) -> f32 {
        ZoneMap::slip_factor(self, pos)
    }

    fn speed_zone_at(&self, pos: Vec2, radius: f32) -> Option<SpeedZoneHit> {
        ZoneMap::speed_zone_at(self, pos, radius)
    }

    fn ships_near(&self, _center: Vec2, _radius: f32) -> SmallVec<[ShipSnapshot; 8]> {
        SmallVec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(index: u32, x: f32, y: f32) -> ShipSnapshot {
        ShipSnapshot {
            ship: ShipHandle::new(index, 0),
            pos: Vec2::new(x, y),
            health: 0.5,
            team: 0,
            destroyed: false,
        }
    }

    #[test]
    fn test_grid_query_finds_neighbours() {
        let mut grid = SpatialGrid::default();
        grid.insert(snapshot(0, 0.0, 0.0));
        grid.insert(snapshot(1, 70.0, 10.0));
        grid.insert(snapshot(2, 1000.0, 1000.0));

        let found: Vec<u32> = grid
            .query_radius(Vec2::ZERO, 89.0)
            .map(|s| s.ship.index)
            .collect();
        assert!(found.contains(&0));
        assert!(found.contains(&1));
        assert!(!found.contains(&2));
    }

    #[test]
    fn test_grid_refresh_updates_health() {
        let mut grid = SpatialGrid::default();
        grid.rebuild([snapshot(1, 0.0, 0.0), snapshot(2, 10.0, 0.0)].into_iter());

        grid.refresh(ShipSnapshot {
            health: 1.0,
            ..snapshot(2, 10.0, 0.0)
        });
        let healths: Vec<(u32, f32)> = grid
            .query_radius(Vec2::ZERO, 20.0)
            .map(|s| (s.ship.index, s.health))
            .collect();
        assert!(healths.contains(&(2, 1.0)));
        assert!(healths.contains(&(1, 0.5)));
    }

    #[test]
    fn test_grid_rebuild_replaces_contents() {
        let mut grid = SpatialGrid::default();
        grid.insert(snapshot(0, 0.0, 0.0));
        grid.rebuild([snapshot(5, 500.0, 500.0)].into_iter());

        assert_eq!(grid.query_radius(Vec2::ZERO, 10.0).count(), 0);
        assert_eq!(grid.stats().total_entities, 1);
    }

    #[test]
    fn test_polygon_contains() {
        let square = Polygon::rect(Vec2::new(0.0, 0.0), Vec2::new(100.0, 100.0));
        assert!(square.contains(Vec2::new(50.0, 50.0)));
        assert!(!square.contains(Vec2::new(150.0, 50.0)));

        let triangle = Polygon::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(100.0, 0.0),
            Vec2::new(0.0, 100.0),
        ]);
        assert!(triangle.contains(Vec2::new(10.0, 10.0)));
        assert!(!triangle.contains(Vec2::new(90.0, 90.0)));
    }

    #[test]
    fn test_circle_touches_edge() {
        let square = Polygon::rect(Vec2::new(0.0, 0.0), Vec2::new(100.0, 100.0));
        assert!(square.intersects_circle(Vec2::new(120.0, 50.0), 24.0));
        assert!(!square.intersects_circle(Vec2::new(130.0, 50.0), 24.0));
    }

    #[test]
    fn test_zone_lookups() {
        let mut zones = ZoneMap::default();
        zones.add_slip_zone(Polygon::rect(Vec2::ZERO, Vec2::new(100.0, 100.0)), 0.5);
        zones.add_speed_zone(
            Polygon::rect(Vec2::new(200.0, 0.0), Vec2::new(220.0, 20.0)),
            Vec2::new(0.0, 2.0),
            1200.0,
        );

        assert_eq!(zones.slip_factor(Vec2::new(50.0, 50.0)), 0.5);
        assert_eq!(zones.slip_factor(Vec2::new(150.0, 50.0)), 1.0);

        let hit = zones.speed_zone_at(Vec2::new(190.0, 10.0), 24.0).unwrap();
        assert_eq!(hit.launch_velocity(), Vec2::new(0.0, 1200.0));
        assert!(zones.speed_zone_at(Vec2::new(0.0, 0.0), 24.0).is_none());
    }
}
