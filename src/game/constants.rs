/// Ship movement constants
pub mod ship {
    /// Collision radius of a ship (world units)
    pub const COLLISION_RADIUS: f32 = 24.0;
    /// Top speed without boost
    pub const MAX_VELOCITY: f32 = 450.0;
    /// Top speed while the boost module is active
    pub const BOOST_MAX_VELOCITY: f32 = 700.0;
    /// Acceleration budget per second without boost
    pub const ACCELERATION: f32 = 2500.0;
    /// Acceleration budget per second while boosting
    pub const BOOST_ACCELERATION: f32 = 5000.0;
    /// Acceleration multiplier when armor is equipped
    pub const ARMOR_ACCEL_PENALTY_FACTOR: f32 = 0.35;
    /// Top speed multiplier when armor is equipped
    pub const ARMOR_SPEED_PENALTY_FACTOR: f32 = 1.0;
    /// Above this speed input is ignored until the ship slows down
    pub const MAX_CONTROLLABLE_SPEED: f32 = 1000.0;
    /// Position/velocity are snapped to a 1/128 grid after controlled steps
    pub const NORMALIZE_MULTIPLIER: f32 = 128.0;
    pub const NORMALIZE_FRACTION: f32 = 1.0 / NORMALIZE_MULTIPLIER;
    /// Repair beam reach (added to the target's collision radius)
    pub const REPAIR_RADIUS: f32 = 65.0;
    /// Health restored per second by the repair module, in hundredths
    pub const REPAIR_HUNDREDTHS_PER_SECOND: f32 = 16.0;
    /// Number of teams a ship can belong to (plus neutral and hostile)
    pub const MAX_TEAMS: i32 = 9;
    /// Team index for objects that belong to nobody
    pub const NEUTRAL_TEAM: i32 = -1;
    /// Team index for objects hostile to everyone
    pub const HOSTILE_TEAM: i32 = -2;
    /// Longest player name carried on the wire
    pub const MAX_NAME_LEN: usize = 32;
}

/// Energy pool constants
pub mod energy {
    /// Full energy pool
    pub const MAX: i32 = 100_000;
    /// Fraction of the pool a freshly spawned ship starts with
    pub const SPAWN_FRACTION: f32 = 0.80;
    /// Regeneration per second while moving with nothing active
    pub const RECHARGE_RATE: f32 = 6_000.0;
    /// Regeneration per second while idle with nothing active
    pub const RECHARGE_RATE_WHEN_IDLE: f32 = 10_000.0;
    /// Modules stay locked out until energy rises above this
    pub const COOLDOWN_THRESHOLD: i32 = 15_000;
    /// One-off cost charged when the sensor switches on
    pub const SENSOR_ACTIVATION_COST: i32 = MAX / 20;
}

/// Timer durations in milliseconds
pub mod timing {
    /// Damage immunity after spawning
    pub const SPAWN_SHIELD_TIME: u32 = 5000;
    /// Cloak is blocked for this long after firing
    pub const WEAPON_FIRE_DECLOAK_TIME: u32 = 350;
    /// Sensor zoom in/out transition
    pub const SENSOR_ZOOM_TIME: u32 = 1000;
    /// Cloak fade in/out
    pub const CLOAK_FADE_TIME: u32 = 300;
    /// Spin-in effect after teleport or spawn
    pub const WARP_FADE_IN_TIME: u32 = 500;
    /// Exploded ships linger this long before removal
    pub const KILL_DELETE_DELAY: u32 = 1500;
    /// Respawn flag is only honoured this soon after the respawn itself
    pub const RESPAWN_EFFECT_WINDOW: u64 = 300;
}

/// Client prediction and interpolation constants
pub mod prediction {
    /// Deltas at or under this are snapped instead of animated
    pub const SNAP_EPSILON: f32 = 0.5;
    /// Deltas over this are treated as a teleport and snapped
    pub const MAX_CONTROL_OBJECT_INTERP_DISTANCE: f32 = 200.0;
    /// No interpolation while the ship moves faster than this
    pub const INTERP_MAX_VELOCITY: f32 = 900.0;
    /// Share of the remaining render gap closed per second
    pub const INTERP_CATCH_UP_RATE: f32 = 10.0;
}

/// Networking constants
pub mod net {
    /// Bits used for a connection-local ghost index
    pub const GHOST_ID_BIT_SIZE: u32 = 10;
    /// Number of addressable ghosts per connection
    pub const MAX_GHOST_COUNT: u32 = 1 << GHOST_ID_BIT_SIZE;
    /// How far below zero the fire timer may be reported
    pub const NEGATIVE_FIRE_DELAY: u32 = 123;
    /// Health precision on the wire
    pub const HEALTH_BITS: u32 = 6;
    /// Longest move the wire format can express (ms)
    pub const MAX_MOVE_TIME: u32 = 1023;
    /// Precision of the move's x/y intent
    pub const MOVE_AXIS_BITS: u32 = 8;
    /// Precision of the move's facing angle
    pub const MOVE_ANGLE_BITS: u32 = 12;
    /// Compressed points are quantised to 1/POINT_SCALE units
    pub const POINT_SCALE: f32 = 16.0;
    /// Precision of a compressed velocity's heading
    pub const VELOCITY_ANGLE_BITS: u32 = 12;
    /// Speeds up to this are sent as heading plus integer magnitude
    pub const COMPRESSED_VELOCITY_MAX: u32 = 701;
    /// Capacity of the inbound move queue
    pub const INPUT_BUFFER_SIZE: usize = 1024;
    /// Ships farther than this from a connection's own ship leave its scope
    pub const SCOPE_RADIUS: f32 = 1200.0;
}

/// Simulation tick constants
pub mod tick {
    /// Default simulation rate in Hz
    pub const TICK_RATE: u32 = 30;
    /// Tick duration in milliseconds
    pub const TICK_DURATION_MS: u32 = 1000 / TICK_RATE;
}
