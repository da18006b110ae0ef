pub mod constants;
pub mod effects;
pub mod handle;
pub mod input_buffer;
pub mod items;
pub mod loadout;
pub mod modules;
pub mod motion;
pub mod moves;
pub mod prediction;
pub mod rules;
pub mod ship;
pub mod spatial;
pub mod systems;
pub mod world;
