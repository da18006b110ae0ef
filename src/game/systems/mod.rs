pub mod damage;
pub mod energy;
pub mod physics;
pub mod repair;
pub mod weapons;
