pub mod bitstream;
pub mod client;
pub mod ghost;
pub mod mask;
pub mod protocol;
pub mod ship_update;
