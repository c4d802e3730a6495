pub mod deep_sea;
pub mod river_swim;

pub use deep_sea::DeepSea;
pub use river_swim::RiverSwim;
