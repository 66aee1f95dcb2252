pub mod container;
pub mod geometry;
pub mod heightmap;
