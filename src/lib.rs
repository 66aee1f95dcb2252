//! Road elevation harmonization and protected terrain blending.
//!
//! Roads given as centerlines are sampled into cross-sections, elevated along the terrain,
//! joined at their junctions with slope-continuous profiles, and stamped into a heightmap
//! without letting lower-priority roads overwrite higher-priority surfaces.
//! [`pipeline::TerrainHarmonizer`] runs every stage in order.

pub mod core;
pub mod elevation;
pub mod error;
pub mod junction;
pub mod params;
pub mod pipeline;
pub mod raster;
pub mod road;
pub mod traits;
pub mod unit;
