pub mod blender;
pub mod falloff;
pub mod ownership;
