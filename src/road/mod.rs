pub mod definition;
pub mod network;
pub mod sampler;
pub mod section;
