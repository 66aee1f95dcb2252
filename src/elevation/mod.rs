pub mod baseline;
pub mod harmonizer;
pub mod profile;
