//! Domain layer - core types and port definitions

pub mod ports;

pub use ports::*;
