//! Event cache ports

pub mod ports;

pub use ports::*;
