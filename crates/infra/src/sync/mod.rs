//! Downstream synchronization

pub mod downstream;

pub use downstream::{HttpDownstreamSync, LogDownstreamSync};
