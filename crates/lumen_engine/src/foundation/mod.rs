//! Foundation utilities shared across the engine
//!
//! Math types and small helpers with no dependency on the scene or
//! rendering layers.

pub mod math;
