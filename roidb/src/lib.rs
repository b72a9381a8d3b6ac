//! Region-of-interest database types, filtering and regression targets.

mod common;

pub mod boxes;
pub use boxes::*;

pub mod entry;
pub use entry::*;

pub mod filter;
pub use filter::*;

mod flip;

pub mod targets;
pub use targets::*;

/// The small constant that keeps divisions finite.
pub const EPS: f64 = 1e-14;
