//! Misc utilities.

mod snapshot;
mod timer;

pub use snapshot::*;
pub use timer::*;
