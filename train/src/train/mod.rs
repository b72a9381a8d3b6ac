//! The training loop and its hooks.

mod observer;
mod solver_wrapper;

pub use observer::*;
pub use solver_wrapper::*;
