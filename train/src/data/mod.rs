//! The data-feeding layer of the solver.

mod layer;
mod minibatch;

pub use layer::*;
pub use minibatch::*;
