//! The solver capability driven by the training loop.

mod lr_scheduler;
mod sgd;

pub use lr_scheduler::*;
pub use sgd::*;

use crate::{common::*, config::SolverConfig};

/// The parameter name of the regression layer weights.
pub const BBOX_PRED_WEIGHT: &str = "bbox_pred.weight";
/// The parameter name of the regression layer biases.
pub const BBOX_PRED_BIAS: &str = "bbox_pred.bias";

/// A stateful optimizer over network parameters.
///
/// The training loop only advances it, reads its iteration counter, accesses
/// parameters by name and persists them. The numerical update rule is up to
/// the implementation.
pub trait Solver {
    /// The file extension of files written by [Solver::save].
    const EXTENSION: &'static str;

    /// Advances `iters` iterations.
    fn step(&mut self, iters: usize) -> Result<()>;

    /// The number of iterations done so far.
    fn iter(&self) -> usize;

    fn has_param(&self, name: &str) -> bool;

    /// Returns a copy of a parameter tensor.
    fn read_param(&self, name: &str) -> Result<Tensor>;

    /// Overwrites a parameter tensor. The shape must not change.
    fn write_param(&mut self, name: &str, value: &Tensor) -> Result<()>;

    /// Serializes the parameters to a file.
    fn save(&self, path: &Path) -> Result<()>;

    /// Initializes parameters from a file, keeping the iteration counter.
    fn copy_from(&mut self, path: &Path) -> Result<()>;

    /// Resumes parameters and the iteration counter from a file written by
    /// [Solver::save].
    fn restore(&mut self, path: &Path) -> Result<()>;

    /// Hands the training roidb to the data-feeding layer.
    fn set_roidb(&mut self, roidb: Arc<Roidb>) -> Result<()>;
}

/// Builds a [Solver] from solver options.
pub trait SolverInit {
    type Solver: Solver;

    fn build(self, config: &SolverConfig) -> Result<Self::Solver>;
}
