//! Failures of a training run.

use crate::common::*;
use thiserror::Error;

/// The error type of the training orchestration.
///
/// Solver implementations report plain [anyhow::Error]s, which are wrapped
/// into the variant describing the stage that failed.
#[derive(Debug, Error)]
pub enum TrainError {
    /// Invalid option combination or unusable training data.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Parameters could not be initialized from a file.
    #[error("failed to load model weights from '{}'", path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: Error,
    },

    /// A solver step failed, e.g. the loss diverged.
    #[error("solver step failed at iteration {iter}")]
    Step {
        iter: usize,
        #[source]
        source: Error,
    },

    /// A snapshot could not be written.
    #[error("failed to write snapshot '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Error,
    },

    /// The solver could not be built or set up.
    #[error("failed to set up the solver")]
    Solver(#[source] Error),
}
