//! The training program of Fast R-CNN detectors.

pub mod common;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod solver;
pub mod train;
pub mod utils;

use crate::{
    common::*,
    config::{Config, TrainingConfig},
    error::TrainError,
    solver::SolverInit,
    train::{SolverWrapper, StepObserver},
};
use roidb::filter_roidb;

/// Returns the roidb used for training, with flipped images appended if
/// enabled.
pub fn get_training_roidb(mut roidb: Roidb, config: &TrainingConfig) -> Roidb {
    if config.use_flipped {
        info!("Appending horizontally-flipped training examples...");
        roidb.append_flipped_images();
        info!("done");
    }
    roidb
}

/// Trains a network and returns the paths of the snapshots taken.
///
/// The roidb is filtered before training starts. Training resumes from a
/// snapshot if configured, and runs up to `config.training.max_iters`.
pub fn train_net<I>(
    solver_init: I,
    config: &Config,
    roidb: Roidb,
    observers: Vec<Box<dyn StepObserver<I::Solver>>>,
) -> Result<Vec<PathBuf>, TrainError>
where
    I: SolverInit,
{
    let training = &config.training;

    let roidb = filter_roidb(roidb, &training.thresholds());
    if roidb.is_empty() {
        return Err(TrainError::Configuration(
            "no usable roidb entries are left after filtering".into(),
        ));
    }

    let mut wrapper = SolverWrapper::new(
        solver_init,
        config,
        roidb,
        &config.output_dir,
        training.pretrained_model.as_deref(),
    )?;
    observers
        .into_iter()
        .for_each(|observer| wrapper.add_observer(observer));
    wrapper.resume(&training.resume)?;

    info!("Solving...");
    let paths = wrapper.train_model(training.max_iters)?;
    info!("done solving");

    Ok(paths)
}
