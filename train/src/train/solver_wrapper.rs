use super::StepObserver;
use crate::{
    common::*,
    config::{Config, Resume},
    error::TrainError,
    solver::{Solver, SolverInit, BBOX_PRED_BIAS, BBOX_PRED_WEIGHT},
    utils::{SnapshotNaming, StepTimer},
};
use roidb::add_bbox_regression_targets;

/// Drives a [Solver] and takes snapshots with denormalized regression
/// weights.
pub struct SolverWrapper<S>
where
    S: Solver,
{
    solver: S,
    output_dir: PathBuf,
    naming: SnapshotNaming,
    display: usize,
    snapshot_iters: usize,
    /// Set iff snapshots carry denormalized regression weights.
    bbox_stats: Option<BboxNormalizationStats>,
    observers: Vec<Box<dyn StepObserver<S>>>,
}

impl<S> SolverWrapper<S>
where
    S: Solver,
{
    pub fn new<I>(
        solver_init: I,
        config: &Config,
        mut roidb: Roidb,
        output_dir: impl Into<PathBuf>,
        pretrained_model: Option<&Path>,
    ) -> Result<Self, TrainError>
    where
        I: SolverInit<Solver = S>,
    {
        let Config {
            ref solver,
            ref training,
            ..
        } = *config;
        let output_dir = output_dir.into();

        training.check()?;
        roidb
            .validate()
            .map_err(|err| TrainError::Configuration(format!("invalid roidb: {:#}", err)))?;

        let bbox_stats = if training.bbox_reg {
            info!("Computing bounding-box regression targets...");
            let stats = add_bbox_regression_targets(&mut roidb, &training.target_options())
                .map_err(|err| TrainError::Configuration(format!("{:#}", err)))?;
            info!("done");
            training.bbox_normalize_targets.then(|| stats)
        } else {
            None
        };

        let mut solver = solver_init.build(solver).map_err(TrainError::Solver)?;
        if let Some(path) = pretrained_model {
            info!("Loading pretrained model weights from {}", path.display());
            solver
                .copy_from(path)
                .map_err(|source| TrainError::ModelLoad {
                    path: path.to_owned(),
                    source,
                })?;
        }

        let naming = SnapshotNaming::new(
            &config.solver.snapshot_prefix,
            &training.snapshot_infix,
            S::EXTENSION,
        )
        .map_err(|err| TrainError::Configuration(format!("{:#}", err)))?;
        fs::create_dir_all(&output_dir).map_err(|err| TrainError::Io {
            path: output_dir.clone(),
            source: err.into(),
        })?;

        solver
            .set_roidb(Arc::new(roidb))
            .map_err(TrainError::Solver)?;

        Ok(Self {
            solver,
            output_dir,
            naming,
            display: config.solver.display,
            snapshot_iters: training.snapshot_iters.get(),
            bbox_stats,
            observers: vec![],
        })
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// The statistics to denormalize the regression layer with, if it is
    /// trained on normalized targets.
    fn rescale_stats(&self) -> Option<&BboxNormalizationStats> {
        self.bbox_stats.as_ref().filter(|_| {
            self.solver.has_param(BBOX_PRED_WEIGHT) && self.solver.has_param(BBOX_PRED_BIAS)
        })
    }

    pub fn add_observer(&mut self, observer: Box<dyn StepObserver<S>>) {
        self.observers.push(observer);
    }

    /// Resumes parameters and the iteration counter from a snapshot.
    pub fn restore(&mut self, path: &Path) -> Result<(), TrainError> {
        info!("Resuming from snapshot {}", path.display());
        let model_load_error = |source| TrainError::ModelLoad {
            path: path.to_owned(),
            source,
        };

        self.solver.restore(path).map_err(model_load_error)?;

        // snapshots carry the denormalized regression layer
        if let Some(stats) = self.rescale_stats().cloned() {
            let layer = RegressionLayer::read(&self.solver, &stats).map_err(model_load_error)?;
            let (weight, bias) = layer.normalized();
            write_regression_layer(&mut self.solver, &weight, &bias).map_err(model_load_error)?;
        }

        info!("resumed at iteration {}", self.solver.iter());
        Ok(())
    }

    /// Resumes with specified resuming method. Returns the resumed snapshot.
    pub fn resume(&mut self, resume: &Resume) -> Result<Option<PathBuf>, TrainError> {
        let path = self
            .naming
            .resolve_resume(resume, &self.output_dir)
            .map_err(|source| TrainError::Io {
                path: self.output_dir.clone(),
                source,
            })?;

        if let Some(path) = &path {
            self.restore(path)?;
        }
        Ok(path)
    }

    /// Writes the parameters to `<output_dir>/<prefix>[_<infix>]_iter_<N>.<ext>`.
    ///
    /// When targets are normalized, the saved regression layer predicts
    /// unnormalized deltas. The in-memory parameters are left untouched.
    pub fn snapshot(&mut self) -> Result<PathBuf, TrainError> {
        let path = self
            .output_dir
            .join(self.naming.file_name(self.solver.iter()));
        let io_error = |source| TrainError::Io {
            path: path.clone(),
            source,
        };

        match self.rescale_stats().cloned() {
            Some(stats) => {
                let guard = DenormalizeGuard::new(&mut self.solver, &stats).map_err(io_error)?;
                guard.solver.save(&path).map_err(io_error)?;
            }
            None => {
                self.solver.save(&path).map_err(io_error)?;
            }
        }

        info!("Wrote snapshot to: {}", path.display());
        Ok(path)
    }

    /// Steps the solver until it reaches `max_iters` and returns the
    /// snapshots taken in order. The last one holds the final parameters.
    pub fn train_model(&mut self, max_iters: usize) -> Result<Vec<PathBuf>, TrainError> {
        let mut last_snapshot_iter = None;
        let mut timer = StepTimer::new();
        let mut paths = vec![];

        while self.solver.iter() < max_iters {
            let prev_iter = self.solver.iter();

            timer.tic();
            self.solver
                .step(1)
                .map_err(|source| TrainError::Step {
                    iter: prev_iter,
                    source,
                })?;
            let elapsed = timer.toc();

            let iter = self.solver.iter();
            if iter <= prev_iter {
                return Err(TrainError::Step {
                    iter: prev_iter,
                    source: format_err!("the solver did not advance"),
                });
            }

            if self.display > 0 && iter % (10 * self.display) == 0 {
                info!("speed: {:.3}s / iter", timer.average_time().as_secs_f64());
            }

            for observer in &mut self.observers {
                observer
                    .after_step(&self.solver, elapsed)
                    .map_err(|source| TrainError::Step { iter, source })?;
            }

            if iter % self.snapshot_iters == 0 {
                last_snapshot_iter = Some(iter);
                paths.push(self.snapshot()?);
            }
        }

        if last_snapshot_iter != Some(self.solver.iter()) {
            paths.push(self.snapshot()?);
        }

        Ok(paths)
    }
}

/// The regression layer parameters along with the statistics of its outputs.
struct RegressionLayer {
    weight: Tensor,
    bias: Tensor,
    means: Tensor,
    stds: Tensor,
}

impl RegressionLayer {
    fn read<S>(solver: &S, stats: &BboxNormalizationStats) -> Result<Self>
    where
        S: Solver,
    {
        let weight = solver.read_param(BBOX_PRED_WEIGHT)?;
        let bias = solver.read_param(BBOX_PRED_BIAS)?;

        let num_outputs = 4 * stats.num_classes() as i64;
        ensure!(
            weight.dim() == 2 && weight.size()[0] == num_outputs && bias.size() == [num_outputs],
            "the regression layer must have {} outputs, but get weight {:?} and bias {:?}",
            num_outputs,
            weight.size(),
            bias.size()
        );

        let (kind, device) = (weight.kind(), weight.device());
        let means = Tensor::of_slice(&stats.flat_means())
            .to_kind(kind)
            .to_device(device);
        let stds = Tensor::of_slice(&stats.flat_stds())
            .to_kind(kind)
            .to_device(device);

        Ok(Self {
            weight,
            bias,
            means,
            stds,
        })
    }

    /// Parameters predicting deltas in box units.
    fn denormalized(&self) -> (Tensor, Tensor) {
        let weight = &self.weight * self.stds.unsqueeze(1);
        let bias = &self.bias * &self.stds + &self.means;
        (weight, bias)
    }

    /// Parameters predicting normalized deltas.
    fn normalized(&self) -> (Tensor, Tensor) {
        let weight = &self.weight / self.stds.unsqueeze(1);
        let bias = (&self.bias - &self.means) / &self.stds;
        (weight, bias)
    }
}

fn write_regression_layer<S>(solver: &mut S, weight: &Tensor, bias: &Tensor) -> Result<()>
where
    S: Solver,
{
    solver.write_param(BBOX_PRED_WEIGHT, weight)?;
    solver.write_param(BBOX_PRED_BIAS, bias)?;
    Ok(())
}

/// Rewrites the regression layer to predict unnormalized deltas and puts the
/// original values back when dropped.
struct DenormalizeGuard<'a, S>
where
    S: Solver,
{
    solver: &'a mut S,
    weight: Tensor,
    bias: Tensor,
}

impl<'a, S> DenormalizeGuard<'a, S>
where
    S: Solver,
{
    fn new(solver: &'a mut S, stats: &BboxNormalizationStats) -> Result<Self> {
        let layer = RegressionLayer::read(solver, stats)?;
        let (weight, bias) = layer.denormalized();

        // originals are restored on drop, even if the writes below fail
        let mut guard = Self {
            solver,
            weight: layer.weight,
            bias: layer.bias,
        };
        write_regression_layer(guard.solver, &weight, &bias)?;

        Ok(guard)
    }
}

impl<'a, S> Drop for DenormalizeGuard<'a, S>
where
    S: Solver,
{
    fn drop(&mut self) {
        if let Err(err) = write_regression_layer(self.solver, &self.weight, &self.bias) {
            error!("failed to restore the regression layer: {:#}", err);
        }
    }
}
