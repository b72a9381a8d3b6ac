//! Training program configuration format.

use crate::{common::*, error::TrainError};
use roidb::TargetOptions;

pub use model::*;
pub use solver::*;
pub use training::*;

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The directory where snapshots are written.
    pub output_dir: PathBuf,
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
    pub solver: SolverConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }
}

/// Dataset options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// The JSON file of the roidb.
    pub roidb_file: PathBuf,
}

/// Data logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Parameters whose statistics are logged during training.
    #[serde(default)]
    pub probe_params: Vec<String>,
    /// Log parameter statistics per this steps.
    #[serde(default = "default_probe_interval")]
    pub probe_interval: NonZeroUsize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            probe_params: vec![],
            probe_interval: default_probe_interval(),
        }
    }
}

mod model {
    use super::*;

    /// The model configuration.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "kind")]
    pub enum ModelConfig {
        /// The geometry-only baseline head.
        Baseline { hidden_dim: NonZeroUsize },
    }
}

mod solver {
    use super::*;

    /// The solver options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SolverConfig {
        /// Learning rate scheduling strategy.
        pub lr_schedule: LearningRateSchedule,
        /// The momentum parameter for optimizer.
        #[serde(default = "default_momentum")]
        pub momentum: R64,
        /// The weight decay parameter for optimizer.
        #[serde(default = "default_weight_decay")]
        pub weight_decay: R64,
        /// Throughput is reported per 10 times of this steps. Zero disables it.
        #[serde(default = "default_display")]
        pub display: usize,
        /// The file name prefix of snapshots.
        pub snapshot_prefix: String,
        /// The device where the solver works on.
        #[serde(with = "tch_serde::serde_device", default = "default_device")]
        pub device: Device,
        /// The random seed of the solver and data layer.
        #[serde(default = "default_seed")]
        pub seed: u64,
    }

    /// The learning rate scheduling strategy.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LearningRateSchedule {
        /// Use constant learning rate.
        Constant { lr: R64 },
        /// Multiply the learning rate by `gamma` per `step_size` steps.
        Step {
            lr: R64,
            gamma: R64,
            step_size: NonZeroUsize,
        },
        /// Use specific learning rate at specified steps.
        StepWise { steps: Vec<(usize, R64)> },
    }
}

mod training {
    use super::*;

    /// The training options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct TrainingConfig {
        /// The number of solver iterations to train for.
        pub max_iters: usize,
        /// Parameters are initialized from this file if set.
        pub pretrained_model: Option<PathBuf>,
        /// Snapshot loading method.
        pub resume: Resume,
        /// If set, horizontally flipped copies of images are appended.
        pub use_flipped: bool,
        /// If set, the network generates its own proposals.
        pub has_rpn: bool,
        /// If set, bounding-box regression is trained.
        pub bbox_reg: bool,
        /// The minimum overlap for a region to get a regression target.
        pub bbox_thresh: R64,
        /// If set, regression targets are normalized.
        pub bbox_normalize_targets: bool,
        /// If set, the configured means and stds are used instead of
        /// statistics computed from the roidb.
        pub bbox_normalize_targets_precomputed: bool,
        pub bbox_normalize_means: [R64; 4],
        pub bbox_normalize_stds: [R64; 4],
        /// Regions overlapping at least this much are foreground.
        pub fg_thresh: R64,
        /// Background regions overlap in `[bg_thresh_lo, bg_thresh_hi)`.
        pub bg_thresh_lo: R64,
        pub bg_thresh_hi: R64,
        /// The fraction of foreground regions in a minibatch.
        pub fg_fraction: R64,
        /// The number of regions per minibatch.
        pub batch_size: NonZeroUsize,
        /// The number of images per minibatch.
        pub ims_per_batch: NonZeroUsize,
        /// Take a snapshot per this steps.
        pub snapshot_iters: NonZeroUsize,
        /// The optional token inserted after the snapshot prefix.
        pub snapshot_infix: String,
    }

    impl TrainingConfig {
        pub fn thresholds(&self) -> RoiThresholds {
            RoiThresholds {
                fg_thresh: self.fg_thresh,
                bg_thresh_lo: self.bg_thresh_lo,
                bg_thresh_hi: self.bg_thresh_hi,
            }
        }

        pub fn target_options(&self) -> TargetOptions {
            TargetOptions {
                bbox_thresh: self.bbox_thresh.raw(),
                normalize_targets: self.bbox_normalize_targets,
                precomputed: self.bbox_normalize_targets_precomputed.then(|| {
                    (
                        self.bbox_normalize_means.map(|mean| mean.raw()),
                        self.bbox_normalize_stds.map(|std| std.raw()),
                    )
                }),
            }
        }

        /// Rejects invalid option combinations.
        pub fn check(&self) -> Result<(), TrainError> {
            let config_error = |msg: &str| Err(TrainError::Configuration(msg.to_string()));

            // RPN can only use precomputed normalization because there are no
            // fixed statistics to compute a priori
            if self.has_rpn
                && self.bbox_reg
                && self.bbox_normalize_targets
                && !self.bbox_normalize_targets_precomputed
            {
                return config_error(
                    "has_rpn with bbox_normalize_targets requires bbox_normalize_targets_precomputed",
                );
            }

            let ratios = [
                self.fg_thresh,
                self.bg_thresh_lo,
                self.bg_thresh_hi,
                self.bbox_thresh,
                self.fg_fraction,
            ];
            if !ratios.iter().all(|ratio| (0.0..=1.0).contains(&ratio.raw())) {
                return config_error("thresholds and fg_fraction must lie in [0, 1]");
            }
            if self.bg_thresh_lo > self.bg_thresh_hi {
                return config_error("bg_thresh_lo must not exceed bg_thresh_hi");
            }
            if self.batch_size.get() % self.ims_per_batch.get() != 0 {
                return config_error("batch_size must be multiple of ims_per_batch");
            }
            if self.bbox_normalize_targets_precomputed
                && !self.bbox_normalize_stds.iter().all(|&std| std > 0.0)
            {
                return config_error("bbox_normalize_stds must be positive");
            }

            Ok(())
        }
    }

    impl Default for TrainingConfig {
        fn default() -> Self {
            Self {
                max_iters: 40000,
                pretrained_model: None,
                resume: Resume::Disabled,
                use_flipped: true,
                has_rpn: false,
                bbox_reg: true,
                bbox_thresh: r64(0.5),
                bbox_normalize_targets: true,
                bbox_normalize_targets_precomputed: false,
                bbox_normalize_means: [r64(0.0); 4],
                bbox_normalize_stds: [r64(0.1), r64(0.1), r64(0.2), r64(0.2)],
                fg_thresh: r64(0.5),
                bg_thresh_lo: r64(0.1),
                bg_thresh_hi: r64(0.5),
                fg_fraction: r64(0.25),
                batch_size: NonZeroUsize::new(128).unwrap(),
                ims_per_batch: NonZeroUsize::new(2).unwrap(),
                snapshot_iters: NonZeroUsize::new(10000).unwrap(),
                snapshot_infix: String::new(),
            }
        }
    }

    /// Snapshot loading method.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum Resume {
        /// Start from iteration zero.
        Disabled,
        /// Resume from the most recent snapshot in the output directory.
        FromRecent,
        /// Resume from the snapshot file at specified path.
        FromFile { file: PathBuf },
    }

    impl Default for Resume {
        fn default() -> Self {
            Self::Disabled
        }
    }
}

fn default_momentum() -> R64 {
    r64(0.9)
}

fn default_weight_decay() -> R64 {
    r64(0.0005)
}

fn default_display() -> usize {
    20
}

fn default_device() -> Device {
    Device::Cpu
}

fn default_seed() -> u64 {
    3
}

fn default_probe_interval() -> NonZeroUsize {
    NonZeroUsize::new(100).unwrap()
}
