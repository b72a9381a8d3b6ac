#![allow(dead_code)]

use anyhow::{bail, ensure, format_err, Result};
use noisy_float::prelude::*;
use roidb::{BoxCoords, Roidb, RoidbEntry};
use std::{
    collections::HashMap,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
};
use tch::{Device, Kind, Tensor};
use train::{
    config::{
        Config, DatasetConfig, LearningRateSchedule, LoggingConfig, ModelConfig, SolverConfig,
        TrainingConfig,
    },
    solver::{Solver, SolverInit, BBOX_PRED_BIAS, BBOX_PRED_WEIGHT},
};

pub const NUM_CLASSES: usize = 3;
pub const HIDDEN_DIM: i64 = 3;
const ITER_NAME: &str = "iter";

/// An in-memory solver whose step only advances the counter.
#[derive(Debug)]
pub struct FakeSolver {
    pub iter: usize,
    pub num_steps: usize,
    pub params: HashMap<String, Tensor>,
    pub fail_save: bool,
    pub fail_step_at: Option<usize>,
    /// Steps succeed without advancing the counter.
    pub stall: bool,
    pub roidb: Option<Arc<Roidb>>,
}

impl FakeSolver {
    pub fn new() -> Self {
        let num_outputs = 4 * NUM_CLASSES as i64;
        let weight = Tensor::arange(num_outputs * HIDDEN_DIM, (Kind::Float, Device::Cpu))
            .view([num_outputs, HIDDEN_DIM])
            / 10.0;
        let bias = Tensor::arange(num_outputs, (Kind::Float, Device::Cpu)) - 5.0;
        let params = vec![
            (BBOX_PRED_WEIGHT.to_string(), weight),
            (BBOX_PRED_BIAS.to_string(), bias),
        ]
        .into_iter()
        .collect();

        Self {
            iter: 0,
            num_steps: 0,
            params,
            fail_save: false,
            fail_step_at: None,
            stall: false,
            roidb: None,
        }
    }

    pub fn param_values(&self, name: &str) -> Vec<f32> {
        Vec::<f32>::from(&self.params[name].view([-1]))
    }
}

impl Solver for FakeSolver {
    const EXTENSION: &'static str = "ot";

    fn step(&mut self, iters: usize) -> Result<()> {
        for _ in 0..iters {
            if self.fail_step_at == Some(self.iter) {
                bail!("loss diverged");
            }
            if self.stall {
                continue;
            }
            self.iter += 1;
            self.num_steps += 1;
        }
        Ok(())
    }

    fn iter(&self) -> usize {
        self.iter
    }

    fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    fn read_param(&self, name: &str) -> Result<Tensor> {
        self.params
            .get(name)
            .map(|param| param.copy())
            .ok_or_else(|| format_err!("no parameter '{}'", name))
    }

    fn write_param(&mut self, name: &str, value: &Tensor) -> Result<()> {
        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| format_err!("no parameter '{}'", name))?;
        ensure!(param.size() == value.size(), "shape mismatch");
        *param = value.copy();
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        if self.fail_save {
            bail!("disk full");
        }
        let iter = Tensor::from(self.iter as i64);
        let named: Vec<_> = self
            .params
            .iter()
            .map(|(name, param)| (name.as_str(), param))
            .chain([(ITER_NAME, &iter)])
            .collect();
        Tensor::save_multi(&named, path)?;
        Ok(())
    }

    fn copy_from(&mut self, path: &Path) -> Result<()> {
        for (name, value) in Tensor::load_multi(path)? {
            if self.params.contains_key(&name) {
                self.params.insert(name, value);
            }
        }
        Ok(())
    }

    fn restore(&mut self, path: &Path) -> Result<()> {
        for (name, value) in Tensor::load_multi(path)? {
            if name == ITER_NAME {
                self.iter = i64::from(&value) as usize;
            } else {
                self.params.insert(name, value);
            }
        }
        Ok(())
    }

    fn set_roidb(&mut self, roidb: Arc<Roidb>) -> Result<()> {
        self.roidb = Some(roidb);
        Ok(())
    }
}

pub struct FakeInit(pub FakeSolver);

impl SolverInit for FakeInit {
    type Solver = FakeSolver;

    fn build(self, _config: &SolverConfig) -> Result<FakeSolver> {
        Ok(self.0)
    }
}

/// Reads the tensors of a snapshot file by name.
pub fn load_snapshot(path: &Path) -> Result<HashMap<String, Tensor>> {
    Ok(Tensor::load_multi(path)?.into_iter().collect())
}

pub fn config(output_dir: &Path) -> Config {
    Config {
        output_dir: output_dir.to_owned(),
        dataset: DatasetConfig {
            roidb_file: PathBuf::from("roidb.json"),
        },
        model: ModelConfig::Baseline {
            hidden_dim: NonZeroUsize::new(8).unwrap(),
        },
        solver: SolverConfig {
            lr_schedule: LearningRateSchedule::Constant { lr: r64(0.001) },
            momentum: r64(0.9),
            weight_decay: r64(0.0005),
            display: 20,
            snapshot_prefix: "fast_rcnn".into(),
            device: Device::Cpu,
            seed: 3,
        },
        training: TrainingConfig {
            use_flipped: false,
            snapshot_iters: NonZeroUsize::new(1000).unwrap(),
            batch_size: NonZeroUsize::new(8).unwrap(),
            ims_per_batch: NonZeroUsize::new(2).unwrap(),
            ..Default::default()
        },
        logging: LoggingConfig::default(),
    }
}

/// Two images, each with a ground truth box, a foreground region and
/// background regions.
pub fn roidb() -> Roidb {
    let classes = ["__background__", "car", "person"]
        .iter()
        .map(|name| name.to_string())
        .collect();
    let entries = vec![
        RoidbEntry {
            image: "000001.jpg".into(),
            width: 128,
            height: 96,
            boxes: vec![
                BoxCoords::new(10.0, 10.0, 59.0, 59.0),
                BoxCoords::new(14.0, 12.0, 66.0, 58.0),
                BoxCoords::new(40.0, 40.0, 90.0, 90.0),
                BoxCoords::new(100.0, 0.0, 127.0, 30.0),
            ],
            max_overlaps: vec![1.0, 0.75, 0.2, 0.0],
            max_classes: vec![1, 1, 0, 0],
            flipped: false,
            bbox_targets: vec![],
        },
        RoidbEntry {
            image: "000002.jpg".into(),
            width: 128,
            height: 96,
            boxes: vec![
                BoxCoords::new(30.0, 20.0, 69.0, 89.0),
                BoxCoords::new(26.0, 24.0, 67.0, 80.0),
                BoxCoords::new(0.0, 0.0, 40.0, 40.0),
                BoxCoords::new(60.0, 50.0, 120.0, 95.0),
            ],
            max_overlaps: vec![1.0, 0.7, 0.15, 0.3],
            max_classes: vec![2, 2, 0, 0],
            flipped: false,
            bbox_targets: vec![],
        },
    ];
    Roidb::new(classes, entries)
}
