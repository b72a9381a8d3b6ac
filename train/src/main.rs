use anyhow::{Context, Result};
use roidb::Roidb;
use std::{env, path::PathBuf};
use structopt::StructOpt;
use tch::nn;
use tracing::{info, info_span};
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};
use train::{
    config::{Config, ModelConfig},
    data::DataLayerConfig,
    model::BaselineHead,
    solver::{SgdSolver, SgdSolverInit},
    train::{ParamProbe, StepObserver},
};

#[derive(Debug, Clone, StructOpt)]
/// Train a Fast R-CNN network
struct Args {
    #[structopt(long, default_value = "train.json5")]
    /// configuration file
    pub config_file: PathBuf,
    #[structopt(long)]
    /// override the number of iterations in the configuration
    pub max_iters: Option<usize>,
}

pub fn main() -> Result<()> {
    // setup tracing
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        let filter = if let Err(_) = env::var("RUST_LOG") {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        };
        filter
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    // parse arguments
    let Args {
        config_file,
        max_iters,
    } = Args::from_args();
    let mut config = Config::open(&config_file)
        .with_context(|| format!("failed to load config file '{}'", config_file.display()))?;
    if let Some(max_iters) = max_iters {
        config.training.max_iters = max_iters;
    }

    // load roidb
    let roidb_file = &config.dataset.roidb_file;
    let roidb = Roidb::open(roidb_file)
        .with_context(|| format!("failed to load roidb file '{}'", roidb_file.display()))?;
    let roidb = train::get_training_roidb(roidb, &config.training);
    info!("{} roidb entries", roidb.len());

    // build solver
    let num_classes = roidb.num_classes();
    let hidden_dim = match config.model {
        ModelConfig::Baseline { hidden_dim } => hidden_dim.get(),
    };
    let solver_init = SgdSolverInit::new(
        DataLayerConfig::from(&config.training),
        move |path: &nn::Path| BaselineHead::new(path, num_classes, hidden_dim),
    );

    let mut observers: Vec<Box<dyn StepObserver<SgdSolver<BaselineHead>>>> = vec![];
    if !config.logging.probe_params.is_empty() {
        observers.push(Box::new(ParamProbe::new(
            config.logging.probe_params.clone(),
            config.logging.probe_interval,
        )));
    }

    // start training program
    let paths = info_span!("train_net")
        .in_scope(|| train::train_net(solver_init, &config, roidb, observers))?;

    for path in &paths {
        println!("{}", path.display());
    }

    Ok(())
}
