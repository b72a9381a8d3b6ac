use super::{LrScheduler, Solver, SolverInit};
use crate::{
    common::*,
    config::SolverConfig,
    data::{DataLayerConfig, RoiDataLayer},
    model::Network,
};
use tch_tensor_like::TensorLike;

const ITER_VAR_NAME: &str = "solver_iter";

/// Builds a [SgdSolver] with the network created by `network_fn`.
#[derive(Debug, Clone)]
pub struct SgdSolverInit<F> {
    pub data_config: DataLayerConfig,
    pub network_fn: F,
}

impl<F> SgdSolverInit<F> {
    pub fn new<N>(data_config: DataLayerConfig, network_fn: F) -> Self
    where
        F: FnOnce(&nn::Path) -> N,
        N: Network,
    {
        Self {
            data_config,
            network_fn,
        }
    }
}

impl<F, N> SolverInit for SgdSolverInit<F>
where
    F: FnOnce(&nn::Path) -> N,
    N: Network,
{
    type Solver = SgdSolver<N>;

    fn build(self, config: &SolverConfig) -> Result<Self::Solver> {
        let Self {
            data_config,
            network_fn,
        } = self;
        SgdSolver::new(config, data_config, network_fn)
    }
}

/// Stochastic gradient descent with momentum over a libtorch var store.
pub struct SgdSolver<N>
where
    N: Network,
{
    vs: nn::VarStore,
    optimizer: nn::Optimizer<nn::Sgd>,
    lr_scheduler: LrScheduler,
    network: N,
    data_config: DataLayerConfig,
    data_layer: Option<RoiDataLayer>,
    iter: usize,
    display: usize,
    device: Device,
    seed: u64,
}

impl<N> SgdSolver<N>
where
    N: Network,
{
    pub fn new<F>(config: &SolverConfig, data_config: DataLayerConfig, network_fn: F) -> Result<Self>
    where
        F: FnOnce(&nn::Path) -> N,
    {
        let SolverConfig {
            ref lr_schedule,
            momentum,
            weight_decay,
            display,
            device,
            seed,
            ..
        } = *config;

        info!("use device {:?}", device);
        tch::manual_seed(seed as i64);

        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let network = network_fn(&root);

        let lr_scheduler = LrScheduler::new(lr_schedule, 0)?;
        let optimizer = nn::Sgd {
            momentum: momentum.raw(),
            dampening: 0.0,
            wd: weight_decay.raw(),
            nesterov: false,
        }
        .build(&vs, lr_scheduler.lr())?;

        Ok(Self {
            vs,
            optimizer,
            lr_scheduler,
            network,
            data_config,
            data_layer: None,
            iter: 0,
            display,
            device,
            seed,
        })
    }

    fn variable(&self, name: &str) -> Result<Tensor> {
        self.vs
            .variables()
            .remove(name)
            .ok_or_else(|| format_err!("the parameter '{}' does not exist", name))
    }
}

impl<N> Solver for SgdSolver<N>
where
    N: Network,
{
    const EXTENSION: &'static str = "ot";

    fn step(&mut self, iters: usize) -> Result<()> {
        for _ in 0..iters {
            let batch = self
                .data_layer
                .as_mut()
                .ok_or_else(|| format_err!("the roidb is not set"))?
                .next_minibatch()
                .to_device(self.device);

            let lr = self.lr_scheduler.next();
            self.optimizer.set_lr(lr);

            let loss = self.network.forward_loss(&batch, true)?;
            let loss_value = f64::from(&loss);
            ensure!(
                loss_value.is_finite(),
                "loss diverged to {} at iteration {}",
                loss_value,
                self.iter
            );
            self.optimizer.backward_step(&loss);

            self.iter += 1;

            if self.display > 0 && self.iter % self.display == 0 {
                info!(
                    "iter: {}\tloss: {:.6}\tlr: {:.6}",
                    self.iter, loss_value, lr
                );
            }
        }

        Ok(())
    }

    fn iter(&self) -> usize {
        self.iter
    }

    fn has_param(&self, name: &str) -> bool {
        self.vs.variables().contains_key(name)
    }

    fn read_param(&self, name: &str) -> Result<Tensor> {
        let var = self.variable(name)?;
        Ok(tch::no_grad(|| var.detach().copy()))
    }

    fn write_param(&mut self, name: &str, value: &Tensor) -> Result<()> {
        let mut var = self.variable(name)?;
        ensure!(
            var.size() == value.size(),
            "the parameter '{}' has shape {:?}, but get {:?}",
            name,
            var.size(),
            value.size()
        );
        tch::no_grad(|| var.f_copy_(value))?;
        Ok(())
    }

    /// Writes the variables along with the iteration counter as an int64
    /// scalar named `solver_iter`.
    fn save(&self, path: &Path) -> Result<()> {
        let iter = Tensor::from(self.iter as i64);
        let variables = self.vs.variables();
        let named: Vec<_> = variables
            .iter()
            .map(|(name, var)| (name.as_str(), var))
            .chain([(ITER_VAR_NAME, &iter)])
            .collect();
        Tensor::save_multi(&named, path)?;
        Ok(())
    }

    fn copy_from(&mut self, path: &Path) -> Result<()> {
        ensure!(path.is_file(), "'{}' is not a file", path.display());

        let missing = self.vs.load_partial(path)?;
        if !missing.is_empty() {
            warn!(
                "parameters not found in '{}': {}",
                path.display(),
                missing.iter().join(", ")
            );
        }
        Ok(())
    }

    fn restore(&mut self, path: &Path) -> Result<()> {
        ensure!(path.is_file(), "'{}' is not a file", path.display());

        self.vs.load(path)?;
        let iter = Tensor::load_multi(path)?
            .into_iter()
            .find(|(name, _)| name == ITER_VAR_NAME)
            .map(|(_, iter)| i64::from(&iter))
            .ok_or_else(|| {
                format_err!("'{}' has no iteration counter", path.display())
            })?;
        ensure!(iter >= 0, "invalid iteration counter {}", iter);

        self.iter = iter as usize;
        self.lr_scheduler.set_step(self.iter);
        Ok(())
    }

    fn set_roidb(&mut self, roidb: Arc<Roidb>) -> Result<()> {
        let data_layer = RoiDataLayer::new(roidb, &self.data_config, self.seed)?;
        self.data_layer = Some(data_layer);
        Ok(())
    }
}
