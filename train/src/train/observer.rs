use crate::{common::*, solver::Solver};

/// A hook invoked by the training loop after every solver step.
pub trait StepObserver<S>
where
    S: Solver,
{
    fn after_step(&mut self, solver: &S, elapsed: Duration) -> Result<()>;
}

/// Logs statistics of named parameters periodically.
#[derive(Debug, Clone)]
pub struct ParamProbe {
    names: Vec<String>,
    interval: usize,
}

impl ParamProbe {
    pub fn new(names: Vec<String>, interval: NonZeroUsize) -> Self {
        Self {
            names,
            interval: interval.get(),
        }
    }
}

impl<S> StepObserver<S> for ParamProbe
where
    S: Solver,
{
    fn after_step(&mut self, solver: &S, elapsed: Duration) -> Result<()> {
        let iter = solver.iter();
        if iter % self.interval != 0 {
            return Ok(());
        }

        for name in &self.names {
            if !solver.has_param(name) {
                warn!("cannot probe the missing parameter '{}'", name);
                continue;
            }

            let param = solver.read_param(name)?;
            let mean = f64::from(&param.mean(Kind::Double));
            let abs_max = f64::from(&param.abs().max());
            debug!(
                "iter: {}\t{}: mean {:.6e}, abs max {:.6e}, step took {:?}",
                iter, name, mean, abs_max, elapsed
            );
        }

        Ok(())
    }
}
