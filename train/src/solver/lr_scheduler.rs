use crate::{common::*, config::LearningRateSchedule};

#[derive(Debug, Clone)]
pub enum LrScheduler {
    Constant {
        lr: R64,
    },
    Step {
        base_lr: R64,
        gamma: R64,
        step_size: usize,
        step: usize,
    },
    StepWise {
        lr_cache: f64,
        step: usize,
        index: usize,
        steps: Vec<(usize, R64)>,
    },
}

impl LrScheduler {
    pub fn new(config: &LearningRateSchedule, init_step: impl Into<Option<usize>>) -> Result<Self> {
        let init_step = init_step.into();

        let mut scheduler = match *config {
            LearningRateSchedule::Constant { lr } => {
                ensure!(lr > 0.0, "the lr must be positive");
                Self::Constant { lr }
            }
            LearningRateSchedule::Step {
                lr,
                gamma,
                step_size,
            } => {
                ensure!(lr > 0.0, "the lr must be positive");
                ensure!(gamma > 0.0, "the gamma must be positive");
                Self::Step {
                    base_lr: lr,
                    gamma,
                    step_size: step_size.get(),
                    step: 0,
                }
            }
            LearningRateSchedule::StepWise { ref steps } => {
                ensure!(
                    !steps.is_empty() && steps[0].0 == 0,
                    "the steps must start from zero"
                );

                steps.iter().try_fold(None, |prev_step, (curr_step, lr)| {
                    if let Some(prev_step) = prev_step {
                        ensure!(curr_step > prev_step, "the steps must be monotonic");
                    }
                    ensure!(lr.raw() > 0.0, "lr must be positive");
                    Ok(Some(curr_step))
                })?;

                Self::StepWise {
                    lr_cache: steps[0].1.raw(),
                    step: 0,
                    index: 0,
                    steps: steps.clone(),
                }
            }
        };

        if let Some(init_step) = init_step {
            scheduler.set_step(init_step);
        }

        Ok(scheduler)
    }

    pub fn set_step(&mut self, new_step: usize) {
        match self {
            Self::Constant { .. } => (),
            Self::Step { step, .. } => {
                *step = new_step;
            }
            Self::StepWise {
                step,
                index,
                steps,
                lr_cache,
            } => {
                *step = new_step;
                let new_index = match steps
                    .binary_search_by_key(&new_step, |(step_thresh, _lr)| *step_thresh)
                {
                    Ok(new_index) => new_index,
                    Err(new_index) => new_index.saturating_sub(1),
                };
                *index = new_index;
                *lr_cache = steps[new_index].1.raw();
            }
        }
    }

    /// The learning rate of current step.
    pub fn lr(&self) -> f64 {
        match *self {
            Self::Constant { lr } => lr.raw(),
            Self::Step {
                base_lr,
                gamma,
                step_size,
                step,
            } => base_lr.raw() * gamma.raw().powi((step / step_size) as i32),
            Self::StepWise { lr_cache, .. } => lr_cache,
        }
    }

    /// Returns the learning rate of current step and moves to the next step.
    pub fn next(&mut self) -> f64 {
        let lr = self.lr();

        match self {
            Self::Constant { .. } => (),
            Self::Step { step, .. } => {
                *step += 1;
            }
            Self::StepWise {
                step,
                index,
                steps,
                lr_cache,
            } => {
                *step += 1;
                let next_index = *index + 1;
                if next_index < steps.len() && *step == steps[next_index].0 {
                    *index = next_index;
                    *lr_cache = steps[next_index].1.raw();
                }
            }
        }

        lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn step_policy() -> Result<()> {
        let config = LearningRateSchedule::Step {
            lr: r64(0.001),
            gamma: r64(0.1),
            step_size: NonZeroUsize::new(3).unwrap(),
        };
        let mut scheduler = LrScheduler::new(&config, None)?;
        let lrs: Vec<_> = (0..7).map(|_| scheduler.next()).collect();
        let expect = [0.001, 0.001, 0.001, 0.0001, 0.0001, 0.0001, 0.00001];
        izip!(lrs, expect).for_each(|(lr, expect)| assert_abs_diff_eq!(lr, expect));

        let resumed = LrScheduler::new(&config, 4)?;
        assert_abs_diff_eq!(resumed.lr(), 0.0001);
        Ok(())
    }

    #[test]
    fn step_wise_policy() -> Result<()> {
        let config = LearningRateSchedule::StepWise {
            steps: vec![(0, r64(0.01)), (2, r64(0.001))],
        };
        let mut scheduler = LrScheduler::new(&config, None)?;
        assert_abs_diff_eq!(scheduler.next(), 0.01);
        assert_abs_diff_eq!(scheduler.next(), 0.01);
        assert_abs_diff_eq!(scheduler.next(), 0.001);
        assert_abs_diff_eq!(scheduler.next(), 0.001);

        let resumed = LrScheduler::new(&config, 5)?;
        assert_abs_diff_eq!(resumed.lr(), 0.001);
        Ok(())
    }

    #[test]
    fn reject_unordered_steps() {
        let config = LearningRateSchedule::StepWise {
            steps: vec![(0, r64(0.01)), (5, r64(0.001)), (3, r64(0.0001))],
        };
        assert!(LrScheduler::new(&config, None).is_err());
    }
}
