use crate::common::*;

/// Accumulates the duration of timed sections.
#[derive(Debug, Clone)]
pub struct StepTimer {
    instant: Option<Instant>,
    total: Duration,
    calls: u32,
}

impl StepTimer {
    pub fn new() -> Self {
        Self {
            instant: None,
            total: Duration::ZERO,
            calls: 0,
        }
    }

    pub fn tic(&mut self) {
        self.instant = Some(Instant::now());
    }

    /// Ends the section started by [StepTimer::tic] and returns its duration.
    pub fn toc(&mut self) -> Duration {
        let elapsed = self
            .instant
            .take()
            .map(|instant| instant.elapsed())
            .unwrap_or(Duration::ZERO);
        self.total += elapsed;
        self.calls += 1;
        elapsed
    }

    pub fn average_time(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total / self.calls
        }
    }
}

impl Default for StepTimer {
    fn default() -> Self {
        Self::new()
    }
}
