use std::time::{Duration, Instant};

/// Per-stage timings of the last step, attached to `Data`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StageProfiler {
    pub position_time: Duration,
    pub inertia_time: Duration,
    pub bias_time: Duration,
    pub constraint_time: Duration,
    pub island_time: Duration,
    pub solve_time: Duration,
    pub integrate_time: Duration,
    pub total_time: Duration,

    pub dof_count: usize,
    pub constraint_rows: usize,
    pub island_count: usize,
}

impl StageProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn report(&self) {
        let total_us = self.total_time.as_micros() as f64;
        if total_us < 1.0 {
            return;
        }

        log::info!(
            "dofs: {}, constraint rows: {}, islands: {}, total {:.3} ms",
            self.dof_count,
            self.constraint_rows,
            self.island_count,
            self.total_time.as_secs_f64() * 1000.0
        );
        for (label, time) in [
            ("position", self.position_time),
            ("inertia", self.inertia_time),
            ("bias", self.bias_time),
            ("constraint", self.constraint_time),
            ("island", self.island_time),
            ("solve", self.solve_time),
            ("integrate", self.integrate_time),
        ] {
            log::info!(
                "  {label:<10} {:.3} ms ({:.1}%)",
                time.as_secs_f64() * 1000.0,
                time.as_micros() as f64 / total_us * 100.0
            );
        }
    }
}

pub struct ScopedTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
