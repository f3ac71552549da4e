//! Global configuration constants and runtime options for the kinetree engine.

use serde::{Deserialize, Serialize};

/// Smallest value treated as nonzero by divisions in the solver.
pub const MIN_VAL: f64 = 1e-15;

/// Default gravity vector applied in the simulation (Z-up).
pub const DEFAULT_GRAVITY: [f64; 3] = [0.0, 0.0, -9.81];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f64 = 0.002;

/// Default constraint impedance in `(0, 1)`; larger values make constraints stiffer.
pub const DEFAULT_IMPEDANCE: f64 = 0.9;

/// Default constraint time constant (in seconds).
pub const DEFAULT_TIME_CONST: f64 = 0.02;

/// Default constraint damping ratio.
pub const DEFAULT_DAMP_RATIO: f64 = 1.0;

/// Minimum number of islands before per-island work is dispatched to rayon.
pub const DEFAULT_MIN_PARALLEL_ISLANDS: usize = 2;

/// Runtime options consumed by the dynamics pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub timestep: f64,
    pub gravity: [f64; 3],
    /// Constraint impedance; the regularizer is `R = (1 - imp) / imp * A_ii`.
    pub impedance: f64,
    pub time_const: f64,
    pub damp_ratio: f64,
    /// Floor applied to mass-matrix pivots. `None` lets degenerate pivots through.
    pub min_diag: Option<f64>,
    /// Solve constraints per island instead of as one global system.
    pub islands: bool,
    /// Dispatch island work items to rayon when the `parallel` feature is enabled.
    pub parallel: bool,
    pub min_parallel_islands: usize,
    /// Disable the constraint stage entirely.
    pub disable_constraints: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timestep: DEFAULT_TIME_STEP,
            gravity: DEFAULT_GRAVITY,
            impedance: DEFAULT_IMPEDANCE,
            time_const: DEFAULT_TIME_CONST,
            damp_ratio: DEFAULT_DAMP_RATIO,
            min_diag: None,
            islands: true,
            parallel: false,
            min_parallel_islands: DEFAULT_MIN_PARALLEL_ISLANDS,
            disable_constraints: false,
        }
    }
}

impl Options {
    /// Reference-acceleration stiffness `k` and damping `b` for soft constraints.
    pub fn reference_gains(&self) -> (f64, f64) {
        let tc = self.time_const.max(2.0 * self.timestep).max(MIN_VAL);
        let dr = self.damp_ratio.max(MIN_VAL);
        let k = 1.0 / (tc * tc * dr * dr);
        let b = 2.0 / tc;
        (k, b)
    }

    /// Ratio turning a diagonal `A_ii` into the regularizer `R_i`.
    pub fn regularizer_ratio(&self) -> f64 {
        let imp = self.impedance.clamp(1e-4, 0.9999);
        (1.0 - imp) / imp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_gains_respect_timestep_floor() {
        let options = Options {
            time_const: 0.0,
            timestep: 0.01,
            ..Options::default()
        };
        let (k, b) = options.reference_gains();
        assert!((b - 100.0).abs() < 1e-9);
        assert!((k - 2500.0).abs() < 1e-6);
    }

    #[test]
    fn regularizer_ratio_for_default_impedance() {
        let ratio = Options::default().regularizer_ratio();
        assert!((ratio - 1.0 / 9.0).abs() < 1e-12);
    }
}
