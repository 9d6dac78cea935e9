//! Thin wrapper around tiny-solver for consistent option handling.

use anyhow::{anyhow, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::LevenbergMarquardtOptimizer;

/// Options for the damped least-squares refinement.
///
/// Parameters are iterated as-is, without rescaling or normalization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DampedLsqOptions {
    /// Iteration cap.
    pub max_iters: usize,
    /// Terminate once the absolute residual improvement drops below this.
    pub min_abs_decrease: f64,
    /// tiny-solver verbosity level (0 is silent).
    pub verbosity: usize,
}

impl Default for DampedLsqOptions {
    fn default() -> Self {
        Self {
            max_iters: 10,
            min_abs_decrease: 1e-6,
            verbosity: 0,
        }
    }
}

impl DampedLsqOptions {
    fn to_optimizer_options(self) -> OptimizerOptions {
        let mut opts = OptimizerOptions::default();
        opts.max_iteration = self.max_iters;
        opts.verbosity_level = self.verbosity;
        opts.min_abs_error_decrease_threshold = self.min_abs_decrease;
        opts
    }
}

/// Solve a tiny-solver problem and return the solution together with the
/// summed squared residual at the optimum.
pub(crate) fn solve(
    problem: &Problem,
    initial: HashMap<String, DVector<f64>>,
    opts: &DampedLsqOptions,
) -> Result<(HashMap<String, DVector<f64>>, f64)> {
    let optimizer = LevenbergMarquardtOptimizer::default();
    let options = opts.to_optimizer_options();
    let solution = optimizer
        .optimize(problem, &initial, Some(options))
        .ok_or_else(|| anyhow!("damped least-squares engine failed to converge"))?;

    let blocks = problem.initialize_parameter_blocks(&solution);
    let residuals = problem.compute_residuals(&blocks, true);
    let res = residuals.as_ref().squared_norm_l2();

    Ok((solution, res))
}
