use nalgebra::{DMatrix, DVector};
use quantal_common::Real;
use tracing::trace;

/// Damping above which the solver gives up on finding a downhill step.
const MAX_DAMPING: Real = 1e16;

/// A nonlinear least squares problem `min ‖r(p)‖²`.
pub trait LeastSquaresProblem {
    fn residuals(&self, params: &DVector<Real>) -> DVector<Real>;
    fn jacobian(&self, params: &DVector<Real>) -> DMatrix<Real>;
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The relative decrease of the cost fell below the tolerance.
    CostTolerance,
    /// The step became negligible relative to the parameters.
    StepTolerance,
    /// The gradient of the cost vanished.
    GradientTolerance,
    MaxIterations,
    /// The cost or a step became NaN or infinite.
    NonFinite,
    /// No downhill step exists even at maximum damping.
    Stalled,
    /// There was nothing to fit.
    NoData,
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            Self::CostTolerance | Self::StepTolerance | Self::GradientTolerance
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Minimisation {
    pub params: DVector<Real>,
    /// Sum of squared residuals at `params`.
    pub cost: Real,
    pub iterations: usize,
    pub termination: Termination,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevenbergMarquardt {
    pub ftol: Real,
    pub xtol: Real,
    pub gtol: Real,
    pub max_iterations: usize,
    pub initial_damping: Real,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
            max_iterations: 200,
            initial_damping: 1e-3,
        }
    }
}

impl LevenbergMarquardt {
    /// Minimises the problem from `initial`. Deterministic: the same input
    /// always takes the same path.
    pub fn minimise<P: LeastSquaresProblem>(
        &self,
        problem: &P,
        initial: DVector<Real>,
    ) -> Minimisation {
        let mut params = initial;
        let mut residuals = problem.residuals(&params);
        let mut cost = residuals.norm_squared();
        let mut damping = self.initial_damping;

        let finish = |params, cost, iterations, termination| Minimisation {
            params,
            cost,
            iterations,
            termination,
        };

        if !cost.is_finite() {
            return finish(params, cost, 0, Termination::NonFinite);
        }

        for iteration in 1..=self.max_iterations {
            let jacobian = problem.jacobian(&params);
            let gradient = jacobian.tr_mul(&residuals);
            if gradient.amax() <= self.gtol {
                return finish(params, cost, iteration - 1, Termination::GradientTolerance);
            }
            let normal = jacobian.tr_mul(&jacobian);

            loop {
                let mut damped = normal.clone();
                for i in 0..damped.nrows() {
                    damped[(i, i)] += damping * normal[(i, i)].max(Real::EPSILON);
                }
                let Some(step) = damped.cholesky().map(|c| -c.solve(&gradient)) else {
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        return finish(params, cost, iteration, Termination::Stalled);
                    }
                    continue;
                };
                if step.iter().any(|s| !s.is_finite()) {
                    return finish(params, cost, iteration, Termination::NonFinite);
                }
                let small_step = step.norm() <= self.xtol * (params.norm() + self.xtol);

                let candidate = &params + &step;
                let candidate_residuals = problem.residuals(&candidate);
                let candidate_cost = candidate_residuals.norm_squared();

                if candidate_cost.is_finite() && candidate_cost < cost {
                    let decrease = cost - candidate_cost;
                    params = candidate;
                    residuals = candidate_residuals;
                    let previous = cost;
                    cost = candidate_cost;
                    damping = (damping / 10.0).max(Real::EPSILON);
                    trace!("LM iteration {iteration}: cost {cost}, damping {damping}");
                    if decrease <= self.ftol * previous {
                        return finish(params, cost, iteration, Termination::CostTolerance);
                    }
                    if small_step {
                        return finish(params, cost, iteration, Termination::StepTolerance);
                    }
                    break;
                }
                if small_step {
                    return finish(params, cost, iteration, Termination::StepTolerance);
                }
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    return finish(params, cost, iteration, Termination::Stalled);
                }
            }
        }
        finish(params, cost, self.max_iterations, Termination::MaxIterations)
    }
}
