use argmin::core::{
    CostFunction, Error, Executor, Gradient, State, TerminationReason, TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use ndarray::Array1;
use std::fmt;
use std::time::Instant;
use thiserror::Error as ThisError;
use tracing::info;

use crate::aggregate::BucketedSeries;

const PARAM_COUNT: usize = 3;
const LBFGS_MEM: usize = 7;
const MAX_ITERS: u64 = 300;
const TOL_GRAD: f64 = 1e-6;
const TOL_COST: f64 = 1e-9;

/// Default rate guess; capacity and midpoint guesses come from the data.
const RATE_GUESS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum GrowthModelKind {
    /// L / (1 + exp(-k (x - x0)))
    Logistic,
    /// a exp(-exp(-b (x - c)))
    Gompertz,
}

impl fmt::Display for GrowthModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrowthModelKind::Logistic => write!(f, "logistic"),
            GrowthModelKind::Gompertz => write!(f, "gompertz"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrowthParams {
    Logistic {
        capacity: f64,
        rate: f64,
        midpoint: f64,
    },
    Gompertz {
        asymptote: f64,
        rate: f64,
        displacement: f64,
    },
}

impl GrowthParams {
    fn from_theta(kind: GrowthModelKind, theta: &Array1<f64>) -> Self {
        match kind {
            GrowthModelKind::Logistic => GrowthParams::Logistic {
                capacity: theta[0],
                rate: theta[1],
                midpoint: theta[2],
            },
            GrowthModelKind::Gompertz => GrowthParams::Gompertz {
                asymptote: theta[0],
                rate: theta[1],
                displacement: theta[2],
            },
        }
    }

    fn is_finite(&self) -> bool {
        match *self {
            GrowthParams::Logistic {
                capacity,
                rate,
                midpoint,
            } => capacity.is_finite() && rate.is_finite() && midpoint.is_finite(),
            GrowthParams::Gompertz {
                asymptote,
                rate,
                displacement,
            } => asymptote.is_finite() && rate.is_finite() && displacement.is_finite(),
        }
    }
}

impl fmt::Display for GrowthParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrowthParams::Logistic {
                capacity,
                rate,
                midpoint,
            } => write!(f, "L={:.3} k={:.4} x0={:.3}", capacity, rate, midpoint),
            GrowthParams::Gompertz {
                asymptote,
                rate,
                displacement,
            } => write!(f, "a={:.3} b={:.4} c={:.3}", asymptote, rate, displacement),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum FitError {
    /// Recoverable per series: callers skip the series and continue.
    #[error("fit did not converge: {reason}")]
    DidNotConverge { reason: String },
    #[error("invalid fit input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub kind: GrowthModelKind,
    pub params: GrowthParams,
    /// Sum of squared residuals at the optimum.
    pub sse: f64,
    pub rmse: f64,
    pub r_squared: f64,
    pub iterations: u64,
}

fn logistic(x: f64, capacity: f64, rate: f64, midpoint: f64) -> f64 {
    capacity / (1.0 + (-rate * (x - midpoint)).exp())
}

fn gompertz(x: f64, asymptote: f64, rate: f64, displacement: f64) -> f64 {
    asymptote * (-(-rate * (x - displacement)).exp()).exp()
}

fn evaluate(kind: GrowthModelKind, theta: &Array1<f64>, x: f64) -> f64 {
    match kind {
        GrowthModelKind::Logistic => logistic(x, theta[0], theta[1], theta[2]),
        GrowthModelKind::Gompertz => gompertz(x, theta[0], theta[1], theta[2]),
    }
}

// Partial derivatives of the model value with respect to each parameter.
fn model_gradient(kind: GrowthModelKind, theta: &Array1<f64>, x: f64) -> [f64; PARAM_COUNT] {
    match kind {
        GrowthModelKind::Logistic => {
            let (capacity, rate, midpoint) = (theta[0], theta[1], theta[2]);
            let s = 1.0 / (1.0 + (-rate * (x - midpoint)).exp());
            let bell = s * (1.0 - s);
            [
                s,
                capacity * bell * (x - midpoint),
                -capacity * bell * rate,
            ]
        }
        GrowthModelKind::Gompertz => {
            let (asymptote, rate, displacement) = (theta[0], theta[1], theta[2]);
            let t = -rate * (x - displacement);
            let outer = (-t.exp()).exp();
            // u e^{-u} for u = e^t, written as e^{t - e^t} so it stays finite
            let damped = (t - t.exp()).exp();
            [
                outer,
                asymptote * damped * (x - displacement),
                -asymptote * damped * rate,
            ]
        }
    }
}

struct SsrProblem {
    kind: GrowthModelKind,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl CostFunction for SsrProblem {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        let sse: f64 = self
            .xs
            .iter()
            .zip(&self.ys)
            .map(|(&x, &y)| {
                let residual = evaluate(self.kind, theta, x) - y;
                residual * residual
            })
            .sum();
        if !sse.is_finite() {
            return Err(Error::msg("non-finite residual sum"));
        }
        Ok(sse)
    }
}

impl Gradient for SsrProblem {
    type Param = Array1<f64>;
    type Gradient = Array1<f64>;

    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        let mut grad = [0.0; PARAM_COUNT];
        for (&x, &y) in self.xs.iter().zip(&self.ys) {
            let residual = evaluate(self.kind, theta, x) - y;
            let partials = model_gradient(self.kind, theta, x);
            for (g, p) in grad.iter_mut().zip(partials) {
                *g += 2.0 * residual * p;
            }
        }
        if grad.iter().any(|g| !g.is_finite()) {
            return Err(Error::msg("non-finite gradient"));
        }
        Ok(Array1::from_vec(grad.to_vec()))
    }
}

/// Initial parameter guesses: capacity/asymptote from the largest observed
/// cumulative count, rate 0.1, midpoint/displacement at the median x.
pub fn initial_guess(xs: &[f64], ys: &[f64]) -> [f64; PARAM_COUNT] {
    let capacity = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    [capacity, RATE_GUESS, median(xs)]
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Fit a growth model to a bucketed series, using the bucket index as the x
/// variable and the cumulative count as y.
pub fn fit(series: &BucketedSeries, kind: GrowthModelKind) -> Result<FitOutcome, FitError> {
    let xs: Vec<f64> = (0..series.len()).map(|i| i as f64).collect();
    let ys: Vec<f64> = series.points.iter().map(|p| p.cumulative as f64).collect();
    fit_points(&xs, &ys, kind)
}

/// Nonlinear least-squares fit of `kind` over explicit (x, y) observations.
pub fn fit_points(xs: &[f64], ys: &[f64], kind: GrowthModelKind) -> Result<FitOutcome, FitError> {
    if xs.len() != ys.len() {
        return Err(FitError::InvalidInput(format!(
            "{} x values against {} y values",
            xs.len(),
            ys.len()
        )));
    }
    if xs.len() < PARAM_COUNT {
        // Under-determined for a 3-parameter model
        return Err(FitError::DidNotConverge {
            reason: format!(
                "{} observations are under-determined for a {}-parameter model",
                xs.len(),
                PARAM_COUNT
            ),
        });
    }

    let start_time = Instant::now();

    // Solve on y / y_max so every parameter is O(1) for the line search;
    // the capacity/asymptote is scaled back afterwards. The initial-guess
    // policy is unchanged by this: the capacity guess (max observed count)
    // becomes 1.0, and the rate and midpoint guesses do not involve y.
    let scale = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max).abs();
    let scale = if scale > 0.0 && scale.is_finite() { scale } else { 1.0 };
    let ys_scaled: Vec<f64> = ys.iter().map(|y| y / scale).collect();

    let theta0 = Array1::from_vec(initial_guess(xs, &ys_scaled).to_vec());
    let problem = SsrProblem {
        kind,
        xs: xs.to_vec(),
        ys: ys_scaled,
    };

    let linesearch = MoreThuenteLineSearch::new();
    let solver = LBFGS::new(linesearch, LBFGS_MEM)
        .with_tolerance_grad(TOL_GRAD)
        .and_then(|s| s.with_tolerance_cost(TOL_COST))
        .map_err(|e| FitError::DidNotConverge {
            reason: format!("solver configuration rejected: {}", e),
        })?;

    let result = Executor::new(problem, solver)
        .configure(|state| state.param(theta0).max_iters(MAX_ITERS))
        .run()
        .map_err(|e| FitError::DidNotConverge {
            reason: e.to_string(),
        })?;

    let state = result.state();
    let converged = matches!(
        state.get_termination_status(),
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );
    if !converged {
        return Err(FitError::DidNotConverge {
            reason: format!(
                "solver stopped without converging: {:?}",
                state.get_termination_status()
            ),
        });
    }

    let theta = state
        .get_best_param()
        .ok_or_else(|| FitError::DidNotConverge {
            reason: "solver produced no parameters".to_string(),
        })?;
    let mut theta = theta.clone();
    theta[0] *= scale;
    let params = GrowthParams::from_theta(kind, &theta);
    if !params.is_finite() {
        return Err(FitError::DidNotConverge {
            reason: "optimum has non-finite parameters".to_string(),
        });
    }

    let sse = state.get_best_cost() * scale * scale;
    let n = xs.len() as f64;
    let mean = ys.iter().sum::<f64>() / n;
    let sst: f64 = ys.iter().map(|y| (y - mean) * (y - mean)).sum();
    let r_squared = if sst > 0.0 { 1.0 - sse / sst } else { f64::NAN };

    let outcome = FitOutcome {
        kind,
        params,
        sse,
        rmse: (sse / n).sqrt(),
        r_squared,
        iterations: state.get_iter(),
    };

    info!(
        action = "complete",
        component = "curve_fit",
        model = %kind,
        iterations = outcome.iterations,
        sse = outcome.sse,
        r_squared = outcome.r_squared,
        duration_ms = start_time.elapsed().as_millis(),
        "Curve fit completed"
    );

    Ok(outcome)
}

/// Evaluate a fitted model at arbitrary x values, including out-of-range
/// ones; extrapolation distance is up to the caller.
pub fn predict(params: &GrowthParams, xs: &[f64]) -> Vec<f64> {
    xs.iter()
        .map(|&x| match *params {
            GrowthParams::Logistic {
                capacity,
                rate,
                midpoint,
            } => logistic(x, capacity, rate, midpoint),
            GrowthParams::Gompertz {
                asymptote,
                rate,
                displacement,
            } => gompertz(x, asymptote, rate, displacement),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logistic_samples(capacity: f64, rate: f64, midpoint: f64, n: usize) -> (Vec<f64>, Vec<f64>) {
        let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| logistic(x, capacity, rate, midpoint)).collect();
        (xs, ys)
    }

    #[test]
    fn initial_guess_follows_policy() {
        let xs = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = vec![3.0, 9.0, 40.0, 80.0, 95.0];
        let [capacity, rate, midpoint] = initial_guess(&xs, &ys);
        assert_eq!(capacity, 95.0);
        assert_eq!(rate, 0.1);
        assert_eq!(midpoint, 2.0);
    }

    #[test]
    fn recovers_logistic_parameters_from_noise_free_data() {
        // 21 noise-free points spanning the inflection at x0 = 10
        let (xs, ys) = logistic_samples(1000.0, 0.3, 10.0, 21);
        let outcome = fit_points(&xs, &ys, GrowthModelKind::Logistic).unwrap();

        let GrowthParams::Logistic {
            capacity,
            rate,
            midpoint,
        } = outcome.params
        else {
            panic!("expected logistic parameters");
        };
        assert!((capacity - 1000.0).abs() / 1000.0 < 0.05, "L = {}", capacity);
        assert!((rate - 0.3).abs() / 0.3 < 0.05, "k = {}", rate);
        assert!((midpoint - 10.0).abs() / 10.0 < 0.05, "x0 = {}", midpoint);
        assert!(outcome.r_squared > 0.999);
    }

    #[test]
    fn recovers_gompertz_parameters_from_noise_free_data() {
        let xs: Vec<f64> = (0..25).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| gompertz(x, 800.0, 0.25, 12.0)).collect();
        let outcome = fit_points(&xs, &ys, GrowthModelKind::Gompertz).unwrap();

        let GrowthParams::Gompertz {
            asymptote,
            rate,
            displacement,
        } = outcome.params
        else {
            panic!("expected gompertz parameters");
        };
        assert!((asymptote - 800.0).abs() / 800.0 < 0.05, "a = {}", asymptote);
        assert!((rate - 0.25).abs() / 0.25 < 0.05, "b = {}", rate);
        assert!((displacement - 12.0).abs() / 12.0 < 0.05, "c = {}", displacement);
    }

    #[test]
    fn two_points_fail_with_did_not_converge() {
        let outcome = fit_points(&[0.0, 1.0], &[5.0, 9.0], GrowthModelKind::Logistic);
        assert!(matches!(outcome, Err(FitError::DidNotConverge { .. })));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let outcome = fit_points(&[0.0, 1.0, 2.0], &[5.0, 9.0], GrowthModelKind::Logistic);
        assert!(matches!(outcome, Err(FitError::InvalidInput(_))));
    }

    #[test]
    fn predict_extrapolates_toward_capacity() {
        let params = GrowthParams::Logistic {
            capacity: 1000.0,
            rate: 0.3,
            midpoint: 10.0,
        };
        let far_future = predict(&params, &[60.0]);
        assert!((far_future[0] - 1000.0).abs() < 1.0);

        let at_midpoint = predict(&params, &[10.0]);
        assert!((at_midpoint[0] - 500.0).abs() < 1e-9);
    }

    #[test]
    fn gompertz_gradient_is_finite_far_from_the_optimum() {
        let theta = Array1::from_vec(vec![1000.0, 5.0, 50.0]);
        // x far below the displacement drives exp(-b (x - c)) to overflow
        let partials = model_gradient(GrowthModelKind::Gompertz, &theta, 0.0);
        assert!(partials.iter().all(|p| p.is_finite()));
    }
}
