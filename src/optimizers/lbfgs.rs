use std::collections::VecDeque;

use argmin::core::observers::ObserverMode;
use argmin::core::{
    ArgminError, CostFunction, Error, Executor, Gradient, IterState, Problem, Solver, State,
    TerminationReason, TerminationStatus, KV,
};
use argmin::kv;
use argmin_math::{ArgminDot, ArgminL2Norm, ArgminMul, ArgminScaledAdd, ArgminSub};
use argmin_observer_slog::SlogLogger;

use crate::errors::{CrfError, Result};
use crate::optimizers::SurpriseConvergence;

const ARMIJO_C1: f64 = 1e-4;
const STEP_FACTOR: f64 = 0.5;
const MAX_LINE_SEARCH_TRIALS: usize = 30;
const CONVERGENCE_WINDOW: usize = 10;
const MIN_VALUES: usize = 5;

type LbfgsState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

/// Limited-memory BFGS with a backtracking Armijo line search.
#[derive(Clone, Debug)]
pub struct Lbfgs {
    memory: usize,
    tolerance: f64,
    s: VecDeque<Vec<f64>>,
    y: VecDeque<Vec<f64>>,
    rho: VecDeque<f64>,
    values: Vec<f64>,
    converged: bool,

    // allocations fail once this many pairs are held
    #[cfg(test)]
    pair_budget: Option<usize>,
}

impl Lbfgs {
    /// Creates a solver keeping the last `memory` correction pairs.
    pub fn new(memory: usize, tolerance: f64) -> Result<Self> {
        if memory == 0 {
            return Err(CrfError::invalid_argument("memory", "must not be 0"));
        }
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(CrfError::invalid_argument(
                "tolerance",
                "must be a positive finite number",
            ));
        }
        Ok(Self {
            memory,
            tolerance,
            s: VecDeque::new(),
            y: VecDeque::new(),
            rho: VecDeque::new(),
            values: vec![],
            converged: false,
            #[cfg(test)]
            pair_budget: None,
        })
    }

    /// Current number of correction pairs kept.
    #[inline(always)]
    pub fn memory(&self) -> usize {
        self.memory
    }

    fn clear(&mut self) {
        self.s.clear();
        self.y.clear();
        self.rho.clear();
    }

    fn drop_oldest(&mut self) {
        self.s.pop_front();
        self.y.pop_front();
        self.rho.pop_front();
    }

    // two-loop recursion
    fn direction(&self, g: &[f64]) -> Vec<f64> {
        let mut q = g.to_vec();
        let mut alpha = vec![0.0; self.s.len()];
        for i in (0..self.s.len()).rev() {
            let sq: f64 = self.s[i].dot(&q);
            alpha[i] = self.rho[i] * sq;
            q = q.scaled_add(&-alpha[i], &self.y[i]);
        }
        if let (Some(s), Some(y)) = (self.s.back(), self.y.back()) {
            let sy: f64 = s.dot(y);
            let yy: f64 = y.dot(y);
            q = q.mul(&(sy / yy));
        }
        for i in 0..self.s.len() {
            let yq: f64 = self.y[i].dot(&q);
            let beta = self.rho[i] * yq;
            q = q.scaled_add(&(alpha[i] - beta), &self.s[i]);
        }
        q.mul(&(-1.0f64))
    }

    fn allocate_pair(&self, n: usize) -> Option<(Vec<f64>, Vec<f64>)> {
        #[cfg(test)]
        if self.pair_budget.is_some_and(|budget| self.s.len() >= budget) {
            return None;
        }
        let mut s = Vec::new();
        let mut y = Vec::new();
        s.try_reserve_exact(n).ok()?;
        y.try_reserve_exact(n).ok()?;
        Some((s, y))
    }

    /// Allocates a buffer for a new pair, halving the memory while the
    /// allocation fails.
    fn reserve_pair(&mut self, n: usize) -> Result<(Vec<f64>, Vec<f64>), Error> {
        loop {
            if let Some(pair) = self.allocate_pair(n) {
                return Ok(pair);
            }
            if self.memory == 1 {
                return Err(ArgminError::PotentialBug {
                    text: "cannot allocate L-BFGS memory".to_string(),
                }
                .into());
            }
            self.memory /= 2;
            while self.s.len() >= self.memory {
                self.drop_oldest();
            }
        }
    }

    fn push_pair(&mut self, s: &[f64], y: &[f64]) -> Result<(), Error> {
        let sy: f64 = s.iter().zip(y).map(|(a, b)| a * b).sum();
        if sy <= 0.0 {
            return Ok(());
        }
        let (mut s_buf, mut y_buf) = self.reserve_pair(s.len())?;
        s_buf.extend_from_slice(s);
        y_buf.extend_from_slice(y);
        while self.s.len() >= self.memory {
            self.drop_oldest();
        }
        self.s.push_back(s_buf);
        self.y.push_back(y_buf);
        self.rho.push_back(1.0 / sy);
        Ok(())
    }

    fn check_convergence(&mut self) {
        let len = self.values.len();
        let Some(&newest) = self.values.last() else {
            return;
        };
        let prev = if len >= CONVERGENCE_WINDOW {
            self.values[len - CONVERGENCE_WINDOW]
        } else {
            self.values[0]
        };
        let average = (prev - newest) / len.min(CONVERGENCE_WINDOW) as f64;
        if len > MIN_VALUES && (average / newest).abs() < self.tolerance {
            self.converged = true;
        }
    }
}

fn surprise(err: &Error) -> Option<String> {
    err.downcast_ref::<SurpriseConvergence>()
        .map(|e| e.0.clone())
}

impl<O> Solver<O, LbfgsState> for Lbfgs
where
    O: CostFunction<Param = Vec<f64>, Output = f64>
        + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
    const NAME: &'static str = "L-BFGS";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        mut state: LbfgsState,
    ) -> Result<(LbfgsState, Option<KV>), Error> {
        let x = state.take_param().ok_or_else(|| ArgminError::NotInitialized {
            text: "initial parameters are required".to_string(),
        })?;
        let f = problem.cost(&x)?;
        let g = problem.gradient(&x)?;
        self.values = vec![f];
        let norm: f64 = g.l2_norm();
        if norm == 0.0 {
            self.converged = true;
        }
        Ok((state.param(x).cost(f).gradient(g), None))
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        mut state: LbfgsState,
    ) -> Result<(LbfgsState, Option<KV>), Error> {
        let x = state.take_param().ok_or_else(|| ArgminError::NotInitialized {
            text: "parameters are missing".to_string(),
        })?;
        let g = state.take_gradient().ok_or_else(|| ArgminError::NotInitialized {
            text: "gradient is missing".to_string(),
        })?;
        let f = state.get_cost();

        let mut d = self.direction(&g);
        let mut gd: f64 = g.dot(&d);
        if !gd.is_finite() || gd >= 0.0 {
            self.clear();
            d = g.mul(&(-1.0f64));
            gd = g.dot(&d);
        }
        let norm: f64 = g.l2_norm();
        let mut step = if self.s.is_empty() {
            1.0 / norm
        } else {
            1.0
        };

        let mut accepted = None;
        for _ in 0..MAX_LINE_SEARCH_TRIALS {
            let candidate = x.scaled_add(&step, &d);
            match problem.cost(&candidate) {
                Ok(value) if value.is_finite() && value <= f + ARMIJO_C1 * step * gd => {
                    accepted = Some((candidate, value));
                    break;
                }
                Ok(_) => step *= STEP_FACTOR,
                Err(e) => {
                    let msg = surprise(&e).ok_or(e)?;
                    let state = state.param(x).gradient(g);
                    return Ok((state.terminate_with(TerminationReason::SolverExit(msg)), None));
                }
            }
        }
        let Some((x_new, f_new)) = accepted else {
            if self.s.is_empty() {
                let state = state.param(x).gradient(g);
                return Ok((
                    state.terminate_with(TerminationReason::SolverExit(
                        "line search failed".to_string(),
                    )),
                    None,
                ));
            }
            // retry from steepest descent
            self.clear();
            return Ok((state.param(x).gradient(g), None));
        };

        let g_new = match problem.gradient(&x_new) {
            Ok(g_new) => g_new,
            Err(e) => {
                let msg = surprise(&e).ok_or(e)?;
                let state = state.param(x_new).cost(f_new).gradient(g);
                return Ok((state.terminate_with(TerminationReason::SolverExit(msg)), None));
            }
        };
        self.push_pair(&x_new.sub(&x), &g_new.sub(&g))?;
        self.values.push(f_new);
        self.check_convergence();
        let norm: f64 = g_new.l2_norm();
        if norm == 0.0 {
            self.converged = true;
        }

        let kv = kv!(
            "step" => step;
            "memory" => self.s.len() as u64;
        );
        Ok((state.param(x_new).cost(f_new).gradient(g_new), Some(kv)))
    }

    fn terminate(&mut self, _state: &LbfgsState) -> TerminationStatus {
        if self.converged {
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        } else {
            TerminationStatus::NotTerminated
        }
    }
}

/// Result of [`optimize`].
#[derive(Clone, Debug)]
pub struct Optimized {
    /// Best parameters found.
    pub weights: Vec<f64>,

    /// `true` if the convergence criterion was met.
    pub converged: bool,

    /// Number of iterations run.
    pub iterations: u64,
}

/// Minimizes `problem` with L-BFGS starting from `init`.
pub fn optimize<O>(
    problem: O,
    init: Vec<f64>,
    memory: usize,
    tolerance: f64,
    max_iter: Option<u64>,
    verbose: bool,
) -> Result<Optimized>
where
    O: CostFunction<Param = Vec<f64>, Output = f64>
        + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
    let solver = Lbfgs::new(memory, tolerance)?;
    let fallback = init.clone();
    let mut executor = Executor::new(problem, solver).configure(|state| {
        let state = state.param(init);
        match max_iter {
            Some(n) => state.max_iters(n),
            None => state,
        }
    });
    if verbose {
        executor = executor.add_observer(SlogLogger::term(), ObserverMode::Always);
    }
    let mut res = executor
        .run()
        .map_err(|e| CrfError::optimization(e.to_string()))?;
    let converged = matches!(
        res.state.get_termination_reason(),
        Some(TerminationReason::SolverConverged)
    );
    let iterations = res.state.get_iter();
    let weights = res
        .state
        .take_best_param()
        .or_else(|| res.state.take_param())
        .unwrap_or(fallback);
    Ok(Optimized {
        weights,
        converged,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic {
        targets: Vec<f64>,
        limit: Option<f64>,
    }

    impl CostFunction for Quadratic {
        type Param = Vec<f64>;
        type Output = f64;

        fn cost(&self, param: &Self::Param) -> Result<f64, Error> {
            if let Some(limit) = self.limit {
                if param[0] > limit {
                    return Err(SurpriseConvergence("out of range".to_string()).into());
                }
            }
            Ok(1.0
                + param
                    .iter()
                    .zip(&self.targets)
                    .enumerate()
                    .map(|(i, (x, t))| (i + 1) as f64 * (x - t) * (x - t))
                    .sum::<f64>())
        }
    }

    impl Gradient for Quadratic {
        type Param = Vec<f64>;
        type Gradient = Vec<f64>;

        fn gradient(&self, param: &Self::Param) -> Result<Vec<f64>, Error> {
            Ok(param
                .iter()
                .zip(&self.targets)
                .enumerate()
                .map(|(i, (x, t))| 2.0 * (i + 1) as f64 * (x - t))
                .collect())
        }
    }

    #[test]
    fn test_quadratic() {
        let problem = Quadratic {
            targets: vec![1.0, -2.0, 3.0],
            limit: None,
        };
        let res = optimize(problem, vec![0.0; 3], 5, 1e-10, Some(200), false).unwrap();
        for (x, t) in res.weights.iter().zip([1.0, -2.0, 3.0]) {
            assert!((x - t).abs() < 1e-3, "{x} != {t}");
        }
        assert!(res.iterations <= 200);
    }

    #[test]
    fn test_max_iter() {
        let problem = Quadratic {
            targets: vec![10.0, -20.0],
            limit: None,
        };
        let res = optimize(problem, vec![0.0; 2], 3, 1e-12, Some(1), false).unwrap();
        assert_eq!(1, res.iterations);
        assert!(!res.converged);
    }

    #[test]
    fn test_surprise_keeps_best() {
        let problem = Quadratic {
            targets: vec![10.0],
            limit: Some(3.0),
        };
        let res = optimize(problem, vec![0.0], 3, 1e-10, Some(100), false).unwrap();
        assert!(!res.converged);
        assert!(res.weights[0] > 0.0);
        assert!(res.weights[0] <= 3.0);
    }

    #[test]
    fn test_allocation_failure_halves_memory() {
        let mut solver = Lbfgs::new(8, 1e-4).unwrap();
        solver.pair_budget = Some(3);
        for k in 1..=3 {
            solver.push_pair(&[k as f64], &[1.0]).unwrap();
        }
        assert_eq!(8, solver.memory());
        assert_eq!(3, solver.s.len());

        solver.push_pair(&[4.0], &[1.0]).unwrap();
        assert_eq!(2, solver.memory());
        assert_eq!(vec![vec![3.0], vec![4.0]], Vec::from(solver.s.clone()));
        assert_eq!(2, solver.y.len());
        assert_eq!(vec![1.0 / 3.0, 1.0 / 4.0], Vec::from(solver.rho.clone()));
    }

    #[test]
    fn test_allocation_failure_at_memory_one() {
        let mut solver = Lbfgs::new(4, 1e-4).unwrap();
        solver.pair_budget = Some(0);
        assert!(solver.push_pair(&[1.0], &[1.0]).is_err());
        assert_eq!(1, solver.memory());
        assert!(solver.s.is_empty());
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(Lbfgs::new(0, 1e-4).is_err());
        assert!(Lbfgs::new(3, 0.0).is_err());
        assert!(Lbfgs::new(3, f64::NAN).is_err());
    }
}
