//! Quasi-Newton minimisation for smooth objectives with analytic gradients.
//!
//! Dense BFGS on the inverse Hessian with a backtracking Armijo line search. Dimensions here
//! are `2 * teams + 1`, so the `O(n^2)` update is cheap.

use tracing::debug;

use crate::error::ModelError;

const ARMIJO_C1: f64 = 1e-4;
const BACKTRACK_SHRINK: f64 = 0.5;
const MAX_BACKTRACKS: usize = 60;
const CURVATURE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub struct BfgsConfig {
    /// `None` means `200 * dimension`.
    pub max_iters: Option<usize>,
    pub grad_tol: f64,
    pub f_tol: f64,
}

impl Default for BfgsConfig {
    fn default() -> Self {
        Self {
            max_iters: None,
            grad_tol: 1e-5,
            f_tol: 1e-12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    GradientTolerance,
    FunctionTolerance,
    /// No step along the search direction lowers the objective in floating point.
    LineSearchStalled,
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub grad_norm: f64,
    pub termination: Termination,
}

/// Minimises `objective` from `x0`.
///
/// The objective returns its value and writes the gradient into the second argument. A
/// non-finite value is treated as "too far" by the line search; it is only an error at `x0`.
pub fn minimize<F>(mut objective: F, x0: Vec<f64>, cfg: &BfgsConfig) -> Result<Minimum, ModelError>
where
    F: FnMut(&[f64], &mut [f64]) -> f64,
{
    let n = x0.len();
    let max_iters = cfg.max_iters.unwrap_or(200 * n.max(1));

    let mut x = x0;
    let mut g = vec![0.0; n];
    let mut fx = objective(&x, &mut g);
    if !fx.is_finite() || g.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFiniteObjective);
    }

    let mut h_inv = identity(n);
    let mut x_new = vec![0.0; n];
    let mut g_new = vec![0.0; n];

    for iter in 0..max_iters {
        let grad_norm = inf_norm(&g);
        if grad_norm <= cfg.grad_tol {
            return Ok(finish(x, fx, iter, grad_norm, Termination::GradientTolerance));
        }

        let mut p = mat_vec(&h_inv, &g);
        p.iter_mut().for_each(|v| *v = -*v);
        let mut slope = dot(&p, &g);
        if !(slope < 0.0) {
            // Lost positive definiteness; restart from steepest descent.
            h_inv = identity(n);
            p = g.iter().map(|v| -v).collect();
            slope = -dot(&g, &g);
        }

        let initial_step = if iter == 0 {
            (1.0 / inf_norm(&p)).min(1.0)
        } else {
            1.0
        };

        let Some(f_new) = backtrack(
            &mut objective,
            &x,
            fx,
            &p,
            slope,
            initial_step,
            &mut x_new,
            &mut g_new,
        ) else {
            debug!(iter, grad_norm, "line search stalled");
            return Ok(finish(x, fx, iter, grad_norm, Termination::LineSearchStalled));
        };

        let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > CURVATURE_EPS {
            if iter == 0 {
                let scale = sy / dot(&y, &y);
                h_inv = identity(n);
                h_inv
                    .iter_mut()
                    .enumerate()
                    .for_each(|(i, row)| row[i] = scale);
            }
            bfgs_update(&mut h_inv, &s, &y, sy);
        }

        let f_prev = fx;
        std::mem::swap(&mut x, &mut x_new);
        std::mem::swap(&mut g, &mut g_new);
        fx = f_new;

        if (f_prev - fx).abs() <= cfg.f_tol * f_prev.abs().max(fx.abs()).max(1.0) {
            let grad_norm = inf_norm(&g);
            return Ok(finish(
                x,
                fx,
                iter + 1,
                grad_norm,
                Termination::FunctionTolerance,
            ));
        }
    }

    Err(ModelError::NotConverged {
        iterations: max_iters,
        grad_norm: inf_norm(&g),
    })
}

fn finish(x: Vec<f64>, value: f64, iterations: usize, grad_norm: f64, termination: Termination) -> Minimum {
    Minimum {
        x,
        value,
        iterations,
        grad_norm,
        termination,
    }
}

#[allow(clippy::too_many_arguments)]
fn backtrack<F>(
    objective: &mut F,
    x: &[f64],
    fx: f64,
    p: &[f64],
    slope: f64,
    initial_step: f64,
    x_new: &mut [f64],
    g_new: &mut [f64],
) -> Option<f64>
where
    F: FnMut(&[f64], &mut [f64]) -> f64,
{
    let mut step = initial_step;
    for _ in 0..MAX_BACKTRACKS {
        for ((xn, xi), pi) in x_new.iter_mut().zip(x).zip(p) {
            *xn = xi + step * pi;
        }
        let f_new = objective(x_new, g_new);
        if f_new.is_finite()
            && g_new.iter().all(|v| v.is_finite())
            && f_new <= fx + ARMIJO_C1 * step * slope
            && f_new < fx
        {
            return Some(f_new);
        }
        step *= BACKTRACK_SHRINK;
    }
    None
}

fn bfgs_update(h_inv: &mut [Vec<f64>], s: &[f64], y: &[f64], sy: f64) {
    let hy = mat_vec(h_inv, y);
    let yhy = dot(y, &hy);
    let rho = 1.0 / sy;
    let coef = (sy + yhy) * rho * rho;
    for (i, row) in h_inv.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell += coef * s[i] * s[j] - rho * (hy[i] * s[j] + s[i] * hy[j]);
        }
    }
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            row
        })
        .collect()
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rosenbrock(x: &[f64], g: &mut [f64]) -> f64 {
        let (a, b) = (x[0], x[1]);
        g[0] = -2.0 * (1.0 - a) - 400.0 * a * (b - a * a);
        g[1] = 200.0 * (b - a * a);
        (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2)
    }

    #[test]
    fn minimises_quadratic_bowl() {
        let min = minimize(
            |x, g| {
                g[0] = 2.0 * (x[0] - 3.0);
                g[1] = 8.0 * (x[1] + 1.0);
                (x[0] - 3.0).powi(2) + 4.0 * (x[1] + 1.0).powi(2)
            },
            vec![0.0, 0.0],
            &BfgsConfig::default(),
        )
        .unwrap();
        assert!((min.x[0] - 3.0).abs() < 1e-5);
        assert!((min.x[1] + 1.0).abs() < 1e-5);
        assert!(min.value < 1e-9);
    }

    #[test]
    fn minimises_rosenbrock() {
        let min = minimize(rosenbrock, vec![-1.2, 1.0], &BfgsConfig::default()).unwrap();
        assert!((min.x[0] - 1.0).abs() < 1e-3, "x = {:?}", min.x);
        assert!((min.x[1] - 1.0).abs() < 1e-3, "x = {:?}", min.x);
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let cfg = BfgsConfig {
            max_iters: Some(2),
            ..BfgsConfig::default()
        };
        let err = minimize(rosenbrock, vec![-1.2, 1.0], &cfg).unwrap_err();
        assert!(matches!(err, ModelError::NotConverged { iterations: 2, .. }));
    }

    #[test]
    fn non_finite_start_is_rejected() {
        let err = minimize(
            |_x, g| {
                g[0] = 0.0;
                f64::NAN
            },
            vec![0.0],
            &BfgsConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::NonFiniteObjective));
    }
}
