//! Time integration of a [`DynamicalSystem`] over a list of sample times.
//!
//! Two methods are available: the adaptive Tsitouras 5(4) pair with
//! mixed absolute/relative error control, and classic RK4 with a fixed
//! maximum step. Both emit the state at every requested sample time and can
//! keep a piecewise cubic Hermite interpolant of the whole run.

use crate::error::DynamicsError;
use crate::solvers::{Tsit5, RK4};
use crate::traits::{DynamicalSystem, Steppable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum IntegratorMethod {
    /// Adaptive step size, controlled by `rtol`/`atol`.
    Tsit5,
    /// Fixed steps no longer than `step`, shortened to land on every sample.
    Rk4 { step: f64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntegratorSettings {
    pub method: IntegratorMethod,
    pub rtol: f64,
    pub atol: f64,
    /// Initial step; estimated from the system when `None`.
    pub first_step: Option<f64>,
    /// Upper bound on the step size; unbounded when `None`.
    pub max_step: Option<f64>,
    /// Steps shorter than this are a failure.
    pub min_step: f64,
    /// Budget of attempted steps, accepted or not.
    pub max_steps: usize,
    /// Keep an interpolant of the full run.
    pub dense_output: bool,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            method: IntegratorMethod::Tsit5,
            rtol: 1e-3,
            atol: 1e-6,
            first_step: None,
            max_step: None,
            min_step: 1e-12,
            max_steps: 100_000,
            dense_output: false,
        }
    }
}

impl IntegratorSettings {
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    pub fn validate(&self) -> Result<(), DynamicsError> {
        let invalid = |msg: String| Err(DynamicsError::InvalidSettings(msg));

        if let IntegratorMethod::Rk4 { step } = self.method {
            if !(step.is_finite() && step > 0.0) {
                return invalid(format!("RK4 step must be positive, got {step}"));
            }
        }
        if !(self.rtol.is_finite() && self.rtol >= 0.0) {
            return invalid(format!("rtol must be non-negative, got {}", self.rtol));
        }
        if !(self.atol.is_finite() && self.atol >= 0.0) {
            return invalid(format!("atol must be non-negative, got {}", self.atol));
        }
        if self.rtol == 0.0 && self.atol == 0.0 {
            return invalid("rtol and atol cannot both be zero".to_string());
        }
        if let Some(h) = self.first_step {
            if !(h.is_finite() && h > 0.0) {
                return invalid(format!("first_step must be positive, got {h}"));
            }
        }
        if let Some(h) = self.max_step {
            if !(h > 0.0) {
                return invalid(format!("max_step must be positive, got {h}"));
            }
        }
        if !(self.min_step.is_finite() && self.min_step >= 0.0) {
            return invalid(format!("min_step must be non-negative, got {}", self.min_step));
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Work counters of one integration run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrationStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub evaluations: usize,
}

/// Cubic Hermite interpolant over one step.
#[derive(Debug, Clone, PartialEq)]
struct HermiteSegment {
    t0: f64,
    t1: f64,
    y0: Vec<f64>,
    y1: Vec<f64>,
    f0: Vec<f64>,
    f1: Vec<f64>,
}

impl HermiteSegment {
    fn evaluate(&self, t: f64, out: &mut [f64]) {
        let h = self.t1 - self.t0;
        if h == 0.0 {
            out.copy_from_slice(&self.y1);
            return;
        }
        let s = (t - self.t0) / h;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;
        for i in 0..out.len() {
            out[i] = h00 * self.y0[i]
                + h10 * h * self.f0[i]
                + h01 * self.y1[i]
                + h11 * h * self.f1[i];
        }
    }
}

/// Continuous extension of an integration run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DenseOutput {
    segments: Vec<HermiteSegment>,
}

impl DenseOutput {
    fn push(&mut self, t0: f64, t1: f64, y0: &[f64], y1: &[f64], f0: &[f64], f1: &[f64]) {
        self.segments.push(HermiteSegment {
            t0,
            t1,
            y0: y0.to_vec(),
            y1: y1.to_vec(),
            f0: f0.to_vec(),
            f1: f1.to_vec(),
        });
    }

    /// Time span covered, if any step was taken.
    pub fn span(&self) -> Option<(f64, f64)> {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => Some((first.t0, last.t1)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Interpolated state at `t`, or `None` outside the integrated span.
    pub fn evaluate(&self, t: f64) -> Option<Vec<f64>> {
        let (start, end) = self.span()?;
        if !(t >= start && t <= end) {
            return None;
        }
        let idx = self
            .segments
            .partition_point(|seg| seg.t1 < t)
            .min(self.segments.len() - 1);
        let seg = &self.segments[idx];
        let mut out = vec![0.0; seg.y0.len()];
        seg.evaluate(t, &mut out);
        Some(out)
    }
}

/// States at the requested sample times.
#[derive(Debug, Clone)]
pub struct IntegrationOutput {
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
    pub stats: IntegrationStats,
    pub dense: Option<DenseOutput>,
}

/// Checks that sample times are finite, non-empty and non-decreasing.
pub fn validate_time_range(t_eval: &[f64]) -> Result<(), DynamicsError> {
    if t_eval.is_empty() {
        return Err(DynamicsError::InvalidTimeRange(
            "at least one sample time is required".to_string(),
        ));
    }
    if let Some(t) = t_eval.iter().find(|t| !t.is_finite()) {
        return Err(DynamicsError::InvalidTimeRange(format!(
            "sample times must be finite, got {t}"
        )));
    }
    if let Some(w) = t_eval.windows(2).find(|w| w[1] < w[0]) {
        return Err(DynamicsError::InvalidTimeRange(format!(
            "sample times must be non-decreasing, got {} after {}",
            w[1], w[0]
        )));
    }
    Ok(())
}

/// Integrates `system` from `t_eval[0]` to the last sample time, starting at `y0`.
pub fn integrate<S: DynamicalSystem<f64>>(
    system: &S,
    y0: &[f64],
    t_eval: &[f64],
    settings: &IntegratorSettings,
) -> Result<IntegrationOutput, DynamicsError> {
    settings.validate()?;
    validate_time_range(t_eval)?;
    if y0.len() != system.dimension() {
        return Err(DynamicsError::shape("y0", system.dimension(), y0.len()));
    }
    if !y0.iter().all(|v| v.is_finite()) {
        return Err(DynamicsError::NonFiniteState {
            t_reached: t_eval[0],
        });
    }

    match settings.method {
        IntegratorMethod::Tsit5 => integrate_adaptive(system, y0, t_eval, settings),
        IntegratorMethod::Rk4 { step } => integrate_fixed(system, y0, t_eval, step, settings),
    }
}

fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Root-mean-square of `v / (atol + rtol * max(|a|, |b|))`.
fn scaled_rms(v: &[f64], a: &[f64], b: &[f64], rtol: f64, atol: f64) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v
        .iter()
        .zip(a.iter().zip(b))
        .map(|(e, (x, y))| {
            let scale = atol + rtol * x.abs().max(y.abs());
            (e / scale).powi(2)
        })
        .sum();
    (sum / v.len() as f64).sqrt()
}

/// Starting step estimate from the size of the state and its derivatives.
fn initial_step<S: DynamicalSystem<f64>>(
    system: &S,
    t0: f64,
    y0: &[f64],
    f0: &[f64],
    settings: &IntegratorSettings,
    stats: &mut IntegrationStats,
) -> f64 {
    let (rtol, atol) = (settings.rtol, settings.atol);
    let d0 = scaled_rms(y0, y0, y0, rtol, atol);
    let d1 = scaled_rms(f0, y0, y0, rtol, atol);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };

    let y1: Vec<f64> = y0.iter().zip(f0).map(|(y, f)| y + h0 * f).collect();
    let mut f1 = vec![0.0; y0.len()];
    system.apply(t0 + h0, &y1, &mut f1);
    stats.evaluations += 1;

    let diff: Vec<f64> = f1.iter().zip(f0).map(|(a, b)| a - b).collect();
    let d2 = scaled_rms(&diff, y0, y0, rtol, atol) / h0;
    let d_max = d1.max(d2);
    let order = Tsit5::<f64>::ERROR_ORDER as f64;
    let h1 = if !d_max.is_finite() || d_max <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d_max).powf(1.0 / (order + 1.0))
    };
    (100.0 * h0).min(h1)
}

/// Records the state at each requested sample time as integration passes it.
struct Sampler<'a> {
    t_eval: &'a [f64],
    next: usize,
    times: Vec<f64>,
    states: Vec<Vec<f64>>,
}

impl<'a> Sampler<'a> {
    fn new(t_eval: &'a [f64]) -> Self {
        Self {
            t_eval,
            next: 0,
            times: Vec::with_capacity(t_eval.len()),
            states: Vec::with_capacity(t_eval.len()),
        }
    }

    fn done(&self) -> bool {
        self.next >= self.t_eval.len()
    }

    /// Next sample time not yet recorded.
    fn next_stop(&self) -> Option<f64> {
        self.t_eval.get(self.next).copied()
    }

    /// Records `y` for every pending sample time up to and including `t`.
    fn collect_at(&mut self, t: f64, y: &[f64]) {
        while self.next < self.t_eval.len() && self.t_eval[self.next] <= t {
            self.times.push(self.t_eval[self.next]);
            self.states.push(y.to_vec());
            self.next += 1;
        }
    }

    fn finish(
        self,
        stats: IntegrationStats,
        dense: Option<DenseOutput>,
    ) -> IntegrationOutput {
        IntegrationOutput {
            times: self.times,
            states: self.states,
            stats,
            dense,
        }
    }
}

fn integrate_adaptive<S: DynamicalSystem<f64>>(
    system: &S,
    y0: &[f64],
    t_eval: &[f64],
    settings: &IntegratorSettings,
) -> Result<IntegrationOutput, DynamicsError> {
    const SAFETY: f64 = 0.9;
    const MIN_FACTOR: f64 = 0.2;
    const MAX_FACTOR: f64 = 10.0;

    let n = y0.len();
    let mut stats = IntegrationStats::default();
    let mut sampler = Sampler::new(t_eval);
    let mut dense = settings.dense_output.then(DenseOutput::default);

    let mut t = t_eval[0];
    let mut y = y0.to_vec();
    sampler.collect_at(t, &y);

    let mut f = vec![0.0; n];
    system.apply(t, &y, &mut f);
    stats.evaluations += 1;
    if !all_finite(&f) {
        return Err(DynamicsError::NonFiniteState { t_reached: t });
    }

    let max_step = settings.max_step.unwrap_or(f64::INFINITY);
    let mut h = match settings.first_step {
        Some(h) => h,
        None if sampler.done() => 0.0,
        None => initial_step(system, t, &y, &f, settings, &mut stats),
    }
    .min(max_step);

    let mut stepper = Tsit5::new(n);
    let mut y_new = vec![0.0; n];
    let mut f_new = vec![0.0; n];
    let mut err = vec![0.0; n];
    let exponent = -1.0 / (Tsit5::<f64>::ERROR_ORDER as f64 + 1.0);
    let mut attempts = 0usize;
    let mut last_rejection_non_finite = false;

    while let Some(stop) = sampler.next_stop() {
        let remaining = stop - t;
        let machine_min = 10.0 * f64::EPSILON * t.abs().max(1.0);

        if attempts >= settings.max_steps {
            log::warn!("integration stopped at t = {t}: step budget exhausted");
            return Err(DynamicsError::MaxStepsExceeded {
                t_reached: t,
                max_steps: settings.max_steps,
            });
        }
        if h < settings.min_step.max(machine_min) && h < remaining {
            log::warn!("integration stopped at t = {t}: step size collapsed to {h:e}");
            return Err(if last_rejection_non_finite {
                DynamicsError::NonFiniteState { t_reached: t }
            } else {
                DynamicsError::StepSizeTooSmall {
                    t_reached: t,
                    step: h,
                }
            });
        }

        // Shorten the step to land exactly on the next sample time.
        let clipped = h >= remaining;
        let (dt, t_next) = if clipped { (remaining, stop) } else { (h, t + h) };

        attempts += 1;
        stepper.attempt(system, t, &y, &f, dt, &mut y_new, &mut f_new, &mut err);
        stats.evaluations += 6;

        let error_norm = scaled_rms(&err, &y, &y_new, settings.rtol, settings.atol);
        let finite = error_norm.is_finite() && all_finite(&y_new) && all_finite(&f_new);

        if !(finite && error_norm <= 1.0) {
            stats.rejected_steps += 1;
            last_rejection_non_finite = !finite;
            let factor = if finite {
                (SAFETY * error_norm.powf(exponent)).clamp(MIN_FACTOR, 1.0)
            } else {
                MIN_FACTOR
            };
            log::trace!("rejected step at t = {t}, dt = {dt:e}, error = {error_norm:e}");
            h = dt * factor;
            continue;
        }

        let factor = if error_norm == 0.0 {
            MAX_FACTOR
        } else {
            (SAFETY * error_norm.powf(exponent)).clamp(MIN_FACTOR, MAX_FACTOR)
        };

        if let Some(dense) = dense.as_mut() {
            dense.push(t, t_next, &y, &y_new, &f, &f_new);
        }
        std::mem::swap(&mut y, &mut y_new);
        std::mem::swap(&mut f, &mut f_new);
        t = t_next;
        sampler.collect_at(t, &y);

        stats.accepted_steps += 1;
        last_rejection_non_finite = false;
        // A step cut short by a sample time says nothing against the longer one.
        h = if clipped { h.max(dt * factor) } else { dt * factor }.min(max_step);
    }

    Ok(sampler.finish(stats, dense))
}

fn integrate_fixed<S: DynamicalSystem<f64>>(
    system: &S,
    y0: &[f64],
    t_eval: &[f64],
    step: f64,
    settings: &IntegratorSettings,
) -> Result<IntegrationOutput, DynamicsError> {
    let n = y0.len();
    let mut stats = IntegrationStats::default();
    let mut sampler = Sampler::new(t_eval);
    let mut dense = settings.dense_output.then(DenseOutput::default);
    let mut stepper = RK4::new(n);

    let mut t = t_eval[0];
    let mut y = y0.to_vec();
    sampler.collect_at(t, &y);

    let mut y_prev = vec![0.0; n];
    let mut f0 = vec![0.0; n];
    let mut f1 = vec![0.0; n];

    for window in t_eval.windows(2) {
        let (a, b) = (window[0], window[1]);
        if b <= a {
            sampler.collect_at(b, &y);
            continue;
        }
        let substeps = ((b - a) / step).ceil().max(1.0) as usize;
        let h = (b - a) / substeps as f64;

        for k in 0..substeps {
            if stats.accepted_steps >= settings.max_steps {
                log::warn!("integration stopped at t = {t}: step budget exhausted");
                return Err(DynamicsError::MaxStepsExceeded {
                    t_reached: t,
                    max_steps: settings.max_steps,
                });
            }

            let t_prev = t;
            y_prev.copy_from_slice(&y);
            if dense.is_some() {
                system.apply(t_prev, &y_prev, &mut f0);
                stats.evaluations += 1;
            }

            stepper.step(system, &mut t, &mut y, h);
            stats.evaluations += 4;
            // Recompute from the window start instead of accumulating h.
            t = if k + 1 == substeps {
                b
            } else {
                a + (k + 1) as f64 * h
            };

            if !all_finite(&y) {
                log::warn!("integration stopped at t = {t_prev}: state became non-finite");
                return Err(DynamicsError::NonFiniteState { t_reached: t_prev });
            }
            stats.accepted_steps += 1;

            if let Some(dense) = dense.as_mut() {
                system.apply(t, &y, &mut f1);
                stats.evaluations += 1;
                dense.push(t_prev, t, &y_prev, &y, &f0, &f1);
            }
        }

        sampler.collect_at(b, &y);
    }

    Ok(sampler.finish(stats, dense))
}
