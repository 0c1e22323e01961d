use crate::constraint::{Constraint, ConstraintMapper};
use crate::error::DynamicsError;
use crate::integration::{integrate, DenseOutput, IntegrationStats, IntegratorSettings};
use crate::particle_system::ParticleSystem;
use crate::traits::DynamicalSystem;
use crate::types::{ConstraintMatrix, ConstraintVec, QVec, SimVec};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Feedback gains of the Baumgarte terms `-α·C(q) - β·Ċ(q, q̇)` added to the
/// multiplier right-hand side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StabilizationGains {
    /// α, applied to the constraint residual.
    pub position: f64,
    /// β, applied to the residual rate.
    pub velocity: f64,
}

impl Default for StabilizationGains {
    fn default() -> Self {
        Self {
            position: 1.0,
            velocity: 1.0,
        }
    }
}

/// Solver quantities at one state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostics {
    pub multipliers: Vec<f64>,
    pub acceleration: Vec<f64>,
    pub residual: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryPoint {
    pub t: f64,
    pub q: Vec<f64>,
    pub qdot: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl TrajectoryPoint {
    pub fn q_vec(&self) -> QVec {
        QVec::from_column_slice(&self.q)
    }

    pub fn qdot_vec(&self) -> QVec {
        QVec::from_column_slice(&self.qdot)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Trajectory {
    pub points: Vec<TrajectoryPoint>,
    pub stats: IntegrationStats,
    #[serde(skip)]
    dense: Option<DenseOutput>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.t).collect()
    }

    pub fn last(&self) -> Option<&TrajectoryPoint> {
        self.points.last()
    }

    /// Interpolated `(q, qdot)` at any time inside the run. Requires
    /// `dense_output` in the integrator settings.
    pub fn state_at(&self, t: f64) -> Option<(QVec, QVec)> {
        let y = self.dense.as_ref()?.evaluate(t)?;
        let n = y.len() / 2;
        Some((
            QVec::from_column_slice(&y[..n]),
            QVec::from_column_slice(&y[n..]),
        ))
    }

    pub fn has_dense_output(&self) -> bool {
        self.dense.is_some()
    }
}

/// Constraint-stabilized dynamics of a particle system.
#[derive(Debug)]
pub struct Simulator {
    particle_system: ParticleSystem,
    constraint_mapper: ConstraintMapper,
    gains: StabilizationGains,
    settings: IntegratorSettings,
    record_diagnostics: bool,
    /// Most recent failure inside `DynamicalSystem::apply`, reported with the
    /// integration error it causes.
    derivative_error: RefCell<Option<DynamicsError>>,
}

impl Simulator {
    /// Row order of every constraint output follows `constraints`.
    pub fn new(
        particle_system: ParticleSystem,
        constraints: Vec<Constraint>,
    ) -> Result<Self, DynamicsError> {
        let constraint_mapper = ConstraintMapper::new(constraints);
        constraint_mapper.validate(&particle_system)?;
        Ok(Self {
            particle_system,
            constraint_mapper,
            gains: StabilizationGains::default(),
            settings: IntegratorSettings::default(),
            record_diagnostics: false,
            derivative_error: RefCell::new(None),
        })
    }

    pub fn with_gains(mut self, gains: StabilizationGains) -> Self {
        self.gains = gains;
        self
    }

    pub fn with_settings(mut self, settings: IntegratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Attach multipliers, acceleration and residual to every trajectory sample.
    pub fn with_diagnostics(mut self, record: bool) -> Self {
        self.record_diagnostics = record;
        self
    }

    pub fn particle_system(&self) -> &ParticleSystem {
        &self.particle_system
    }

    pub fn constraint_mapper(&self) -> &ConstraintMapper {
        &self.constraint_mapper
    }

    pub fn gains(&self) -> StabilizationGains {
        self.gains
    }

    pub fn settings(&self) -> &IntegratorSettings {
        &self.settings
    }

    fn check_inputs(&self, q: &QVec, qdot: &QVec, f: &QVec) -> Result<(), DynamicsError> {
        let ps = &self.particle_system;
        ps.check_q("q", q)?;
        ps.check_q("qdot", qdot)?;
        ps.check_q("force", f)
    }

    /// Lagrange multipliers λ solving `J W Jᵀ λ = b` in the least-squares sense.
    pub fn lagrange_multiplier(
        &self,
        q: &QVec,
        qdot: &QVec,
        f: &QVec,
    ) -> Result<ConstraintVec, DynamicsError> {
        self.check_inputs(q, qdot, f)?;
        let jac = self
            .constraint_mapper
            .constraint_jac_unchecked(&self.particle_system, q);
        self.solve_multipliers(q, qdot, f, &jac)
    }

    /// `W (f + Jᵀ λ)`: external plus constraint reaction force, mass weighted.
    pub fn net_acceleration(
        &self,
        q: &QVec,
        qdot: &QVec,
        f: &QVec,
    ) -> Result<QVec, DynamicsError> {
        self.check_inputs(q, qdot, f)?;
        self.solve(q, qdot, f).map(|(_, acceleration)| acceleration)
    }

    /// Constraint residuals `C(q)` in mapper order.
    pub fn constraint_residual(&self, q: &QVec) -> Result<ConstraintVec, DynamicsError> {
        self.constraint_mapper.constraint(&self.particle_system, q)
    }

    /// Multipliers, acceleration and residual at `(q, qdot)` under the system's force law.
    pub fn diagnostics(&self, q: &QVec, qdot: &QVec) -> Result<Diagnostics, DynamicsError> {
        let f = self.particle_system.force(q, qdot)?;
        let (multipliers, acceleration) = self.solve(q, qdot, &f)?;
        let residual = self
            .constraint_mapper
            .constraint_unchecked(&self.particle_system, q);
        Ok(Diagnostics {
            multipliers: multipliers.as_slice().to_vec(),
            acceleration: acceleration.as_slice().to_vec(),
            residual: residual.as_slice().to_vec(),
        })
    }

    /// `dy/dt = [qdot, net_acceleration(q, qdot, force(q, qdot))]`.
    pub fn state_derivative(&self, y: &SimVec) -> Result<SimVec, DynamicsError> {
        let (q, qdot) = self.particle_system.y_to_qqdot(y)?;
        let f = self.particle_system.force(&q, &qdot)?;
        let (_, acceleration) = self.solve(&q, &qdot, &f)?;
        self.particle_system.qqdot_to_y(&qdot, &acceleration)
    }

    fn solve(
        &self,
        q: &QVec,
        qdot: &QVec,
        f: &QVec,
    ) -> Result<(ConstraintVec, QVec), DynamicsError> {
        let jac = self
            .constraint_mapper
            .constraint_jac_unchecked(&self.particle_system, q);
        let lambda = self.solve_multipliers(q, qdot, f, &jac)?;
        let reaction = jac.tr_mul(&lambda);
        let acceleration = (f + reaction).component_mul(self.particle_system.inverse_mass_diagonal());
        Ok((lambda, acceleration))
    }

    fn solve_multipliers(
        &self,
        q: &QVec,
        qdot: &QVec,
        f: &QVec,
        jac: &ConstraintMatrix,
    ) -> Result<ConstraintVec, DynamicsError> {
        if self.constraint_mapper.is_empty() {
            return Ok(ConstraintVec::zeros(0));
        }
        let ps = &self.particle_system;
        let w = ps.inverse_mass_diagonal();

        let mut jw = jac.clone();
        for (mut column, wi) in jw.column_iter_mut().zip(w.iter()) {
            column *= *wi;
        }
        let a = &jw * jac.transpose();

        let jac_dt = self.constraint_mapper.constraint_jac_dt_unchecked(ps, q, qdot);
        let residual = self.constraint_mapper.constraint_unchecked(ps, q);
        let residual_rate = jac * qdot;
        let b = -(jac_dt * qdot)
            - &jw * f
            - residual * self.gains.position
            - residual_rate * self.gains.velocity;

        least_squares(a, &b)
    }

    /// Integrates from `t_range[0]` to its last entry, sampling at every entry.
    pub fn simulate(
        &self,
        q0: &QVec,
        qdot0: &QVec,
        t_range: &[f64],
    ) -> Result<Trajectory, DynamicsError> {
        let ps = &self.particle_system;
        let y0 = ps.qqdot_to_y(q0, qdot0)?;
        log::debug!(
            "simulating {} particles under {} constraints over {} samples",
            ps.n_particles(),
            self.constraint_mapper.len(),
            t_range.len()
        );

        self.derivative_error.replace(None);
        let output = integrate(self, y0.as_slice(), t_range, &self.settings)
            .map_err(|err| self.with_derivative_cause(err))?;
        log::debug!(
            "simulation finished: {} accepted, {} rejected steps, {} evaluations",
            output.stats.accepted_steps,
            output.stats.rejected_steps,
            output.stats.evaluations
        );

        let n = ps.q_len();
        let mut points = Vec::with_capacity(output.times.len());
        for (t, y) in output.times.into_iter().zip(output.states) {
            let (q, qdot) = y.split_at(n);
            let diagnostics = if self.record_diagnostics {
                Some(self.diagnostics(&QVec::from_column_slice(q), &QVec::from_column_slice(qdot))?)
            } else {
                None
            };
            points.push(TrajectoryPoint {
                t,
                q: q.to_vec(),
                qdot: qdot.to_vec(),
                diagnostics,
            });
        }

        Ok(Trajectory {
            points,
            stats: output.stats,
            dense: output.dense,
        })
    }

    /// Attaches the last derivative failure to a non-finite integration error.
    fn with_derivative_cause(&self, err: DynamicsError) -> DynamicsError {
        match (err, self.derivative_error.take()) {
            (DynamicsError::NonFiniteState { t_reached }, Some(cause)) => {
                DynamicsError::DerivativeFailed {
                    t_reached,
                    source: Box::new(cause),
                }
            }
            (err, _) => err,
        }
    }

    /// Largest `|C(q)|` over all samples of a trajectory.
    pub fn max_constraint_violation(&self, trajectory: &Trajectory) -> Result<f64, DynamicsError> {
        trajectory.points.iter().try_fold(0.0_f64, |acc, point| {
            let residual = self.constraint_residual(&point.q_vec())?;
            Ok(residual.iter().fold(acc, |m, c| m.max(c.abs())))
        })
    }
}

impl DynamicalSystem<f64> for Simulator {
    fn dimension(&self) -> usize {
        self.particle_system.y_len()
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        match self.state_derivative(&SimVec::from_column_slice(x)) {
            Ok(dy) => out.copy_from_slice(dy.as_slice()),
            Err(err) => {
                log::debug!("state derivative unavailable at t = {t}: {err}");
                self.derivative_error.replace(Some(err));
                out.fill(f64::NAN);
            }
        }
    }
}

/// Minimum-norm least-squares solution of `a x = b` through the SVD.
/// Rank-deficient `a` is accepted; singular values below the usual
/// `max(m, n) · ε · σ_max` cutoff are treated as zero.
fn least_squares(a: ConstraintMatrix, b: &ConstraintVec) -> Result<ConstraintVec, DynamicsError> {
    if !(a.iter().all(|v| v.is_finite()) && b.iter().all(|v| v.is_finite())) {
        return Err(DynamicsError::LinearSolve(
            "multiplier system has non-finite entries".to_string(),
        ));
    }

    let m = a.nrows().max(a.ncols());
    let svd = a
        .try_svd(true, true, f64::EPSILON, 10_000)
        .ok_or_else(|| DynamicsError::LinearSolve("SVD did not converge".to_string()))?;
    let cutoff = m as f64 * f64::EPSILON * svd.singular_values.max();

    let rank = svd.rank(cutoff);
    if rank < b.len() {
        log::trace!("multiplier system is rank deficient ({rank} of {})", b.len());
    }

    svd.solve(b, cutoff)
        .map_err(|msg| DynamicsError::LinearSolve(msg.to_string()))
}
