use super::{scatter, ApplyTo, ConstraintFunction};
use crate::error::DynamicsError;
use crate::particle_system::ParticleSystem;
use crate::types::{QVec, SpaceVec};

fn check_radius(radius: f64) -> Result<(), DynamicsError> {
    if !(radius.is_finite() && radius >= 0.0) {
        return Err(DynamicsError::DegenerateConstraint(format!(
            "circle radius must be finite and non-negative, got {radius}"
        )));
    }
    Ok(())
}

fn half_squared_excess(r: &SpaceVec, radius: f64) -> f64 {
    0.5 * (r.dot(r) - radius * radius)
}

/// Keeps one particle at distance `radius` from a fixed `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleConstraint {
    particle: usize,
    origin: SpaceVec,
    radius: f64,
}

impl CircleConstraint {
    pub fn new(
        ps: &ParticleSystem,
        particle: usize,
        origin: SpaceVec,
        radius: f64,
    ) -> Result<Self, DynamicsError> {
        let constraint = Self {
            particle,
            origin,
            radius,
        };
        constraint.validate(ps)?;
        Ok(constraint)
    }

    pub fn particle(&self) -> usize {
        self.particle
    }

    pub fn origin(&self) -> &SpaceVec {
        &self.origin
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    fn delta_x(&self, x: &SpaceVec) -> SpaceVec {
        x - &self.origin
    }
}

impl ConstraintFunction for CircleConstraint {
    fn apply_to(&self) -> ApplyTo {
        ApplyTo::Particle(self.particle)
    }

    fn validate(&self, ps: &ParticleSystem) -> Result<(), DynamicsError> {
        ps.check_index(self.particle)?;
        ps.check_space_vec("circle origin", &self.origin)?;
        check_radius(self.radius)
    }

    fn constraint_unchecked(&self, ps: &ParticleSystem, q: &QVec) -> f64 {
        let r = self.delta_x(&ps.particle_unchecked(q, self.particle));
        half_squared_excess(&r, self.radius)
    }

    fn constraint_jac_unchecked(&self, ps: &ParticleSystem, q: &QVec) -> QVec {
        let r = self.delta_x(&ps.particle_unchecked(q, self.particle));
        scatter(ps, &[(self.particle, r)])
    }

    fn constraint_jac_dt_unchecked(&self, ps: &ParticleSystem, _q: &QVec, qdot: &QVec) -> QVec {
        // d/dt (x_i - origin) is the particle velocity itself.
        let v = ps.particle_unchecked(qdot, self.particle);
        scatter(ps, &[(self.particle, v)])
    }
}

/// Keeps `particle` at distance `radius` from `origin_particle`.
///
/// The two indices are not interchangeable in the API: `origin_particle`
/// provides the centre and `particle` is the constrained point. Both receive
/// reaction forces, with opposite signs.
#[derive(Debug, Clone, PartialEq)]
pub struct CoupledCircleConstraint {
    origin_particle: usize,
    particle: usize,
    radius: f64,
}

impl CoupledCircleConstraint {
    pub fn new(
        ps: &ParticleSystem,
        origin_particle: usize,
        particle: usize,
        radius: f64,
    ) -> Result<Self, DynamicsError> {
        let constraint = Self {
            origin_particle,
            particle,
            radius,
        };
        constraint.validate(ps)?;
        Ok(constraint)
    }

    /// Builds from an ordered `[origin_particle, particle]` list.
    pub fn from_apply_to(
        ps: &ParticleSystem,
        apply_to: &[usize],
        radius: f64,
    ) -> Result<Self, DynamicsError> {
        match apply_to {
            [origin_particle, particle] => Self::new(ps, *origin_particle, *particle, radius),
            _ => Err(DynamicsError::DegenerateConstraint(format!(
                "coupled circle needs exactly two particle indices, got {}",
                apply_to.len()
            ))),
        }
    }

    pub fn origin_particle(&self) -> usize {
        self.origin_particle
    }

    pub fn particle(&self) -> usize {
        self.particle
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// `x_particle - x_origin`, applied to positions or velocities alike.
    fn delta_x(&self, ps: &ParticleSystem, v: &QVec) -> SpaceVec {
        ps.particle_unchecked(v, self.particle) - ps.particle_unchecked(v, self.origin_particle)
    }

    fn antisymmetric_row(&self, ps: &ParticleSystem, r: SpaceVec) -> QVec {
        scatter(ps, &[(self.origin_particle, -&r), (self.particle, r)])
    }
}

impl ConstraintFunction for CoupledCircleConstraint {
    fn apply_to(&self) -> ApplyTo {
        ApplyTo::Particles(vec![self.origin_particle, self.particle])
    }

    fn validate(&self, ps: &ParticleSystem) -> Result<(), DynamicsError> {
        ps.check_index(self.origin_particle)?;
        ps.check_index(self.particle)?;
        if self.origin_particle == self.particle {
            return Err(DynamicsError::DegenerateConstraint(format!(
                "coupled circle links particle {} to itself",
                self.particle
            )));
        }
        check_radius(self.radius)
    }

    fn constraint_unchecked(&self, ps: &ParticleSystem, q: &QVec) -> f64 {
        half_squared_excess(&self.delta_x(ps, q), self.radius)
    }

    fn constraint_jac_unchecked(&self, ps: &ParticleSystem, q: &QVec) -> QVec {
        self.antisymmetric_row(ps, self.delta_x(ps, q))
    }

    fn constraint_jac_dt_unchecked(&self, ps: &ParticleSystem, _q: &QVec, qdot: &QVec) -> QVec {
        self.antisymmetric_row(ps, self.delta_x(ps, qdot))
    }
}
