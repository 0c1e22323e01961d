pub mod circle;
pub mod mapper;
pub mod planar;

pub use circle::{CircleConstraint, CoupledCircleConstraint};
pub use mapper::ConstraintMapper;
pub use planar::PlanarConstraint;

use crate::error::DynamicsError;
use crate::particle_system::ParticleSystem;
use crate::types::{QVec, SpaceVec};

/// Particles a constraint acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyTo {
    Particle(usize),
    /// Ordered; the meaning of each position is defined by the constraint.
    Particles(Vec<usize>),
}

/// Scalar holonomic constraint `g(q) = 0` over a particle system.
///
/// The `*_unchecked` methods assume `q` and `qdot` have already been checked
/// against `ps` and that the constraint was validated against the same `ps`;
/// [`Constraint`] and [`ConstraintMapper`] do that once at their boundary.
pub trait ConstraintFunction {
    fn apply_to(&self) -> ApplyTo;

    /// Checks particle indices and parameter shapes against `ps`.
    fn validate(&self, ps: &ParticleSystem) -> Result<(), DynamicsError>;

    /// Signed residual; zero when the constraint is satisfied.
    fn constraint_unchecked(&self, ps: &ParticleSystem, q: &QVec) -> f64;

    /// Gradient of the residual w.r.t. the full position vector.
    fn constraint_jac_unchecked(&self, ps: &ParticleSystem, q: &QVec) -> QVec;

    /// Row `r` such that `r · qdot` is the convective term `(d/dt ∂g/∂q) · qdot`.
    fn constraint_jac_dt_unchecked(&self, ps: &ParticleSystem, q: &QVec, qdot: &QVec) -> QVec;
}

/// The closed set of supported constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Circle(CircleConstraint),
    CoupledCircle(CoupledCircleConstraint),
    Planar(PlanarConstraint),
}

impl From<CircleConstraint> for Constraint {
    fn from(c: CircleConstraint) -> Self {
        Constraint::Circle(c)
    }
}

impl From<CoupledCircleConstraint> for Constraint {
    fn from(c: CoupledCircleConstraint) -> Self {
        Constraint::CoupledCircle(c)
    }
}

impl From<PlanarConstraint> for Constraint {
    fn from(c: PlanarConstraint) -> Self {
        Constraint::Planar(c)
    }
}

impl Constraint {
    fn inner(&self) -> &dyn ConstraintFunction {
        match self {
            Constraint::Circle(c) => c,
            Constraint::CoupledCircle(c) => c,
            Constraint::Planar(c) => c,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Constraint::Circle(_) => "circle",
            Constraint::CoupledCircle(_) => "coupled circle",
            Constraint::Planar(_) => "planar",
        }
    }

    pub fn constraint(&self, ps: &ParticleSystem, q: &QVec) -> Result<f64, DynamicsError> {
        self.validate(ps)?;
        ps.check_q("q", q)?;
        Ok(self.constraint_unchecked(ps, q))
    }

    pub fn constraint_jac(&self, ps: &ParticleSystem, q: &QVec) -> Result<QVec, DynamicsError> {
        self.validate(ps)?;
        ps.check_q("q", q)?;
        Ok(self.constraint_jac_unchecked(ps, q))
    }

    pub fn constraint_jac_dt(
        &self,
        ps: &ParticleSystem,
        q: &QVec,
        qdot: &QVec,
    ) -> Result<QVec, DynamicsError> {
        self.validate(ps)?;
        ps.check_q("q", q)?;
        ps.check_q("qdot", qdot)?;
        Ok(self.constraint_jac_dt_unchecked(ps, q, qdot))
    }

    /// Time derivative of the residual, `constraint_jac(q) · qdot`.
    pub fn constraint_dt(
        &self,
        ps: &ParticleSystem,
        q: &QVec,
        qdot: &QVec,
    ) -> Result<f64, DynamicsError> {
        ps.check_q("qdot", qdot)?;
        Ok(self.constraint_jac(ps, q)?.dot(qdot))
    }
}

impl ConstraintFunction for Constraint {
    fn apply_to(&self) -> ApplyTo {
        self.inner().apply_to()
    }

    fn validate(&self, ps: &ParticleSystem) -> Result<(), DynamicsError> {
        self.inner().validate(ps)
    }

    fn constraint_unchecked(&self, ps: &ParticleSystem, q: &QVec) -> f64 {
        self.inner().constraint_unchecked(ps, q)
    }

    fn constraint_jac_unchecked(&self, ps: &ParticleSystem, q: &QVec) -> QVec {
        self.inner().constraint_jac_unchecked(ps, q)
    }

    fn constraint_jac_dt_unchecked(&self, ps: &ParticleSystem, q: &QVec, qdot: &QVec) -> QVec {
        self.inner().constraint_jac_dt_unchecked(ps, q, qdot)
    }
}

/// Full-length row, zero except for the listed particle slots.
pub(crate) fn scatter(ps: &ParticleSystem, slots: &[(usize, SpaceVec)]) -> QVec {
    let dim = ps.dim();
    let mut row = QVec::zeros(ps.q_len());
    for (index, value) in slots {
        row.rows_mut(index * dim, dim).copy_from(value);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::{ApplyTo, CircleConstraint, Constraint, ConstraintFunction, PlanarConstraint};
    use crate::forces::ZeroForce;
    use crate::particle_system::ParticleSystem;
    use crate::types::{QVec, SpaceVec};

    #[test]
    fn constraint_dt_is_jacobian_dot_velocity() {
        let ps = ParticleSystem::new(2, vec![1.0, 1.0], ZeroForce).expect("valid system");
        let c: Constraint = CircleConstraint::new(&ps, 1, SpaceVec::from_vec(vec![1.0, 0.0]), 3.0)
            .expect("valid circle")
            .into();
        let q = QVec::from_vec(vec![0.0, 0.0, 4.0, 1.0]);
        let qdot = QVec::from_vec(vec![5.0, 5.0, 0.5, -2.0]);
        // r = (3, 1), velocity of particle 1 = (0.5, -2).
        let dt = c.constraint_dt(&ps, &q, &qdot).expect("constraint_dt");
        assert_eq!(dt, 3.0 * 0.5 + 1.0 * -2.0);
        assert_eq!(c.apply_to(), ApplyTo::Particle(1));
        assert_eq!(c.kind(), "circle");
    }

    #[test]
    fn checked_methods_reject_foreign_systems() {
        let ps = ParticleSystem::new(2, vec![1.0, 1.0], ZeroForce).expect("valid system");
        let small = ParticleSystem::new(2, vec![1.0], ZeroForce).expect("valid system");
        let c: Constraint = PlanarConstraint::new(
            &ps,
            1,
            SpaceVec::from_vec(vec![0.0, 1.0]),
            SpaceVec::zeros(2),
        )
        .expect("valid plane")
        .into();

        let err = c
            .constraint(&small, &QVec::zeros(2))
            .expect_err("index 1 does not exist in a single particle system");
        assert!(format!("{err}").contains("out of range"));

        let err = c
            .constraint_jac(&ps, &QVec::zeros(3))
            .expect_err("q has the wrong length");
        assert!(format!("{err}").contains("expected length 4, got 3"));
    }
}
