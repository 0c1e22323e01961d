use super::{scatter, ApplyTo, ConstraintFunction};
use crate::error::DynamicsError;
use crate::particle_system::ParticleSystem;
use crate::types::{QVec, SpaceVec};

/// Keeps one particle on the hyperplane through `point` with normal `normal`.
///
/// The residual is `normal · (x - point)`; the normal is used as given, so its
/// length scales the residual and the reaction force.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarConstraint {
    particle: usize,
    normal: SpaceVec,
    point: SpaceVec,
}

impl PlanarConstraint {
    pub fn new(
        ps: &ParticleSystem,
        particle: usize,
        normal: SpaceVec,
        point: SpaceVec,
    ) -> Result<Self, DynamicsError> {
        let constraint = Self {
            particle,
            normal,
            point,
        };
        constraint.validate(ps)?;
        Ok(constraint)
    }

    pub fn particle(&self) -> usize {
        self.particle
    }

    pub fn normal(&self) -> &SpaceVec {
        &self.normal
    }

    pub fn point(&self) -> &SpaceVec {
        &self.point
    }
}

impl ConstraintFunction for PlanarConstraint {
    fn apply_to(&self) -> ApplyTo {
        ApplyTo::Particle(self.particle)
    }

    fn validate(&self, ps: &ParticleSystem) -> Result<(), DynamicsError> {
        ps.check_index(self.particle)?;
        ps.check_space_vec("plane normal", &self.normal)?;
        ps.check_space_vec("plane point", &self.point)?;
        let norm = self.normal.norm();
        if !(norm.is_finite() && norm > 0.0) {
            return Err(DynamicsError::DegenerateConstraint(format!(
                "plane normal must be finite and non-zero, got norm {norm}"
            )));
        }
        Ok(())
    }

    fn constraint_unchecked(&self, ps: &ParticleSystem, q: &QVec) -> f64 {
        let x = ps.particle_unchecked(q, self.particle);
        self.normal.dot(&(x - &self.point))
    }

    fn constraint_jac_unchecked(&self, ps: &ParticleSystem, _q: &QVec) -> QVec {
        scatter(ps, &[(self.particle, self.normal.clone())])
    }

    fn constraint_jac_dt_unchecked(&self, ps: &ParticleSystem, _q: &QVec, _qdot: &QVec) -> QVec {
        // Constant Jacobian.
        QVec::zeros(ps.q_len())
    }
}

#[cfg(test)]
mod tests {
    use super::PlanarConstraint;
    use crate::constraint::ConstraintFunction;
    use crate::forces::ZeroForce;
    use crate::particle_system::ParticleSystem;
    use crate::types::{QVec, SpaceVec};

    fn system() -> ParticleSystem {
        ParticleSystem::new(3, vec![1.0, 2.0], ZeroForce).expect("valid system")
    }

    #[test]
    fn residual_is_signed_distance_along_normal() {
        let ps = system();
        let plane = PlanarConstraint::new(
            &ps,
            1,
            SpaceVec::from_vec(vec![0.0, 0.0, 2.0]),
            SpaceVec::from_vec(vec![5.0, 5.0, 1.0]),
        )
        .expect("valid plane");
        let q = QVec::from_vec(vec![0.0, 0.0, 0.0, 1.0, -3.0, 4.0]);
        assert_eq!(plane.constraint_unchecked(&ps, &q), 6.0);
        assert_eq!(
            plane.constraint_jac_unchecked(&ps, &q).as_slice(),
            &[0.0, 0.0, 0.0, 0.0, 0.0, 2.0]
        );
        let qdot = QVec::from_element(6, 1.0);
        assert!(plane
            .constraint_jac_dt_unchecked(&ps, &q, &qdot)
            .iter()
            .all(|v| *v == 0.0));
    }

    #[test]
    fn zero_normal_is_rejected() {
        let ps = system();
        let err = PlanarConstraint::new(&ps, 0, SpaceVec::zeros(3), SpaceVec::zeros(3))
            .expect_err("zero normal");
        assert!(format!("{err}").contains("non-zero"));
        let err = PlanarConstraint::new(&ps, 0, SpaceVec::zeros(2), SpaceVec::zeros(3))
            .expect_err("short normal");
        assert!(format!("{err}").contains("plane normal"));
    }
}
