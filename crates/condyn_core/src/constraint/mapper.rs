use super::{Constraint, ConstraintFunction};
use crate::error::DynamicsError;
use crate::particle_system::ParticleSystem;
use crate::types::{ConstraintMatrix, ConstraintVec, QVec};

/// Stacks an ordered list of constraints into vector-valued functions.
///
/// Row `k` of every output belongs to `constraints()[k]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintMapper {
    constraints: Vec<Constraint>,
}

impl ConstraintMapper {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Validates every constraint against `ps`.
    pub fn validate(&self, ps: &ParticleSystem) -> Result<(), DynamicsError> {
        self.constraints.iter().try_for_each(|c| c.validate(ps))
    }

    pub fn constraint(&self, ps: &ParticleSystem, q: &QVec) -> Result<ConstraintVec, DynamicsError> {
        self.validate(ps)?;
        ps.check_q("q", q)?;
        Ok(self.constraint_unchecked(ps, q))
    }

    pub fn constraint_jac(
        &self,
        ps: &ParticleSystem,
        q: &QVec,
    ) -> Result<ConstraintMatrix, DynamicsError> {
        self.validate(ps)?;
        ps.check_q("q", q)?;
        Ok(self.constraint_jac_unchecked(ps, q))
    }

    pub fn constraint_jac_dt(
        &self,
        ps: &ParticleSystem,
        q: &QVec,
        qdot: &QVec,
    ) -> Result<ConstraintMatrix, DynamicsError> {
        self.validate(ps)?;
        ps.check_q("q", q)?;
        ps.check_q("qdot", qdot)?;
        Ok(self.constraint_jac_dt_unchecked(ps, q, qdot))
    }

    /// `constraint_jac(q) · qdot`.
    pub fn constraint_dt(
        &self,
        ps: &ParticleSystem,
        q: &QVec,
        qdot: &QVec,
    ) -> Result<ConstraintVec, DynamicsError> {
        ps.check_q("qdot", qdot)?;
        Ok(self.constraint_jac(ps, q)? * qdot)
    }

    pub(crate) fn constraint_unchecked(&self, ps: &ParticleSystem, q: &QVec) -> ConstraintVec {
        ConstraintVec::from_iterator(
            self.len(),
            self.constraints
                .iter()
                .map(|c| c.constraint_unchecked(ps, q)),
        )
    }

    pub(crate) fn constraint_jac_unchecked(
        &self,
        ps: &ParticleSystem,
        q: &QVec,
    ) -> ConstraintMatrix {
        self.stack_rows(ps, |c| c.constraint_jac_unchecked(ps, q))
    }

    pub(crate) fn constraint_jac_dt_unchecked(
        &self,
        ps: &ParticleSystem,
        q: &QVec,
        qdot: &QVec,
    ) -> ConstraintMatrix {
        self.stack_rows(ps, |c| c.constraint_jac_dt_unchecked(ps, q, qdot))
    }

    fn stack_rows(
        &self,
        ps: &ParticleSystem,
        row: impl Fn(&Constraint) -> QVec,
    ) -> ConstraintMatrix {
        let mut matrix = ConstraintMatrix::zeros(self.len(), ps.q_len());
        for (k, c) in self.constraints.iter().enumerate() {
            matrix.row_mut(k).tr_copy_from(&row(c));
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::ConstraintMapper;
    use crate::constraint::{CircleConstraint, CoupledCircleConstraint, PlanarConstraint};
    use crate::forces::ZeroForce;
    use crate::particle_system::ParticleSystem;
    use crate::types::{QVec, SpaceVec};

    fn v2(x: f64, y: f64) -> SpaceVec {
        SpaceVec::from_vec(vec![x, y])
    }

    fn setup() -> (ParticleSystem, ConstraintMapper) {
        let ps = ParticleSystem::new(2, vec![1.0, 1.0], ZeroForce).expect("valid system");
        let mapper = ConstraintMapper::new(vec![
            CircleConstraint::new(&ps, 0, v2(0.0, 0.0), 1.0)
                .expect("circle")
                .into(),
            CoupledCircleConstraint::new(&ps, 0, 1, 2.0)
                .expect("coupling")
                .into(),
            PlanarConstraint::new(&ps, 1, v2(0.0, 1.0), v2(0.0, 0.0))
                .expect("plane")
                .into(),
        ]);
        (ps, mapper)
    }

    #[test]
    fn outputs_follow_list_order() {
        let (ps, mapper) = setup();
        let q = QVec::from_vec(vec![1.0, 0.0, 3.0, 0.5]);
        let qdot = QVec::from_vec(vec![0.0, 1.0, 1.0, 0.0]);

        let c = mapper.constraint(&ps, &q).expect("values");
        assert_eq!(c.len(), 3);
        assert_eq!(c[0], 0.0);
        assert_eq!(c[1], 0.5 * (4.0 + 0.25 - 4.0));
        assert_eq!(c[2], 0.5);

        let jac = mapper.constraint_jac(&ps, &q).expect("jacobian");
        assert_eq!((jac.nrows(), jac.ncols()), (3, 4));
        assert_eq!(jac.row(0).iter().copied().collect::<Vec<_>>(), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(jac.row(1).iter().copied().collect::<Vec<_>>(), [-2.0, -0.5, 2.0, 0.5]);
        assert_eq!(jac.row(2).iter().copied().collect::<Vec<_>>(), [0.0, 0.0, 0.0, 1.0]);

        let jac_dt = mapper.constraint_jac_dt(&ps, &q, &qdot).expect("jacobian dot");
        assert_eq!(jac_dt.row(0).iter().copied().collect::<Vec<_>>(), [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(jac_dt.row(1).iter().copied().collect::<Vec<_>>(), [-1.0, 1.0, 1.0, -1.0]);
        assert!(jac_dt.row(2).iter().all(|v| *v == 0.0));

        let c_dt = mapper.constraint_dt(&ps, &q, &qdot).expect("rates");
        assert_eq!(c_dt.as_slice(), &[0.0, 1.5, 0.0]);
    }

    #[test]
    fn empty_mapper_yields_empty_outputs() {
        let ps = ParticleSystem::new(3, vec![1.0], ZeroForce).expect("valid system");
        let mapper = ConstraintMapper::default();
        assert!(mapper.is_empty());
        let q = QVec::zeros(3);
        assert_eq!(mapper.constraint(&ps, &q).expect("values").len(), 0);
        let jac = mapper.constraint_jac(&ps, &q).expect("jacobian");
        assert_eq!((jac.nrows(), jac.ncols()), (0, 3));
    }

    #[test]
    fn mapper_checks_shapes_and_systems() {
        let (ps, mapper) = setup();
        let err = mapper
            .constraint_dt(&ps, &QVec::zeros(4), &QVec::zeros(2))
            .expect_err("short qdot");
        assert!(format!("{err}").contains("qdot"));

        let single = ParticleSystem::new(2, vec![1.0], ZeroForce).expect("valid system");
        let err = mapper
            .constraint(&single, &QVec::zeros(2))
            .expect_err("constraints reference particle 1");
        assert!(format!("{err}").contains("out of range"));
    }
}
