use crate::error::DynamicsError;
use crate::forces::{ForceLaw, SurfaceGravity};
use crate::types::{QMatrix, QVec, SimVec, SpaceVec, SpaceVecs};
use std::fmt;

/// Fixed description of N point particles living in a `dim`-dimensional space.
///
/// Positions and velocities are flat vectors laid out particle by particle:
/// particle `i` occupies entries `i * dim .. (i + 1) * dim`.
pub struct ParticleSystem {
    dim: usize,
    masses: Vec<f64>,
    inverse_masses: QVec,
    force: Box<dyn ForceLaw>,
}

impl fmt::Debug for ParticleSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleSystem")
            .field("dim", &self.dim)
            .field("masses", &self.masses)
            .finish_non_exhaustive()
    }
}

impl ParticleSystem {
    pub fn new(
        dim: usize,
        masses: Vec<f64>,
        force: impl ForceLaw + 'static,
    ) -> Result<Self, DynamicsError> {
        if dim == 0 {
            return Err(DynamicsError::InvalidParticleSystem(
                "dimension must be positive".to_string(),
            ));
        }
        if masses.is_empty() {
            return Err(DynamicsError::InvalidParticleSystem(
                "at least one particle is required".to_string(),
            ));
        }
        if let Some((index, mass)) = masses
            .iter()
            .enumerate()
            .find(|(_, m)| !(m.is_finite() && **m > 0.0))
        {
            return Err(DynamicsError::InvalidParticleSystem(format!(
                "mass of particle {index} must be positive and finite, got {mass}"
            )));
        }

        let inverse_masses = QVec::from_iterator(
            masses.len() * dim,
            masses.iter().flat_map(|m| std::iter::repeat(1.0 / m).take(dim)),
        );

        Ok(Self {
            dim,
            masses,
            inverse_masses,
            force: Box::new(force),
        })
    }

    /// Particles under uniform gravity `g` along the negative second axis.
    pub fn with_surface_gravity(dim: usize, masses: Vec<f64>, g: f64) -> Result<Self, DynamicsError> {
        let gravity = SurfaceGravity::new(g, &masses, dim)?;
        Self::new(dim, masses, gravity)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn n_particles(&self) -> usize {
        self.masses.len()
    }

    /// Length of a generalized position or velocity vector.
    pub fn q_len(&self) -> usize {
        self.n_particles() * self.dim
    }

    /// Length of a combined `[q, qdot]` state.
    pub fn y_len(&self) -> usize {
        2 * self.q_len()
    }

    pub(crate) fn check_q(&self, what: &'static str, v: &QVec) -> Result<(), DynamicsError> {
        if v.len() != self.q_len() {
            return Err(DynamicsError::shape(what, self.q_len(), v.len()));
        }
        Ok(())
    }

    pub(crate) fn check_index(&self, index: usize) -> Result<(), DynamicsError> {
        if index >= self.n_particles() {
            return Err(DynamicsError::ParticleIndexOutOfRange {
                index,
                n_particles: self.n_particles(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_space_vec(
        &self,
        what: &'static str,
        v: &SpaceVec,
    ) -> Result<(), DynamicsError> {
        if v.len() != self.dim {
            return Err(DynamicsError::shape(what, self.dim, v.len()));
        }
        Ok(())
    }

    fn check_y(&self, y: &SimVec) -> Result<(), DynamicsError> {
        if y.len() % 2 != 0 || y.len() != self.y_len() {
            return Err(DynamicsError::shape("y", self.y_len(), y.len()));
        }
        Ok(())
    }

    pub fn y_to_q(&self, y: &SimVec) -> Result<QVec, DynamicsError> {
        self.check_y(y)?;
        Ok(y.rows(0, self.q_len()).into_owned())
    }

    pub fn y_to_qdot(&self, y: &SimVec) -> Result<QVec, DynamicsError> {
        self.check_y(y)?;
        Ok(y.rows(self.q_len(), self.q_len()).into_owned())
    }

    pub fn y_to_qqdot(&self, y: &SimVec) -> Result<(QVec, QVec), DynamicsError> {
        Ok((self.y_to_q(y)?, self.y_to_qdot(y)?))
    }

    pub fn qqdot_to_y(&self, q: &QVec, qdot: &QVec) -> Result<SimVec, DynamicsError> {
        self.check_q("q", q)?;
        self.check_q("qdot", qdot)?;
        let n = self.q_len();
        let mut y = SimVec::zeros(2 * n);
        y.rows_mut(0, n).copy_from(q);
        y.rows_mut(n, n).copy_from(qdot);
        Ok(y)
    }

    /// Reshapes `q` into one row per particle.
    pub fn q_to_xs(&self, q: &QVec) -> Result<SpaceVecs, DynamicsError> {
        self.check_q("q", q)?;
        Ok(SpaceVecs::from_row_slice(
            self.n_particles(),
            self.dim,
            q.as_slice(),
        ))
    }

    pub fn xs_to_q(&self, xs: &SpaceVecs) -> Result<QVec, DynamicsError> {
        if xs.nrows() != self.n_particles() {
            return Err(DynamicsError::shape(
                "xs rows",
                self.n_particles(),
                xs.nrows(),
            ));
        }
        if xs.ncols() != self.dim {
            return Err(DynamicsError::shape("xs columns", self.dim, xs.ncols()));
        }
        // The transpose is stored column-major, i.e. particle by particle.
        Ok(QVec::from_column_slice(xs.transpose().as_slice()))
    }

    /// The `dim` entries of `q` belonging to particle `index`.
    pub fn particle(&self, q: &QVec, index: usize) -> Result<SpaceVec, DynamicsError> {
        self.check_q("q", q)?;
        self.check_index(index)?;
        Ok(self.particle_unchecked(q, index))
    }

    pub(crate) fn particle_unchecked(&self, q: &QVec, index: usize) -> SpaceVec {
        q.rows(index * self.dim, self.dim).into_owned()
    }

    /// Diagonal inverse mass matrix. Only the layout of `q` matters, not its values.
    pub fn inverse_mass(&self, q: &QVec) -> Result<QMatrix, DynamicsError> {
        self.check_q("q", q)?;
        Ok(QMatrix::from_diagonal(&self.inverse_masses))
    }

    /// Diagonal of [`Self::inverse_mass`].
    pub fn inverse_mass_diagonal(&self) -> &QVec {
        &self.inverse_masses
    }

    /// Evaluates the external force law, checking the shape of its output.
    pub fn force(&self, q: &QVec, qdot: &QVec) -> Result<QVec, DynamicsError> {
        self.check_q("q", q)?;
        self.check_q("qdot", qdot)?;
        let f = self.force.force(q, qdot);
        self.check_q("force", &f)?;
        Ok(f)
    }
}
