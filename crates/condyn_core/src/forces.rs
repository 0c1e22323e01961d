use crate::error::DynamicsError;
use crate::types::QVec;

/// External force acting on the particles.
///
/// Implementations must be pure: the simulator evaluates the law several times
/// per integrator step, at trial states that may later be rejected. The
/// returned vector has the same length as `q`.
pub trait ForceLaw {
    fn force(&self, q: &QVec, qdot: &QVec) -> QVec;
}

impl<F> ForceLaw for F
where
    F: Fn(&QVec, &QVec) -> QVec,
{
    fn force(&self, q: &QVec, qdot: &QVec) -> QVec {
        self(q, qdot)
    }
}

/// No external force.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroForce;

impl ForceLaw for ZeroForce {
    fn force(&self, q: &QVec, _qdot: &QVec) -> QVec {
        QVec::zeros(q.len())
    }
}

/// Uniform gravity of strength `g` pulling every particle towards negative
/// values of its second coordinate, scaled by the particle's mass.
#[derive(Debug, Clone)]
pub struct SurfaceGravity {
    weights: QVec,
}

impl SurfaceGravity {
    pub fn new(g: f64, masses: &[f64], dim: usize) -> Result<Self, DynamicsError> {
        if dim < 2 {
            return Err(DynamicsError::InvalidParticleSystem(format!(
                "surface gravity acts along the second axis and needs dim >= 2, got {dim}"
            )));
        }
        if !g.is_finite() {
            return Err(DynamicsError::InvalidParticleSystem(
                "gravitational acceleration must be finite".to_string(),
            ));
        }

        let mut weights = QVec::zeros(masses.len() * dim);
        for (i, &m) in masses.iter().enumerate() {
            weights[i * dim + 1] = -g * m;
        }
        Ok(Self { weights })
    }
}

impl ForceLaw for SurfaceGravity {
    fn force(&self, _q: &QVec, _qdot: &QVec) -> QVec {
        self.weights.clone()
    }
}
