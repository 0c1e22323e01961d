use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DynamicsError {
    #[error("Shape mismatch for {what}: expected length {expected}, got {actual}.")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid particle system: {0}")]
    InvalidParticleSystem(String),

    #[error("Particle index {index} is out of range for a system of {n_particles} particles.")]
    ParticleIndexOutOfRange { index: usize, n_particles: usize },

    #[error("Degenerate constraint: {0}")]
    DegenerateConstraint(String),

    #[error("Invalid integrator settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Step size fell to {step:e} at t = {t_reached}; integration cannot proceed.")]
    StepSizeTooSmall { t_reached: f64, step: f64 },

    #[error("Integration exceeded {max_steps} steps, stopped at t = {t_reached}.")]
    MaxStepsExceeded { t_reached: f64, max_steps: usize },

    #[error("State became non-finite after t = {t_reached}.")]
    NonFiniteState { t_reached: f64 },

    #[error("Linear solve failed: {0}")]
    LinearSolve(String),

    #[error("State derivative could not be evaluated after t = {t_reached}: {source}")]
    DerivativeFailed {
        t_reached: f64,
        #[source]
        source: Box<DynamicsError>,
    },
}

impl DynamicsError {
    pub(crate) fn shape(what: &'static str, expected: usize, actual: usize) -> Self {
        DynamicsError::ShapeMismatch {
            what,
            expected,
            actual,
        }
    }

    /// Furthest time successfully reached, for integration failures.
    pub fn t_reached(&self) -> Option<f64> {
        match self {
            DynamicsError::StepSizeTooSmall { t_reached, .. }
            | DynamicsError::MaxStepsExceeded { t_reached, .. }
            | DynamicsError::NonFiniteState { t_reached }
            | DynamicsError::DerivativeFailed { t_reached, .. } => Some(*t_reached),
            _ => None,
        }
    }

    pub fn is_integration_failure(&self) -> bool {
        self.t_reached().is_some()
    }
}
