//! The `condyn_core` crate simulates point particles held to holonomic
//! constraints with Lagrange multipliers and Baumgarte stabilization.
//!
//! Key components:
//! - **ParticleSystem**: masses, dimension, external force law, and the
//!   conversions between flat state vectors and per-particle views.
//! - **Constraints**: circle, coupled circle and planar constraints, stacked
//!   by a `ConstraintMapper` into residuals and Jacobians.
//! - **Simulator**: solves for the multipliers, builds the constrained
//!   acceleration and integrates it (adaptive Tsit5 or fixed-step RK4).
//! - **Scenario**: serde-friendly descriptors that build a `Simulator`.

pub mod constraint;
pub mod error;
pub mod forces;
pub mod integration;
pub mod particle_system;
pub mod scenario;
pub mod simulation;
pub mod solvers;
pub mod traits;
pub mod types;

pub use constraint::{
    CircleConstraint, Constraint, ConstraintMapper, CoupledCircleConstraint, PlanarConstraint,
};
pub use error::DynamicsError;
pub use particle_system::ParticleSystem;
pub use simulation::{Simulator, StabilizationGains, Trajectory, TrajectoryPoint};
