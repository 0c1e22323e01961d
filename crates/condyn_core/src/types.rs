//! Semantic names for the vectors and matrices passed around the solver.
//!
//! All of them are dynamically sized `nalgebra` types; the aliases only
//! document which layout a value is expected to have.

use nalgebra::{DMatrix, DVector};

/// Generalized position or velocity, length `n_particles * dim`.
pub type QVec = DVector<f64>;

/// Combined state `[q, qdot]`, length `2 * n_particles * dim`.
pub type SimVec = DVector<f64>;

/// Position or velocity of a single particle, length `dim`.
pub type SpaceVec = DVector<f64>;

/// Per-particle view of a `QVec`: one row per particle, `dim` columns.
pub type SpaceVecs = DMatrix<f64>;

/// Square matrix acting on `QVec`s.
pub type QMatrix = DMatrix<f64>;

/// One scalar per constraint, in mapper order.
pub type ConstraintVec = DVector<f64>;

/// Stacked constraint rows, `num_constraints × (n_particles * dim)`.
pub type ConstraintMatrix = DMatrix<f64>;
