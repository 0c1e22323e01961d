use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Numeric type the integrators are written against.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {
    /// Converts an f64 literal, yielding NaN if the type cannot represent it.
    fn lit(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }
}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A first-order system of ODEs `dy/dt = f(t, y)`.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the length of the state vector `y`.
    fn dimension(&self) -> usize;

    /// Evaluates the right-hand side.
    /// t: current time
    /// x: current state
    /// out: buffer receiving dy/dt
    ///
    /// Implementations that cannot evaluate a state write NaN into `out`;
    /// integrators treat a non-finite derivative as a failed step.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A fixed-step one-step method.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}
