use crate::traits::{DynamicalSystem, Scalar, Steppable};

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::lit(0.5);
        let sixth = T::lit(1.0 / 6.0);
        let two = T::lit(2.0);
        let t0 = *t;

        system.apply(t0, state, &mut self.k1);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Tsitouras 5(4) embedded pair.
///
/// The fifth-order solution is propagated; the difference to the embedded
/// fourth-order solution is the local error estimate. The last stage is
/// evaluated at the new state, so on acceptance it doubles as the first stage
/// of the next step.
pub struct Tsit5<T: Scalar> {
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Tsit5<T> {
    /// Order of the embedded error estimator.
    pub const ERROR_ORDER: i32 = 4;

    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            tmp: vec![z; dim],
        }
    }

    /// Takes a trial step of size `dt` from `(t0, y0)`.
    ///
    /// `f0` must hold `f(t0, y0)`. On return `y1` holds the new state, `f1`
    /// holds `f(t0 + dt, y1)` and `err` the componentwise error estimate.
    /// Nothing is committed; the caller decides whether to accept.
    #[allow(clippy::too_many_arguments)]
    pub fn attempt(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t0: T,
        y0: &[T],
        f0: &[T],
        dt: T,
        y1: &mut [T],
        f1: &mut [T],
        err: &mut [T],
    ) {
        let c2 = T::lit(0.161);
        let c3 = T::lit(0.327);
        let c4 = T::lit(0.9);
        let c5 = T::lit(0.9800255409045097);

        let a21 = T::lit(0.161);

        let a31 = T::lit(-0.008480655492356989);
        let a32 = T::lit(0.335480655492357);

        let a41 = T::lit(2.898);
        let a42 = T::lit(-6.359447987781783);
        let a43 = T::lit(4.361447987781783);

        let a51 = T::lit(5.325864858437957);
        let a52 = T::lit(-11.748883564062828);
        let a53 = T::lit(7.495539342889693);
        let a54 = T::lit(-0.09249506636030195);

        let a61 = T::lit(5.86145544294642);
        let a62 = T::lit(-12.92096931784711);
        let a63 = T::lit(8.159367898576159);
        let a64 = T::lit(-0.071584973281401);
        let a65 = T::lit(-0.02826857949054663);

        // 5th order weights (row 7 of the tableau)
        let b1 = T::lit(0.09646076681806523);
        let b2 = T::lit(0.01);
        let b3 = T::lit(0.4798896504144996);
        let b4 = T::lit(1.379008574103742);
        let b5 = T::lit(-3.290069515436099);
        let b6 = T::lit(2.324710524099774);

        // b - b_hat
        let e1 = T::lit(-0.00178001105222577714);
        let e2 = T::lit(-0.0008164344596567469);
        let e3 = T::lit(0.007880878010261995);
        let e4 = T::lit(-0.1447110071732629);
        let e5 = T::lit(0.5823571654525552);
        let e6 = T::lit(-0.45808210592918697);
        let e7 = T::lit(1.0 / 66.0);

        let n = y0.len();

        for i in 0..n {
            self.tmp[i] = y0[i] + dt * (a21 * f0[i]);
        }
        system.apply(t0 + c2 * dt, &self.tmp, &mut self.k2);

        for i in 0..n {
            self.tmp[i] = y0[i] + dt * (a31 * f0[i] + a32 * self.k2[i]);
        }
        system.apply(t0 + c3 * dt, &self.tmp, &mut self.k3);

        for i in 0..n {
            self.tmp[i] = y0[i] + dt * (a41 * f0[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        system.apply(t0 + c4 * dt, &self.tmp, &mut self.k4);

        for i in 0..n {
            self.tmp[i] = y0[i]
                + dt * (a51 * f0[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        system.apply(t0 + c5 * dt, &self.tmp, &mut self.k5);

        for i in 0..n {
            self.tmp[i] = y0[i]
                + dt * (a61 * f0[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k6);

        for i in 0..n {
            y1[i] = y0[i]
                + dt * (b1 * f0[i]
                    + b2 * self.k2[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }
        system.apply(t0 + dt, y1, f1);

        for i in 0..n {
            err[i] = dt
                * (e1 * f0[i]
                    + e2 * self.k2[i]
                    + e3 * self.k3[i]
                    + e4 * self.k4[i]
                    + e5 * self.k5[i]
                    + e6 * self.k6[i]
                    + e7 * f1[i]);
        }
    }
}
