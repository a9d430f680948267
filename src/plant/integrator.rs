//! Fixed-step Runge-Kutta integration for scalar ODEs.
//!
//! The interval is split into equal sub-steps no longer than `max_step`; only the
//! state at the end of the interval is returned.

/// Right-hand side of `dy/dt = f(t, y)`.
pub trait ScalarOde {
    fn rhs(&self, t: f64, y: f64) -> f64;
}

/// Classical RK4 with sub-stepping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rk4 {
    pub max_step: f64,
}

impl Default for Rk4 {
    fn default() -> Self {
        Self { max_step: 0.1 }
    }
}

impl Rk4 {
    pub fn new(max_step: f64) -> Self {
        Self { max_step }
    }

    /// Number of equal sub-steps used to cover `span`.
    pub fn substeps(&self, span: f64) -> usize {
        if self.max_step <= 0.0 || !self.max_step.is_finite() {
            return 1;
        }
        ((span / self.max_step).ceil() as usize).max(1)
    }

    /// Integrate from `y0` over `[0, span]`.
    pub fn integrate<O: ScalarOde>(&self, ode: &O, y0: f64, span: f64) -> f64 {
        let n = self.substeps(span);
        let h = span / n as f64;
        let mut t = 0.0;
        let mut y = y0;
        for _ in 0..n {
            y = Self::step(ode, t, y, h);
            t += h;
        }
        y
    }

    #[inline]
    fn step<O: ScalarOde>(ode: &O, t: f64, y: f64, h: f64) -> f64 {
        let k1 = ode.rhs(t, y);
        let k2 = ode.rhs(t + 0.5 * h, y + 0.5 * h * k1);
        let k3 = ode.rhs(t + 0.5 * h, y + 0.5 * h * k2);
        let k4 = ode.rhs(t + h, y + h * k3);
        y + h / 6.0 * (k1 + 2.0 * k2 + 2.0 * k3 + k4)
    }
}
