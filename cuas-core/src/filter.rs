//! Per-track position smoothing: a 2-D Kalman filter over lat/lon with a
//! scalar-diagonal covariance, and a cheaper alpha-beta alternative for
//! scalar channels. Both fuse noisy position measurements into a smoothed
//! `[x, y, vx, vy]` state estimate.

use nalgebra::Vector4;

/// Process/measurement noise configuration shared by both filter kinds.
#[derive(Debug, Clone, Copy)]
pub struct FilterConfig {
    pub process_noise: f64,
    pub measurement_noise: f64,
    /// Fallback `Δt` (seconds) used by `update` when no true elapsed time
    /// is supplied, derived from the Track Manager's `update_rate_hz`.
    pub base_dt: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { process_noise: 0.1, measurement_noise: 1.0, base_dt: 0.1 }
    }
}

/// A 2-D Kalman filter with state `[x, y, vx, vy]` and a scalar-diagonal
/// covariance (one variance per state component rather than a full 4x4
/// matrix) -- sufficient fidelity for the correlation/smoothing role this
/// filter plays, at a fraction of the bookkeeping of a coupled filter.
#[derive(Debug, Clone)]
pub struct KalmanFilter2D {
    config: FilterConfig,
    state: Vector4<f64>,
    covariance: Vector4<f64>,
}

const INITIAL_POS_VARIANCE: f64 = 20.0;
const INITIAL_VEL_VARIANCE: f64 = 4.0;

impl KalmanFilter2D {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            state: Vector4::zeros(),
            covariance: Vector4::new(
                INITIAL_POS_VARIANCE,
                INITIAL_POS_VARIANCE,
                INITIAL_VEL_VARIANCE,
                INITIAL_VEL_VARIANCE,
            ),
        }
    }

    /// Resets the filter to a fresh measurement with zero velocity and the
    /// initial covariance. Used both for the first measurement of a new
    /// track and to recover from a degenerate (NaN) state.
    pub fn initialize(&mut self, x: f64, y: f64) {
        self.state = Vector4::new(x, y, 0.0, 0.0);
        self.covariance = Vector4::new(
            INITIAL_POS_VARIANCE,
            INITIAL_POS_VARIANCE,
            INITIAL_VEL_VARIANCE,
            INITIAL_VEL_VARIANCE,
        );
    }

    pub fn position(&self) -> (f64, f64) {
        (self.state.x, self.state.y)
    }

    pub fn velocity(&self) -> (f64, f64) {
        (self.state.z, self.state.w)
    }

    pub fn is_degenerate(&self) -> bool {
        self.state.iter().any(|v| v.is_nan()) || self.covariance.iter().any(|v| v.is_nan())
    }

    /// Propagates the mean by the current velocity estimate and inflates
    /// the diagonal covariance by `Q * dt^2`.
    pub fn predict(&mut self, dt: f64) {
        self.state.x += self.state.z * dt;
        self.state.y += self.state.w * dt;
        let inflate = self.config.process_noise * dt * dt;
        self.covariance.add_scalar_mut(inflate);
    }

    /// Corrects the filter against a new raw measurement. `dt` is the
    /// elapsed time since the previous update, used to estimate velocity
    /// from the position innovation; callers fall back to
    /// `config.base_dt` when no true elapsed time is known (e.g. the very
    /// first update after `initialize`).
    pub fn update(&mut self, meas_x: f64, meas_y: f64, dt: f64) {
        let dt = if dt > 0.0 { dt } else { self.config.base_dt };
        let r = self.config.measurement_noise;

        let (k_x, k_y) = (
            self.covariance.x / (self.covariance.x + r),
            self.covariance.y / (self.covariance.y + r),
        );

        let innovation_x = meas_x - self.state.x;
        let innovation_y = meas_y - self.state.y;

        self.state.x += k_x * innovation_x;
        self.state.y += k_y * innovation_y;
        self.state.z = innovation_x / dt;
        self.state.w = innovation_y / dt;

        self.covariance.x *= 1.0 - k_x;
        self.covariance.y *= 1.0 - k_y;
    }
}

/// Alpha-beta filter, a cheaper scalar-channel alternative to the Kalman
/// filter above. Tracks `(position, velocity)` per axis with fixed gains
/// rather than a computed Kalman gain.
#[derive(Debug, Clone, Copy)]
pub struct AlphaBetaFilter2D {
    alpha: f64,
    beta: f64,
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
}

impl Default for AlphaBetaFilter2D {
    fn default() -> Self {
        Self::new(0.85, 0.005)
    }
}

impl AlphaBetaFilter2D {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta, x: 0.0, y: 0.0, vx: 0.0, vy: 0.0 }
    }

    pub fn initialize(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
        self.vx = 0.0;
        self.vy = 0.0;
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn velocity(&self) -> (f64, f64) {
        (self.vx, self.vy)
    }

    pub fn predict(&mut self, dt: f64) {
        self.x += self.vx * dt;
        self.y += self.vy * dt;
    }

    pub fn update(&mut self, meas_x: f64, meas_y: f64, dt: f64) {
        let dt = if dt > 0.0 { dt } else { 0.1 };
        let residual_x = meas_x - self.x;
        let residual_y = meas_y - self.y;

        self.x += self.alpha * residual_x;
        self.y += self.alpha * residual_y;
        self.vx += self.beta * residual_x / dt;
        self.vy += self.beta * residual_y / dt;
    }
}

/// Either smoothing strategy, selected per Track Manager config.
#[derive(Debug, Clone)]
pub enum SmoothingFilter {
    Kalman(KalmanFilter2D),
    AlphaBeta(AlphaBetaFilter2D),
    /// Raw pass-through: used when `enable_kalman_filter = false`.
    Passthrough { x: f64, y: f64, vx: f64, vy: f64 },
}

impl SmoothingFilter {
    pub fn new_kalman(config: FilterConfig) -> Self {
        Self::Kalman(KalmanFilter2D::new(config))
    }

    pub fn new_alpha_beta() -> Self {
        Self::AlphaBeta(AlphaBetaFilter2D::default())
    }

    pub fn new_passthrough() -> Self {
        Self::Passthrough { x: 0.0, y: 0.0, vx: 0.0, vy: 0.0 }
    }

    pub fn initialize(&mut self, x: f64, y: f64) {
        match self {
            Self::Kalman(f) => f.initialize(x, y),
            Self::AlphaBeta(f) => f.initialize(x, y),
            Self::Passthrough { x: sx, y: sy, vx, vy } => {
                *sx = x;
                *sy = y;
                *vx = 0.0;
                *vy = 0.0;
            }
        }
    }

    pub fn predict(&mut self, dt: f64) {
        match self {
            Self::Kalman(f) => f.predict(dt),
            Self::AlphaBeta(f) => f.predict(dt),
            Self::Passthrough { .. } => {}
        }
    }

    pub fn update(&mut self, meas_x: f64, meas_y: f64, dt: f64) {
        match self {
            Self::Kalman(f) => f.update(meas_x, meas_y, dt),
            Self::AlphaBeta(f) => f.update(meas_x, meas_y, dt),
            Self::Passthrough { x, y, vx, vy } => {
                let dt = if dt > 0.0 { dt } else { 0.1 };
                *vx = (meas_x - *x) / dt;
                *vy = (meas_y - *y) / dt;
                *x = meas_x;
                *y = meas_y;
            }
        }
    }

    pub fn position(&self) -> (f64, f64) {
        match self {
            Self::Kalman(f) => f.position(),
            Self::AlphaBeta(f) => f.position(),
            Self::Passthrough { x, y, .. } => (*x, *y),
        }
    }

    pub fn velocity(&self) -> (f64, f64) {
        match self {
            Self::Kalman(f) => f.velocity(),
            Self::AlphaBeta(f) => f.velocity(),
            Self::Passthrough { vx, vy, .. } => (*vx, *vy),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        match self {
            Self::Kalman(f) => f.is_degenerate(),
            Self::AlphaBeta(f) => f.position().0.is_nan() || f.position().1.is_nan(),
            Self::Passthrough { x, y, .. } => x.is_nan() || y.is_nan(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn kalman_initialize_resets_state() {
        let mut f = KalmanFilter2D::new(FilterConfig::default());
        f.initialize(34.05, -118.24);
        assert_eq!(f.position(), (34.05, -118.24));
        assert_eq!(f.velocity(), (0.0, 0.0));
    }

    #[test]
    fn kalman_update_moves_toward_measurement() {
        let mut f = KalmanFilter2D::new(FilterConfig::default());
        f.initialize(0.0, 0.0);
        f.update(1.0, 1.0, 0.5);
        let (x, y) = f.position();
        assert!(x > 0.0 && x < 1.0);
        assert!(y > 0.0 && y < 1.0);
    }

    #[test]
    fn kalman_converges_to_repeated_identical_measurement() {
        let mut f = KalmanFilter2D::new(FilterConfig::default());
        f.initialize(0.0, 0.0);
        for _ in 0..50 {
            f.update(10.0, 5.0, 0.1);
        }
        let (x, y) = f.position();
        assert_relative_eq!(x, 10.0, epsilon = 0.5);
        assert_relative_eq!(y, 5.0, epsilon = 0.5);
    }

    #[test]
    fn alpha_beta_tracks_constant_velocity_target() {
        let mut f = AlphaBetaFilter2D::default();
        f.initialize(0.0, 0.0);
        let mut true_x = 0.0;
        for _ in 0..100 {
            true_x += 1.0;
            f.predict(1.0);
            f.update(true_x, 0.0, 1.0);
        }
        let (x, _) = f.position();
        assert_relative_eq!(x, true_x, epsilon = 5.0);
    }

    #[test]
    fn passthrough_reports_raw_measurement() {
        let mut f = SmoothingFilter::new_passthrough();
        f.initialize(1.0, 2.0);
        f.update(3.0, 4.0, 1.0);
        assert_eq!(f.position(), (3.0, 4.0));
    }
}
