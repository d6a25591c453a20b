//! 7-state visual Kalman filter
//!
//! State vector `(x, y, s, r, vx, vy, vs)` where `(x, y)` is the box
//! center, `s` the box area and `r` the aspect ratio. Constant velocity
//! in position and scale, constant ratio. Measurements are `(x, y, s, r)`.

use crate::rect::Rect;
use nalgebra::{SMatrix, SVector};

pub type StateVector = SVector<f32, 7>;
pub type StateMatrix = SMatrix<f32, 7, 7>;
pub type Measurement = SVector<f32, 4>;
pub type MeasurementMatrix = SMatrix<f32, 4, 7>;
pub type InnovationMatrix = SMatrix<f32, 4, 4>;

/// Calibrated noise for normalized-coordinate face boxes at 30 fps.
const MEASUREMENT_NOISE: [f32; 4] = [1e-4, 1e-4, 1e-3, 1e-2];
const PROCESS_NOISE: [f32; 7] = [1e-5, 1e-5, 1e-5, 1e-6, 1e-4, 1e-4, 1e-5];
const INITIAL_VARIANCE: [f32; 7] = [1e-2, 1e-2, 1e-2, 1e-2, 1.0, 1.0, 1.0];

#[derive(Debug, Clone)]
pub struct VisualKalmanFilter {
    pub x: StateVector,
    pub p: StateMatrix,
    a: StateMatrix,
    h: MeasurementMatrix,
    q: StateMatrix,
    r: InnovationMatrix,
    velocity_damping: f32,
    growth_damping: f32,
}

impl VisualKalmanFilter {
    /// Filter initialized at `rect` with zero velocities.
    ///
    /// `dt` is the step length in seconds; the damping arguments are the
    /// per-second decay bases, raised to `dt` internally.
    pub fn new(rect: Rect, dt: f32, velocity_damping: f32, growth_damping: f32) -> Self {
        let z = rect.to_z();
        let x = StateVector::from_column_slice(&[z[0], z[1], z[2], z[3], 0.0, 0.0, 0.0]);

        // A = I + dt * F, constant velocity in (x, y, s).
        let mut a = StateMatrix::identity();
        a[(0, 4)] = dt;
        a[(1, 5)] = dt;
        a[(2, 6)] = dt;

        let mut h = MeasurementMatrix::zeros();
        for i in 0..4 {
            h[(i, i)] = 1.0;
        }

        Self {
            x,
            p: StateMatrix::from_diagonal(&StateVector::from_column_slice(&INITIAL_VARIANCE)),
            a,
            h,
            q: StateMatrix::from_diagonal(&StateVector::from_column_slice(&PROCESS_NOISE)),
            r: InnovationMatrix::from_diagonal(&Measurement::from_column_slice(
                &MEASUREMENT_NOISE,
            )),
            velocity_damping: velocity_damping.powf(dt),
            growth_damping: growth_damping.powf(dt),
        }
    }

    /// Advance the state one time step.
    pub fn predict(&mut self) {
        // Clamp shrink rate when the step would take the area negative.
        if self.x[2] + self.a[(2, 6)] * self.x[6] <= 0.0 {
            self.x[6] = 0.0;
        }
        self.x = self.a * self.x;
        self.p = self.a * self.p * self.a.transpose() + self.q;
    }

    /// Fold in a measurement. A singular innovation covariance skips the
    /// update and leaves the state untouched.
    pub fn update(&mut self, z: Measurement) {
        let y = z - self.h * self.x;
        let s = self.h * self.p * self.h.transpose() + self.r;
        let Some(s_inv) = s.try_inverse() else {
            return;
        };
        let k = self.p * self.h.transpose() * s_inv;
        self.x += k * y;
        self.p = (StateMatrix::identity() - k * self.h) * self.p;
    }

    /// Current state as a rect. Width is NaN when `s * r < 0`, which
    /// marks the filter invalid; callers skip such tracks.
    pub fn rect(&self) -> Rect {
        Rect::from_z(&[self.x[0], self.x[1], self.x[2], self.x[3]])
    }

    /// Overwrite position and scale from a rect, keeping velocities.
    pub fn set_rect(&mut self, rect: Rect) {
        let z = rect.to_z();
        self.x[0] = z[0];
        self.x[1] = z[1];
        self.x[2] = z[2];
        self.x[3] = z[3];
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.x[4], self.x[5])
    }

    pub fn growth(&self) -> f32 {
        self.x[6]
    }

    /// Decay velocities and growth by the per-frame damping factors.
    pub fn damp(&mut self) {
        self.x[4] *= self.velocity_damping;
        self.x[5] *= self.velocity_damping;
        self.x[6] *= self.growth_damping;
    }

    /// Zero velocities and growth. Used when a track goes inactive so a
    /// stale motion model cannot carry the box away from its last
    /// observed position.
    pub fn deactivate(&mut self) {
        self.x[4] = 0.0;
        self.x[5] = 0.0;
        self.x[6] = 0.0;
    }

    pub fn is_valid(&self) -> bool {
        !self.rect().width.is_nan()
    }
}
