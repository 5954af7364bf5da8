//! Constant-velocity Kalman filter over `(cx, cy, aspect, height)` boxes.
//!
//! State is 8-dimensional: the four measured quantities followed by their
//! velocities. Fixed-size nalgebra matrices keep everything on the stack.

use nalgebra::{SMatrix, SVector};

pub type StateMean = SVector<f64, 8>;
pub type StateCovariance = SMatrix<f64, 8, 8>;
type Measurement = SVector<f64, 4>;
type MeasurementCovariance = SMatrix<f64, 4, 4>;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: StateCovariance,
    update_mat: SMatrix<f64, 4, 8>,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut motion_mat = StateCovariance::identity();
        let mut update_mat = SMatrix::<f64, 4, 8>::zeros();
        for i in 0..4 {
            motion_mat[(i, 4 + i)] = 1.0;
            update_mat[(i, i)] = 1.0;
        }

        Self {
            motion_mat,
            update_mat,
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    pub fn initiate(&self, measurement: [f32; 4]) -> (StateMean, StateCovariance) {
        let mut mean = StateMean::zeros();
        for (i, value) in measurement.iter().enumerate() {
            mean[i] = *value as f64;
        }

        let h = mean[3];
        let pos = 2.0 * self.std_weight_position * h;
        let vel = 10.0 * self.std_weight_velocity * h;
        let std = SVector::<f64, 8>::from([pos, pos, 1e-2, pos, vel, vel, 1e-5, vel]);

        (mean, StateCovariance::from_diagonal(&std.component_mul(&std)))
    }

    pub fn predict(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (StateMean, StateCovariance) {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let vel = self.std_weight_velocity * h;
        let std = SVector::<f64, 8>::from([pos, pos, 1e-2, pos, vel, vel, 1e-5, vel]);
        let motion_cov = StateCovariance::from_diagonal(&std.component_mul(&std));

        let new_mean = self.motion_mat * mean;
        let new_covariance = self.motion_mat * covariance * self.motion_mat.transpose() + motion_cov;
        (new_mean, new_covariance)
    }

    fn project(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (Measurement, MeasurementCovariance) {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let std = Measurement::from([pos, pos, 1e-1, pos]);
        let innovation_cov = MeasurementCovariance::from_diagonal(&std.component_mul(&std));

        let projected_mean = self.update_mat * mean;
        let projected_cov =
            self.update_mat * covariance * self.update_mat.transpose() + innovation_cov;
        (projected_mean, projected_cov)
    }

    /// Correct the state with a new measurement.
    ///
    /// A singular innovation covariance leaves the state untouched; it only
    /// occurs for degenerate zero-height boxes.
    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurement: [f32; 4],
    ) -> (StateMean, StateCovariance) {
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let Some(s_inv) = projected_cov.try_inverse() else {
            log::warn!("singular innovation covariance, skipping Kalman update");
            return (*mean, *covariance);
        };

        let measurement = Measurement::from(measurement.map(f64::from));
        let innovation = measurement - projected_mean;
        let kalman_gain = covariance * self.update_mat.transpose() * s_inv;

        let new_mean = mean + kalman_gain * innovation;
        let new_covariance = covariance - kalman_gain * projected_cov * kalman_gain.transpose();
        (new_mean, new_covariance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate([100.0, 200.0, 0.5, 50.0]);
        assert_eq!(mean[0], 100.0);
        assert_eq!(mean[4], 0.0);
        assert!(cov[(0, 0)] > 0.0);
        assert_eq!(cov[(0, 1)], 0.0);
    }

    #[test]
    fn test_update_pulls_towards_measurement() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate([100.0, 100.0, 1.0, 50.0]);
        let (mean, cov) = kf.predict(&mean, &cov);
        let (updated, _) = kf.update(&mean, &cov, [110.0, 100.0, 1.0, 50.0]);
        assert!(updated[0] > 100.0 && updated[0] < 110.0);
    }
}
