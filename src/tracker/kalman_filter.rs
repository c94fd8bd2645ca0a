//! Constant-velocity Kalman filter over bounding boxes, using ndarray for the
//! state algebra and nalgebra for the innovation inverse.
//!
//! State is `[cx, cy, s, r, vcx, vcy, vs]` where `s` is the box area and `r`
//! its aspect ratio. The aspect ratio carries no velocity term. Only the first
//! four components are observed.

use ndarray::{Array1, Array2, s};

use crate::tracker::rect::Rect;

const DIM_X: usize = 7;
const DIM_Z: usize = 4;

/// Motion predictor owned by a single track.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    /// State estimate `[cx, cy, s, r, vcx, vcy, vs]`.
    x: Array1<f64>,
    /// Error covariance of `x`.
    p: Array2<f64>,
    motion_mat: Array2<f64>,
    update_mat: Array2<f64>,
    process_noise: Array2<f64>,
    measurement_noise: Array2<f64>,
    /// Predict steps taken since creation.
    pub age: u32,
    /// Predict steps since the last correction.
    pub time_since_update: u32,
    /// Corrections applied since creation.
    pub hits: u32,
    /// Consecutive frames with a correction.
    pub hit_streak: u32,
}

impl KalmanFilter {
    /// Seed a filter from an observed box. Velocities start at zero with a
    /// covariance far wider than the position channels.
    pub fn new(bbox: &Rect) -> Self {
        let mut motion_mat = Array2::<f64>::eye(DIM_X);
        for i in 0..3 {
            motion_mat[[i, DIM_Z + i]] = 1.0;
        }

        let mut update_mat = Array2::<f64>::zeros((DIM_Z, DIM_X));
        for i in 0..DIM_Z {
            update_mat[[i, i]] = 1.0;
        }

        let mut measurement_noise = Array2::<f64>::eye(DIM_Z);
        measurement_noise
            .slice_mut(s![2.., 2..])
            .mapv_inplace(|v| v * 10.0);

        let mut p = Array2::<f64>::eye(DIM_X);
        p.slice_mut(s![4.., 4..]).mapv_inplace(|v| v * 1000.0);
        p *= 10.0;

        let mut process_noise = Array2::<f64>::eye(DIM_X);
        process_noise[[DIM_X - 1, DIM_X - 1]] *= 0.01;
        process_noise
            .slice_mut(s![4.., 4..])
            .mapv_inplace(|v| v * 0.01);

        let mut x = Array1::<f64>::zeros(DIM_X);
        for (i, v) in bbox.to_xysr().into_iter().enumerate() {
            x[i] = v;
        }

        Self {
            x,
            p,
            motion_mat,
            update_mat,
            process_noise,
            measurement_noise,
            age: 0,
            time_since_update: 0,
            hits: 0,
            hit_streak: 0,
        }
    }

    /// Advance the state one frame and return the predicted box.
    pub fn predict(&mut self) -> Rect {
        // Area must not be driven non-positive by its own velocity.
        if self.x[6] + self.x[2] <= 0.0 {
            self.x[6] = 0.0;
        }

        self.x = self.motion_mat.dot(&self.x);
        self.p = self.motion_mat.dot(&self.p).dot(&self.motion_mat.t()) + &self.process_noise;

        self.age += 1;
        if self.time_since_update > 0 {
            self.hit_streak = 0;
        }
        self.time_since_update += 1;

        self.state()
    }

    /// Correct the state with an observed box.
    ///
    /// Returns the corrected box, or `None` if the innovation covariance is
    /// singular, in which case the filter is left untouched.
    pub fn update(&mut self, bbox: &Rect) -> Option<Rect> {
        let z = Array1::from_vec(bbox.to_xysr().to_vec());

        let innovation = z - self.update_mat.dot(&self.x);
        let pht = self.p.dot(&self.update_mat.t()); // 7x4
        let innovation_cov = self.update_mat.dot(&pht) + &self.measurement_noise;
        let s_inv = invert_4x4(&innovation_cov)?;

        let kalman_gain = pht.dot(&s_inv); // 7x4

        // Joseph form keeps the covariance symmetric positive semi-definite.
        let i_kh = Array2::<f64>::eye(DIM_X) - kalman_gain.dot(&self.update_mat);
        let new_p = i_kh.dot(&self.p).dot(&i_kh.t())
            + kalman_gain
                .dot(&self.measurement_noise)
                .dot(&kalman_gain.t());

        self.x = &self.x + &kalman_gain.dot(&innovation);
        self.p = new_p;

        self.time_since_update = 0;
        self.hits += 1;
        self.hit_streak += 1;

        Some(self.state())
    }

    /// Current box estimate decoded from the state.
    pub fn state(&self) -> Rect {
        Rect::from_xysr(self.x[0], self.x[1], self.x[2], self.x[3])
    }

    /// Raw state vector `[cx, cy, s, r, vcx, vcy, vs]`.
    pub fn mean(&self) -> &Array1<f64> {
        &self.x
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.p
    }
}

/// Invert a 4x4 matrix using nalgebra (pure Rust).
fn invert_4x4(m: &Array2<f64>) -> Option<Array2<f64>> {
    let nm = nalgebra::Matrix4::from_fn(|i, j| m[[i, j]]);
    let inv = nm.try_inverse()?;
    if inv.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Array2::from_shape_fn((4, 4), |(i, j)| inv[(i, j)]))
}
