//! Head pose estimation
//!
//! Six 2D landmarks are matched against a canonical 3D face template and the
//! rigid transform is recovered with Levenberg–Marquardt over a Rodrigues
//! rotation vector and a translation. The camera is an ideal pinhole with
//! focal length equal to the image width and the principal point at the image
//! centre.

use crate::error::{AnalysisError, Result};

/// Canonical face template (approximate millimetres), in the order
/// nose tip, chin, right eye outer, left eye outer, mouth left, mouth right
pub const MODEL_POINTS: [[f64; 3]; 6] = [
    [0.0, 0.0, 0.0],
    [0.0, -63.6, -12.5],
    [-43.3, 32.7, -26.0],
    [43.3, 32.7, -26.0],
    [-28.9, -28.9, -24.1],
    [28.9, -28.9, -24.1],
];

/// Distance between the template's outer eye corners
const MODEL_EYE_SPAN: f64 = 86.6;

const MAX_ITERATIONS: usize = 100;
const INITIAL_DAMPING: f64 = 1e-3;
/// Reprojection RMS above this fraction of the focal length is a failed solve
const MAX_RMS_RATIO: f64 = 0.1;

/// Head orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl HeadPose {
    /// Substituted when the solver fails
    pub const ZERO: HeadPose = HeadPose {
        yaw: 0.0,
        pitch: 0.0,
        roll: 0.0,
    };
}

/// Pinhole camera without distortion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub focal: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Camera {
    pub fn for_image(width: u32, height: u32) -> Self {
        Self {
            focal: width as f64,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }

    fn project(&self, point: [f64; 3]) -> Option<[f64; 2]> {
        if point[2] <= 0.0 {
            return None;
        }
        Some([
            self.focal * point[0] / point[2] + self.cx,
            self.focal * point[1] / point[2] + self.cy,
        ])
    }
}

/// Rigid transform recovered by the solver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSolution {
    pub rvec: [f64; 3],
    pub tvec: [f64; 3],
    /// Reprojection RMS in pixels
    pub rms: f64,
}

type Mat3 = [[f64; 3]; 3];

/// Rotation matrix from a Rodrigues vector
pub fn rodrigues(rvec: [f64; 3]) -> Mat3 {
    let theta = (rvec[0] * rvec[0] + rvec[1] * rvec[1] + rvec[2] * rvec[2]).sqrt();
    if theta < 1e-12 {
        // First-order expansion: I + [r]x
        return [
            [1.0, -rvec[2], rvec[1]],
            [rvec[2], 1.0, -rvec[0]],
            [-rvec[1], rvec[0], 1.0],
        ];
    }
    let [kx, ky, kz] = [rvec[0] / theta, rvec[1] / theta, rvec[2] / theta];
    let (s, c) = theta.sin_cos();
    let v = 1.0 - c;
    [
        [c + kx * kx * v, kx * ky * v - kz * s, kx * kz * v + ky * s],
        [ky * kx * v + kz * s, c + ky * ky * v, ky * kz * v - kx * s],
        [kz * kx * v - ky * s, kz * ky * v + kx * s, c + kz * kz * v],
    ]
}

fn transform(r: &Mat3, t: [f64; 3], p: [f64; 3]) -> [f64; 3] {
    [
        r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + t[0],
        r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + t[1],
        r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + t[2],
    ]
}

/// Reprojection residuals (projected - observed), 12 values
fn residuals(params: &[f64; 6], observed: &[[f64; 2]; 6], camera: &Camera) -> Option<[f64; 12]> {
    let r = rodrigues([params[0], params[1], params[2]]);
    let t = [params[3], params[4], params[5]];
    let mut out = [0.0; 12];
    for (i, (model, image)) in MODEL_POINTS.iter().zip(observed).enumerate() {
        let [u, v] = camera.project(transform(&r, t, *model))?;
        out[2 * i] = u - image[0];
        out[2 * i + 1] = v - image[1];
    }
    Some(out)
}

fn sum_squares(r: &[f64; 12]) -> f64 {
    r.iter().map(|x| x * x).sum()
}

/// Solve a 6×6 system by Gaussian elimination with partial pivoting
fn solve6(mut a: [[f64; 6]; 6], mut b: [f64; 6]) -> Option<[f64; 6]> {
    for col in 0..6 {
        let pivot = (col..6).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-18 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..6 {
            let factor = a[row][col] / a[col][col];
            for k in col..6 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = [0.0; 6];
    for row in (0..6).rev() {
        let tail: f64 = (row + 1..6).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// Frontal-face starting point: rotated half a turn about x (template y up,
/// image y down) and pushed back to match the observed eye span.
fn initial_guess(observed: &[[f64; 2]; 6], eye_span: f64, camera: &Camera) -> [f64; 6] {
    let z = camera.focal * MODEL_EYE_SPAN / eye_span;
    let nose = observed[0];
    [
        std::f64::consts::PI,
        0.0,
        0.0,
        (nose[0] - camera.cx) * z / camera.focal,
        (nose[1] - camera.cy) * z / camera.focal,
        z,
    ]
}

fn jacobian(
    params: &[f64; 6],
    observed: &[[f64; 2]; 6],
    camera: &Camera,
) -> Option<[[f64; 6]; 12]> {
    let mut jac = [[0.0; 6]; 12];
    for j in 0..6 {
        let h = 1e-6 * params[j].abs().max(1.0);
        let mut plus = *params;
        let mut minus = *params;
        plus[j] += h;
        minus[j] -= h;
        let rp = residuals(&plus, observed, camera)?;
        let rm = residuals(&minus, observed, camera)?;
        for i in 0..12 {
            jac[i][j] = (rp[i] - rm[i]) / (2.0 * h);
        }
    }
    Some(jac)
}

/// Recover the face transform from six image points
pub fn solve_pose(observed: &[[f64; 2]; 6], camera: &Camera) -> Result<PoseSolution> {
    let fail = |reason: &str| AnalysisError::PoseSolve(reason.to_string());

    if observed.iter().flatten().any(|v| !v.is_finite()) {
        return Err(fail("non-finite image points"));
    }
    let [re, le] = [observed[2], observed[3]];
    let eye_span = ((re[0] - le[0]).powi(2) + (re[1] - le[1]).powi(2)).sqrt();
    if eye_span < 1.0 {
        return Err(fail("collapsed eye corners"));
    }

    let mut params = initial_guess(observed, eye_span, camera);
    let mut current = residuals(&params, observed, camera)
        .ok_or_else(|| fail("initial guess places points behind the camera"))?;
    let mut cost = sum_squares(&current);
    let mut lambda = INITIAL_DAMPING;

    for _ in 0..MAX_ITERATIONS {
        let jac = jacobian(&params, observed, camera)
            .ok_or_else(|| fail("points behind the camera"))?;

        let mut a = [[0.0; 6]; 6];
        let mut g = [0.0; 6];
        for i in 0..12 {
            for j in 0..6 {
                g[j] += jac[i][j] * current[i];
                for k in 0..6 {
                    a[j][k] += jac[i][j] * jac[i][k];
                }
            }
        }

        let mut improved = false;
        while lambda < 1e12 {
            let mut damped = a;
            for (j, row) in damped.iter_mut().enumerate() {
                row[j] += lambda * a[j][j].max(1e-12);
            }
            let step = solve6(damped, g.map(|v| -v)).ok_or_else(|| fail("singular normal equations"))?;

            let mut candidate = params;
            for j in 0..6 {
                candidate[j] += step[j];
            }
            match residuals(&candidate, observed, camera) {
                Some(r) if sum_squares(&r) < cost => {
                    let new_cost = sum_squares(&r);
                    let step_norm = step.iter().map(|s| s * s).sum::<f64>().sqrt();
                    let relative_gain = (cost - new_cost) / cost.max(1e-300);
                    params = candidate;
                    current = r;
                    cost = new_cost;
                    lambda = (lambda / 10.0).max(1e-12);
                    improved = true;
                    if step_norm < 1e-10 || relative_gain < 1e-12 {
                        lambda = f64::INFINITY;
                    }
                    break;
                }
                _ => lambda *= 10.0,
            }
        }

        if !improved || !lambda.is_finite() || cost < 1e-18 {
            break;
        }
    }

    if params.iter().any(|p| !p.is_finite()) {
        return Err(fail("non-finite solution"));
    }
    if params[5] <= 0.0 {
        return Err(fail("face behind the camera"));
    }
    let rms = (cost / MODEL_POINTS.len() as f64).sqrt();
    if !rms.is_finite() || rms > MAX_RMS_RATIO * camera.focal {
        return Err(AnalysisError::PoseSolve(format!(
            "reprojection error too large ({rms:.1}px)"
        )));
    }

    Ok(PoseSolution {
        rvec: [params[0], params[1], params[2]],
        tvec: [params[3], params[4], params[5]],
        rms,
    })
}

/// Raw Euler angles in degrees as `(pitch, yaw, roll)`
pub fn rotation_to_euler(r: &Mat3) -> (f64, f64, f64) {
    let sy = (r[0][0] * r[0][0] + r[1][0] * r[1][0]).sqrt();
    let (pitch, yaw, roll) = if sy >= 1e-6 {
        (
            r[2][1].atan2(r[2][2]),
            (-r[2][0]).atan2(sy),
            r[1][0].atan2(r[0][0]),
        )
    } else {
        ((-r[1][2]).atan2(r[1][1]), (-r[2][0]).atan2(sy), 0.0)
    };
    (pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
}

/// Wrap an angle into [-180, 180)
pub fn wrap_angle(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Fold a wrapped pitch into [-90, 90] to undo axis-convention flips
pub fn fold_pitch(deg: f64) -> f64 {
    if deg < -90.0 {
        deg + 180.0
    } else if deg > 90.0 {
        deg - 180.0
    } else {
        deg
    }
}

/// Convert a rotation to wrapped and folded head angles
pub fn head_pose_from_rotation(r: &Mat3) -> HeadPose {
    let (pitch, yaw, roll) = rotation_to_euler(r);
    HeadPose {
        yaw: wrap_angle(yaw),
        pitch: fold_pitch(wrap_angle(pitch)),
        roll: wrap_angle(roll),
    }
}

/// Solve and convert in one step
pub fn estimate_head_pose(observed: &[[f64; 2]; 6], width: u32, height: u32) -> Result<HeadPose> {
    let camera = Camera::for_image(width, height);
    let solution = solve_pose(observed, &camera)?;
    Ok(head_pose_from_rotation(&rodrigues(solution.rvec)))
}
