//! Gaze estimation
//!
//! The iris position ratio is kept as a diagnostic signal. Classification uses
//! head yaw, which is far more stable than the iris ratio on webcam footage.

use crate::types::Gaze;
use crate::vision::landmarks::{
    FaceMesh, LEFT_EYE_INNER, LEFT_EYE_OUTER, LEFT_IRIS, RIGHT_EYE_INNER, RIGHT_EYE_OUTER,
    RIGHT_IRIS,
};

/// Horizontal iris position within one eye
///
/// Formula: `(iris_x - outer_x) / (inner_x - outer_x + 1e-6)`
/// Around 0.5 when looking straight ahead.
pub fn iris_ratio(iris_x: f64, outer_x: f64, inner_x: f64) -> f64 {
    (iris_x - outer_x) / (inner_x - outer_x + 1e-6)
}

/// Mean of the left and right eye iris ratios
pub fn average_iris_ratio(mesh: &FaceMesh) -> f64 {
    let right = iris_ratio(
        mesh.centroid(&RIGHT_IRIS)[0],
        mesh.xy(RIGHT_EYE_OUTER)[0],
        mesh.xy(RIGHT_EYE_INNER)[0],
    );
    let left = iris_ratio(
        mesh.centroid(&LEFT_IRIS)[0],
        mesh.xy(LEFT_EYE_OUTER)[0],
        mesh.xy(LEFT_EYE_INNER)[0],
    );
    (right + left) / 2.0
}

/// Classify gaze from head yaw; CENTER when yaw is unknown
pub fn classify_gaze(yaw_deg: Option<f64>, yaw_thresh_deg: f64) -> Gaze {
    match yaw_deg {
        None => Gaze::Center,
        Some(yaw) if yaw.abs() <= yaw_thresh_deg => Gaze::Center,
        Some(yaw) if yaw > yaw_thresh_deg => Gaze::Right,
        Some(_) => Gaze::Left,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iris_ratio_centered() {
        assert!((iris_ratio(15.0, 10.0, 20.0) - 0.5).abs() < 1e-6);
        // Left eye: outer corner has the larger x
        assert!((iris_ratio(15.0, 20.0, 10.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_classify_gaze_band() {
        assert_eq!(classify_gaze(Some(0.0), 8.0), Gaze::Center);
        assert_eq!(classify_gaze(Some(8.0), 8.0), Gaze::Center);
        assert_eq!(classify_gaze(Some(-8.0), 8.0), Gaze::Center);
        assert_eq!(classify_gaze(Some(8.1), 8.0), Gaze::Right);
        assert_eq!(classify_gaze(Some(-12.0), 8.0), Gaze::Left);
    }

    #[test]
    fn test_missing_yaw_defaults_to_center() {
        assert_eq!(classify_gaze(None, 8.0), Gaze::Center);
    }
}
