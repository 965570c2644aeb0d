//! Smile scoring

use crate::types::Blendshapes;
use crate::vision::landmarks::{FaceMesh, LIP_LOWER, LIP_UPPER, MOUTH_LEFT, MOUTH_RIGHT};

/// Lip gap below this fraction of the interocular distance counts as closed
pub const CLOSED_LIP_GAP_RATIO: f64 = 0.01;

/// Damping applied to the geometric score for a closed mouth
pub const CLOSED_LIP_DAMPING: f64 = 0.7;

const MOUTH_SMILE_LEFT: &str = "mouthSmileLeft";
const MOUTH_SMILE_RIGHT: &str = "mouthSmileRight";

/// Geometric smile proxy from raw distances
///
/// Formula: `mouth_width / (interocular + 1e-6)`, × 0.7 when
/// `lip_gap < 0.01 · interocular`
pub fn geometric_smile_score(mouth_width: f64, lip_gap: f64, interocular: f64) -> f64 {
    let score = mouth_width / (interocular + 1e-6);
    if lip_gap < CLOSED_LIP_GAP_RATIO * interocular {
        score * CLOSED_LIP_DAMPING
    } else {
        score
    }
}

/// Geometric smile proxy for a mesh
pub fn geometric_smile(mesh: &FaceMesh) -> f64 {
    geometric_smile_score(
        mesh.distance(MOUTH_LEFT, MOUTH_RIGHT),
        mesh.distance(LIP_UPPER, LIP_LOWER),
        mesh.interocular(),
    )
}

/// Lip gap normalized by the interocular distance
pub fn mouth_openness(mesh: &FaceMesh) -> f64 {
    mesh.distance(LIP_UPPER, LIP_LOWER) / (mesh.interocular() + 1e-6)
}

/// Mean of the left/right mouth-smile activations, or whichever is present
pub fn blendshape_smile(blendshapes: &Blendshapes) -> Option<f64> {
    let values: Vec<f64> = [MOUTH_SMILE_LEFT, MOUTH_SMILE_RIGHT]
        .iter()
        .filter_map(|name| blendshapes.get(*name).copied())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
