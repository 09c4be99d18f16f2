use serde::Serialize;

use crate::geometry::RotatedRect;

/// Reading direction of a detected region, decided by the box fitter from the
/// principal-axis angle and the side ratio. It selects which box corners map
/// to which corners of the rectified strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// One decoded token. `id` indexes the recognizer's character dictionary
/// (the blank class is already shifted out).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Character {
    pub id: usize,
    pub prob: f32,
}

/// One detected text region, alive for a single frame.
///
/// `prob` starts out as the detection containment score and is overwritten
/// with the mean token confidence once recognition decodes at least one token.
#[derive(Debug, Clone)]
pub struct Object {
    pub rrect: RotatedRect,
    pub orientation: Orientation,
    pub prob: f32,
    pub text: Vec<Character>,
}

/// Serialized form of a surviving [`Object`]: corners in TL,TR,BR,BL order in
/// original-image pixel coordinates, the decoded string, and the final
/// confidence.
#[derive(Debug, Clone, Serialize)]
pub struct TextRegion {
    #[serde(rename = "box")]
    pub corners: [[f32; 2]; 4],
    pub text: String,
    pub prob: f32,
}

/// Stage durations for one detection pass, in milliseconds.
///
/// Callers that care about per-stage cost hand a `&mut PipelineStats` to
/// [`FrameOCR::detect_regions_with_stats`](crate::FrameOCR::detect_regions_with_stats);
/// recognition stages accumulate across all objects of the frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineStats {
    pub det_preprocess_ms: f64,
    pub det_inference_ms: f64,
    pub det_postprocess_ms: f64,
    pub rec_preprocess_ms: f64,
    pub rec_inference_ms: f64,
    pub rec_decode_ms: f64,
}
