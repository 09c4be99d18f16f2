use std::path::PathBuf;

use image::RgbaImage;
use tracing::instrument;

pub mod boxfit;
mod crnn_net;
pub mod dbnet;
pub mod decode;
mod error;
pub mod geometry;
pub mod result;
pub mod segment;
pub mod util;

use crnn_net::CrnnNet;
use dbnet::DbNet;
pub use error::{Error, Result};
pub use result::{Character, Object, Orientation, PipelineStats, TextRegion};

pub use ort as runtime;

pub struct FrameOCRBuilder {
    threads: usize,
    det_path: Option<PathBuf>,
    rec_paths: Option<(PathBuf, PathBuf)>,
    text_score_threshold: f32,
    cache_path: Option<PathBuf>,
    execution_providers: Vec<ExecutionProvider>,
}

impl FrameOCRBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn det_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.det_path = Some(path.into());
        self
    }

    pub fn rec_model(
        mut self,
        model_path: impl Into<PathBuf>,
        keys_path: impl Into<PathBuf>,
    ) -> Self {
        self.rec_paths = Some((model_path.into(), keys_path.into()));
        self
    }

    /// Objects whose final confidence falls below this are dropped from the
    /// results. Can be changed later with
    /// [`FrameOCR::set_text_score_threshold`].
    pub fn text_score_threshold(mut self, threshold: f32) -> Self {
        self.text_score_threshold = threshold;
        self
    }

    pub fn with_engine_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_execution_providers(
        mut self,
        providers: impl IntoIterator<Item = ExecutionProvider>,
    ) -> Self {
        self.execution_providers = providers.into_iter().collect();
        self
    }

    #[instrument(skip(self), level = "debug")]
    fn init_models(&mut self) -> Result<(DbNet, CrnnNet)> {
        let det_path = self
            .det_path
            .take()
            .unwrap_or_else(|| "models/PP-OCRv5_mobile_det.onnx".into());
        let (rec_path, keys_path) = self.rec_paths.take().unwrap_or_else(|| {
            (
                "models/PP-OCRv5_mobile_rec.onnx".into(),
                "models/ppocrv5_dict.txt".into(),
            )
        });
        Ok((
            DbNet::init(
                det_path,
                self.threads,
                &self.execution_providers,
                self.cache_path.clone(),
            )?,
            CrnnNet::init(
                rec_path,
                keys_path,
                self.threads,
                &self.execution_providers,
                self.cache_path.clone(),
            )?,
        ))
    }

    /// Loads both models. Missing model files fail here; a built [`FrameOCR`]
    /// is always ready to detect.
    #[instrument(skip(self))]
    pub fn build(mut self) -> Result<FrameOCR> {
        let (det_model, rec_model) = self.init_models()?;
        Ok(FrameOCR {
            det_model,
            rec_model,
            text_score_threshold: self.text_score_threshold,
        })
    }
}

impl Default for FrameOCRBuilder {
    fn default() -> Self {
        Self {
            threads: 4,
            det_path: None,
            rec_paths: None,
            text_score_threshold: 0.5,
            cache_path: None,
            execution_providers: DEFAULT_PROVIDERS.to_vec(),
        }
    }
}

/// One text detection + recognition engine instance.
///
/// Owns its two inference sessions; instances are independent and any number
/// of them may coexist.
pub struct FrameOCR {
    det_model: DbNet,
    rec_model: CrnnNet,
    text_score_threshold: f32,
}

impl FrameOCR {
    /// Applies to all subsequent detections.
    pub fn set_text_score_threshold(&mut self, threshold: f32) {
        log::info!("text score threshold set to {threshold}");
        self.text_score_threshold = threshold;
    }

    /// One dummy forward pass through both models, forcing one-time graph
    /// setup ahead of the first real frame.
    #[instrument(skip(self))]
    pub fn warmup(&self) -> Result<()> {
        self.det_model.warmup()?;
        self.rec_model.warmup()?;
        log::info!("warmup complete (det + rec run)");
        Ok(())
    }

    /// Detects and recognizes text in one RGBA frame (top-left origin,
    /// row-major, `width * height * 4` bytes).
    ///
    /// Malformed input (zero dimension, short buffer) yields an empty result.
    /// Per-object geometry failures are logged and skipped; one bad region
    /// never aborts the frame.
    #[instrument(skip(self, rgba))]
    pub fn detect_regions(&self, rgba: &[u8], width: u32, height: u32) -> Result<Vec<TextRegion>> {
        let mut stats = PipelineStats::default();
        self.detect_regions_with_stats(rgba, width, height, &mut stats)
    }

    /// Like [`detect_regions`](Self::detect_regions), accumulating per-stage
    /// durations into the caller's [`PipelineStats`].
    pub fn detect_regions_with_stats(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        stats: &mut PipelineStats,
    ) -> Result<Vec<TextRegion>> {
        let Some(image) = checked_image(rgba, width, height) else {
            return Ok(Vec::new());
        };

        let mut objects = self.det_model.detect_objects(&image, stats)?;
        log::debug!("detection found {} text regions", objects.len());

        for object in &mut objects {
            let strip = match geometry::rectify_region(rgba, width, height, object) {
                Ok(strip) => strip,
                Err(err) => {
                    log::warn!("skipping text box: {err}");
                    continue;
                }
            };
            let text = self.rec_model.recognize(strip, stats)?;
            // Recognition confidence replaces detection confidence, but an
            // empty decode keeps the detection score.
            if !text.is_empty() {
                object.prob = text.iter().map(|ch| ch.prob).sum::<f32>() / text.len() as f32;
            }
            object.text = text;
        }

        Ok(objects
            .iter()
            .filter(|object| object.prob >= self.text_score_threshold)
            .map(|object| self.to_region(object))
            .collect())
    }

    /// Detects text and serializes the surviving regions as a JSON array.
    /// Malformed input yields `"[]"`.
    pub fn detect_json(&self, rgba: &[u8], width: u32, height: u32) -> Result<String> {
        let regions = self.detect_regions(rgba, width, height)?;
        Ok(serde_json::to_string(&regions)?)
    }

    fn to_region(&self, object: &Object) -> TextRegion {
        let corners = object.rrect.points().map(|p| [p.x, p.y]);
        TextRegion {
            corners,
            text: self.rec_model.text_of(&object.text),
            prob: object.prob,
        }
    }
}

fn checked_image(rgba: &[u8], width: u32, height: u32) -> Option<RgbaImage> {
    if width == 0 || height == 0 {
        return None;
    }
    let len = width as usize * height as usize * 4;
    if rgba.len() < len {
        return None;
    }
    RgbaImage::from_raw(width, height, rgba[..len].to_vec())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Default,
    #[cfg(feature = "tensorrt")]
    TensorRT,
    #[cfg(feature = "coreml")]
    CoreML,
    #[cfg(feature = "cuda")]
    Cuda,
    #[cfg(feature = "directml")]
    DirectML,
}

const DEFAULT_PROVIDERS: &[ExecutionProvider] = &[
    #[cfg(feature = "tensorrt")]
    ExecutionProvider::TensorRT,
    #[cfg(feature = "coreml")]
    ExecutionProvider::CoreML,
    #[cfg(feature = "directml")]
    ExecutionProvider::DirectML,
    #[cfg(feature = "cuda")]
    ExecutionProvider::Cuda,
    ExecutionProvider::Default,
];
