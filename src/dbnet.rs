use std::path::PathBuf;
use std::time::Instant;

use image::RgbaImage;
use ndarray::{Array4, ArrayView2, Axis};
use ort::{inputs, ExecutionProviderDispatch, GraphOptimizationLevel, Session};
use tracing::instrument;

use crate::boxfit::{self, MASK_THRESHOLD};
use crate::error::Result;
use crate::result::{Object, PipelineStats};
use crate::segment;
use crate::util::{self, Letterbox};
use crate::ExecutionProvider;

const MEAN_VALUES: [f32; 3] = [0.485 * 255.0, 0.456 * 255.0, 0.406 * 255.0];
const NORM_VALUES: [f32; 3] = [
    1.0 / (0.229 * 255.0),
    1.0 / (0.224 * 255.0),
    1.0 / (0.225 * 255.0),
];

/// Text detector: one DB-style session producing a probability heat-map, plus
/// the postprocess that turns the map into rotated boxes.
pub struct DbNet {
    session: Session,
}

#[cfg(feature = "tensorrt")]
fn setup_tensorrt(cache_path: PathBuf) -> ExecutionProviderDispatch {
    use ort::TensorRTExecutionProvider;

    use crate::util::DET_TARGET_SIZE;

    TensorRTExecutionProvider::default()
        .with_profile_min_shapes("x:1x3x32x32")
        .with_profile_max_shapes(format!("x:1x3x{DET_TARGET_SIZE}x{DET_TARGET_SIZE}"))
        .with_profile_opt_shapes(format!("x:1x3x{DET_TARGET_SIZE}x{DET_TARGET_SIZE}"))
        .with_engine_cache(true)
        .with_engine_cache_path(cache_path.to_string_lossy())
        .with_timing_cache(true)
        .build()
}

#[cfg(feature = "cuda")]
fn setup_cuda() -> ExecutionProviderDispatch {
    use ort::CUDAExecutionProvider;

    CUDAExecutionProvider::default().build()
}

#[cfg(feature = "directml")]
fn setup_directml() -> ExecutionProviderDispatch {
    use ort::DirectMLExecutionProvider;

    DirectMLExecutionProvider::default().build()
}

#[cfg(feature = "coreml")]
fn setup_coreml() -> ExecutionProviderDispatch {
    use ort::CoreMLExecutionProvider;

    CoreMLExecutionProvider::default().build()
}

impl DbNet {
    #[instrument(level = "debug")]
    pub fn init(
        path: PathBuf,
        num_threads: usize,
        execution_providers: &[ExecutionProvider],
        cache_path: Option<PathBuf>,
    ) -> Result<Self> {
        #[cfg(feature = "directml")]
        let parallel = execution_providers.contains(&ExecutionProvider::DirectML);
        #[cfg(not(feature = "directml"))]
        let parallel = true;

        let execution_providers = execution_providers.iter().filter_map(
            |provider| -> Option<ExecutionProviderDispatch> {
                match provider {
                    ExecutionProvider::Default => None,
                    #[cfg(feature = "tensorrt")]
                    ExecutionProvider::TensorRT => Some(setup_tensorrt(
                        cache_path
                            .clone()
                            .unwrap_or_else(|| path.parent().unwrap().join(".cache")),
                    )),
                    #[cfg(feature = "cuda")]
                    ExecutionProvider::Cuda => Some(setup_cuda()),
                    #[cfg(feature = "directml")]
                    ExecutionProvider::DirectML => Some(setup_directml()),
                    #[cfg(feature = "coreml")]
                    ExecutionProvider::CoreML => Some(setup_coreml()),
                }
            },
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_memory_pattern(parallel)?
            .with_parallel_execution(parallel)?
            .with_inter_threads(num_threads)?
            .with_intra_threads(num_threads)?
            .with_execution_providers(execution_providers)?
            .commit_from_file(path)?;

        Ok(Self { session })
    }

    /// Runs one detection pass: letterboxed preprocess, forward pass, then
    /// postprocess of the probability field into candidate objects.
    #[instrument(level = "debug", skip(self, image, stats))]
    pub fn detect_objects(
        &self,
        image: &RgbaImage,
        stats: &mut PipelineStats,
    ) -> Result<Vec<Object>> {
        let start = Instant::now();
        let letterbox = util::letterbox_dims(image.width(), image.height());
        let input =
            util::detector_tensor(image, &letterbox, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        stats.det_preprocess_ms += start.elapsed().as_secs_f64() * 1e3;

        let start = Instant::now();
        let outputs = self.session.run(inputs!["x" => input]?)?;
        let pred = outputs
            .first_key_value()
            .unwrap()
            .1
            .try_extract_tensor::<f32>()?;
        stats.det_inference_ms += start.elapsed().as_secs_f64() * 1e3;

        let start = Instant::now();
        let height = pred.len_of(Axis(2));
        let width = pred.len_of(Axis(3));
        let pred = pred.remove_axis(Axis(0)).remove_axis(Axis(0));
        // The model emits probabilities in [0,1]; the postprocess thresholds
        // operate in the 0..=255 domain.
        let mut field = pred.to_shape((height, width)).unwrap().to_owned();
        field.mapv_inplace(|v| v * 255.0);
        log::debug!("detection map size: {width}x{height}");

        let objects = find_text_objects(field.view(), &letterbox);
        stats.det_postprocess_ms += start.elapsed().as_secs_f64() * 1e3;

        Ok(objects)
    }

    /// One dummy forward pass to absorb first-run graph setup costs.
    pub fn warmup(&self) -> Result<()> {
        let input = Array4::<f32>::ones((1, 3, 320, 320));
        self.session.run(inputs!["x" => input]?)?;
        Ok(())
    }
}

/// Pure postprocess of a probability field (0..=255 domain) into candidate
/// objects: flood-fill segmentation followed by box fitting, with boxes
/// remapped into original-image coordinates through `letterbox`.
#[instrument(level = "trace", skip(pred))]
pub fn find_text_objects(pred: ArrayView2<f32>, letterbox: &Letterbox) -> Vec<Object> {
    segment::find_components(pred, MASK_THRESHOLD)
        .into_iter()
        .filter_map(|contour| boxfit::fit_box(pred, &contour, letterbox))
        .collect()
}
