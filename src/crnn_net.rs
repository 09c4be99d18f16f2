use std::path::PathBuf;
use std::time::Instant;

use ndarray::{Array3, Array4, Axis};
use ort::{inputs, ExecutionProviderDispatch, GraphOptimizationLevel, Session};
use tracing::instrument;

use crate::decode::greedy_ctc;
use crate::error::{Error, Result};
use crate::geometry::STRIP_HEIGHT;
use crate::result::{Character, PipelineStats};
use crate::util;
use crate::ExecutionProvider;

const MEAN_VALUES: [f32; 3] = [127.5, 127.5, 127.5];
const NORM_VALUES: [f32; 3] = [1.0 / 127.5, 1.0 / 127.5, 1.0 / 127.5];

/// Text recognizer: one CRNN-style session over a rectified strip, plus the
/// character dictionary the decoded token ids index into.
pub struct CrnnNet {
    session: Session,
    keys: Vec<String>,
}

#[cfg(feature = "tensorrt")]
fn setup_tensorrt(cache_path: PathBuf) -> ExecutionProviderDispatch {
    use ort::TensorRTExecutionProvider;

    TensorRTExecutionProvider::default()
        .with_profile_min_shapes(format!("x:1x3x{STRIP_HEIGHT}x16"))
        .with_profile_max_shapes(format!("x:1x3x{STRIP_HEIGHT}x2048"))
        .with_profile_opt_shapes(format!("x:1x3x{STRIP_HEIGHT}x256"))
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

impl CrnnNet {
    #[instrument(level = "debug")]
    pub fn init(
        model_path: PathBuf,
        keys_path: PathBuf,
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
                    ExecutionProvider::TensorRT => {
                        Some(setup_tensorrt(cache_path.clone().unwrap_or_else(|| {
                            model_path.parent().unwrap().join(".cache")
                        })))
                    }
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
            .with_parallel_execution(parallel)?
            .with_inter_threads(num_threads)?
            .with_intra_threads(num_threads)?
            .with_execution_providers(execution_providers)?
            .commit_from_file(model_path)?;

        // One token per line, wrapped with the blank sentinel in slot 0 and a
        // trailing space entry, so class index i maps to keys[i].
        let keys = std::fs::read_to_string(&keys_path).map_err(|source| Error::Dictionary {
            path: keys_path,
            source,
        })?;
        let keys = keys.lines().map(|line| line.to_string());
        let keys: Vec<String> = ["#".to_string()]
            .into_iter()
            .chain(keys)
            .chain([" ".to_string()])
            .collect();

        log::debug!("CRNN inputs: {:?}", session.inputs);
        log::debug!("CRNN outputs: {:?}", session.outputs);

        Ok(Self { session, keys })
    }

    /// Decodes one rectified strip (BGR planar, 0..=255, shape `(3, 48, w)`)
    /// into tokens with per-token confidence.
    #[instrument(level = "trace", skip(self, strip, stats))]
    pub fn recognize(
        &self,
        mut strip: Array3<f32>,
        stats: &mut PipelineStats,
    ) -> Result<Vec<Character>> {
        let start = Instant::now();
        util::normalize_planar(&mut strip, &MEAN_VALUES, &NORM_VALUES);
        let input = strip.insert_axis(Axis(0));
        stats.rec_preprocess_ms += start.elapsed().as_secs_f64() * 1e3;

        let start = Instant::now();
        let outputs = self.session.run(inputs!["x" => input]?)?;
        let tensor = outputs
            .first_key_value()
            .unwrap()
            .1
            .try_extract_tensor::<f32>()?;
        let timesteps = tensor.len_of(Axis(1));
        let classes = tensor.len_of(Axis(2));
        let scores = tensor.remove_axis(Axis(0));
        let scores = scores.to_shape((timesteps, classes)).unwrap();
        stats.rec_inference_ms += start.elapsed().as_secs_f64() * 1e3;

        let start = Instant::now();
        let text = greedy_ctc(scores.view());
        stats.rec_decode_ms += start.elapsed().as_secs_f64() * 1e3;
        Ok(text)
    }

    /// Dictionary lookup over decoded tokens; ids outside the dictionary are
    /// skipped.
    pub fn text_of(&self, text: &[Character]) -> String {
        text.iter()
            .filter_map(|ch| self.keys.get(ch.id + 1))
            .map(String::as_str)
            .collect()
    }

    /// One dummy forward pass to absorb first-run graph setup costs.
    pub fn warmup(&self) -> Result<()> {
        let input = Array4::<f32>::from_elem((1, 3, STRIP_HEIGHT, 160), 0.5);
        self.session.run(inputs!["x" => input]?)?;
        Ok(())
    }
}
