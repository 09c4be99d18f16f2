use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("inference session error: {0}")]
    Session(#[from] ort::Error),
    #[error("failed to read character dictionary {path}: {source}")]
    Dictionary {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The forward affine matrix of a text box could not be inverted.
    /// The orchestrator skips the offending box and keeps the frame alive.
    #[error("degenerate affine transform")]
    DegenerateTransform,
    /// The cropped region of a text box has no overlap with the image.
    #[error("text box lies outside the image")]
    RegionOutsideImage,
    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}
