//! One-time model loading at process start.
//!
//! Loading never takes the process down: [`load_adapter`] logs the failure
//! and hands back an unready adapter instead.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::adapter::InferenceAdapter;
use crate::labels::{DecoderError, LabelDecoder};
#[cfg(feature = "onnx")]
use crate::pipeline::PipelineError;

/// Default file name of the serialized pipeline inside a model directory.
pub const PIPELINE_FILE: &str = "best_pipeline.onnx";
/// Default file name of the serialized label decoder inside a model directory.
pub const DECODER_FILE: &str = "label_encoder.json";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("loading label decoder {path}: {source}")]
    Decoder {
        path: PathBuf,
        source: DecoderError,
    },

    #[cfg(feature = "onnx")]
    #[error("loading pipeline {path}: {source}")]
    Pipeline {
        path: PathBuf,
        source: PipelineError,
    },

    #[cfg(not(feature = "onnx"))]
    #[error("cannot load pipeline {0}: built without ONNX Runtime support")]
    OnnxDisabled(PathBuf),
}

/// Where the serialized pipeline and label decoder live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifacts {
    pub pipeline: PathBuf,
    pub decoder: PathBuf,
}

impl ModelArtifacts {
    /// Artifacts under their default file names in `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            pipeline: dir.join(PIPELINE_FILE),
            decoder: dir.join(DECODER_FILE),
        }
    }

    pub fn with_pipeline(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipeline = path.into();
        self
    }

    pub fn with_decoder(mut self, path: impl Into<PathBuf>) -> Self {
        self.decoder = path.into();
        self
    }
}

/// Load the pipeline and label decoder into a ready adapter.
pub fn try_load(artifacts: &ModelArtifacts) -> Result<InferenceAdapter, LoadError> {
    for path in [&artifacts.decoder, &artifacts.pipeline] {
        if !path.exists() {
            return Err(LoadError::NotFound(path.clone()));
        }
    }

    let decoder = LabelDecoder::load(&artifacts.decoder).map_err(|source| LoadError::Decoder {
        path: artifacts.decoder.clone(),
        source,
    })?;
    info!(
        path = %artifacts.decoder.display(),
        classes = ?decoder.classes(),
        "loaded label decoder"
    );

    let pipeline = load_pipeline(&artifacts.pipeline)?;
    info!(
        path = %artifacts.pipeline.display(),
        backend = %pipeline.describe(),
        "loaded pipeline"
    );

    Ok(InferenceAdapter::ready(pipeline, decoder))
}

/// Load the model artifacts, or fall back to an unready adapter.
///
/// The unready reason names the artifact that failed so it can be surfaced
/// to callers.
pub fn load_adapter(artifacts: &ModelArtifacts) -> InferenceAdapter {
    match try_load(artifacts) {
        Ok(adapter) => adapter,
        Err(e) => {
            warn!(error = %e, "model not loaded, serving requests as not ready");
            InferenceAdapter::unready(e.to_string())
        }
    }
}

#[cfg(feature = "onnx")]
fn load_pipeline(path: &Path) -> Result<Box<dyn crate::Pipeline>, LoadError> {
    crate::onnx::OnnxPipeline::load(path)
        .map(|p| Box::new(p) as Box<dyn crate::Pipeline>)
        .map_err(|source| LoadError::Pipeline {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(feature = "onnx"))]
fn load_pipeline(path: &Path) -> Result<Box<dyn crate::Pipeline>, LoadError> {
    Err(LoadError::OnnxDisabled(path.to_path_buf()))
}
