//! Inference layer: the pipeline seam, label decoding, and the adapter that
//! turns a validated feature record into a severity label.

pub mod adapter;
pub mod labels;
pub mod loader;
pub mod pipeline;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::OnnxPipeline;

pub use adapter::{ClassProbabilities, ClassificationResult, InferenceAdapter, InferenceError};
pub use labels::{DecoderError, LabelDecoder};
pub use loader::{LoadError, ModelArtifacts, load_adapter, try_load};
pub use pipeline::{Pipeline, PipelineError, RawPrediction};
