use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use thiserror::Error;

/// Raw output of one pipeline call on a single feature row.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    /// Encoded class index, as understood by the label decoder.
    pub class_index: i64,
    /// Per-class probabilities indexed by encoded class, when the model
    /// exposes them.
    pub probabilities: Option<Vec<f32>>,
}

/// A trained transformation + classification pipeline.
///
/// Implementations must be usable from many threads at once; backends whose
/// native session is not re-entrant serialize calls internally.
pub trait Pipeline: Send + Sync {
    /// Predict the class (and class probabilities, if available) for a
    /// single-row feature table.
    fn predict(&self, row: &RecordBatch) -> Result<RawPrediction, PipelineError>;

    /// Short backend description for logs.
    fn describe(&self) -> String {
        "pipeline".to_string()
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[cfg(feature = "onnx")]
    #[error("onnx runtime error: {0}")]
    Onnx(#[from] ort::Error),

    #[error("feature row has no column '{0}' required by the model")]
    MissingColumn(String),

    #[error("model returned class index {index}, but the label decoder knows {known} classes")]
    UnknownClass { index: i64, known: usize },

    #[error("model returned {got} class probabilities, expected {expected}")]
    ProbabilityShape { expected: usize, got: usize },

    #[error("model returned probability {value} for class {index}, outside [0, 1]")]
    ProbabilityRange { index: usize, value: f32 },

    #[error("{0}")]
    Other(String),
}
