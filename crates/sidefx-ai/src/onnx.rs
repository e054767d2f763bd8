//! ONNX Runtime backend for a scikit-learn pipeline exported to ONNX.
//!
//! The exported graph takes one `[N, 1]` input per feature column, named
//! after the column. Outputs are an int64 label tensor and, optionally,
//! class probabilities as either a `[N, classes]` float tensor or the
//! `seq(map(int64, float))` zipmap form.

use std::path::Path;
use std::sync::Mutex;

use arrow::array::{Array, Float32Array, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use ort::memory::Allocator;
use ort::session::{Session, SessionInputValue, SessionOutputs};
use ort::tensor::TensorElementType;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor, ValueType};
use tracing::{debug, info};

use crate::pipeline::{Pipeline, PipelineError, RawPrediction};

/// A graph input and the element type it expects.
struct GraphInput {
    name: String,
    ty: TensorElementType,
}

/// Pipeline backed by an ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so runs are serialized.
pub struct OnnxPipeline {
    session: Mutex<Session>,
    inputs: Vec<GraphInput>,
    label_output: String,
    proba_output: Option<String>,
}

impl OnnxPipeline {
    /// Load an exported pipeline from `path`.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let session = Session::builder()?.commit_from_file(path)?;

        let inputs = session
            .inputs()
            .iter()
            .map(|input| match input.dtype() {
                ValueType::Tensor { ty, .. } => Ok(GraphInput {
                    name: input.name().to_string(),
                    ty: *ty,
                }),
                other => Err(PipelineError::Other(format!(
                    "graph input '{}' is not a tensor: {other:?}",
                    input.name()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        let label_output = output_names
            .iter()
            .find(|n| n.contains("label"))
            .or_else(|| output_names.first())
            .cloned()
            .ok_or_else(|| PipelineError::Other("model graph has no outputs".into()))?;

        let proba_output = output_names
            .iter()
            .find(|n| n.contains("prob"))
            .or_else(|| output_names.iter().find(|n| **n != label_output))
            .cloned();

        info!(
            model = %path.display(),
            inputs = inputs.len(),
            label_output = %label_output,
            proba_output = ?proba_output,
            "loaded ONNX pipeline"
        );

        Ok(Self {
            session: Mutex::new(session),
            inputs,
            label_output,
            proba_output,
        })
    }
}

impl Pipeline for OnnxPipeline {
    fn predict(&self, row: &RecordBatch) -> Result<RawPrediction, PipelineError> {
        let mut feeds: Vec<(String, SessionInputValue<'static>)> =
            Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let value = input_tensor(row, input)?;
            feeds.push((input.name.clone(), SessionInputValue::from(value)));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| PipelineError::Other("ONNX session lock poisoned".into()))?;
        let outputs = session.run(feeds)?;

        let class_index = extract_label(&outputs, &self.label_output)?;
        let probabilities = match &self.proba_output {
            Some(name) => extract_probabilities(&outputs, name)?,
            None => None,
        };

        debug!(class_index, has_probabilities = probabilities.is_some(), "ONNX run complete");
        Ok(RawPrediction {
            class_index,
            probabilities,
        })
    }

    fn describe(&self) -> String {
        format!("onnx ({} inputs)", self.inputs.len())
    }
}

/// Build the `[1, 1]` tensor for one graph input from the same-named column.
fn input_tensor(row: &RecordBatch, input: &GraphInput) -> Result<DynValue, PipelineError> {
    let column = row
        .column_by_name(&input.name)
        .ok_or_else(|| PipelineError::MissingColumn(input.name.clone()))?;
    let shape = [1_i64, 1];

    let value = match input.ty {
        TensorElementType::String => {
            let col = cast(column, &DataType::Utf8)?;
            let text = col
                .as_any()
                .downcast_ref::<StringArray>()
                .map(|a| a.value(0).to_string())
                .ok_or_else(|| cast_failed(&input.name, "string"))?;
            Tensor::from_string_array((shape, &[text][..]))?.into_dyn()
        }
        TensorElementType::Float32 => {
            let col = cast(column, &DataType::Float32)?;
            let v = col
                .as_any()
                .downcast_ref::<Float32Array>()
                .map(|a| a.value(0))
                .ok_or_else(|| cast_failed(&input.name, "float32"))?;
            Tensor::from_array((shape, vec![v].into_boxed_slice()))?.into_dyn()
        }
        TensorElementType::Float64 => {
            let col = cast(column, &DataType::Float64)?;
            let v = col
                .as_any()
                .downcast_ref::<Float64Array>()
                .map(|a| a.value(0))
                .ok_or_else(|| cast_failed(&input.name, "float64"))?;
            Tensor::from_array((shape, vec![v].into_boxed_slice()))?.into_dyn()
        }
        TensorElementType::Int64 => {
            let col = cast(column, &DataType::Int64)?;
            let v = col
                .as_any()
                .downcast_ref::<Int64Array>()
                .map(|a| a.value(0))
                .ok_or_else(|| cast_failed(&input.name, "int64"))?;
            Tensor::from_array((shape, vec![v].into_boxed_slice()))?.into_dyn()
        }
        other => {
            return Err(PipelineError::Other(format!(
                "graph input '{}' has unsupported element type {other:?}",
                input.name
            )));
        }
    };

    Ok(value)
}

fn cast_failed(column: &str, ty: &str) -> PipelineError {
    PipelineError::Other(format!("column '{column}' could not be read as {ty}"))
}

fn extract_label(outputs: &SessionOutputs, name: &str) -> Result<i64, PipelineError> {
    let output = outputs
        .get(name)
        .ok_or_else(|| PipelineError::Other(format!("model produced no '{name}' output")))?;
    let (_, labels) = output.try_extract_tensor::<i64>()?;
    labels
        .first()
        .copied()
        .ok_or_else(|| PipelineError::Other(format!("'{name}' output is empty")))
}

/// Class probabilities for the first row, indexed by encoded class.
fn extract_probabilities(
    outputs: &SessionOutputs,
    name: &str,
) -> Result<Option<Vec<f32>>, PipelineError> {
    let Some(output) = outputs.get(name) else {
        return Ok(None);
    };

    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        return first_row(shape, data).map(Some);
    }

    if DynSequenceValueType::can_downcast(output.dtype()) {
        return extract_from_sequence_map(output).map(Some);
    }

    Err(PipelineError::Other(format!(
        "'{name}' output has unsupported type {:?}",
        output.dtype()
    )))
}

/// Probabilities from the zipmap form: `seq(map(int64, float))`.
fn extract_from_sequence_map(output: &DynValue) -> Result<Vec<f32>, PipelineError> {
    let allocator = Allocator::default();
    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| PipelineError::Other(format!("probability output is not a sequence: {e}")))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let first = maps
        .first()
        .ok_or_else(|| PipelineError::Other("probability sequence is empty".into()))?;

    let pairs = first.try_extract_key_values::<i64, f32>()?;
    dense_from_pairs(pairs)
}

/// The first row of a `[N, classes]` (or flat `[classes]`) probability tensor.
fn first_row(dims: &[i64], data: &[f32]) -> Result<Vec<f32>, PipelineError> {
    let classes = match dims {
        [_, n] | [n] => usize::try_from(*n).map_err(|_| {
            PipelineError::Other(format!("probability tensor has invalid dimension {n}"))
        })?,
        _ => data.len(),
    };
    if classes > data.len() {
        return Err(PipelineError::ProbabilityShape {
            expected: classes,
            got: data.len(),
        });
    }
    Ok(data[..classes].to_vec())
}

/// Zipmap pairs as a dense vector. Keys must be exactly `0..n`.
fn dense_from_pairs(mut pairs: Vec<(i64, f32)>) -> Result<Vec<f32>, PipelineError> {
    pairs.sort_by_key(|(class, _)| *class);
    for (position, (class, _)) in pairs.iter().enumerate() {
        if usize::try_from(*class).ok() != Some(position) {
            return Err(PipelineError::Other(format!(
                "probability map has class key {class} at position {position}; \
                 keys must be 0..{}",
                pairs.len()
            )));
        }
    }
    Ok(pairs.into_iter().map(|(_, p)| p).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidefx_core::FeatureRecord;
    use sidefx_core::schema::{DOSAGE_MG, DRUG_CLASS, EXPIRY_DATE};
    use std::path::PathBuf;

    fn model_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("models")
            .join(crate::loader::PIPELINE_FILE)
    }

    fn require_model() -> PathBuf {
        let path = model_path();
        if !path.exists() {
            panic!(
                "Model not found. Export the trained pipeline with skl2onnx to:\n  {}",
                path.display()
            );
        }
        path
    }

    fn record() -> FeatureRecord {
        FeatureRecord::new(
            500.0,
            "Analgesic",
            "Pain",
            "Nausea",
            "Liver disease",
            "Do not exceed dose",
            "Approved",
            365,
        )
    }

    #[test]
    #[ignore = "needs models/best_pipeline.onnx"]
    fn predicts_with_exported_pipeline() {
        let pipeline = OnnxPipeline::load(&require_model()).unwrap();
        let row = record().to_feature_row().unwrap();
        let prediction = pipeline.predict(&row).unwrap();
        assert!(prediction.class_index >= 0);
        if let Some(probs) = prediction.probabilities {
            let sum: f32 = probs.iter().sum();
            assert!((sum - 1.0).abs() < 1e-3, "probabilities sum to {sum}");
        }
    }

    #[test]
    #[ignore = "needs models/best_pipeline.onnx"]
    fn repeated_runs_agree() {
        let pipeline = OnnxPipeline::load(&require_model()).unwrap();
        let row = record().to_feature_row().unwrap();
        assert_eq!(pipeline.predict(&row).unwrap(), pipeline.predict(&row).unwrap());
    }

    fn graph_input(name: &str, ty: TensorElementType) -> GraphInput {
        GraphInput {
            name: name.to_string(),
            ty,
        }
    }

    #[test]
    fn graph_input_without_column_is_missing_column() {
        let row = record().to_feature_row().unwrap();
        let err = input_tensor(&row, &graph_input("not_a_column", TensorElementType::Float32))
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(name) if name == "not_a_column"));
    }

    #[test]
    fn dosage_is_cast_to_float32() {
        let row = record().to_feature_row().unwrap();
        let value = input_tensor(&row, &graph_input(DOSAGE_MG, TensorElementType::Float32)).unwrap();
        let (shape, data) = value.try_extract_tensor::<f32>().unwrap();
        let dims: &[i64] = shape;
        assert_eq!(dims, &[1, 1]);
        assert_eq!(data, &[500.0]);
    }

    #[test]
    fn dosage_stays_float64() {
        let row = record().to_feature_row().unwrap();
        let value = input_tensor(&row, &graph_input(DOSAGE_MG, TensorElementType::Float64)).unwrap();
        let (_, data) = value.try_extract_tensor::<f64>().unwrap();
        assert_eq!(data, &[500.0]);
    }

    #[test]
    fn expiry_alias_is_int64() {
        let row = record().to_feature_row().unwrap();
        let value = input_tensor(&row, &graph_input(EXPIRY_DATE, TensorElementType::Int64)).unwrap();
        let (shape, data) = value.try_extract_tensor::<i64>().unwrap();
        let dims: &[i64] = shape;
        assert_eq!(dims, &[1, 1]);
        assert_eq!(data, &[365]);
    }

    #[test]
    fn text_column_becomes_string_tensor() {
        let row = record().to_feature_row().unwrap();
        let value = input_tensor(&row, &graph_input(DRUG_CLASS, TensorElementType::String)).unwrap();
        let (_, strings) = value.try_extract_strings().unwrap();
        assert_eq!(strings, vec!["Analgesic".to_string()]);
    }

    #[test]
    fn unsupported_element_type_is_rejected() {
        let row = record().to_feature_row().unwrap();
        let err = input_tensor(&row, &graph_input(DOSAGE_MG, TensorElementType::Bool)).unwrap_err();
        assert!(matches!(err, PipelineError::Other(msg) if msg.contains("unsupported")));
    }

    #[test]
    fn first_row_takes_class_count_from_shape() {
        let data = [0.2, 0.3, 0.5, 0.9, 0.05, 0.05];
        assert_eq!(first_row(&[2, 3], &data).unwrap(), vec![0.2, 0.3, 0.5]);
        assert_eq!(first_row(&[3], &data[..3]).unwrap(), vec![0.2, 0.3, 0.5]);
    }

    #[test]
    fn negative_dimension_is_rejected() {
        let err = first_row(&[1, -3], &[0.5, 0.5]).unwrap_err();
        assert!(matches!(err, PipelineError::Other(msg) if msg.contains("-3")));
    }

    #[test]
    fn dimension_larger_than_data_is_rejected() {
        let err = first_row(&[1, 4], &[0.5, 0.5]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ProbabilityShape {
                expected: 4,
                got: 2
            }
        ));
    }

    #[test]
    fn zipmap_pairs_are_ordered_by_class() {
        let dense = dense_from_pairs(vec![(2, 0.7), (0, 0.1), (1, 0.2)]).unwrap();
        assert_eq!(dense, vec![0.1, 0.2, 0.7]);
    }

    #[test]
    fn zipmap_key_gap_is_rejected() {
        let err = dense_from_pairs(vec![(0, 0.1), (2, 0.2), (3, 0.7)]).unwrap_err();
        assert!(matches!(err, PipelineError::Other(msg) if msg.contains("class key 2")));
    }

    #[test]
    fn zipmap_negative_key_is_rejected() {
        assert!(dense_from_pairs(vec![(-1, 0.5), (0, 0.5)]).is_err());
    }

    #[test]
    fn garbage_file_fails_to_load() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, b"definitely not onnx").unwrap();
        assert!(OnnxPipeline::load(f.path()).is_err());
    }
}
