//! Inference adapter: the narrow `classify` boundary in front of a loaded
//! pipeline and label decoder.
//!
//! The adapter is either `Unready` (nothing loaded) or `Ready`. The state is
//! fixed at construction; a failed load leaves it unready for the life of
//! the process.

use serde::Serialize;
use serde::ser::Serializer;
use sidefx_core::FeatureRecord;
use thiserror::Error;
use tracing::debug;

use crate::labels::LabelDecoder;
use crate::pipeline::{Pipeline, PipelineError};

#[derive(Debug, Error)]
pub enum InferenceError {
    /// No model is loaded. Retrying with different input will not help.
    #[error("model not ready: {reason}")]
    ModelNotReady { reason: String },

    /// The model call (or decoding its output) failed for this record.
    #[error("prediction failed: {0}")]
    PredictionFailed(#[source] PipelineError),
}

/// Per-class probabilities in the decoder's canonical class order.
///
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities(Vec<(String, f64)>);

impl ClassProbabilities {
    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, p)| *p)
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().map(|(_, p)| p).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(l, p)| (l.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(l, p)| (l, p)))
    }
}

/// Outcome of classifying one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    pub probabilities: Option<ClassProbabilities>,
}

enum State {
    Unready {
        reason: String,
    },
    Ready {
        pipeline: Box<dyn Pipeline>,
        decoder: LabelDecoder,
    },
}

/// Classifies feature records with a loaded pipeline.
///
/// Read-only after construction; share it behind an `Arc`.
pub struct InferenceAdapter {
    state: State,
}

impl InferenceAdapter {
    /// An adapter with no model. Every `classify` call fails with
    /// [`InferenceError::ModelNotReady`] carrying `reason`.
    pub fn unready(reason: impl Into<String>) -> Self {
        Self {
            state: State::Unready {
                reason: reason.into(),
            },
        }
    }

    /// An adapter around a loaded pipeline and its label decoder.
    pub fn ready(pipeline: Box<dyn Pipeline>, decoder: LabelDecoder) -> Self {
        Self {
            state: State::Ready { pipeline, decoder },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready { .. })
    }

    /// Why the adapter is unready, or `None` when ready.
    pub fn unready_reason(&self) -> Option<&str> {
        match &self.state {
            State::Unready { reason } => Some(reason),
            State::Ready { .. } => None,
        }
    }

    /// Label classes, in canonical order, when ready.
    pub fn classes(&self) -> Option<&[String]> {
        match &self.state {
            State::Unready { .. } => None,
            State::Ready { decoder, .. } => Some(decoder.classes()),
        }
    }

    /// Classify one record.
    ///
    /// The pipeline is called exactly once. Its class index is decoded with
    /// the label decoder, and any probabilities are aligned to the decoder's
    /// class order.
    pub fn classify(&self, record: &FeatureRecord) -> Result<ClassificationResult, InferenceError> {
        let (pipeline, decoder) = match &self.state {
            State::Unready { reason } => {
                return Err(InferenceError::ModelNotReady {
                    reason: reason.clone(),
                });
            }
            State::Ready { pipeline, decoder } => (pipeline, decoder),
        };

        predict_and_decode(pipeline.as_ref(), decoder, record)
            .map_err(InferenceError::PredictionFailed)
    }
}

fn predict_and_decode(
    pipeline: &dyn Pipeline,
    decoder: &LabelDecoder,
    record: &FeatureRecord,
) -> Result<ClassificationResult, PipelineError> {
    let row = record.to_feature_row()?;
    let raw = pipeline.predict(&row)?;

    let label = decoder
        .decode(raw.class_index)
        .ok_or(PipelineError::UnknownClass {
            index: raw.class_index,
            known: decoder.len(),
        })?
        .to_string();

    let probabilities = match raw.probabilities {
        None => None,
        Some(values) => {
            if values.len() != decoder.len() {
                return Err(PipelineError::ProbabilityShape {
                    expected: decoder.len(),
                    got: values.len(),
                });
            }
            if let Some((index, &value)) = values
                .iter()
                .enumerate()
                .find(|(_, p)| !(0.0..=1.0).contains(*p))
            {
                return Err(PipelineError::ProbabilityRange { index, value });
            }
            let pairs = decoder
                .classes()
                .iter()
                .cloned()
                .zip(values.into_iter().map(f64::from))
                .collect();
            Some(ClassProbabilities(pairs))
        }
    };

    debug!(
        label = %label,
        class_index = raw.class_index,
        backend = %pipeline.describe(),
        "classified record"
    );

    Ok(ClassificationResult {
        label,
        probabilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RawPrediction;
    use arrow::array::{Array, Float64Array, Int64Array};
    use arrow::record_batch::RecordBatch;
    use sidefx_core::schema::{DAYS_UNTIL_EXPIRY, DOSAGE_MG, EXPIRY_DATE, FEATURE_COLUMNS};
    use std::sync::Mutex;

    /// Pipeline returning a canned prediction and remembering the rows it saw.
    struct FixedPipeline {
        prediction: RawPrediction,
        seen: Mutex<Vec<RecordBatch>>,
    }

    impl FixedPipeline {
        fn new(class_index: i64, probabilities: Option<Vec<f32>>) -> Self {
            Self {
                prediction: RawPrediction {
                    class_index,
                    probabilities,
                },
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Pipeline for FixedPipeline {
        fn predict(&self, row: &RecordBatch) -> Result<RawPrediction, PipelineError> {
            self.seen.lock().unwrap().push(row.clone());
            Ok(self.prediction.clone())
        }
    }

    impl Pipeline for std::sync::Arc<FixedPipeline> {
        fn predict(&self, row: &RecordBatch) -> Result<RawPrediction, PipelineError> {
            self.as_ref().predict(row)
        }
    }

    struct FailingPipeline;

    impl Pipeline for FailingPipeline {
        fn predict(&self, _row: &RecordBatch) -> Result<RawPrediction, PipelineError> {
            Err(PipelineError::Other("unknown category 'Herbal' in drug_class".into()))
        }
    }

    fn decoder() -> LabelDecoder {
        LabelDecoder::from_classes(["Mild", "Moderate", "Severe"]).unwrap()
    }

    fn record() -> FeatureRecord {
        FeatureRecord::new(
            100.0,
            "Antiviral",
            "Influenza",
            "Headache",
            "Pregnancy",
            "Monitor liver",
            "Approved",
            42,
        )
    }

    #[test]
    fn unready_adapter_reports_model_not_ready() {
        let adapter = InferenceAdapter::unready("best_pipeline.onnx not found");
        assert!(!adapter.is_ready());
        let err = adapter.classify(&record()).unwrap_err();
        assert!(
            matches!(&err, InferenceError::ModelNotReady { reason } if reason.contains("best_pipeline.onnx"))
        );
    }

    #[test]
    fn decodes_label_through_decoder() {
        let adapter =
            InferenceAdapter::ready(Box::new(FixedPipeline::new(2, None)), decoder());
        let result = adapter.classify(&record()).unwrap();
        assert_eq!(result.label, "Severe");
        assert!(result.probabilities.is_none());
    }

    #[test]
    fn probabilities_follow_decoder_order() {
        let decoder = LabelDecoder::from_classes(["Severe", "Mild", "Moderate"]).unwrap();
        let adapter = InferenceAdapter::ready(
            Box::new(FixedPipeline::new(1, Some(vec![0.1, 0.7, 0.2]))),
            decoder,
        );
        let result = adapter.classify(&record()).unwrap();
        assert_eq!(result.label, "Mild");

        let probs = result.probabilities.unwrap();
        let order: Vec<&str> = probs.iter().map(|(l, _)| l).collect();
        assert_eq!(order, vec!["Severe", "Mild", "Moderate"]);
        assert!((probs.get("Mild").unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn probability_sum_is_preserved() {
        let values = vec![0.2f32, 0.5, 0.3];
        let expected: f64 = values.iter().map(|&v| f64::from(v)).sum();
        let adapter =
            InferenceAdapter::ready(Box::new(FixedPipeline::new(1, Some(values))), decoder());
        let probs = adapter.classify(&record()).unwrap().probabilities.unwrap();
        assert!((probs.sum() - expected).abs() < 1e-9);
        assert!((probs.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn probabilities_serialize_as_ordered_object() {
        let decoder = LabelDecoder::from_classes(["Severe", "Mild"]).unwrap();
        let adapter = InferenceAdapter::ready(
            Box::new(FixedPipeline::new(0, Some(vec![0.75, 0.25]))),
            decoder,
        );
        let probs = adapter.classify(&record()).unwrap().probabilities.unwrap();
        let json = serde_json::to_string(&probs).unwrap();
        assert_eq!(json, r#"{"Severe":0.75,"Mild":0.25}"#);
    }

    #[test]
    fn unknown_class_index_is_prediction_failure() {
        let adapter =
            InferenceAdapter::ready(Box::new(FixedPipeline::new(7, None)), decoder());
        let err = adapter.classify(&record()).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::PredictionFailed(PipelineError::UnknownClass { index: 7, known: 3 })
        ));
    }

    #[test]
    fn misaligned_probabilities_are_prediction_failure() {
        let adapter = InferenceAdapter::ready(
            Box::new(FixedPipeline::new(0, Some(vec![0.5, 0.5]))),
            decoder(),
        );
        let err = adapter.classify(&record()).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::PredictionFailed(PipelineError::ProbabilityShape {
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn out_of_range_probabilities_are_prediction_failure() {
        for (values, bad_index) in [
            (vec![f32::NAN, 0.5, 0.5], 0),
            (vec![0.0, 1.5, 0.0], 1),
            (vec![0.8, 0.7, -0.5], 2),
        ] {
            let adapter =
                InferenceAdapter::ready(Box::new(FixedPipeline::new(0, Some(values))), decoder());
            let err = adapter.classify(&record()).unwrap_err();
            assert!(
                matches!(
                    err,
                    InferenceError::PredictionFailed(PipelineError::ProbabilityRange { index, .. })
                        if index == bad_index
                ),
                "{err:?}"
            );
        }
    }

    #[test]
    fn boundary_probabilities_are_accepted() {
        let adapter = InferenceAdapter::ready(
            Box::new(FixedPipeline::new(2, Some(vec![0.0, 0.0, 1.0]))),
            decoder(),
        );
        let probs = adapter.classify(&record()).unwrap().probabilities.unwrap();
        assert_eq!(probs.get("Severe"), Some(1.0));
    }

    #[test]
    fn backend_errors_are_wrapped() {
        let adapter = InferenceAdapter::ready(Box::new(FailingPipeline), decoder());
        let err = adapter.classify(&record()).unwrap_err();
        assert!(matches!(err, InferenceError::PredictionFailed(_)));
        assert!(err.to_string().contains("Herbal"));
    }

    #[test]
    fn classify_is_idempotent() {
        let adapter = InferenceAdapter::ready(
            Box::new(FixedPipeline::new(1, Some(vec![0.3, 0.6, 0.1]))),
            decoder(),
        );
        let first = adapter.classify(&record()).unwrap();
        let second = adapter.classify(&record()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn pipeline_sees_training_column_layout() {
        let pipeline = std::sync::Arc::new(FixedPipeline::new(0, None));
        let adapter = InferenceAdapter::ready(Box::new(pipeline.clone()), decoder());
        adapter.classify(&record()).unwrap();

        let seen = pipeline.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let row = &seen[0];
        assert_eq!(row.num_rows(), 1);

        let names: Vec<String> = row.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, FEATURE_COLUMNS);

        let days = |name: &str| {
            row.column_by_name(name)
                .unwrap()
                .as_any()
                .downcast_ref::<Int64Array>()
                .unwrap()
                .value(0)
        };
        assert_eq!(days(DAYS_UNTIL_EXPIRY), 42);
        assert_eq!(days(EXPIRY_DATE), 42);

        let dosage = row
            .column_by_name(DOSAGE_MG)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!(!dosage.is_null(0));
        assert_eq!(dosage.value(0), 100.0);
    }

    #[test]
    fn ready_adapter_exposes_classes() {
        let adapter =
            InferenceAdapter::ready(Box::new(FixedPipeline::new(0, None)), decoder());
        assert_eq!(adapter.unready_reason(), None);
        assert_eq!(adapter.classes().unwrap().len(), 3);
    }
}
