use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sidefx_ai::InferenceError;
use sidefx_core::{INPUT_FIELDS, ValidationErrors};
use thiserror::Error;
use tracing::warn;

const PREDICTION_HINT: &str = "Ensure your input data matches the features used during training.";

/// Everything that can go wrong while serving `POST /predict`.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request body is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("wrong JSON type: {}", .0.join("; "))]
    WrongType(Vec<String>),

    #[error("invalid input: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Serialize)]
struct ErrorBody {
    status_code: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Inference(InferenceError::ModelNotReady { .. }) | Self::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            Self::Inference(InferenceError::ModelNotReady { .. }) | Self::Task(_) => None,
            Self::Inference(InferenceError::PredictionFailed(_)) => {
                Some(PREDICTION_HINT.to_string())
            }
            Self::Invalid(_) => Some(
                "dosage_mg must be a non-negative number, text fields must be non-empty, \
                 and expiry_date must be YYYY-MM-DD."
                    .to_string(),
            ),
            Self::MalformedJson(_) | Self::NotAnObject | Self::WrongType(_) => Some(format!(
                "Send a JSON object with the fields: {}. dosage_mg may be a number or a \
                 string; every other field must be a string.",
                INPUT_FIELDS.join(", ")
            )),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Inference(InferenceError::ModelNotReady { .. }) => {
                "Internal Server Error! Model not loaded.".to_string()
            }
            Self::Task(_) => "Internal Server Error! Inference did not complete.".to_string(),
            Self::Inference(InferenceError::PredictionFailed(cause)) => {
                format!("Inference failed: {cause}")
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(status = status.as_u16(), error = %self, "predict request failed");
        let body = ErrorBody {
            status_code: status.as_u16(),
            message: self.message(),
            hint: self.hint(),
        };
        (status, Json(body)).into_response()
    }
}
