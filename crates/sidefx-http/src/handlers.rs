use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use sidefx_ai::{ClassProbabilities, InferenceAdapter, InferenceError};
use sidefx_core::schema::DOSAGE_MG;
use sidefx_core::{INPUT_FIELDS, RawFields, validate};
use tracing::info;

use crate::error::RequestError;

/// Shared state handed to every handler.
pub struct AppState {
    pub adapter: Arc<InferenceAdapter>,
    /// Reference time for expiry derivation.
    now: fn() -> NaiveDateTime,
}

impl AppState {
    pub fn new(adapter: Arc<InferenceAdapter>) -> Self {
        Self::with_clock(adapter, local_now)
    }

    pub fn with_clock(adapter: Arc<InferenceAdapter>, now: fn() -> NaiveDateTime) -> Self {
        Self { adapter, now }
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Build the axum [`Router`] with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    status_code: u16,
    prediction_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction_probabilities: Option<ClassProbabilities>,
}

async fn predict_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PredictResponse>, RequestError> {
    if let Some(reason) = state.adapter.unready_reason() {
        return Err(InferenceError::ModelNotReady {
            reason: reason.to_string(),
        }
        .into());
    }

    let raw = raw_fields_from_json(&body)?;
    let record = validate(&raw, (state.now)())?;
    let days_until_expiry = record.days_until_expiry();

    let adapter = Arc::clone(&state.adapter);
    let result = tokio::task::spawn_blocking(move || adapter.classify(&record)).await??;

    info!(
        prediction_class = %result.label,
        days_until_expiry,
        "prediction served"
    );

    Ok(Json(PredictResponse {
        status_code: 200,
        prediction_class: result.label,
        prediction_probabilities: result.probabilities,
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let body = match state.adapter.unready_reason() {
        None => serde_json::json!({
            "status": "ready",
            "model_loaded": true,
            "classes": state.adapter.classes(),
        }),
        Some(_) => serde_json::json!({
            "status": "unready",
            "model_loaded": false,
        }),
    };
    Json(body)
}

/// Convert a JSON request body into raw string fields.
///
/// `dosage_mg` may be a string or a number; every other input field must be
/// a string. `null` counts as absent and unknown keys are dropped. Values of
/// any other type are reported together, by field name.
pub fn raw_fields_from_json(body: &[u8]) -> Result<RawFields, RequestError> {
    let value: Value = serde_json::from_slice(body)?;
    let Value::Object(map) = value else {
        return Err(RequestError::NotAnObject);
    };

    let mut raw = RawFields::new();
    let mut wrong = Vec::new();
    for name in INPUT_FIELDS {
        let text = match map.get(name) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) if name == DOSAGE_MG => n.to_string(),
            Some(other) => {
                let expected = if name == DOSAGE_MG {
                    "a number or string"
                } else {
                    "a string"
                };
                wrong.push(format!("{name} must be {expected}, got {}", json_kind(other)));
                continue;
            }
        };
        raw.insert(name.to_string(), text);
    }

    if wrong.is_empty() {
        Ok(raw)
    } else {
        Err(RequestError::WrongType(wrong))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
