use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sentiment_runtime::{InferenceError, NotReadyError};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to HTTP clients as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    NotReady(#[from] NotReadyError),
    #[error("Erreur lors de la prédiction: {0}")]
    Prediction(#[source] InferenceError),
    #[error("Erreur lors de la prédiction par lot: {0}")]
    BatchPrediction(#[source] InferenceError),
    #[error("Erreur lors de la prédiction: la tâche d'inférence a été interrompue")]
    Interrupted,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            log::error!("{self}");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
