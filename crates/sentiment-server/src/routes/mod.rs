//! HTTP handlers.
//!
//! Inference handlers take the bundle through [`Lifecycle::bundle`], which
//! answers 503 until the model is ready, and run the classifier on the
//! blocking pool so the async workers keep serving `/health`.
//!
//! [`Lifecycle::bundle`]: sentiment_runtime::Lifecycle::bundle

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use sentiment_runtime::{
    InferenceError, PredictionResult, ReadinessState, predict_many, predict_one,
};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::schemas::{
    BatchSentimentResponse, BatchTweetRequest, FeedbackRequest, HealthResponse, InfoResponse,
    StatusResponse, TweetRequest,
};
use crate::state::AppState;
use crate::telemetry::Properties;


const UNSET: &str = "Non défini";
const REPORTED_ENV: [&str; 2] = ["CUDA_VISIBLE_DEVICES", "TF_FORCE_GPU_ALLOW_GROWTH"];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/predict", post(predict))
        .route("/predict-batch", post(predict_batch))
        .route("/feedback", post(feedback))
        .route("/test-appinsights", get(test_appinsights))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "API de prédiction de sentiment pour tweets",
        "status": "opérationnel",
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let readiness = state.lifecycle.state();
    let response = match readiness {
        ReadinessState::Ready => HealthResponse {
            status: "ok",
            message: "Le modèle est chargé et prêt pour les prédictions.",
            readiness,
        },
        _ => HealthResponse {
            status: "erreur",
            message: "Le modèle n'est pas chargé.",
            readiness,
        },
    };
    Json(response)
}

async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    let backend = state
        .lifecycle
        .bundle()
        .ok()
        .map(|bundle| bundle.classifier().backend());
    let devices_available = backend.iter().map(|b| b.device.clone()).collect();
    let environment = REPORTED_ENV
        .into_iter()
        .map(|key| (key, std::env::var(key).unwrap_or_else(|_| UNSET.to_string())))
        .collect();

    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION"),
        backend,
        devices_available,
        using_gpu: false,
        readiness: state.lifecycle.state(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        environment,
    })
}

async fn run_blocking<T, F>(job: F) -> Result<Result<T, InferenceError>, ApiError>
where
    F: FnOnce() -> Result<T, InferenceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job).await.map_err(|e| {
        log::error!("Inference task failed: {e}");
        ApiError::Interrupted
    })
}

async fn predict(
    State(state): State<AppState>,
    Json(request): Json<TweetRequest>,
) -> Result<Json<PredictionResult>, ApiError> {
    let bundle = state.lifecycle.bundle()?;
    let result = run_blocking(move || predict_one(&request.text, &bundle))
        .await?
        .map_err(ApiError::Prediction)?;
    Ok(Json(result))
}

async fn predict_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchTweetRequest>,
) -> Result<Json<BatchSentimentResponse>, ApiError> {
    let bundle = state.lifecycle.bundle()?;
    if request.texts.is_empty() {
        return Ok(Json(BatchSentimentResponse { results: vec![] }));
    }
    let results = run_blocking(move || predict_many(&request.texts, &bundle))
        .await?
        .map_err(ApiError::BatchPrediction)?;
    Ok(Json(BatchSentimentResponse { results }))
}

fn feedback_properties(feedback: &FeedbackRequest) -> Properties {
    let mut properties = Properties::from([
        ("tweet".to_string(), feedback.tweet_text.clone()),
        ("prediction".to_string(), feedback.prediction.clone()),
        ("confidence".to_string(), feedback.confidence.to_string()),
        // Existing dashboards filter on these exact values.
        (
            "is_correct".to_string(),
            if feedback.is_correct { "True" } else { "False" }.to_string(),
        ),
    ]);
    if !feedback.corrected_sentiment.is_empty() {
        properties.insert(
            "corrected_sentiment".to_string(),
            feedback.corrected_sentiment.clone(),
        );
    }
    if !feedback.comments.is_empty() {
        properties.insert("comments".to_string(), feedback.comments.clone());
    }
    properties
}

async fn feedback(
    State(state): State<AppState>,
    Json(feedback): Json<FeedbackRequest>,
) -> Json<StatusResponse> {
    log::info!("Feedback received: {feedback:?}");

    // Acknowledged without waiting on the ingestion endpoint.
    if let Some(telemetry) = state.telemetry.clone() {
        let properties = feedback_properties(&feedback);
        tokio::spawn(async move {
            if let Err(e) = telemetry.track_event("model_feedback", properties).await {
                log::warn!("Failed to send feedback telemetry: {e}");
            }
        });
    }
    Json(StatusResponse::new("success", "Feedback enregistré avec succès"))
}

async fn test_appinsights(State(state): State<AppState>) -> Json<StatusResponse> {
    let Some(telemetry) = &state.telemetry else {
        return Json(StatusResponse::new(
            "error",
            "Aucun client Application Insights n'est configuré. Vérifiez la variable d'environnement APPINSIGHTS_INSTRUMENTATION_KEY.",
        ));
    };

    let properties = Properties::from([
        (
            "timestamp".to_string(),
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        ),
        ("test_id".to_string(), uuid::Uuid::new_v4().to_string()),
    ]);
    let response = match telemetry
        .track_event("appinsights_connection_test", properties)
        .await
    {
        Ok(()) => StatusResponse::new(
            "success",
            "Événement de test envoyé à Application Insights. Vérifiez le portail Azure pour confirmer la réception.",
        ),
        Err(e) => {
            log::warn!("Application Insights connection test failed: {e}");
            StatusResponse::new(
                "error",
                format!("Erreur lors du test de connexion à Application Insights: {e}"),
            )
        }
    };
    Json(response)
}
