use std::path::Path;

use axum::{
    body::Bytes,
    extract::{FromRequest, Json, Request, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Form, Router,
};
use serde_json::{Map, Value};
use tower_http::services::ServeFile;
use tracing::warn;

use crate::{
    app_state::AppState,
    error::ApiError,
    models::{AnalysisDocument, AnonymityStats, DataDump, HealthReport, SubmissionReceipt, SurveyRole},
    service::SurveyService,
};

const EXPORT_FILE_NAME: &str = "lms-research-data.json";

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/survey/student", post(student_survey_handler))
        .route("/api/survey/professor", post(professor_survey_handler))
        .route("/api/data/all", get(all_data_handler))
        .route("/api/analysis", get(analysis_handler))
        .route("/api/analysis/refresh", post(refresh_analysis_handler))
        .route("/api/stats/anonymous", get(anonymous_stats_handler))
        .route("/api/export/json", get(export_json_handler))
        .route("/api/health", get(health_handler))
        .with_state(app_state)
}

/// Páginas HTML de la aplicación (formularios, resultados y panel).
pub fn pages_router(public_dir: &Path) -> Router {
    let pages = [
        ("/", "index.html"),
        ("/student-survey", "student-survey.html"),
        ("/professor-survey", "professor-survey.html"),
        ("/results", "results.html"),
        ("/dashboard", "dashboard.html"),
        ("/report", "research-report.html"),
    ];

    pages
        .into_iter()
        .fold(Router::new(), |router, (route, file)| {
            router.route_service(route, ServeFile::new(public_dir.join(file)))
        })
}

/// Ejecuta una operación del servicio (E/S de ficheros síncrona) fuera del
/// hilo del runtime.
async fn run_blocking<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&SurveyService) -> Result<T, ApiError> + Send + 'static,
{
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || op(&service)).await?
}

// --- Handlers ---

#[axum::debug_handler]
async fn student_survey_handler(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    submit(&state, SurveyRole::Student, request).await
}

#[axum::debug_handler]
async fn professor_survey_handler(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    submit(&state, SurveyRole::Professor, request).await
}

async fn submit(
    state: &AppState,
    role: SurveyRole,
    request: Request,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    let payload = read_payload(request).await;
    let receipt = run_blocking(state, move |service| {
        service.submit(role, payload).map_err(ApiError::Save)
    })
    .await?;
    Ok(Json(receipt))
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("application/x-www-form-urlencoded"))
}

/// Lee el cuerpo como formulario HTML o como JSON según el `Content-Type`.
/// Un cuerpo ilegible se trata como un envío vacío.
async fn read_payload(request: Request) -> Map<String, Value> {
    if is_form(request.headers()) {
        match Form::<Vec<(String, String)>>::from_request(request, &()).await {
            Ok(Form(pairs)) => form_to_map(pairs),
            Err(e) => {
                warn!("Formulario de encuesta ilegible ({}); se usan valores por defecto.", e);
                Map::new()
            }
        }
    } else {
        match Bytes::from_request(request, &()).await {
            Ok(body) => parse_payload(&body),
            Err(e) => {
                warn!("No se pudo leer el cuerpo de la encuesta ({}).", e);
                Map::new()
            }
        }
    }
}

/// Convierte pares de formulario en un objeto. Las claves repetidas o con
/// sufijo `[]` (casillas de selección múltiple) se agrupan en una lista.
fn form_to_map(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        let (key, is_list) = match key.strip_suffix("[]") {
            Some(base) => (base.to_string(), true),
            None => (key, false),
        };
        let value = Value::String(value);
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None if is_list => {
                map.insert(key, Value::Array(vec![value]));
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    map
}

fn parse_payload(body: &[u8]) -> Map<String, Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Map::new();
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("Payload de encuesta no es un objeto JSON; se usan valores por defecto.");
            Map::new()
        }
        Err(e) => {
            warn!("Payload de encuesta ilegible ({}); se usan valores por defecto.", e);
            Map::new()
        }
    }
}

#[axum::debug_handler]
async fn all_data_handler(State(state): State<AppState>) -> Result<Json<DataDump>, ApiError> {
    run_blocking(&state, |service| service.all_data().map_err(ApiError::ReadData))
        .await
        .map(Json)
}

#[axum::debug_handler]
async fn analysis_handler(
    State(state): State<AppState>,
) -> Result<Json<AnalysisDocument>, ApiError> {
    run_blocking(&state, |service| {
        service.analysis().map_err(ApiError::ReadAnalysis)
    })
    .await
    .map(Json)
}

#[axum::debug_handler]
async fn refresh_analysis_handler(
    State(state): State<AppState>,
) -> Result<Json<AnalysisDocument>, ApiError> {
    run_blocking(&state, |service| {
        service.refresh_analysis().map_err(ApiError::Refresh)
    })
    .await
    .map(Json)
}

#[axum::debug_handler]
async fn anonymous_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<AnonymityStats>, ApiError> {
    run_blocking(&state, |service| {
        service.anonymous_stats().map_err(ApiError::ReadData)
    })
    .await
    .map(Json)
}

#[axum::debug_handler]
async fn export_json_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let bundle = run_blocking(&state, |service| {
        service.export_bundle().map_err(ApiError::Export)
    })
    .await?;
    let body = serde_json::to_string_pretty(&bundle).map_err(ApiError::Encode)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILE_NAME}\""),
            ),
        ],
        body,
    ))
}

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthReport>, ApiError> {
    run_blocking(&state, |service| Ok(service.health()))
        .await
        .map(Json)
}
