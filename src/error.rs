//! Tipos de error: persistencia (`StoreError`) y su traducción a HTTP (`ApiError`).

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Error de E/S en {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON inválido en {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errores visibles para el cliente. Todos terminan en HTTP 500 con un
/// mensaje en árabe; el detalle sólo va al log.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Error guardando la encuesta: {0}")]
    Save(#[source] StoreError),

    #[error("Error leyendo los datos: {0}")]
    ReadData(#[source] StoreError),

    #[error("Error leyendo el análisis: {0}")]
    ReadAnalysis(#[source] StoreError),

    #[error("Error recalculando el análisis: {0}")]
    Refresh(#[source] StoreError),

    #[error("Error exportando los datos: {0}")]
    Export(#[source] StoreError),

    #[error("Error serializando la exportación: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Tarea de E/S interrumpida: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn user_message(&self) -> &'static str {
        match self {
            ApiError::Save(_) => "خطأ في حفظ البيانات",
            ApiError::ReadData(_) => "خطأ في قراءة البيانات",
            ApiError::ReadAnalysis(_) => "خطأ في قراءة التحليلات",
            ApiError::Refresh(_) => "خطأ في تحديث التحليلات",
            ApiError::Export(_) | ApiError::Encode(_) => "خطأ في التصدير",
            ApiError::Task(_) => "خطأ داخلي في الخادم",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("{}", self);
        let body = Json(json!({
            "success": false,
            "error": self.user_message(),
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
