// Módulos de la aplicación
mod aggregator;
mod api;
mod app_state;
mod config;
mod error;
mod models;
mod normalizer;
mod service;
mod store;

use crate::{app_state::AppState, service::SurveyService, store::JsonFileStore};
use anyhow::Context;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("survey_backend=info,tower_http=info")),
        )
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Abrir el almacén de datos (crea los ficheros vacíos en el primer arranque)
    let store = JsonFileStore::open(&cfg.data_dir).with_context(|| {
        format!("Error abriendo el directorio de datos {}", cfg.data_dir.display())
    })?;
    info!("Datos en {}", store.dir().display());

    // 4. Servicio de encuestas y análisis inicial
    let service = Arc::new(SurveyService::new(Arc::new(store), cfg.refresh_policy));
    match service.refresh_analysis() {
        Ok(analysis) => info!(
            "Análisis inicial calculado: {} participantes.",
            analysis.summary.total_participants
        ),
        Err(e) => error!("Error calculando el análisis inicial: {}", e),
    }

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        service,
    };

    // 6. Configurar el router de la API, las páginas y los ficheros estáticos
    let app = api::create_router(app_state.clone())
        .merge(api::pages_router(&cfg.public_dir))
        .fallback_service(ServeDir::new(&cfg.public_dir))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    let server_url = format!("http://{}", server_addr.replace("0.0.0.0", "localhost"));
    info!("🚀 Servidor de encuestas escuchando en {}", &server_url);

    if app_state.config.open_browser {
        let dashboard_url = format!("{server_url}/dashboard");
        if webbrowser::open(&dashboard_url).is_err() {
            info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", dashboard_url);
        }
    }

    // Apagado ordenado con Ctrl-C.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
