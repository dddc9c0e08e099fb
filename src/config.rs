//! Carga y gestión de configuración de la aplicación (servidor + almacenamiento).

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Cuándo se recalcula el documento de análisis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Tras cada envío guardado correctamente.
    OnWrite,
    /// Sólo al arrancar y con `POST /api/analysis/refresh`.
    Manual,
}

impl RefreshPolicy {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "on-write" | "onwrite" | "auto" => Ok(Self::OnWrite),
            "manual" => Ok(Self::Manual),
            other => Err(anyhow!("Política de análisis no soportada: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub data_dir: PathBuf,
    pub public_dir: PathBuf,
    pub refresh_policy: RefreshPolicy,
    pub open_browser: bool,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr = match env::var("SERVER_ADDR") {
            Ok(addr) => addr,
            Err(_) => {
                let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
                let port: u16 = port
                    .parse()
                    .map_err(|_| anyhow!("PORT inválido: {port}"))?;
                format!("0.0.0.0:{port}")
            }
        };

        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let public_dir = env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".to_string());

        let refresh_policy_str =
            env::var("ANALYSIS_REFRESH").unwrap_or_else(|_| "on-write".to_string());
        let refresh_policy = RefreshPolicy::from_str(&refresh_policy_str)?;

        let open_browser = match env::var("OPEN_BROWSER") {
            Ok(value) => parse_bool(&value)
                .ok_or_else(|| anyhow!("OPEN_BROWSER debe ser true/false: {value}"))?,
            Err(_) => false,
        };

        Ok(Self {
            server_addr,
            data_dir: PathBuf::from(data_dir),
            public_dir: PathBuf::from(public_dir),
            refresh_policy,
            open_browser,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
