//! Persistencia de las colecciones y del análisis como ficheros JSON.
//!
//! Cada escritura reemplaza el fichero completo (lectura → modificación →
//! escritura). No hay bloqueo entre escritores: dos envíos simultáneos
//! pueden perder uno de los registros.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::{
    aggregator,
    error::StoreError,
    models::{AnalysisDocument, SurveyRecord, SurveyRole},
};

/// Los tres blobs persistidos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blob {
    Students,
    Professors,
    Analysis,
}

impl Blob {
    pub fn for_role(role: SurveyRole) -> Self {
        match role {
            SurveyRole::Student => Self::Students,
            SurveyRole::Professor => Self::Professors,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Students => "student-results.json",
            Self::Professors => "professor-results.json",
            Self::Analysis => "combined-analysis.json",
        }
    }
}

/// Contrato de persistencia que usa el servicio de encuestas.
pub trait RecordStore: Send + Sync {
    fn load_records(&self, role: SurveyRole) -> Result<Vec<SurveyRecord>, StoreError>;
    fn save_records(&self, role: SurveyRole, records: &[SurveyRecord]) -> Result<(), StoreError>;
    fn load_analysis(&self) -> Result<AnalysisDocument, StoreError>;
    fn save_analysis(&self, analysis: &AnalysisDocument) -> Result<(), StoreError>;
    fn exists(&self, blob: Blob) -> bool;
}

/// Almacén basado en un directorio con un fichero JSON por blob.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Abre el directorio de datos, creándolo junto con los ficheros
    /// iniciales si todavía no existen.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let store = Self { dir };
        store.init_blob(Blob::Students, &Vec::<SurveyRecord>::new())?;
        store.init_blob(Blob::Professors, &Vec::<SurveyRecord>::new())?;
        store.init_blob(
            Blob::Analysis,
            &aggregator::aggregate(&[], &[], Utc::now()),
        )?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, blob: Blob) -> PathBuf {
        self.dir.join(blob.file_name())
    }

    fn init_blob<T: Serialize>(&self, blob: Blob, initial: &T) -> Result<(), StoreError> {
        let path = self.path(blob);
        if path.exists() {
            return Ok(());
        }
        write_json(&path, initial)?;
        info!("Fichero inicial creado: {}", path.display());
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn load_records(&self, role: SurveyRole) -> Result<Vec<SurveyRecord>, StoreError> {
        read_json(&self.path(Blob::for_role(role)))
    }

    fn save_records(&self, role: SurveyRole, records: &[SurveyRecord]) -> Result<(), StoreError> {
        write_json(&self.path(Blob::for_role(role)), &records)
    }

    fn load_analysis(&self) -> Result<AnalysisDocument, StoreError> {
        read_json(&self.path(Blob::Analysis))
    }

    fn save_analysis(&self, analysis: &AnalysisDocument) -> Result<(), StoreError> {
        write_json(&self.path(Blob::Analysis), analysis)
    }

    fn exists(&self, blob: Blob) -> bool {
        self.path(blob).is_file()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
