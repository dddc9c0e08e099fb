//! Modelos de dominio: registros de encuesta, documento de análisis y
//! respuestas de la API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Valor centinela para campos ausentes o vacíos.
pub const UNSPECIFIED: &str = "غير محدد";

/// Nombre genérico que sustituye al de los participantes anónimos en la exportación.
pub const ANONYMOUS_PLACEHOLDER: &str = "مشارك مجهول";

/// Rol del participante. Cada rol tiene su propia colección.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurveyRole {
    Student,
    Professor,
}

impl SurveyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Professor => "professor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipationType {
    #[default]
    Named,
    Anonymous,
}

/// Una respuesta de encuesta ya normalizada.
///
/// Los campos comunes están tipados; el resto de campos del formulario se
/// guardan aplanados en `fields`, en el orden en que llegaron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyRecord {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    /// Nombre tal y como se envió (posiblemente vacío). Nunca se exporta.
    #[serde(default)]
    pub submitted_name: String,
    #[serde(default)]
    pub participation_type: ParticipationType,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub created_at: String,
    // Value y no f64: los registros antiguos guardaban texto ("غير محدد").
    #[serde(default)]
    pub completion_time: Value,
    #[serde(default)]
    pub completed: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SurveyRecord {
    /// Devuelve el valor de un campo por su nombre JSON.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match key {
            "completionTime" => Some(&self.completion_time),
            _ => self.fields.get(key),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.participation_type == ParticipationType::Anonymous
    }
}

// --- Documento de análisis ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Summary {
    pub total_participants: usize,
    pub student_count: usize,
    pub professor_count: usize,
    pub completion_rate: f64,
    pub average_time: f64,
    pub anonymous_count: usize,
    pub anonymous_percentage: u32,
}

/// Histograma de satisfacción con los cinco niveles fijos.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatisfactionLevels {
    #[serde(rename = "مرتفع جداً")]
    pub very_high: usize,
    #[serde(rename = "مرتفع")]
    pub high: usize,
    #[serde(rename = "متوسط")]
    pub medium: usize,
    #[serde(rename = "منخفض")]
    pub low: usize,
    #[serde(rename = "منخفض جداً")]
    pub very_low: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Charts {
    pub by_gender: BTreeMap<String, usize>,
    pub by_age: BTreeMap<String, usize>,
    pub by_education: BTreeMap<String, usize>,
    pub by_experience: BTreeMap<String, usize>,
    pub by_major: BTreeMap<String, usize>,
    pub by_department: BTreeMap<String, usize>,
    pub by_participation: BTreeMap<String, usize>,
    /// Media por característica, de mayor a menor.
    pub feature_rankings: Map<String, Value>,
    pub satisfaction_levels: SatisfactionLevels,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisDocument {
    pub summary: Summary,
    pub charts: Charts,
    pub insights: Vec<String>,
    pub last_updated: String,
}

// --- Estadísticas de anonimato ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAnonymity {
    pub total: usize,
    pub anonymous: usize,
    pub named: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymityStats {
    pub total: usize,
    pub anonymous: usize,
    pub named: usize,
    pub percentage: u32,
    pub students: RoleAnonymity,
    pub professors: RoleAnonymity,
}

// --- Respuestas de la API ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub success: bool,
    pub message: String,
    pub id: i64,
    pub display_name: String,
    pub anonymous: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Totals {
    pub students: usize,
    pub professors: usize,
    pub total: usize,
}

impl Totals {
    pub fn new(students: usize, professors: usize) -> Self {
        Self {
            students,
            professors,
            total: students + professors,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DataDump {
    pub students: Vec<SurveyRecord>,
    pub professors: Vec<SurveyRecord>,
    pub totals: Totals,
}

/// Paquete descargable con los nombres anónimos ya depurados.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub export_date: String,
    pub project: String,
    pub totals: Totals,
    pub students: Vec<Value>,
    pub professors: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageStatus {
    pub students: bool,
    pub professors: bool,
    pub analysis: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub storage: StorageStatus,
}
