//! Servicio de encuestas: orquesta normalización, guardado y recálculo del
//! análisis, y atiende las consultas de sólo lectura.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::{
    aggregator,
    config::RefreshPolicy,
    error::StoreError,
    models::{
        AnalysisDocument, AnonymityStats, DataDump, ExportBundle, HealthReport, StorageStatus,
        SubmissionReceipt, SurveyRecord, SurveyRole, Totals, ANONYMOUS_PLACEHOLDER,
    },
    normalizer::{self, IdGenerator},
    store::{Blob, RecordStore},
};

pub const EXPORT_PROJECT: &str = "LMS Research Survey";

pub struct SurveyService {
    store: Arc<dyn RecordStore>,
    refresh_policy: RefreshPolicy,
    ids: IdGenerator,
}

impl SurveyService {
    pub fn new(store: Arc<dyn RecordStore>, refresh_policy: RefreshPolicy) -> Self {
        Self {
            store,
            refresh_policy,
            ids: IdGenerator::default(),
        }
    }

    /// Normaliza y añade un envío a la colección de su rol.
    ///
    /// Si el guardado falla no se recalcula nada. Si falla el recálculo, el
    /// envío ya está guardado y se confirma igualmente.
    pub fn submit(
        &self,
        role: SurveyRole,
        payload: Map<String, Value>,
    ) -> Result<SubmissionReceipt, StoreError> {
        let now = Utc::now();
        let record = normalizer::normalize(
            payload,
            role,
            self.ids.next(now),
            now,
            &mut rand::thread_rng(),
        );
        let receipt = SubmissionReceipt {
            success: true,
            message: submission_message(role).to_string(),
            id: record.id,
            display_name: record.name.clone(),
            anonymous: record.is_anonymous(),
        };

        let mut records = self.store.load_records(role)?;
        records.push(record);
        self.store.save_records(role, &records)?;
        info!(
            "Encuesta de {} guardada (id {}, total {}).",
            role.as_str(),
            receipt.id,
            records.len()
        );

        if self.refresh_policy == RefreshPolicy::OnWrite {
            if let Err(err) = self.refresh_analysis() {
                error!("Error actualizando el análisis tras el envío {}: {}", receipt.id, err);
            }
        }

        Ok(receipt)
    }

    /// Recalcula el análisis desde cero y lo persiste.
    pub fn refresh_analysis(&self) -> Result<AnalysisDocument, StoreError> {
        let students = self.store.load_records(SurveyRole::Student)?;
        let professors = self.store.load_records(SurveyRole::Professor)?;
        let analysis = aggregator::aggregate(&students, &professors, Utc::now());
        self.store.save_analysis(&analysis)?;
        Ok(analysis)
    }

    pub fn all_data(&self) -> Result<DataDump, StoreError> {
        let students = self.store.load_records(SurveyRole::Student)?;
        let professors = self.store.load_records(SurveyRole::Professor)?;
        let totals = Totals::new(students.len(), professors.len());
        Ok(DataDump {
            students,
            professors,
            totals,
        })
    }

    /// Última instantánea guardada; no recalcula.
    pub fn analysis(&self) -> Result<AnalysisDocument, StoreError> {
        self.store.load_analysis()
    }

    pub fn anonymous_stats(&self) -> Result<AnonymityStats, StoreError> {
        let students = self.store.load_records(SurveyRole::Student)?;
        let professors = self.store.load_records(SurveyRole::Professor)?;
        Ok(aggregator::anonymity_stats(&students, &professors))
    }

    pub fn export_bundle(&self) -> Result<ExportBundle, StoreError> {
        let students = self.store.load_records(SurveyRole::Student)?;
        let professors = self.store.load_records(SurveyRole::Professor)?;
        Ok(ExportBundle {
            export_date: Utc::now().to_rfc3339(),
            project: EXPORT_PROJECT.to_string(),
            totals: Totals::new(students.len(), professors.len()),
            students: students.iter().map(scrub_for_export).collect(),
            professors: professors.iter().map(scrub_for_export).collect(),
        })
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            timestamp: Utc::now().to_rfc3339(),
            storage: StorageStatus {
                students: self.store.exists(Blob::Students),
                professors: self.store.exists(Blob::Professors),
                analysis: self.store.exists(Blob::Analysis),
            },
        }
    }
}

fn submission_message(role: SurveyRole) -> &'static str {
    match role {
        SurveyRole::Student => "تم حفظ استبيان الطالب بنجاح",
        SurveyRole::Professor => "تم حفظ استبيان الهيئة التدريسية بنجاح",
    }
}

/// Copia exportable del registro: sin el nombre original y, si es anónimo,
/// con el nombre genérico.
fn scrub_for_export(record: &SurveyRecord) -> Value {
    let mut value = serde_json::to_value(record).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.remove("submittedName");
        if record.is_anonymous() {
            map.insert("name".to_string(), Value::from(ANONYMOUS_PLACEHOLDER));
        }
    }
    value
}
