//! Normalización de envíos: convierte el payload crudo de un formulario en
//! un `SurveyRecord` completo, aplicando los valores por defecto de cada rol.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Local, Utc};
use rand::{seq::SliceRandom, Rng};
use serde_json::{Map, Value};

use crate::models::{ParticipationType, SurveyRecord, SurveyRole, UNSPECIFIED};

/// Tipo de valor por defecto de un campo esperado.
#[derive(Debug, Clone, Copy)]
enum FieldDefault {
    Text,
    Number,
    List,
    Object,
}

impl FieldDefault {
    fn value(self) -> Value {
        match self {
            Self::Text => Value::String(UNSPECIFIED.to_string()),
            Self::Number => Value::from(0),
            Self::List => Value::Array(Vec::new()),
            Self::Object => Value::Object(Map::new()),
        }
    }
}

use FieldDefault::{List, Number, Object, Text};

const STUDENT_FIELDS: &[(&str, FieldDefault)] = &[
    ("gender", Text),
    ("age", Text),
    ("major", Text),
    ("educationLevel", Text),
    ("academicYear", Text),
    ("university", Text),
    ("currentSystem", Text),
    ("usageFrequency", Text),
    ("devices", List),
    ("needs", List),
    ("challenges", List),
    ("featureRatings", Object),
    ("overallSatisfaction", Number),
    ("preferredLearningMode", Text),
    ("suggestions", Text),
];

const PROFESSOR_FIELDS: &[(&str, FieldDefault)] = &[
    ("gender", Text),
    ("age", Text),
    ("department", Text),
    ("academicRank", Text),
    ("educationLevel", Text),
    ("experience", Text),
    ("currentSystem", Text),
    ("teachingMethods", List),
    ("requirements", List),
    ("challenges", List),
    ("featureRatings", Object),
    ("systemUsefulness", Number),
    ("trainingNeeded", Text),
    ("suggestions", Text),
];

const STUDENT_PREFIXES: &[&str] = &["طالب", "متعلم", "دارس"];
const PROFESSOR_PREFIXES: &[&str] = &["أستاذ", "عضو هيئة تدريس", "محاضر"];

/// Claves gestionadas por el normalizador; nunca se copian del payload.
const RESERVED_KEYS: &[&str] = &[
    "id",
    "name",
    "submittedName",
    "participationType",
    "timestamp",
    "createdAt",
    "completionTime",
    "completed",
];

/// Rango (inclusive) del tiempo de respuesta sintético, en minutos.
pub const COMPLETION_TIME_FALLBACK: (i64, i64) = (5, 15);

pub fn name_prefixes(role: SurveyRole) -> &'static [&'static str] {
    match role {
        SurveyRole::Student => STUDENT_PREFIXES,
        SurveyRole::Professor => PROFESSOR_PREFIXES,
    }
}

fn field_table(role: SurveyRole) -> &'static [(&'static str, FieldDefault)] {
    match role {
        SurveyRole::Student => STUDENT_FIELDS,
        SurveyRole::Professor => PROFESSOR_FIELDS,
    }
}

/// Genera ids basados en el reloj (milisegundos) y estrictamente crecientes
/// dentro del proceso, aunque lleguen dos envíos en el mismo milisegundo.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn next(&self, now: DateTime<Utc>) -> i64 {
        let now_ms = now.timestamp_millis();
        let step = |last: i64| now_ms.max(last + 1);
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(step(last)))
            .unwrap_or_else(|last| last);
        step(previous)
    }
}

/// Convierte un payload arbitrario en un registro completo. Nunca falla.
pub fn normalize<R: Rng + ?Sized>(
    raw: Map<String, Value>,
    role: SurveyRole,
    id: i64,
    now: DateTime<Utc>,
    rng: &mut R,
) -> SurveyRecord {
    let submitted_name = match raw.get("name") {
        Some(Value::String(name)) => name.clone(),
        _ => String::new(),
    };
    let (name, participation_type) = if submitted_name.trim().is_empty() {
        (anonymous_name(role, rng), ParticipationType::Anonymous)
    } else {
        (submitted_name.clone(), ParticipationType::Named)
    };

    let completion_time = raw
        .get("completionTime")
        .and_then(parse_positive_number)
        .map(number_value)
        .unwrap_or_else(|| {
            let (lo, hi) = COMPLETION_TIME_FALLBACK;
            Value::from(rng.gen_range(lo..=hi))
        });

    let mut fields = Map::new();
    for (key, value) in raw {
        if !RESERVED_KEYS.contains(&key.as_str()) {
            fields.insert(key, value);
        }
    }
    for (key, default) in field_table(role) {
        let missing = fields.get(*key).map_or(true, is_blank);
        if missing {
            fields.insert(key.to_string(), default.value());
        }
    }

    SurveyRecord {
        id,
        name,
        submitted_name,
        participation_type,
        timestamp: now
            .with_timezone(&Local)
            .format("%Y/%m/%d %H:%M:%S")
            .to_string(),
        created_at: now.to_rfc3339(),
        completion_time,
        completed: true,
        fields,
    }
}

fn anonymous_name<R: Rng + ?Sized>(role: SurveyRole, rng: &mut R) -> String {
    let prefix = name_prefixes(role).choose(rng).copied().unwrap_or("مشارك");
    format!("{} {}", prefix, rng.gen_range(1000..=9999))
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Interpreta números y textos con un número al principio ("12 دقيقة").
/// Devuelve `None` si no hay número o no es positivo.
pub fn parse_positive_number(value: &Value) -> Option<f64> {
    parse_number(value).filter(|n| *n > 0.0)
}

pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_number(s),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn leading_number(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
        .map_or(text.len(), |(i, _)| i);
    text[..end].parse().ok()
}
