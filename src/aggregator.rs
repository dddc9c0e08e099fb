//! Cálculo del documento de análisis a partir de las dos colecciones.
//!
//! Todo es puro: mismas colecciones (y mismo `now`) producen el mismo
//! documento. No se guarda ningún estado intermedio.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{
    models::{
        AnalysisDocument, AnonymityStats, Charts, RoleAnonymity, SatisfactionLevels, Summary,
        SurveyRecord, UNSPECIFIED,
    },
    normalizer::{parse_number, parse_positive_number},
};

/// Texto que sustituye a la lista de conclusiones cuando no hay ninguna.
pub const NO_INSIGHTS: &str = "لا توجد insights كافية بعد";

/// Los cinco niveles de satisfacción, de 1 (muy bajo) a 5 (muy alto).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatisfactionLevel {
    VeryLow = 1,
    Low = 2,
    Medium = 3,
    High = 4,
    VeryHigh = 5,
}

impl SatisfactionLevel {
    const ALL: [Self; 5] = [
        Self::VeryLow,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::VeryHigh,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::VeryHigh => "مرتفع جداً",
            Self::High => "مرتفع",
            Self::Medium => "متوسط",
            Self::Low => "منخفض",
            Self::VeryLow => "منخفض جداً",
        }
    }

    pub fn score(self) -> u8 {
        self as u8
    }

    fn from_score(score: f64) -> Option<Self> {
        if score.fract() != 0.0 {
            return None;
        }
        Self::ALL.into_iter().find(|l| f64::from(l.score()) == score)
    }

    /// Acepta la escala numérica (1–5, número o texto) y las etiquetas.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().and_then(Self::from_score),
            Value::String(s) => {
                let s = s.trim();
                Self::ALL
                    .into_iter()
                    .find(|l| l.label() == s)
                    .or_else(|| s.parse::<f64>().ok().and_then(Self::from_score))
            }
            _ => None,
        }
    }
}

/// Recalcula el documento completo.
pub fn aggregate(
    students: &[SurveyRecord],
    professors: &[SurveyRecord],
    now: DateTime<Utc>,
) -> AnalysisDocument {
    let all = || students.iter().chain(professors.iter());
    let anonymity = anonymity_stats(students, professors);

    let summary = Summary {
        total_participants: students.len() + professors.len(),
        student_count: students.len(),
        professor_count: professors.len(),
        completion_rate: completion_rate(all()),
        average_time: average_completion_time(all()),
        anonymous_count: anonymity.anonymous,
        anonymous_percentage: anonymity.percentage,
    };

    let feature_rankings: Map<String, Value> = rank_features(all())
        .into_iter()
        .map(|(feature, score)| (feature, Value::from(score)))
        .collect();

    let charts = Charts {
        by_gender: group_by(all(), "gender"),
        by_age: group_by(all(), "age"),
        by_education: group_by(all(), "educationLevel"),
        by_experience: group_by(professors, "experience"),
        by_major: group_by(students, "major"),
        by_department: group_by(professors, "department"),
        by_participation: group_by_participation(all()),
        feature_rankings,
        satisfaction_levels: satisfaction_histogram(all()),
    };

    AnalysisDocument {
        summary,
        charts,
        insights: generate_insights(students, professors),
        last_updated: now.to_rfc3339(),
    }
}

/// Cuenta las apariciones de cada valor del campo. Los valores ausentes o
/// "falsos" (null, false, 0, "", []) se cuentan bajo el centinela.
pub fn group_by<'a, I>(records: I, field: &str) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = &'a SurveyRecord>,
{
    let mut groups = BTreeMap::new();
    for record in records {
        *groups.entry(group_key(record.field(field))).or_insert(0) += 1;
    }
    groups
}

fn group_by_participation<'a, I>(records: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = &'a SurveyRecord>,
{
    let mut groups = BTreeMap::new();
    for record in records {
        let key = if record.is_anonymous() { "anonymous" } else { "named" };
        *groups.entry(key.to_string()).or_insert(0) += 1;
    }
    groups
}

fn group_key(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => UNSPECIFIED.to_string(),
        Some(Value::Bool(true)) => "true".to_string(),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => UNSPECIFIED.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if s.is_empty() => UNSPECIFIED.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) if items.is_empty() => UNSPECIFIED.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(item_text)
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

fn item_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Porcentaje de registros completados, con un decimal. 0 si no hay registros.
pub fn completion_rate<'a, I>(records: I) -> f64
where
    I: IntoIterator<Item = &'a SurveyRecord>,
{
    let (completed, total) = records
        .into_iter()
        .fold((0usize, 0usize), |(done, total), r| {
            (done + usize::from(r.completed), total + 1)
        });
    if total == 0 {
        return 0.0;
    }
    round_to(completed as f64 / total as f64 * 100.0, 1)
}

/// Media de los tiempos positivos. Los no numéricos o <= 0 no cuentan.
pub fn average_completion_time<'a, I>(records: I) -> f64
where
    I: IntoIterator<Item = &'a SurveyRecord>,
{
    let times: Vec<f64> = records
        .into_iter()
        .filter_map(|r| parse_positive_number(&r.completion_time))
        .collect();
    if times.is_empty() {
        return 0.0;
    }
    round_to(times.iter().sum::<f64>() / times.len() as f64, 1)
}

/// Media por característica, ordenada de mayor a menor. Los empates
/// conservan el orden de primera aparición.
pub fn rank_features<'a, I>(records: I) -> Vec<(String, f64)>
where
    I: IntoIterator<Item = &'a SurveyRecord>,
{
    let mut order: Vec<(String, f64, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(Value::Object(ratings)) = record.field("featureRatings") else {
            continue;
        };
        for (feature, rating) in ratings {
            let slot = *index.entry(feature.clone()).or_insert_with(|| {
                order.push((feature.clone(), 0.0, 0));
                order.len() - 1
            });
            let entry = &mut order[slot];
            entry.1 += parse_number(rating).unwrap_or(0.0);
            entry.2 += 1;
        }
    }

    let mut means: Vec<(String, f64)> = order
        .into_iter()
        .map(|(feature, sum, count)| (feature, sum / count as f64))
        .collect();
    means.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    means
        .into_iter()
        .map(|(feature, mean)| (feature, round_to(mean, 2)))
        .collect()
}

/// Valores que un formulario deja "vacíos": null, false, 0 y "".
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Se toma `overallSatisfaction` y sólo si está vacío `systemUsefulness`.
/// Un valor presente pero no reconocido no pasa al siguiente campo.
fn satisfaction_of(record: &SurveyRecord) -> Option<SatisfactionLevel> {
    ["overallSatisfaction", "systemUsefulness"]
        .iter()
        .filter_map(|key| record.field(key))
        .find(|value| !is_falsy(value))
        .and_then(SatisfactionLevel::from_value)
}

/// Histograma de los cinco niveles. Los valores no reconocidos se ignoran.
pub fn satisfaction_histogram<'a, I>(records: I) -> SatisfactionLevels
where
    I: IntoIterator<Item = &'a SurveyRecord>,
{
    let mut levels = SatisfactionLevels::default();
    for level in records.into_iter().filter_map(satisfaction_of) {
        let bucket = match level {
            SatisfactionLevel::VeryHigh => &mut levels.very_high,
            SatisfactionLevel::High => &mut levels.high,
            SatisfactionLevel::Medium => &mut levels.medium,
            SatisfactionLevel::Low => &mut levels.low,
            SatisfactionLevel::VeryLow => &mut levels.very_low,
        };
        *bucket += 1;
    }
    levels
}

/// Media de satisfacción (1–5) o `None` si nadie respondió.
pub fn average_satisfaction(records: &[SurveyRecord]) -> Option<f64> {
    let scores: Vec<f64> = records
        .iter()
        .filter_map(satisfaction_of)
        .map(|level| f64::from(level.score()))
        .collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

pub fn anonymity_percentage(anonymous: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (anonymous as f64 / total as f64 * 100.0).round() as u32
}

fn role_anonymity(records: &[SurveyRecord]) -> RoleAnonymity {
    let anonymous = records.iter().filter(|r| r.is_anonymous()).count();
    RoleAnonymity {
        total: records.len(),
        anonymous,
        named: records.len() - anonymous,
    }
}

pub fn anonymity_stats(students: &[SurveyRecord], professors: &[SurveyRecord]) -> AnonymityStats {
    let students = role_anonymity(students);
    let professors = role_anonymity(professors);
    let total = students.total + professors.total;
    let anonymous = students.anonymous + professors.anonymous;

    AnonymityStats {
        total,
        anonymous,
        named: total - anonymous,
        percentage: anonymity_percentage(anonymous, total),
        students,
        professors,
    }
}

/// Opción más repetida de un campo de selección múltiple o texto libre.
/// Empates: gana la primera que apareció.
pub fn top_choice(records: &[SurveyRecord], field: &str) -> Option<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let items: Vec<String> = match record.field(field) {
            Some(Value::Array(items)) => items.iter().map(item_text).collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => continue,
        };
        for item in items {
            let item = item.trim().to_string();
            if item.is_empty() || item == UNSPECIFIED {
                continue;
            }
            match index.get(&item) {
                Some(&slot) => counts[slot].1 += 1,
                None => {
                    index.insert(item.clone(), counts.len());
                    counts.push((item, 1));
                }
            }
        }
    }

    counts
        .into_iter()
        .fold(None, |best: Option<(String, usize)>, candidate| match best {
            Some(b) if b.1 >= candidate.1 => Some(b),
            _ => Some(candidate),
        })
}

pub fn generate_insights(students: &[SurveyRecord], professors: &[SurveyRecord]) -> Vec<String> {
    let mut insights = Vec::new();

    if let Some((need, count)) = top_choice(students, "needs") {
        insights.push(format!("الطلاب يفضلون: {need} ({count} إجابة)"));
    }
    if let Some((requirement, count)) = top_choice(professors, "requirements") {
        insights.push(format!("الهيئة التدريسية تحتاج: {requirement} ({count} إجابة)"));
    }

    if let (Some(student), Some(professor)) = (
        average_satisfaction(students),
        average_satisfaction(professors),
    ) {
        if student > professor {
            insights.push("الطلاب أكثر رضا عن النظام الحالي من الهيئة التدريسية".to_string());
        } else if professor > student {
            insights.push("الهيئة التدريسية أكثر رضا عن النظام الحالي من الطلاب".to_string());
        }
    }

    if insights.is_empty() {
        insights.push(NO_INSIGHTS.to_string());
    }
    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParticipationType;
    use proptest::prelude::*;
    use serde_json::json;

    fn make_record(fields: Value) -> SurveyRecord {
        let Value::Object(fields) = fields else {
            panic!("fields must be an object");
        };
        SurveyRecord {
            id: 1,
            name: "مشارك".to_string(),
            submitted_name: "مشارك".to_string(),
            participation_type: ParticipationType::Named,
            timestamp: String::new(),
            created_at: String::new(),
            completion_time: json!(10),
            completed: true,
            fields,
        }
    }

    fn anonymous(mut record: SurveyRecord) -> SurveyRecord {
        record.participation_type = ParticipationType::Anonymous;
        record
    }

    #[test]
    fn test_empty_collections() {
        let doc = aggregate(&[], &[], Utc::now());

        assert_eq!(doc.summary.total_participants, 0);
        assert_eq!(doc.summary.completion_rate, 0.0);
        assert_eq!(doc.summary.average_time, 0.0);
        assert_eq!(doc.summary.anonymous_percentage, 0);
        assert_eq!(doc.insights, vec!["لا توجد insights كافية بعد".to_string()]);
        assert_eq!(doc.charts.satisfaction_levels, SatisfactionLevels::default());
    }

    #[test]
    fn test_completion_rate_rounds_to_one_decimal() {
        let mut pending = make_record(json!({}));
        pending.completed = false;
        let records = vec![make_record(json!({})), make_record(json!({})), pending];

        assert_eq!(completion_rate(&records), 66.7);
    }

    #[test]
    fn test_average_time_skips_invalid_values() {
        let mut legacy = make_record(json!({}));
        legacy.completion_time = json!("غير محدد");
        let mut zero = make_record(json!({}));
        zero.completion_time = json!(0);
        let mut text = make_record(json!({}));
        text.completion_time = json!("15");
        let records = vec![make_record(json!({})), legacy, zero, text];

        assert_eq!(average_completion_time(&records), 12.5);
    }

    #[test]
    fn test_group_by_uses_sentinel_for_falsy_values() {
        let records = vec![
            make_record(json!({ "gender": "ذكر" })),
            make_record(json!({ "gender": "" })),
            make_record(json!({ "gender": null })),
            make_record(json!({})),
            make_record(json!({ "gender": "ذكر" })),
        ];

        let groups = group_by(&records, "gender");
        assert_eq!(groups.get("ذكر"), Some(&2));
        assert_eq!(groups.get(UNSPECIFIED), Some(&3));
    }

    #[test]
    fn test_feature_rankings_sorted_with_stable_ties() {
        let records = vec![
            make_record(json!({ "featureRatings": { "quizzes": 3, "forums": 5, "video": 4 } })),
            make_record(json!({ "featureRatings": { "quizzes": "5", "forums": 3, "grades": 4 } })),
        ];

        let ranked = rank_features(&records);
        let names: Vec<&str> = ranked.iter().map(|(f, _)| f.as_str()).collect();
        // quizzes, forums, video y grades empatan a 4.0: orden de aparición
        assert_eq!(names, vec!["quizzes", "forums", "video", "grades"]);
        assert!(ranked.iter().all(|(_, score)| *score == 4.0));
    }

    #[test]
    fn test_feature_rankings_descending() {
        let records = vec![
            make_record(json!({ "featureRatings": { "a": 1, "b": 5, "c": 3 } })),
            make_record(json!({ "featureRatings": { "a": 2 } })),
        ];

        let ranked = rank_features(&records);
        assert_eq!(
            ranked,
            vec![
                ("b".to_string(), 5.0),
                ("c".to_string(), 3.0),
                ("a".to_string(), 1.5)
            ]
        );

        let doc = aggregate(&records, &[], Utc::now());
        let keys: Vec<&String> = doc.charts.feature_rankings.keys().collect();
        assert_eq!(keys, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_satisfaction_histogram_numeric_scale() {
        let students = vec![
            make_record(json!({ "overallSatisfaction": 5 })),
            make_record(json!({ "overallSatisfaction": 5 })),
            make_record(json!({ "overallSatisfaction": 3 })),
        ];

        let doc = aggregate(&students, &[], Utc::now());
        let levels = doc.charts.satisfaction_levels;
        assert_eq!(levels.very_high, 2);
        assert_eq!(levels.medium, 1);
        assert_eq!(levels.high + levels.low + levels.very_low, 0);
    }

    #[test]
    fn test_satisfaction_histogram_labels_and_unrecognized() {
        let records = vec![
            make_record(json!({ "overallSatisfaction": "مرتفع" })),
            make_record(json!({ "systemUsefulness": "منخفض جداً" })),
            make_record(json!({ "overallSatisfaction": 0, "systemUsefulness": "2" })),
            make_record(json!({ "overallSatisfaction": 7 })),
            make_record(json!({ "overallSatisfaction": "رائع" })),
            make_record(json!({})),
        ];

        let levels = satisfaction_histogram(&records);
        assert_eq!(levels.high, 1);
        assert_eq!(levels.very_low, 1);
        assert_eq!(levels.low, 1);
        assert_eq!(
            levels.very_high + levels.high + levels.medium + levels.low + levels.very_low,
            3
        );
    }

    #[test]
    fn test_unrecognized_satisfaction_does_not_fall_back() {
        let records = vec![
            make_record(json!({ "overallSatisfaction": "رائع", "systemUsefulness": 4 })),
            make_record(json!({ "overallSatisfaction": "", "systemUsefulness": 4 })),
            make_record(json!({ "overallSatisfaction": null, "systemUsefulness": "مرتفع جداً" })),
        ];

        let levels = satisfaction_histogram(&records);
        assert_eq!(levels.high, 1);
        assert_eq!(levels.very_high, 1);
        assert_eq!(
            levels.very_high + levels.high + levels.medium + levels.low + levels.very_low,
            2
        );
        assert_eq!(average_satisfaction(&records[..1]), None);
    }

    #[test]
    fn test_anonymity_stats() {
        let students = vec![
            anonymous(make_record(json!({}))),
            make_record(json!({})),
            anonymous(make_record(json!({}))),
        ];
        let professors = vec![make_record(json!({}))];

        let stats = anonymity_stats(&students, &professors);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.anonymous, 2);
        assert_eq!(stats.named, 2);
        assert_eq!(stats.percentage, 50);
        assert_eq!(stats.students.anonymous, 2);
        assert_eq!(stats.professors.named, 1);
        assert_eq!(anonymity_percentage(1, 3), 33);
        assert_eq!(anonymity_percentage(2, 3), 67);
        assert_eq!(anonymity_percentage(0, 0), 0);
    }

    #[test]
    fn test_insights_top_needs_and_comparison() {
        let students = vec![
            make_record(json!({ "needs": ["تطبيق جوال", "اختبارات"], "overallSatisfaction": 4 })),
            make_record(json!({ "needs": ["اختبارات"], "overallSatisfaction": 5 })),
        ];
        let professors = vec![make_record(json!({
            "requirements": "تدريب",
            "systemUsefulness": "متوسط"
        }))];

        let insights = generate_insights(&students, &professors);
        assert_eq!(
            insights,
            vec![
                "الطلاب يفضلون: اختبارات (2 إجابة)".to_string(),
                "الهيئة التدريسية تحتاج: تدريب (1 إجابة)".to_string(),
                "الطلاب أكثر رضا عن النظام الحالي من الهيئة التدريسية".to_string(),
            ]
        );
    }

    #[test]
    fn test_insights_equal_satisfaction_has_no_comparison() {
        let students = vec![make_record(json!({ "overallSatisfaction": 4 }))];
        let professors = vec![make_record(json!({ "systemUsefulness": "مرتفع" }))];

        assert_eq!(
            generate_insights(&students, &professors),
            vec![NO_INSIGHTS.to_string()]
        );
    }

    #[test]
    fn test_top_choice_ties_keep_first_seen() {
        let records = vec![
            make_record(json!({ "needs": ["ب", "أ"] })),
            make_record(json!({ "needs": ["أ", "ب", UNSPECIFIED] })),
        ];

        assert_eq!(top_choice(&records, "needs"), Some(("ب".to_string(), 2)));
        assert_eq!(top_choice(&records, "requirements"), None);
    }

    #[test]
    fn test_recomputation_is_idempotent() {
        let students = vec![
            make_record(json!({ "gender": "أنثى", "featureRatings": { "x": 2, "y": 2 } })),
            anonymous(make_record(json!({ "gender": "ذكر", "overallSatisfaction": 3 }))),
        ];
        let professors = vec![make_record(json!({ "department": "الرياضيات" }))];

        let first = aggregate(&students, &professors, Utc::now());
        let second = aggregate(&students, &professors, Utc::now());
        assert_eq!(
            serde_json::to_string(&first.summary).unwrap(),
            serde_json::to_string(&second.summary).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&first.charts).unwrap(),
            serde_json::to_string(&second.charts).unwrap()
        );
    }

    fn arb_record() -> impl Strategy<Value = SurveyRecord> {
        (
            any::<bool>(),
            prop::option::of(prop::sample::select(vec!["ذكر", "أنثى", ""])),
            -5i64..30,
            prop::collection::vec((0usize..4, 0i64..=5), 0..4),
        )
            .prop_map(|(completed, gender, minutes, ratings)| {
                let mut fields = Map::new();
                if let Some(gender) = gender {
                    fields.insert("gender".to_string(), json!(gender));
                }
                let ratings: Map<String, Value> = ratings
                    .into_iter()
                    .map(|(feature, score)| (format!("f{feature}"), json!(score)))
                    .collect();
                fields.insert("featureRatings".to_string(), Value::Object(ratings));

                let mut record = make_record(Value::Object(fields));
                record.completed = completed;
                record.completion_time = json!(minutes);
                record
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn completion_rate_is_a_percentage(records in prop::collection::vec(arb_record(), 1..20)) {
            let rate = completion_rate(&records);
            prop_assert!((0.0..=100.0).contains(&rate));
            if records.iter().all(|r| r.completed) {
                prop_assert_eq!(rate, 100.0);
            }
        }

        #[test]
        fn group_counts_sum_to_record_count(records in prop::collection::vec(arb_record(), 0..20)) {
            let groups = group_by(&records, "gender");
            prop_assert_eq!(groups.values().sum::<usize>(), records.len());
        }

        #[test]
        fn rankings_are_non_increasing(records in prop::collection::vec(arb_record(), 0..20)) {
            let ranked = rank_features(&records);
            prop_assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
        }

        #[test]
        fn anonymity_percentage_matches_formula(anonymous in 0usize..500, extra in 0usize..500) {
            let total = anonymous + extra;
            let expected = if total == 0 {
                0
            } else {
                (anonymous as f64 / total as f64 * 100.0).round() as u32
            };
            prop_assert_eq!(anonymity_percentage(anonymous, total), expected);
            prop_assert!(anonymity_percentage(anonymous, total) <= 100);
        }
    }
}
