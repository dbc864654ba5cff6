//! Turning the model's reply into a [`Diagnosis`].

use serde::Deserialize;

use crate::llm::strip_code_fence;
use crate::models::{Diagnosis, FailureCategory};

#[derive(Debug, Deserialize)]
struct RawDiagnosis {
    #[serde(default, alias = "error_type")]
    category: Option<String>,
    #[serde(default, alias = "error_summary")]
    summary: Option<String>,
    #[serde(default)]
    root_cause: Option<String>,
    #[serde(default)]
    suggested_fix: Option<String>,
    #[serde(default, alias = "fix_confidence")]
    confidence: Option<serde_json::Value>,
    #[serde(default)]
    requires_manual_intervention: Option<bool>,
    #[serde(default)]
    relevant_files: Vec<String>,
}

/// Extract the JSON object from a reply that may be fenced or chatty.
pub fn json_object(reply: &str) -> Option<&str> {
    let unfenced = strip_code_fence(reply);
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (end > start).then(|| &unfenced[start..=end])
}

fn confidence_score(value: Option<&serde_json::Value>) -> f64 {
    let raw = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}

pub fn parse_diagnosis(reply: &str) -> Result<Diagnosis, String> {
    let json = json_object(reply).ok_or_else(|| "no JSON object in response".to_string())?;
    let raw: RawDiagnosis =
        serde_json::from_str(json).map_err(|e| format!("invalid diagnosis JSON: {e}"))?;

    let category = raw
        .category
        .as_deref()
        .map(FailureCategory::from_label)
        .unwrap_or(FailureCategory::Unknown);

    Ok(Diagnosis {
        category,
        summary: raw.summary.unwrap_or_default().trim().to_string(),
        root_cause: raw.root_cause.unwrap_or_default(),
        suggested_fix: raw.suggested_fix.unwrap_or_default(),
        confidence: confidence_score(raw.confidence.as_ref()),
        requires_manual_intervention: raw.requires_manual_intervention.unwrap_or(true),
        relevant_files: raw.relevant_files,
    })
}
