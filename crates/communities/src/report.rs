use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use extract::parser::extract_json_object;
use index::CommunityReport;

pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 10.0;

#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("no JSON object in model output")]
    NoJson,

    #[error("invalid report JSON: {0}")]
    Invalid(String),

    #[error("report is missing {0}")]
    MissingField(&'static str),
}

#[derive(Deserialize)]
struct RawReport {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    rating: Option<Value>,
    #[serde(default, alias = "explanation")]
    rating_explanation: Option<String>,
}

fn text(field: Option<String>) -> Option<String> {
    field.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parse `{title, summary, rating, rating_explanation}`, tolerating code
/// fences and surrounding prose. Ratings are clamped to 0–10.
pub fn parse_report(output: &str) -> Result<CommunityReport, ReportError> {
    let json = extract_json_object(output).ok_or(ReportError::NoJson)?;
    let raw: RawReport = serde_json::from_str(json).map_err(|e| ReportError::Invalid(e.to_string()))?;

    let rating = match raw.rating {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|r| r.is_finite())
    .ok_or(ReportError::MissingField("rating"))?;

    Ok(CommunityReport {
        title: text(raw.title).ok_or(ReportError::MissingField("title"))?,
        summary: text(raw.summary).ok_or(ReportError::MissingField("summary"))?,
        rating: rating.clamp(MIN_RATING, MAX_RATING),
        rating_explanation: text(raw.rating_explanation).unwrap_or_default(),
    })
}
