//! Small readers for loosely shaped FHIR JSON.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// Non-empty, trimmed string at `key`.
pub(crate) fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn first_item<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).and_then(Value::as_array).and_then(|arr| arr.first())
}

pub(crate) fn array_len(value: &Value, key: &str) -> usize {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// Human-readable text of a CodeableConcept: `text`, then the first coding
/// display, then the first coding code.
pub(crate) fn extract_codeable_text(value: &Value) -> Option<String> {
    if let Some(text) = text_field(value, "text") {
        return Some(text);
    }

    if let Some(codings) = value.get("coding").and_then(Value::as_array) {
        for coding in codings {
            if let Some(text) = extract_coding_text(coding) {
                return Some(text);
            }
        }
    }

    None
}

pub(crate) fn extract_coding_text(coding: &Value) -> Option<String> {
    text_field(coding, "display").or_else(|| text_field(coding, "code"))
}

/// First timestamp found among `fields`. Periods prefer `start`.
pub(crate) fn extract_datetime(resource: &Value, fields: &[&str]) -> Option<DateTime<Utc>> {
    for field in fields {
        let Some(value) = resource.get(*field) else {
            continue;
        };

        if let Some(text) = value.as_str() {
            if let Some(dt) = parse_datetime(text) {
                return Some(dt);
            }
        }

        if let Some(obj) = value.as_object() {
            for key in ["start", "end"] {
                if let Some(dt) = obj.get(key).and_then(Value::as_str).and_then(parse_datetime) {
                    return Some(dt);
                }
            }
        }
    }
    None
}

/// Accepts full RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC).
pub(crate) fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    parse_date(value)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub(crate) fn format_quantity_value(value: &Value) -> Option<String> {
    let magnitude = value.get("value")?.as_f64()?;
    let unit = text_field(value, "unit").or_else(|| text_field(value, "code"));
    let number = format_numeric(magnitude);
    match unit {
        Some(unit) => Some(format!("{number} {unit}")),
        None => Some(number),
    }
}

pub(crate) fn format_numeric(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn codeable_text_prefers_text_then_display_then_code() {
        assert_eq!(
            extract_codeable_text(&json!({"text": " CBC ", "coding": [{"display": "x"}]})),
            Some("CBC".to_string())
        );
        assert_eq!(
            extract_codeable_text(&json!({"coding": [{"code": "718-7"}, {"display": "Hb"}]})),
            Some("718-7".to_string())
        );
        assert_eq!(extract_codeable_text(&json!({"coding": []})), None);
    }

    #[test]
    fn plain_dates_parse_as_midnight() {
        let dt = parse_datetime("2024-05-01").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-05-01T00:00:00+00:00");
    }

    #[test]
    fn periods_use_start() {
        let resource = json!({"started": {"start": "2024-05-01T10:00:00Z", "end": "2024-05-01T11:00:00Z"}});
        let dt = extract_datetime(&resource, &["started"]).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn quantities_drop_trailing_zero_fraction() {
        assert_eq!(
            format_quantity_value(&json!({"value": 7.0, "unit": "mmol/L"})),
            Some("7 mmol/L".to_string())
        );
        assert_eq!(
            format_quantity_value(&json!({"value": 36.6, "code": "Cel"})),
            Some("36.6 Cel".to_string())
        );
    }
}
