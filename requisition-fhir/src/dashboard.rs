//! Resolved bundle to grouped dashboard sections.

use chrono::{Datelike, NaiveDate};
use requisition_core::{
    Dashboard, ImagingCard, ObservationCard, OrderCard, PatientSummary, PhotoSource, ReportCard,
    ResolvedBundle, ResourceKind, ViewerConfig,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::endpoint::resolve_against;
use crate::fields::{
    array_len, extract_codeable_text, extract_coding_text, extract_datetime, first_item,
    format_quantity_value, parse_date, text_field,
};

/// Order statuses that are no longer outstanding. Compared case-insensitively.
pub const TERMINAL_ORDER_STATUSES: [&str; 4] =
    ["completed", "revoked", "entered-in-error", "stopped"];

/// A FHIR HumanName. Absent or `null` parts are `None` or empty and are
/// skipped when composing the display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HumanName {
    #[serde(rename = "use")]
    pub usage: Option<String>,
    pub text: Option<String>,
    pub family: Option<String>,
    #[serde(deserialize_with = "name_parts")]
    pub given: Vec<String>,
    #[serde(deserialize_with = "name_parts")]
    pub prefix: Vec<String>,
    #[serde(deserialize_with = "name_parts")]
    pub suffix: Vec<String>,
}

/// A string list where `null`, for the list or any item, means "nothing".
fn name_parts<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let parts = Option::<Vec<Option<String>>>::deserialize(deserializer)?;
    Ok(parts.unwrap_or_default().into_iter().flatten().collect())
}

impl HumanName {
    /// Prefix, given names, family, suffix joined by single spaces; falls back
    /// to `text` when every structured part is empty.
    pub fn display(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .prefix
            .iter()
            .chain(self.given.iter())
            .chain(self.family.iter())
            .chain(self.suffix.iter())
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect();

        if !parts.is_empty() {
            return Some(parts.join(" "));
        }

        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

/// A FHIR Attachment, reduced to the fields needed for photos.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: Option<String>,
    pub data: Option<String>,
    pub url: Option<String>,
}

/// Reads a list field as typed values; malformed items are skipped.
fn typed_list<T: for<'de> Deserialize<'de>>(resource: &Value, key: &str) -> Vec<T> {
    resource
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| T::deserialize(item).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Display name of a Patient: the `official` name if any, else the first.
pub fn patient_display_name(patient: &Value) -> Option<String> {
    let names: Vec<HumanName> = typed_list(patient, "name");
    names
        .iter()
        .find(|name| name.usage.as_deref() == Some("official"))
        .or_else(|| names.first())
        .and_then(HumanName::display)
}

/// Whole years between `birth` and `today`; `None` for future birth dates.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// Inline data wins over a URL; relative URLs are resolved against `base`.
pub fn photo_source(photos: &[Attachment], base: &str) -> Option<PhotoSource> {
    let inline = photos.iter().find_map(|photo| {
        let data: String = photo
            .data
            .as_deref()?
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if data.is_empty() {
            return None;
        }
        let content_type = photo
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or("image/png");
        Some(PhotoSource::Inline {
            data_uri: format!("data:{content_type};base64,{data}"),
        })
    });

    inline.or_else(|| {
        photos.iter().find_map(|photo| {
            let url = photo.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
            Some(PhotoSource::Remote {
                url: resolve_against(base, url),
            })
        })
    })
}

pub fn is_outstanding(status: Option<&str>) -> bool {
    match status {
        Some(status) => !TERMINAL_ORDER_STATUSES
            .iter()
            .any(|terminal| terminal.eq_ignore_ascii_case(status.trim())),
        None => true,
    }
}

/// Builds every dashboard section from one resolved bundle.
///
/// `today` is the local date used for the age calculation.
pub fn build_dashboard(
    bundle: &ResolvedBundle,
    base: &str,
    today: NaiveDate,
    config: &ViewerConfig,
) -> Dashboard {
    let patient = bundle
        .resources_of(ResourceKind::Patient)
        .next()
        .map(|resource| summarize_patient(resource, base, today));

    let orders: Vec<OrderCard> = bundle
        .resources_of(ResourceKind::ServiceRequest)
        .map(summarize_order)
        .collect();
    let total_orders = orders.len();
    let outstanding_orders = orders
        .into_iter()
        .filter(|order| is_outstanding(order.status.as_deref()))
        .collect();

    let reports = bundle
        .resources_of(ResourceKind::DiagnosticReport)
        .map(summarize_report)
        .collect();

    let imaging = bundle
        .resources_of(ResourceKind::ImagingStudy)
        .map(summarize_imaging)
        .collect();

    let all_observations: Vec<&Value> = bundle
        .resources_of(ResourceKind::Observation)
        .collect();
    let more_observations = all_observations
        .len()
        .saturating_sub(config.observation_limit);
    let observations = all_observations
        .into_iter()
        .take(config.observation_limit)
        .map(summarize_observation)
        .collect();

    Dashboard {
        as_of: Some(today),
        patient,
        outstanding_orders,
        total_orders,
        reports,
        imaging,
        observations,
        more_observations,
    }
}

/// Parses a JSON string and builds the dashboard.
pub fn build_dashboard_str(
    bundle_json: &str,
    base: &str,
    today: NaiveDate,
    config: &ViewerConfig,
) -> Result<Dashboard, requisition_core::ViewerError> {
    let value: Value = serde_json::from_str(bundle_json).map_err(|err| {
        requisition_core::ViewerError::UnexpectedShape {
            expected: "a JSON Bundle".to_string(),
            received: format!("unparsable JSON ({err})"),
        }
    })?;
    let bundle = ResolvedBundle::from_value(value)?;
    Ok(build_dashboard(&bundle, base, today, config))
}

fn summarize_patient(resource: &Value, base: &str, today: NaiveDate) -> PatientSummary {
    let birth_date = resource
        .get("birthDate")
        .and_then(Value::as_str)
        .and_then(parse_date);
    let photos: Vec<Attachment> = typed_list(resource, "photo");

    PatientSummary {
        id: text_field(resource, "id"),
        display_name: patient_display_name(resource),
        gender: text_field(resource, "gender"),
        birth_date,
        age: birth_date.and_then(|birth| age_on(birth, today)),
        photo: photo_source(&photos, base),
        identifier: first_item(resource, "identifier").and_then(|id| text_field(id, "value")),
        address: first_item(resource, "address").and_then(format_address),
        contact: resource
            .get("telecom")
            .and_then(Value::as_array)
            .and_then(|telecoms| telecoms.iter().find_map(|t| text_field(t, "value"))),
    }
}

fn format_address(address: &Value) -> Option<String> {
    if let Some(text) = text_field(address, "text") {
        return Some(text);
    }

    let mut parts: Vec<String> = address
        .get("line")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    for key in ["city", "state", "postalCode", "country"] {
        if let Some(part) = text_field(address, key) {
            parts.push(part);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn summarize_order(resource: &Value) -> OrderCard {
    let requester = resource
        .get("requester")
        .and_then(|r| text_field(r, "display").or_else(|| text_field(r, "reference")));

    let notes = resource
        .get("note")
        .and_then(Value::as_array)
        .map(|notes| notes.iter().filter_map(|n| text_field(n, "text")).collect())
        .unwrap_or_default();

    OrderCard {
        id: text_field(resource, "id"),
        status: text_field(resource, "status"),
        intent: text_field(resource, "intent"),
        priority: text_field(resource, "priority"),
        code: resource.get("code").and_then(extract_codeable_text),
        category: first_item(resource, "category").and_then(extract_codeable_text),
        requisition: resource
            .get("requisition")
            .and_then(|requisition| text_field(requisition, "value")),
        authored_on: extract_datetime(resource, &["authoredOn"]),
        requester,
        notes,
    }
}

fn summarize_report(resource: &Value) -> ReportCard {
    ReportCard {
        id: text_field(resource, "id"),
        status: text_field(resource, "status"),
        code: resource.get("code").and_then(extract_codeable_text),
        issued: extract_datetime(resource, &["issued", "effectiveDateTime", "effectivePeriod"]),
        conclusion: text_field(resource, "conclusion").or_else(|| {
            first_item(resource, "conclusionCode").and_then(extract_codeable_text)
        }),
        result_count: array_len(resource, "result"),
    }
}

fn summarize_imaging(resource: &Value) -> ImagingCard {
    // R4 lists Codings, R5 lists CodeableConcepts.
    let modality = first_item(resource, "modality")
        .and_then(|m| extract_codeable_text(m).or_else(|| extract_coding_text(m)));

    let series = resource.get("series").and_then(Value::as_array);
    let series_count = resource
        .get("numberOfSeries")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_else(|| series.map(Vec::len).unwrap_or(0));
    let instance_count = resource
        .get("numberOfInstances")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_else(|| {
            series
                .map(|series| {
                    series
                        .iter()
                        .map(|s| {
                            s.get("numberOfInstances")
                                .and_then(Value::as_u64)
                                .and_then(|n| usize::try_from(n).ok())
                                .unwrap_or_else(|| array_len(s, "instance"))
                        })
                        .sum()
                })
                .unwrap_or(0)
        });

    ImagingCard {
        id: text_field(resource, "id"),
        status: text_field(resource, "status"),
        modality,
        description: text_field(resource, "description"),
        started: extract_datetime(resource, &["started"]),
        series_count,
        instance_count,
    }
}

fn summarize_observation(resource: &Value) -> ObservationCard {
    ObservationCard {
        id: text_field(resource, "id"),
        status: text_field(resource, "status"),
        code: resource.get("code").and_then(extract_codeable_text),
        value: summarize_observation_value(resource),
        effective: extract_datetime(
            resource,
            &[
                "effectiveDateTime",
                "effectiveInstant",
                "effectivePeriod",
                "issued",
            ],
        ),
    }
}

fn summarize_observation_value(resource: &Value) -> Option<String> {
    if let Some(quantity) = resource.get("valueQuantity") {
        return format_quantity_value(quantity);
    }

    if let Some(value) = text_field(resource, "valueString") {
        return Some(value);
    }

    if let Some(concept) = resource.get("valueCodeableConcept") {
        if let Some(text) = extract_codeable_text(concept) {
            return Some(text);
        }
    }

    if let Some(flag) = resource.get("valueBoolean").and_then(Value::as_bool) {
        return Some(if flag { "Yes" } else { "No" }.to_string());
    }

    let components = resource.get("component").and_then(Value::as_array)?;
    if let Some(bp) = summarize_blood_pressure(components) {
        return Some(bp);
    }

    let parts: Vec<String> = components
        .iter()
        .filter_map(|component| {
            let label = component
                .get("code")
                .and_then(extract_codeable_text)
                .unwrap_or_else(|| "Component".to_string());
            let value = component.get("valueQuantity").and_then(format_quantity_value)?;
            Some(format!("{label}: {value}"))
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

/// `120/80 mmHg` when both systolic and diastolic components are present.
fn summarize_blood_pressure(components: &[Value]) -> Option<String> {
    let mut systolic = None;
    let mut diastolic = None;
    let mut unit = None;

    for component in components {
        let label = component
            .get("code")
            .and_then(extract_codeable_text)
            .unwrap_or_default()
            .to_lowercase();
        let Some(quantity) = component.get("valueQuantity") else {
            continue;
        };
        let Some(value) = quantity.get("value").and_then(Value::as_f64) else {
            continue;
        };

        if systolic.is_none() && label.contains("systolic") {
            systolic = Some(value);
        } else if diastolic.is_none() && label.contains("diastolic") {
            diastolic = Some(value);
        } else {
            continue;
        }
        if unit.is_none() {
            unit = text_field(quantity, "unit");
        }
    }

    let (sys, dia) = (systolic?, diastolic?);
    Some(format!(
        "{}/{} {}",
        crate::fields::format_numeric(sys),
        crate::fields::format_numeric(dia),
        unit.unwrap_or_else(|| "mmHg".to_string())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_borrows_a_year_before_the_birthday() {
        let birth = date(2000, 3, 15);
        assert_eq!(age_on(birth, date(2024, 3, 14)), Some(23));
        assert_eq!(age_on(birth, date(2024, 3, 15)), Some(24));
        assert_eq!(age_on(birth, date(2024, 2, 29)), Some(23));
        assert_eq!(age_on(birth, date(1999, 1, 1)), None);
    }

    #[test]
    fn name_joins_non_empty_parts_in_order() {
        let name = HumanName {
            prefix: vec!["Dr".into()],
            given: vec!["Ada".into(), " ".into(), "May".into()],
            family: Some("Lovelace".into()),
            suffix: vec!["PhD".into()],
            ..HumanName::default()
        };
        assert_eq!(name.display().as_deref(), Some("Dr Ada May Lovelace PhD"));
    }

    #[test]
    fn name_falls_back_to_text() {
        let patient = json!({
            "resourceType": "Patient",
            "name": [{"text": "Kari Nordmann"}]
        });
        assert_eq!(
            patient_display_name(&patient).as_deref(),
            Some("Kari Nordmann")
        );
    }

    #[test]
    fn official_name_wins() {
        let patient = json!({
            "resourceType": "Patient",
            "name": [
                {"use": "nickname", "given": ["Kit"]},
                {"use": "official", "given": ["Katherine"], "family": "Smith"}
            ]
        });
        assert_eq!(
            patient_display_name(&patient).as_deref(),
            Some("Katherine Smith")
        );
    }

    #[test]
    fn outstanding_filter_is_case_insensitive() {
        let statuses = ["active", "completed", "on-hold", "REVOKED"];
        let outstanding: Vec<&str> = statuses
            .into_iter()
            .filter(|status| is_outstanding(Some(*status)))
            .collect();
        assert_eq!(outstanding, vec!["active", "on-hold"]);
        assert!(is_outstanding(None));
    }

    #[test]
    fn inline_photo_beats_url() {
        let photos = vec![
            Attachment {
                url: Some("Binary/1".into()),
                ..Attachment::default()
            },
            Attachment {
                content_type: Some("image/jpeg".into()),
                data: Some("AAEC\nAwQ=".into()),
                ..Attachment::default()
            },
        ];
        assert_eq!(
            photo_source(&photos, "https://example.org/fhir"),
            Some(PhotoSource::Inline {
                data_uri: "data:image/jpeg;base64,AAECAwQ=".into()
            })
        );
    }

    #[test]
    fn relative_photo_url_is_resolved() {
        let photos = vec![Attachment {
            url: Some("Binary/1".into()),
            ..Attachment::default()
        }];
        assert_eq!(
            photo_source(&photos, "https://example.org/fhir/"),
            Some(PhotoSource::Remote {
                url: "https://example.org/fhir/Binary/1".into()
            })
        );
    }

    #[test]
    fn observations_are_capped_with_a_more_count() {
        let entries: Vec<Value> = (0..13)
            .map(|i| {
                json!({"resource": {
                    "resourceType": "Observation",
                    "id": format!("obs-{i}"),
                    "valueQuantity": {"value": i, "unit": "mg"}
                }})
            })
            .collect();
        let bundle = ResolvedBundle::from_value(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": entries
        }))
        .unwrap();

        let dashboard = build_dashboard(
            &bundle,
            "https://example.org/fhir",
            date(2024, 1, 1),
            &ViewerConfig::default(),
        );
        assert_eq!(dashboard.observations.len(), 10);
        assert_eq!(dashboard.more_observations, 3);
        assert_eq!(dashboard.observations[0].id.as_deref(), Some("obs-0"));
        assert_eq!(dashboard.observations[9].value.as_deref(), Some("9 mg"));
    }

    #[test]
    fn blood_pressure_components_are_combined() {
        let observation = json!({
            "resourceType": "Observation",
            "component": [
                {"code": {"text": "Systolic blood pressure"}, "valueQuantity": {"value": 120, "unit": "mmHg"}},
                {"code": {"text": "Diastolic blood pressure"}, "valueQuantity": {"value": 80, "unit": "mmHg"}}
            ]
        });
        assert_eq!(
            summarize_observation_value(&observation).as_deref(),
            Some("120/80 mmHg")
        );
    }

    #[test]
    fn imaging_counts_fall_back_to_series() {
        let study = json!({
            "resourceType": "ImagingStudy",
            "modality": [{"system": "http://dicom.nema.org/resources/ontology/DCM", "code": "CT"}],
            "series": [
                {"numberOfInstances": 3},
                {"instance": [{}, {}]}
            ]
        });
        let card = summarize_imaging(&study);
        assert_eq!(card.modality.as_deref(), Some("CT"));
        assert_eq!(card.series_count, 2);
        assert_eq!(card.instance_count, 5);
    }

    #[test]
    fn null_name_parts_do_not_drop_the_name() {
        let patient = json!({
            "resourceType": "Patient",
            "name": [{"given": null, "prefix": [null, "Ms"], "family": "Nordmann", "suffix": null}]
        });
        assert_eq!(
            patient_display_name(&patient).as_deref(),
            Some("Ms Nordmann")
        );
    }

    #[test]
    fn imaging_counts_prefer_declared_totals() {
        let study = json!({
            "resourceType": "ImagingStudy",
            "numberOfSeries": 4,
            "numberOfInstances": 120,
            "series": [{"numberOfInstances": 3}]
        });
        let card = summarize_imaging(&study);
        assert_eq!(card.series_count, 4);
        assert_eq!(card.instance_count, 120);

        let negative = json!({
            "resourceType": "ImagingStudy",
            "numberOfSeries": -1,
            "series": [{"numberOfInstances": 3}]
        });
        assert_eq!(summarize_imaging(&negative).series_count, 1);
    }

    #[test]
    fn address_is_composed_from_parts() {
        let address = json!({"line": ["1 Main St"], "city": "Oslo", "country": "NO"});
        assert_eq!(
            format_address(&address).as_deref(),
            Some("1 Main St, Oslo, NO")
        );
    }
}
