use std::fs;

use chrono::NaiveDate;
use requisition_core::{Dashboard, ViewerConfig};
use requisition_fhir::build_dashboard_str;

fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
}

#[test]
fn everything_bundle_matches_golden() {
    let bundle = fs::read_to_string(fixture_path("requisition_everything_bundle.json"))
        .expect("Cannot read sample bundle");

    let dashboard = build_dashboard_str(
        &bundle,
        "https://fhir.example.org/r4",
        as_of(),
        &ViewerConfig::default(),
    )
    .expect("Cannot build dashboard");

    let expected = fs::read_to_string(fixture_path("requisition_everything_dashboard.json"))
        .expect("Cannot read golden dashboard");
    let expected: Dashboard = serde_json::from_str(&expected).expect("Golden is not valid");

    assert_eq!(dashboard, expected);
}

#[test]
fn observation_limit_moves_the_rest_behind_the_indicator() {
    let bundle = fs::read_to_string(fixture_path("requisition_everything_bundle.json"))
        .expect("Cannot read sample bundle");
    let config = ViewerConfig {
        observation_limit: 1,
        ..ViewerConfig::default()
    };

    let dashboard =
        build_dashboard_str(&bundle, "https://fhir.example.org/r4", as_of(), &config).unwrap();

    assert_eq!(dashboard.observations.len(), 1);
    assert_eq!(dashboard.observations[0].id.as_deref(), Some("obs-hb"));
    assert_eq!(dashboard.more_observations, 1);
}

#[test]
fn non_bundle_json_is_rejected() {
    let result = build_dashboard_str(
        r#"{"resourceType": "Patient", "id": "pat-1"}"#,
        "https://fhir.example.org/r4",
        as_of(),
        &ViewerConfig::default(),
    );
    assert!(result.is_err());
}

#[test]
fn history_fixture_lists_versions_newest_first() {
    let text = fs::read_to_string(fixture_path("service_request_history.json"))
        .expect("Cannot read history fixture");
    let history =
        requisition_core::HistoryBundle::from_value(serde_json::from_str(&text).unwrap()).unwrap();

    let entries = history.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].version_id.as_deref(), Some("2"));
    assert_eq!(entries[0].method.as_deref(), Some("PUT"));
    assert_eq!(entries[1].full_url, None);
    assert_eq!(
        requisition_fhir::entry_locator(&entries[1], "https://fhir.example.org/r4").unwrap(),
        "https://fhir.example.org/r4/ServiceRequest/sr-1/_history/1"
    );
}
