//! Core types for resolving and presenting clinical requisition data.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod state;

pub use state::{ViewEvent, ViewState, ViewStatus};

/// Settings shared by the resolver, the presentation layer and the worklist.
///
/// Missing fields deserialize to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    /// Base URL of the FHIR server, without trailing slash.
    pub base_url: String,
    /// How many observations are shown before the "more" indicator.
    pub observation_limit: usize,
    /// Look-back window (hours) for the recent-orders worklist.
    pub worklist_window_hours: u32,
    /// Maximum number of rows requested for the worklist.
    pub worklist_count: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://server.fire.ly".to_string(),
            observation_limit: 10,
            worklist_window_hours: 6,
            worklist_count: 15,
        }
    }
}

/// Which kind of input the user declared for the locator field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    DirectUrl,
    Identifier,
    Scanned,
}

impl InputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InputMode::DirectUrl => "direct_url",
            InputMode::Identifier => "identifier",
            InputMode::Scanned => "scanned",
        }
    }
}

impl std::str::FromStr for InputMode {
    type Err = ViewerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "direct_url" | "url" => Ok(InputMode::DirectUrl),
            "identifier" | "id" => Ok(InputMode::Identifier),
            "scanned" | "scan" | "qr" => Ok(InputMode::Scanned),
            other => Err(ViewerError::Input(format!("Unknown input mode: {other}"))),
        }
    }
}

/// A user-supplied locator after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Url(String),
    Identifier(String),
}

impl Locator {
    /// Classify a raw locator string. Surrounding whitespace is ignored.
    pub fn classify(raw: &str) -> Result<Self, ViewerError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ViewerError::Input(
                "Enter a URL or a record identifier".to_string(),
            ));
        }

        if looks_like_url(trimmed) {
            Ok(Locator::Url(trimmed.to_string()))
        } else {
            Ok(Locator::Identifier(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Locator::Url(value) | Locator::Identifier(value) => value,
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, Locator::Url(_))
    }
}

/// Optional scheme followed by `//`.
fn looks_like_url(value: &str) -> bool {
    if value.starts_with("//") {
        return true;
    }

    let Some((scheme, rest)) = value.split_once(':') else {
        return false;
    };

    let mut chars = scheme.chars();
    let valid_scheme = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    };

    valid_scheme && rest.starts_with("//")
}

/// Declared `resourceType` of a server response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Bundle,
    Patient,
    ServiceRequest,
    DiagnosticReport,
    ImagingStudy,
    Observation,
    Other(String),
}

impl ResourceKind {
    pub fn from_declared(name: &str) -> Self {
        match name {
            "Bundle" => ResourceKind::Bundle,
            "Patient" => ResourceKind::Patient,
            "ServiceRequest" => ResourceKind::ServiceRequest,
            "DiagnosticReport" => ResourceKind::DiagnosticReport,
            "ImagingStudy" => ResourceKind::ImagingStudy,
            "Observation" => ResourceKind::Observation,
            other => ResourceKind::Other(other.to_string()),
        }
    }

    /// Reads `resourceType` from a JSON resource, if present.
    pub fn of(resource: &Value) -> Option<Self> {
        resource
            .get("resourceType")
            .and_then(Value::as_str)
            .map(Self::from_declared)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Bundle => "Bundle",
            ResourceKind::Patient => "Patient",
            ResourceKind::ServiceRequest => "ServiceRequest",
            ResourceKind::DiagnosticReport => "DiagnosticReport",
            ResourceKind::ImagingStudy => "ImagingStudy",
            ResourceKind::Observation => "Observation",
            ResourceKind::Other(name) => name,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn ensure_bundle(value: &Value) -> Result<(), ViewerError> {
    match ResourceKind::of(value) {
        Some(ResourceKind::Bundle) => Ok(()),
        Some(other) => Err(ViewerError::UnexpectedShape {
            expected: "Bundle".to_string(),
            received: other.to_string(),
        }),
        None => Err(ViewerError::UnexpectedShape {
            expected: "Bundle".to_string(),
            received: "a document without resourceType".to_string(),
        }),
    }
}

fn entry_resources(bundle: &Value) -> impl Iterator<Item = &Value> {
    bundle
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| entries.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| entry.get("resource"))
}

/// The clinical snapshot displayed on the dashboard.
///
/// The wrapped document is kept verbatim so the raw view can show exactly
/// what the server returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ResolvedBundle(Value);

impl ResolvedBundle {
    pub fn from_value(value: Value) -> Result<Self, ViewerError> {
        ensure_bundle(&value)?;
        Ok(Self(value))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Resources carried by the bundle entries, in bundle order.
    pub fn resources(&self) -> impl Iterator<Item = &Value> {
        entry_resources(&self.0)
    }

    /// Resources of one declared type, in bundle order.
    pub fn resources_of(&self, kind: ResourceKind) -> impl Iterator<Item = &Value> {
        self.resources()
            .filter(move |resource| ResourceKind::of(resource).as_ref() == Some(&kind))
    }
}

impl TryFrom<Value> for ResolvedBundle {
    type Error = ViewerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<ResolvedBundle> for Value {
    fn from(bundle: ResolvedBundle) -> Self {
        bundle.0
    }
}

/// All versions of one logical record, as returned by `_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct HistoryBundle(Value);

impl HistoryBundle {
    pub fn from_value(value: Value) -> Result<Self, ViewerError> {
        ensure_bundle(&value)?;
        Ok(Self(value))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Version entries in server order (usually newest first).
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.0
            .get("entry")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(HistoryEntry::from_entry).collect())
            .unwrap_or_default()
    }
}

impl TryFrom<Value> for HistoryBundle {
    type Error = ViewerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<HistoryBundle> for Value {
    fn from(bundle: HistoryBundle) -> Self {
        bundle.0
    }
}

/// One version listed in a history bundle.
///
/// Every field is optional: deleted versions carry no resource, and some
/// servers omit `fullUrl` on history entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub full_url: Option<String>,
    pub resource_type: Option<String>,
    pub id: Option<String>,
    pub version_id: Option<String>,
    pub last_updated: Option<String>,
    pub status: Option<String>,
    pub method: Option<String>,
}

impl HistoryEntry {
    pub fn from_entry(entry: &Value) -> Self {
        let text = |value: Option<&Value>| {
            value
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let resource = entry.get("resource");
        let meta = resource.and_then(|r| r.get("meta"));

        Self {
            full_url: text(entry.get("fullUrl")),
            resource_type: text(resource.and_then(|r| r.get("resourceType"))),
            id: text(resource.and_then(|r| r.get("id"))),
            version_id: text(meta.and_then(|m| m.get("versionId"))),
            last_updated: text(meta.and_then(|m| m.get("lastUpdated"))),
            status: text(resource.and_then(|r| r.get("status"))),
            method: text(entry.get("request").and_then(|r| r.get("method"))),
        }
    }
}

/// Result of one resolution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "bundle", rename_all = "snake_case")]
pub enum Resolution {
    /// Displayable clinical snapshot.
    Resolved(ResolvedBundle),
    /// Version list; the user must pick one entry.
    History(HistoryBundle),
}

/// Where the patient photo comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PhotoSource {
    /// Inline attachment data, ready to use as an `<img src>`.
    Inline { data_uri: String },
    /// Absolute URL of a remote image.
    Remote { url: String },
}

impl PhotoSource {
    pub fn src(&self) -> &str {
        match self {
            PhotoSource::Inline { data_uri } => data_uri,
            PhotoSource::Remote { url } => url,
        }
    }
}

/// Subject record card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub age: Option<u32>,
    pub photo: Option<PhotoSource>,
    pub identifier: Option<String>,
    pub address: Option<String>,
    pub contact: Option<String>,
}

/// A requested clinical action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderCard {
    pub id: Option<String>,
    pub status: Option<String>,
    pub intent: Option<String>,
    pub priority: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    pub requisition: Option<String>,
    pub authored_on: Option<DateTime<Utc>>,
    pub requester: Option<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportCard {
    pub id: Option<String>,
    pub status: Option<String>,
    pub code: Option<String>,
    pub issued: Option<DateTime<Utc>>,
    pub conclusion: Option<String>,
    pub result_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImagingCard {
    pub id: Option<String>,
    pub status: Option<String>,
    pub modality: Option<String>,
    pub description: Option<String>,
    pub started: Option<DateTime<Utc>>,
    pub series_count: usize,
    pub instance_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationCard {
    pub id: Option<String>,
    pub status: Option<String>,
    pub code: Option<String>,
    pub value: Option<String>,
    pub effective: Option<DateTime<Utc>>,
}

/// Grouped, display-ready view of a resolved bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    /// Date the ages were computed against.
    pub as_of: Option<NaiveDate>,
    pub patient: Option<PatientSummary>,
    pub outstanding_orders: Vec<OrderCard>,
    pub total_orders: usize,
    pub reports: Vec<ReportCard>,
    pub imaging: Vec<ImagingCard>,
    pub observations: Vec<ObservationCard>,
    /// Observations hidden behind the "more" indicator.
    pub more_observations: usize,
}

impl Dashboard {
    pub fn is_empty(&self) -> bool {
        self.patient.is_none()
            && self.total_orders == 0
            && self.reports.is_empty()
            && self.imaging.is_empty()
            && self.observations.is_empty()
    }
}

/// One line of the recent-orders worklist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorklistRow {
    pub id: Option<String>,
    pub requisition: Option<String>,
    pub status: Option<String>,
    pub subject_name: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    /// Dereferenceable URL to feed back into direct-URL resolution.
    pub locator: Option<String>,
}

/// Failures of a resolution attempt. The display string is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewerError {
    #[error("Invalid input: {0}")]
    Input(String),
    #[error("{}", fetch_message(.status, .message))]
    Fetch {
        status: Option<u16>,
        message: String,
    },
    #[error("Unexpected response: expected {expected}, received {received}")]
    UnexpectedShape { expected: String, received: String },
    #[error("Cannot resolve a subject for {0}")]
    UnresolvableReference(String),
}

fn fetch_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Request failed with HTTP {code}: {message}"),
        None => format!("Request failed: {message}"),
    }
}
