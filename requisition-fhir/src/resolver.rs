//! Locator resolution: from user input to a displayable bundle or a version list.

use requisition_core::{
    HistoryBundle, HistoryEntry, InputMode, Locator, Resolution, ResolvedBundle, ResourceKind,
    ViewerError,
};
use serde_json::Value;
use tracing::{debug, info_span, Instrument};

use crate::endpoint::{
    absolute_url, everything_url, identifier_history_url, subject_everything_url,
};
use crate::fields::text_field;
use crate::history::entry_locator;
use crate::transport::FhirTransport;

/// Resolves locators against one FHIR server.
///
/// Issues at most two GETs per attempt and never retries.
#[derive(Debug, Clone)]
pub struct Resolver<T> {
    transport: T,
    base_url: String,
}

impl<T: FhirTransport> Resolver<T> {
    pub fn new(transport: T, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Classifies `raw`, checks it against `mode`, and fetches.
    pub async fn resolve(&self, raw: &str, mode: InputMode) -> Result<Resolution, ViewerError> {
        let locator = Locator::classify(raw)?;
        let span = info_span!("resolve", mode = mode.as_str(), url = locator.is_url());

        async move {
            match (mode, locator) {
                (InputMode::Identifier, Locator::Url(url)) => Err(ViewerError::Input(format!(
                    "Identifier mode expects a record identifier such as ServiceRequest/123, not a URL ({url})"
                ))),
                (InputMode::DirectUrl, Locator::Identifier(identifier)) => {
                    Err(ViewerError::Input(format!(
                        "Direct URL mode expects a full URL, got '{identifier}'"
                    )))
                }
                (InputMode::Identifier | InputMode::Scanned, Locator::Identifier(identifier)) => {
                    self.fetch_history(&identifier).await.map(Resolution::History)
                }
                (InputMode::DirectUrl | InputMode::Scanned, Locator::Url(url)) => {
                    self.resolve_url(&url).await.map(Resolution::Resolved)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Fetches `{base}/{Type}/{id}/_history` for an identifier.
    pub async fn fetch_history(&self, identifier: &str) -> Result<HistoryBundle, ViewerError> {
        let url = identifier_history_url(&self.base_url, identifier)?;
        let value = self.transport.get_json(&url).await?;
        HistoryBundle::from_value(value)
    }

    /// Direct-URL branch: fetch the URL, then classify what came back.
    ///
    /// Scheme-relative URLs borrow the base URL's scheme.
    pub async fn resolve_url(&self, url: &str) -> Result<ResolvedBundle, ViewerError> {
        let url = absolute_url(&self.base_url, url)?;
        let resource = self.transport.get_json(&url).await?;
        self.resolve_resource(resource).await
    }

    /// Resolves a version picked from a history list.
    pub async fn resolve_history_entry(
        &self,
        entry: &HistoryEntry,
    ) -> Result<ResolvedBundle, ViewerError> {
        let url = entry_locator(entry, &self.base_url)?;
        debug!(%url, "history entry selected");
        self.resolve_url(&url).await
    }

    async fn resolve_resource(&self, resource: Value) -> Result<ResolvedBundle, ViewerError> {
        let Some(kind) = ResourceKind::of(&resource) else {
            return Err(ViewerError::UnexpectedShape {
                expected: "a FHIR resource".to_string(),
                received: "a document without resourceType".to_string(),
            });
        };
        debug!(resource_type = %kind, "classified response");

        match kind {
            ResourceKind::Bundle => ResolvedBundle::from_value(resource),
            ResourceKind::Patient => {
                let id = text_field(&resource, "id").ok_or_else(|| {
                    ViewerError::UnresolvableReference("a Patient without id".to_string())
                })?;
                let url = everything_url(&self.base_url, "Patient", &id)?;
                self.fetch_everything(&url).await
            }
            ResourceKind::ServiceRequest
            | ResourceKind::DiagnosticReport
            | ResourceKind::ImagingStudy
            | ResourceKind::Observation
            | ResourceKind::Other(_) => {
                let Some(reference) = subject_reference(&resource) else {
                    return Err(ViewerError::UnresolvableReference(describe(&kind, &resource)));
                };
                let url = subject_everything_url(&self.base_url, &reference)?;
                self.fetch_everything(&url).await
            }
        }
    }

    async fn fetch_everything(&self, url: &str) -> Result<ResolvedBundle, ViewerError> {
        debug!(%url, "following subject");
        let value = self.transport.get_json(url).await?;
        ResolvedBundle::from_value(value)
    }
}

/// `subject.reference`, falling back to `patient.reference`.
fn subject_reference(resource: &Value) -> Option<String> {
    ["subject", "patient"]
        .into_iter()
        .filter_map(|field| resource.get(field))
        .find_map(|link| text_field(link, "reference"))
}

fn describe(kind: &ResourceKind, resource: &Value) -> String {
    match text_field(resource, "id") {
        Some(id) => format!("{kind}/{id} (no subject reference)"),
        None => format!("{kind} (no subject reference)"),
    }
}
