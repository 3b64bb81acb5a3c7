//! Turning a picked history entry into a dereferenceable locator.

use requisition_core::{HistoryEntry, ViewerError};

use crate::endpoint::{resolve_against, version_url};

/// Prefers the entry's `fullUrl`; otherwise builds
/// `{base}/{Type}/{id}/_history/{version}` from the embedded resource.
pub fn entry_locator(entry: &HistoryEntry, base: &str) -> Result<String, ViewerError> {
    if let Some(full_url) = entry.full_url.as_deref() {
        return Ok(resolve_against(base, full_url));
    }

    match (
        entry.resource_type.as_deref(),
        entry.id.as_deref(),
        entry.version_id.as_deref(),
    ) {
        (Some(resource_type), Some(id), Some(version)) => {
            version_url(base, resource_type, id, version)
        }
        _ => Err(ViewerError::Input(
            "This history entry has no URL and no type/id/version to build one".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://example.org/fhir";

    #[test]
    fn synthesizes_versioned_url() {
        let entry = HistoryEntry {
            resource_type: Some("ServiceRequest".into()),
            id: Some("abc".into()),
            version_id: Some("3".into()),
            ..HistoryEntry::default()
        };
        assert_eq!(
            entry_locator(&entry, BASE).unwrap(),
            "https://example.org/fhir/ServiceRequest/abc/_history/3"
        );
    }

    #[test]
    fn prefers_full_url() {
        let entry = HistoryEntry {
            full_url: Some("https://mirror.example.org/ServiceRequest/abc".into()),
            resource_type: Some("ServiceRequest".into()),
            id: Some("abc".into()),
            version_id: Some("3".into()),
            ..HistoryEntry::default()
        };
        assert_eq!(
            entry_locator(&entry, BASE).unwrap(),
            "https://mirror.example.org/ServiceRequest/abc"
        );
    }

    #[test]
    fn missing_version_is_an_input_error() {
        let entry = HistoryEntry {
            resource_type: Some("ServiceRequest".into()),
            id: Some("abc".into()),
            ..HistoryEntry::default()
        };
        assert!(matches!(
            entry_locator(&entry, BASE),
            Err(ViewerError::Input(_))
        ));
    }
}
