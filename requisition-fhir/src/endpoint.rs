//! REST endpoint shapes used against the FHIR server.

use chrono::{DateTime, Utc};
use requisition_core::{Locator, ViewerError};
use url::Url;

/// Resource type assumed for identifiers given without one.
pub const DEFAULT_IDENTIFIER_TYPE: &str = "ServiceRequest";

/// Trims whitespace and trailing slashes; an empty base is an input error.
pub fn normalize_base(base: &str) -> Result<String, ViewerError> {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ViewerError::Input(
            "A base server URL is required".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// `{base}/{Type}/{id}/_history`
pub fn history_url(base: &str, resource_type: &str, id: &str) -> Result<String, ViewerError> {
    Ok(format!("{}/{resource_type}/{id}/_history", normalize_base(base)?))
}

/// `{base}/{Type}/{id}/_history/{version}`
pub fn version_url(
    base: &str,
    resource_type: &str,
    id: &str,
    version: &str,
) -> Result<String, ViewerError> {
    Ok(format!(
        "{}/{resource_type}/{id}/_history/{version}",
        normalize_base(base)?
    ))
}

/// `{base}/{Type}/{id}/$everything`
pub fn everything_url(base: &str, resource_type: &str, id: &str) -> Result<String, ViewerError> {
    Ok(format!(
        "{}/{resource_type}/{id}/$everything",
        normalize_base(base)?
    ))
}

/// History endpoint for a `Type/id` (or bare id) identifier.
pub fn identifier_history_url(base: &str, identifier: &str) -> Result<String, ViewerError> {
    let (resource_type, id) = split_identifier(identifier)?;
    history_url(base, resource_type, id)
}

fn split_identifier(identifier: &str) -> Result<(&str, &str), ViewerError> {
    let trimmed = identifier.trim().trim_matches('/');
    let parts: Vec<&str> = trimmed.split('/').collect();
    match parts.as_slice() {
        [id] if !id.is_empty() => Ok((DEFAULT_IDENTIFIER_TYPE, *id)),
        [resource_type, id] if !resource_type.is_empty() && !id.is_empty() => {
            Ok((*resource_type, *id))
        }
        _ => Err(ViewerError::Input(format!(
            "'{identifier}' is not a record identifier (expected Type/id)"
        ))),
    }
}

/// `$everything` endpoint for the subject named by a reference.
///
/// Relative references are resolved against `base`; absolute ones keep their
/// own server. Version suffixes are dropped.
pub fn subject_everything_url(base: &str, reference: &str) -> Result<String, ViewerError> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') {
        return Err(ViewerError::UnresolvableReference(format!(
            "subject reference '{reference}'"
        )));
    }

    if Locator::classify(reference)?.is_url() {
        return absolute_everything_url(&absolute_url(base, reference)?);
    }

    let segments: Vec<&str> = reference.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [id] => everything_url(base, "Patient", id),
        [resource_type, id] | [resource_type, id, "_history", _] => {
            everything_url(base, resource_type, id)
        }
        _ => Err(ViewerError::UnresolvableReference(format!(
            "subject reference '{reference}'"
        ))),
    }
}

fn absolute_everything_url(reference: &str) -> Result<String, ViewerError> {
    let unresolvable =
        || ViewerError::UnresolvableReference(format!("subject reference '{reference}'"));

    let mut url = Url::parse(reference).map_err(|_| unresolvable())?;
    url.set_query(None);
    url.set_fragment(None);

    let path = {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let cut = segments
            .iter()
            .position(|segment| *segment == "_history")
            .unwrap_or(segments.len());
        if cut < 2 {
            return Err(unresolvable());
        }
        segments[..cut].join("/")
    };

    url.set_path(&format!("{path}/$everything"));
    Ok(url.to_string())
}

/// Gives a scheme-relative (`//host/...`) URL the scheme of `base`. Other
/// URLs are returned trimmed.
pub fn absolute_url(base: &str, url: &str) -> Result<String, ViewerError> {
    let url = url.trim();
    if !url.starts_with("//") {
        return Ok(url.to_string());
    }

    let base = normalize_base(base)?;
    let parsed = Url::parse(&base)
        .map_err(|err| ViewerError::Input(format!("'{base}' is not a server URL: {err}")))?;
    Ok(format!("{}:{url}", parsed.scheme()))
}

/// Resolves a possibly relative URL (photo, `fullUrl`, subject reference)
/// against the base server URL. Returns the input unchanged when it cannot
/// be joined.
pub fn resolve_against(base: &str, target: &str) -> String {
    let target = target.trim();
    if Url::parse(target).is_ok() {
        return target.to_string();
    }
    if target.starts_with("//") {
        return absolute_url(base, target).unwrap_or_else(|_| target.to_string());
    }

    let Ok(base) = normalize_base(base) else {
        return target.to_string();
    };

    Url::parse(&format!("{base}/"))
        .and_then(|base_url| base_url.join(target.trim_start_matches('/')))
        .map(|joined| joined.to_string())
        .unwrap_or_else(|_| target.to_string())
}

/// Recently updated orders, newest first.
pub fn worklist_url(
    base: &str,
    since: DateTime<Utc>,
    count: u32,
) -> Result<String, ViewerError> {
    Ok(format!(
        "{}/ServiceRequest?_lastUpdated=gt{}&_sort=-_lastUpdated&_count={count}",
        normalize_base(base)?,
        since.format("%Y-%m-%dT%H:%M:%SZ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BASE: &str = "https://example.org/fhir/";

    #[test]
    fn builds_the_three_endpoint_shapes() {
        assert_eq!(
            history_url(BASE, "ServiceRequest", "abc").unwrap(),
            "https://example.org/fhir/ServiceRequest/abc/_history"
        );
        assert_eq!(
            version_url(BASE, "ServiceRequest", "abc", "3").unwrap(),
            "https://example.org/fhir/ServiceRequest/abc/_history/3"
        );
        assert_eq!(
            everything_url(BASE, "Patient", "P1").unwrap(),
            "https://example.org/fhir/Patient/P1/$everything"
        );
    }

    #[test]
    fn empty_base_is_an_input_error() {
        assert!(matches!(
            history_url("  ", "Patient", "1"),
            Err(ViewerError::Input(_))
        ));
    }

    #[test]
    fn identifiers_default_to_service_requests() {
        assert_eq!(
            identifier_history_url(BASE, "abc").unwrap(),
            "https://example.org/fhir/ServiceRequest/abc/_history"
        );
        assert_eq!(
            identifier_history_url(BASE, "/Patient/P1").unwrap(),
            "https://example.org/fhir/Patient/P1/_history"
        );
        assert!(identifier_history_url(BASE, "a/b/c").is_err());
    }

    #[test]
    fn subject_references_map_to_everything() {
        assert_eq!(
            subject_everything_url(BASE, "Patient/P2").unwrap(),
            "https://example.org/fhir/Patient/P2/$everything"
        );
        assert_eq!(
            subject_everything_url(BASE, "Patient/P2/_history/4").unwrap(),
            "https://example.org/fhir/Patient/P2/$everything"
        );
        assert_eq!(
            subject_everything_url(BASE, "P3").unwrap(),
            "https://example.org/fhir/Patient/P3/$everything"
        );
        assert_eq!(
            subject_everything_url(BASE, "https://other.org/r4/Patient/P4/_history/1").unwrap(),
            "https://other.org/r4/Patient/P4/$everything"
        );
    }

    #[test]
    fn contained_references_are_unresolvable() {
        assert!(matches!(
            subject_everything_url(BASE, "#pat"),
            Err(ViewerError::UnresolvableReference(_))
        ));
    }

    #[test]
    fn relative_targets_join_the_base() {
        assert_eq!(
            resolve_against(BASE, "Binary/photo-1"),
            "https://example.org/fhir/Binary/photo-1"
        );
        assert_eq!(
            resolve_against(BASE, "https://cdn.example.org/p.png"),
            "https://cdn.example.org/p.png"
        );
    }

    #[test]
    fn scheme_relative_urls_take_the_base_scheme() {
        assert_eq!(
            absolute_url(BASE, "//other.org/r4/Patient/P1").unwrap(),
            "https://other.org/r4/Patient/P1"
        );
        assert_eq!(
            absolute_url("http://localhost:8080/fhir", " //localhost:8080/fhir/Patient/P1 ").unwrap(),
            "http://localhost:8080/fhir/Patient/P1"
        );
        assert_eq!(
            absolute_url(BASE, "https://cdn.example.org/p.png").unwrap(),
            "https://cdn.example.org/p.png"
        );
        assert!(matches!(
            absolute_url("", "//other.org/x"),
            Err(ViewerError::Input(_))
        ));
        assert_eq!(
            resolve_against(BASE, "//cdn.example.org/p.png"),
            "https://cdn.example.org/p.png"
        );
        assert_eq!(
            subject_everything_url(BASE, "//other.org/r4/Patient/P4").unwrap(),
            "https://other.org/r4/Patient/P4/$everything"
        );
    }

    #[test]
    fn worklist_query_uses_utc_timestamp() {
        let since = Utc.with_ymd_and_hms(2024, 3, 14, 6, 0, 0).unwrap();
        assert_eq!(
            worklist_url(BASE, since, 15).unwrap(),
            "https://example.org/fhir/ServiceRequest?_lastUpdated=gt2024-03-14T06:00:00Z&_sort=-_lastUpdated&_count=15"
        );
    }
}
