//! Recently updated orders with their subjects' names.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use requisition_core::{ResolvedBundle, ViewerConfig, ViewerError, WorklistRow};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dashboard::patient_display_name;
use crate::endpoint::{resolve_against, worklist_url};
use crate::fields::{extract_codeable_text, first_item, text_field};
use crate::transport::FhirTransport;

/// Lists orders updated within the configured window, newest first.
///
/// Subject names are looked up one request at a time; a failed lookup leaves
/// the name empty instead of failing the listing.
pub async fn recent_orders<T: FhirTransport>(
    transport: &T,
    base: &str,
    now: DateTime<Utc>,
    config: &ViewerConfig,
) -> Result<Vec<WorklistRow>, ViewerError> {
    let since = now - Duration::hours(i64::from(config.worklist_window_hours));
    let url = worklist_url(base, since, config.worklist_count)?;
    let bundle = ResolvedBundle::from_value(transport.get_json(&url).await?)?;

    let entries = bundle
        .as_value()
        .get("entry")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut names: HashMap<String, Option<String>> = HashMap::new();
    let mut rows = Vec::new();

    for entry in entries {
        let Some(resource) = entry.get("resource") else {
            continue;
        };
        if resource.get("resourceType").and_then(Value::as_str) != Some("ServiceRequest") {
            continue;
        }

        let subject_name = match resource
            .get("subject")
            .and_then(|subject| text_field(subject, "reference"))
        {
            Some(reference) => {
                if let Some(known) = names.get(&reference) {
                    known.clone()
                } else {
                    let name = lookup_subject_name(transport, base, &reference).await;
                    names.insert(reference, name.clone());
                    name
                }
            }
            None => resource
                .get("subject")
                .and_then(|subject| text_field(subject, "display")),
        };

        let id = text_field(resource, "id");
        let locator = text_field(entry, "fullUrl")
            .map(|full_url| resolve_against(base, &full_url))
            .or_else(|| {
                id.as_deref()
                    .map(|id| resolve_against(base, &format!("ServiceRequest/{id}")))
            });

        rows.push(WorklistRow {
            id,
            requisition: resource
                .get("requisition")
                .and_then(|requisition| text_field(requisition, "value")),
            status: text_field(resource, "status"),
            subject_name,
            code: resource.get("code").and_then(extract_codeable_text),
            category: first_item(resource, "category").and_then(extract_codeable_text),
            locator,
        });
    }

    debug!(rows = rows.len(), "worklist loaded");
    Ok(rows)
}

async fn lookup_subject_name<T: FhirTransport>(
    transport: &T,
    base: &str,
    reference: &str,
) -> Option<String> {
    if reference.starts_with('#') {
        return None;
    }

    let url = resolve_against(base, reference);
    match transport.get_json(&url).await {
        Ok(subject) => patient_display_name(&subject),
        Err(err) => {
            warn!(%reference, error = %err, "subject lookup failed");
            None
        }
    }
}
