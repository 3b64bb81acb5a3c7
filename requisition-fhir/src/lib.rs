//! FHIR REST client side of the requisition viewer: locator resolution,
//! history selection, dashboard building and the recent-orders worklist.

pub mod dashboard;
pub mod endpoint;
mod fields;
pub mod history;
pub mod resolver;
pub mod transport;
pub mod worklist;

pub use dashboard::{build_dashboard, build_dashboard_str, TERMINAL_ORDER_STATUSES};
pub use history::entry_locator;
pub use resolver::Resolver;
pub use transport::{FhirTransport, HttpTransport};
pub use worklist::recent_orders;

use requisition_core::{InputMode, Resolution, ViewerError};

/// Resolves `locator` in `mode` against `base_url` with the given transport.
pub async fn resolve<T: FhirTransport>(
    transport: T,
    locator: &str,
    mode: InputMode,
    base_url: &str,
) -> Result<Resolution, ViewerError> {
    Resolver::new(transport, base_url).resolve(locator, mode).await
}
