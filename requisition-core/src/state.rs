//! Explicit view state for the viewer, advanced by discrete events.
//!
//! Every transition returns a new `ViewState`; nothing is mutated in place.

use serde::{Deserialize, Serialize};

use crate::{HistoryBundle, HistoryEntry, InputMode, Resolution, ResolvedBundle, ViewerError};

/// Presentation phase of the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "phase", content = "data", rename_all = "snake_case")]
pub enum ViewStatus {
    #[default]
    Idle,
    Resolving,
    Resolved(ResolvedBundle),
    HistoryPending(HistoryBundle),
    Failed(String),
}

/// Everything the viewer shows, as one immutable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub mode: InputMode,
    pub locator: String,
    pub base_url: String,
    pub status: ViewStatus,
    /// Incremented whenever a new attempt starts.
    pub attempt: u64,
    /// Entry picked from the history list for the attempt in flight.
    pub chosen_entry: Option<HistoryEntry>,
}

impl ViewState {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            mode: InputMode::default(),
            locator: String::new(),
            base_url: base_url.into(),
            status: ViewStatus::Idle,
            attempt: 0,
            chosen_entry: None,
        }
    }

    pub fn is_resolving(&self) -> bool {
        matches!(self.status, ViewStatus::Resolving)
    }

    /// Whether the submit control should be enabled.
    pub fn can_submit(&self) -> bool {
        !self.is_resolving() && !self.locator.trim().is_empty()
    }

    pub fn active_bundle(&self) -> Option<&ResolvedBundle> {
        match &self.status {
            ViewStatus::Resolved(bundle) => Some(bundle),
            _ => None,
        }
    }

    pub fn history(&self) -> Option<&HistoryBundle> {
        match &self.status {
            ViewStatus::HistoryPending(bundle) => Some(bundle),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            ViewStatus::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// Applies one event and returns the next state.
    pub fn apply(&self, event: ViewEvent) -> ViewState {
        match event {
            ViewEvent::ModeChanged(mode) => ViewState {
                mode,
                ..self.clone()
            },
            ViewEvent::LocatorEdited(locator) => ViewState {
                locator,
                ..self.clone()
            },
            ViewEvent::BaseUrlEdited(base_url) => ViewState {
                base_url,
                ..self.clone()
            },
            ViewEvent::Submitted => {
                if self.is_resolving() {
                    return self.clone();
                }
                self.start_attempt(None)
            }
            ViewEvent::ScanDecoded(value) => {
                if self.is_resolving() {
                    return self.clone();
                }
                ViewState {
                    mode: InputMode::Scanned,
                    locator: value,
                    ..self.clone()
                }
                .start_attempt(None)
            }
            ViewEvent::HistoryEntryChosen(entry) => {
                if self.history().is_none() {
                    return self.clone();
                }
                self.start_attempt(Some(entry))
            }
            ViewEvent::Settled(result) => {
                if !self.is_resolving() {
                    return self.clone();
                }
                let status = match result {
                    Ok(Resolution::Resolved(bundle)) => ViewStatus::Resolved(bundle),
                    Ok(Resolution::History(bundle)) => ViewStatus::HistoryPending(bundle),
                    Err(err) => ViewStatus::Failed(err.to_string()),
                };
                ViewState {
                    status,
                    chosen_entry: None,
                    ..self.clone()
                }
            }
        }
    }

    fn start_attempt(&self, chosen_entry: Option<HistoryEntry>) -> ViewState {
        ViewState {
            status: ViewStatus::Resolving,
            attempt: self.attempt + 1,
            chosen_entry,
            ..self.clone()
        }
    }
}

/// User and network events that move the viewer between states.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    ModeChanged(InputMode),
    LocatorEdited(String),
    BaseUrlEdited(String),
    Submitted,
    /// A camera scan produced a locator; switches to scanned mode and submits.
    ScanDecoded(String),
    HistoryEntryChosen(HistoryEntry),
    Settled(Result<Resolution, ViewerError>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolved() -> ResolvedBundle {
        ResolvedBundle::from_value(json!({"resourceType": "Bundle", "type": "searchset"})).unwrap()
    }

    fn history() -> HistoryBundle {
        HistoryBundle::from_value(json!({"resourceType": "Bundle", "type": "history"})).unwrap()
    }

    #[test]
    fn submit_clears_the_previous_bundle() {
        let state = ViewState::new("https://example.org/fhir")
            .apply(ViewEvent::LocatorEdited("https://example.org/fhir/Patient/1".into()))
            .apply(ViewEvent::Submitted)
            .apply(ViewEvent::Settled(Ok(Resolution::Resolved(resolved()))));
        assert!(state.active_bundle().is_some());

        let next = state.apply(ViewEvent::Submitted);
        assert!(next.is_resolving());
        assert!(next.active_bundle().is_none());
        assert_eq!(next.attempt, 2);
    }

    #[test]
    fn submit_is_ignored_while_resolving() {
        let state = ViewState::new("https://example.org/fhir")
            .apply(ViewEvent::LocatorEdited("abc".into()))
            .apply(ViewEvent::Submitted);
        assert!(!state.can_submit());

        let again = state.apply(ViewEvent::Submitted);
        assert_eq!(again, state);
    }

    #[test]
    fn failure_keeps_only_the_message() {
        let state = ViewState::new("https://example.org/fhir")
            .apply(ViewEvent::Submitted)
            .apply(ViewEvent::Settled(Err(ViewerError::Input("bad".into()))));
        assert_eq!(state.error_message(), Some("Invalid input: bad"));
        assert!(state.active_bundle().is_none());
    }

    #[test]
    fn history_choice_requires_pending_history() {
        let idle = ViewState::new("https://example.org/fhir");
        let unchanged = idle.apply(ViewEvent::HistoryEntryChosen(HistoryEntry::default()));
        assert_eq!(unchanged, idle);

        let pending = idle
            .apply(ViewEvent::Submitted)
            .apply(ViewEvent::Settled(Ok(Resolution::History(history()))));
        assert!(pending.history().is_some());

        let entry = HistoryEntry {
            id: Some("abc".into()),
            ..HistoryEntry::default()
        };
        let choosing = pending.apply(ViewEvent::HistoryEntryChosen(entry.clone()));
        assert!(choosing.is_resolving());
        assert_eq!(choosing.chosen_entry, Some(entry));
    }

    #[test]
    fn scan_switches_mode_and_submits() {
        let state = ViewState::new("https://example.org/fhir")
            .apply(ViewEvent::ScanDecoded("ServiceRequest/abc".into()));
        assert_eq!(state.mode, InputMode::Scanned);
        assert_eq!(state.locator, "ServiceRequest/abc");
        assert!(state.is_resolving());
    }

    #[test]
    fn late_results_are_ignored_when_idle() {
        let idle = ViewState::new("https://example.org/fhir");
        let next = idle.apply(ViewEvent::Settled(Ok(Resolution::Resolved(resolved()))));
        assert_eq!(next, idle);
    }
}
