//! Stylesheet injected once per document and refreshed when the bundled
//! version changes.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;
#[cfg(target_arch = "wasm32")]
use web_sys::Document;

const STYLE_ELEMENT_ID: &str = "requisition-ui-styles";
const STYLE_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StyleAction {
    Insert,
    Replace,
    Keep,
}

/// What to do given the `data-version` of an already injected tag, if any.
fn style_action(existing: Option<Option<&str>>) -> StyleAction {
    match existing {
        None => StyleAction::Insert,
        Some(Some(version)) if version == STYLE_VERSION => StyleAction::Keep,
        Some(_) => StyleAction::Replace,
    }
}

/// Default CSS for the viewer. Colors and spacing are exposed as tokens.
#[cfg(target_arch = "wasm32")]
pub const DEFAULT_STYLES: &str = r#"
:root {
  --viewer-font-family: 'Inter', system-ui, -apple-system, 'Segoe UI', sans-serif;
  --viewer-bg: #f8fafc;
  --viewer-card-bg: #ffffff;
  --viewer-card-border: rgba(148, 163, 184, 0.35);
  --viewer-radius: 12px;
  --viewer-text: #1f2933;
  --viewer-muted: #52606d;
  --viewer-accent: #2563eb;
  --viewer-accent-text: #ffffff;
  --viewer-error-bg: rgba(180, 35, 24, 0.08);
  --viewer-error-text: #b42318;
  --viewer-pill-bg: rgba(37, 99, 235, 0.1);
}

.viewer-root {
  font-family: var(--viewer-font-family);
  background: var(--viewer-bg);
  color: var(--viewer-text);
  display: flex;
  flex-direction: column;
  gap: 20px;
  padding: 24px;
  border-radius: var(--viewer-radius);
}

.viewer-form {
  display: grid;
  grid-template-columns: minmax(140px, 180px) 1fr;
  gap: 10px 14px;
  align-items: center;
}

.viewer-form label {
  font-size: 0.85rem;
  color: var(--viewer-muted);
}

.viewer-form input,
.viewer-form select {
  font: inherit;
  padding: 8px 10px;
  border: 1px solid var(--viewer-card-border);
  border-radius: 8px;
  background: var(--viewer-card-bg);
}

.viewer-actions {
  grid-column: 2;
  display: flex;
  gap: 10px;
}

.viewer-actions button,
.viewer-history button,
.viewer-worklist button {
  font: inherit;
  cursor: pointer;
  padding: 8px 14px;
  border-radius: 8px;
  border: 1px solid var(--viewer-accent);
  background: var(--viewer-accent);
  color: var(--viewer-accent-text);
}

.viewer-actions button.secondary,
.viewer-history button,
.viewer-worklist button.row-link {
  background: transparent;
  color: var(--viewer-accent);
}

button:disabled {
  opacity: 0.5;
  cursor: not-allowed;
}

.viewer-status {
  color: var(--viewer-muted);
}

.viewer-error {
  background: var(--viewer-error-bg);
  color: var(--viewer-error-text);
  padding: 12px 16px;
  border-radius: var(--viewer-radius);
}

.viewer-grid {
  display: grid;
  grid-template-columns: repeat(auto-fit, minmax(280px, 1fr));
  gap: 16px;
}

.viewer-card {
  background: var(--viewer-card-bg);
  border: 1px solid var(--viewer-card-border);
  border-radius: var(--viewer-radius);
  padding: 16px 18px;
}

.viewer-card header {
  display: flex;
  justify-content: space-between;
  align-items: baseline;
  margin-bottom: 10px;
}

.viewer-card h3 {
  margin: 0;
  font-size: 1rem;
}

.viewer-count {
  background: var(--viewer-pill-bg);
  color: var(--viewer-accent);
  border-radius: 999px;
  padding: 2px 10px;
  font-size: 0.8rem;
}

.viewer-card ul {
  list-style: none;
  margin: 0;
  padding: 0;
  display: flex;
  flex-direction: column;
  gap: 10px;
}

.viewer-item-title {
  font-weight: 600;
}

.viewer-item-meta {
  font-size: 0.85rem;
  color: var(--viewer-muted);
}

.viewer-empty {
  color: var(--viewer-muted);
  font-style: italic;
}

.viewer-patient {
  display: flex;
  gap: 16px;
  align-items: flex-start;
}

.viewer-patient img {
  width: 96px;
  height: 96px;
  object-fit: cover;
  border-radius: 50%;
}

.viewer-patient dl {
  display: grid;
  grid-template-columns: auto 1fr;
  gap: 4px 12px;
  margin: 0;
}

.viewer-patient dt {
  color: var(--viewer-muted);
}

.viewer-more {
  color: var(--viewer-muted);
  font-size: 0.85rem;
}

.viewer-worklist table {
  width: 100%;
  border-collapse: collapse;
}

.viewer-worklist th,
.viewer-worklist td {
  text-align: left;
  padding: 6px 8px;
  border-bottom: 1px solid var(--viewer-card-border);
}

.viewer-raw pre {
  max-height: 420px;
  overflow: auto;
  background: var(--viewer-card-bg);
  border: 1px solid var(--viewer-card-border);
  border-radius: var(--viewer-radius);
  padding: 12px;
  font-size: 0.8rem;
}

@media (max-width: 720px) {
  .viewer-form {
    grid-template-columns: 1fr;
  }

  .viewer-actions {
    grid-column: 1;
  }
}
"#;

#[cfg(target_arch = "wasm32")]
pub fn ensure_styles(document: &Document) -> Result<(), JsValue> {
    let existing = document.get_element_by_id(STYLE_ELEMENT_ID);
    let version = existing
        .as_ref()
        .map(|element| element.get_attribute("data-version"));

    match (style_action(version.as_ref().map(Option::as_deref)), existing) {
        (StyleAction::Keep, _) => Ok(()),
        (StyleAction::Replace, Some(element)) => {
            element.set_attribute("data-version", STYLE_VERSION)?;
            element.set_text_content(Some(DEFAULT_STYLES));
            Ok(())
        }
        _ => {
            let head = document
                .head()
                .ok_or_else(|| JsValue::from_str("Document has no <head>"))?;
            let element = document.create_element("style")?;
            element.set_id(STYLE_ELEMENT_ID);
            element.set_attribute("data-version", STYLE_VERSION)?;
            element.set_text_content(Some(DEFAULT_STYLES));
            head.append_child(&element)?;
            Ok(())
        }
    }
}
