//! Yew viewer for requisition data, compiled for WebAssembly.

#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
mod styles;

#[cfg(target_arch = "wasm32")]
mod wasm_ui {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::styles;
    use chrono::{DateTime, Local, Utc};
    use requisition_core::{
        Dashboard, HistoryBundle, HistoryEntry, ImagingCard, InputMode, ObservationCard,
        OrderCard, PatientSummary, ReportCard, Resolution, ViewEvent, ViewState, ViewStatus,
        ViewerConfig, ViewerError, WorklistRow,
    };
    use requisition_fhir::{build_dashboard, recent_orders, HttpTransport, Resolver};
    use serde_wasm_bindgen::from_value;
    use wasm_bindgen::prelude::*;
    use web_sys::{console, Document, Element, Event, HtmlInputElement, HtmlSelectElement, Window};
    use yew::platform::spawn_local;
    use yew::prelude::*;
    use yew::TargetCast;

    const SCAN_START_EVENT: &str = "requisition-scan:start";
    const SCAN_STOP_EVENT: &str = "requisition-scan:stop";

    const MODES: [(InputMode, &str); 3] = [
        (InputMode::DirectUrl, "Direct URL"),
        (InputMode::Identifier, "Identifier"),
        (InputMode::Scanned, "Scanned QR"),
    ];

    thread_local! {
        static SCAN_SINK: RefCell<Option<Callback<String>>> = RefCell::new(None);
    }

    /// Reducer wrapper so `ViewState::apply` drives the component tree.
    #[derive(Clone, PartialEq)]
    pub struct ViewerStore(ViewState);

    impl Reducible for ViewerStore {
        type Action = ViewEvent;

        fn reduce(self: Rc<Self>, action: ViewEvent) -> Rc<Self> {
            Rc::new(ViewerStore(self.0.apply(action)))
        }
    }

    type ViewerContext = UseReducerHandle<ViewerStore>;

    #[derive(Properties, PartialEq)]
    pub struct ViewerAppProps {
        pub config: ViewerConfig,
    }

    #[function_component(ViewerApp)]
    fn viewer_app(props: &ViewerAppProps) -> Html {
        let base_url = props.config.base_url.clone();
        let store = use_reducer(move || ViewerStore(ViewState::new(base_url)));
        let scanning = use_state(|| false);

        use_effect_with((), |_| {
            if let Some(document) = web_sys::window().and_then(|window| window.document()) {
                if let Err(err) = styles::ensure_styles(&document) {
                    console::error_1(&err);
                }
            }
            || ()
        });

        {
            let store = store.clone();
            let scanning = scanning.clone();
            use_effect_with((), move |_| {
                let sink = Callback::from(move |value: String| {
                    scanning.set(false);
                    announce_scanner(false);
                    store.dispatch(ViewEvent::ScanDecoded(value));
                });
                SCAN_SINK.with(|slot| *slot.borrow_mut() = Some(sink));
                || SCAN_SINK.with(|slot| *slot.borrow_mut() = None)
            });
        }

        {
            let store = store.clone();
            use_effect_with(store.0.attempt, move |_| {
                let state = store.0.clone();
                if state.is_resolving() {
                    spawn_local(async move {
                        let outcome = run_attempt(&state).await;
                        if let Err(err) = &outcome {
                            console::warn_1(&JsValue::from_str(&err.to_string()));
                        }
                        store.dispatch(ViewEvent::Settled(outcome));
                    });
                }
                || ()
            });
        }

        let state = &store.0;
        let body = match &state.status {
            ViewStatus::Idle => html! {
                <p class="viewer-status">{"Enter a URL or identifier, or scan a requisition QR code."}</p>
            },
            ViewStatus::Resolving => html! {
                <p class="viewer-status" role="status">{"Loading…"}</p>
            },
            ViewStatus::Failed(message) => html! {
                <div class="viewer-error" role="alert">{ message.clone() }</div>
            },
            ViewStatus::HistoryPending(history) => html! {
                <HistoryList history={history.clone()} />
            },
            ViewStatus::Resolved(bundle) => {
                let config = ViewerConfig {
                    base_url: state.base_url.clone(),
                    ..props.config.clone()
                };
                let dashboard =
                    build_dashboard(bundle, &config.base_url, Local::now().date_naive(), &config);
                let raw = serde_json::to_string_pretty(bundle.as_value()).unwrap_or_default();
                html! { <DashboardView dashboard={dashboard} raw={raw} /> }
            }
        };

        html! {
            <ContextProvider<ViewerContext> context={store.clone()}>
                <div class="viewer-root">
                    <InputPanel scanning={scanning.clone()} />
                    <section aria-live="polite">{ body }</section>
                    <WorklistPanel config={props.config.clone()} />
                </div>
            </ContextProvider<ViewerContext>>
        }
    }

    async fn run_attempt(state: &ViewState) -> Result<Resolution, ViewerError> {
        let resolver = Resolver::new(HttpTransport::default(), state.base_url.trim());
        match &state.chosen_entry {
            Some(entry) => resolver
                .resolve_history_entry(entry)
                .await
                .map(Resolution::Resolved),
            None => resolver.resolve(&state.locator, state.mode).await,
        }
    }

    fn announce_scanner(active: bool) {
        let name = if active {
            SCAN_START_EVENT
        } else {
            SCAN_STOP_EVENT
        };
        let Some(window) = web_sys::window() else {
            return;
        };
        let dispatched = Event::new(name).and_then(|event| window.dispatch_event(&event));
        if let Err(err) = dispatched {
            console::error_1(&err);
        }
    }

    #[derive(Properties, PartialEq)]
    struct InputPanelProps {
        scanning: UseStateHandle<bool>,
    }

    #[function_component(InputPanel)]
    fn input_panel(props: &InputPanelProps) -> Html {
        let Some(store) = use_context::<ViewerContext>() else {
            return Html::default();
        };
        let state = &store.0;

        let on_mode = {
            let store = store.clone();
            Callback::from(move |event: Event| {
                let select: HtmlSelectElement = event.target_unchecked_into();
                match select.value().parse::<InputMode>() {
                    Ok(mode) => store.dispatch(ViewEvent::ModeChanged(mode)),
                    Err(err) => console::error_1(&JsValue::from_str(&err.to_string())),
                }
            })
        };

        let on_locator = {
            let store = store.clone();
            Callback::from(move |event: InputEvent| {
                let input: HtmlInputElement = event.target_unchecked_into();
                store.dispatch(ViewEvent::LocatorEdited(input.value()));
            })
        };

        let on_base = {
            let store = store.clone();
            Callback::from(move |event: InputEvent| {
                let input: HtmlInputElement = event.target_unchecked_into();
                store.dispatch(ViewEvent::BaseUrlEdited(input.value()));
            })
        };

        let on_submit = {
            let store = store.clone();
            Callback::from(move |event: SubmitEvent| {
                event.prevent_default();
                store.dispatch(ViewEvent::Submitted);
            })
        };

        let on_scan_toggle = {
            let scanning = props.scanning.clone();
            Callback::from(move |_| {
                let next = !*scanning;
                scanning.set(next);
                announce_scanner(next);
            })
        };

        let placeholder = match state.mode {
            InputMode::DirectUrl => "https://server.fire.ly/ServiceRequest/123",
            InputMode::Identifier => "ServiceRequest/123",
            InputMode::Scanned => "Scanned value",
        };

        html! {
            <form class="viewer-form" onsubmit={on_submit}>
                <label for="viewer-mode">{"Input mode"}</label>
                <select id="viewer-mode" onchange={on_mode}>
                    {
                        for MODES.into_iter().map(|(mode, label)| html! {
                            <option value={mode.as_str()} selected={state.mode == mode}>{ label }</option>
                        })
                    }
                </select>

                <label for="viewer-locator">{"Locator"}</label>
                <input
                    id="viewer-locator"
                    type="text"
                    placeholder={placeholder}
                    value={state.locator.clone()}
                    oninput={on_locator}
                />

                <label for="viewer-base">{"FHIR server"}</label>
                <input
                    id="viewer-base"
                    type="url"
                    value={state.base_url.clone()}
                    oninput={on_base}
                />

                <div class="viewer-actions">
                    <button type="submit" disabled={!state.can_submit()}>
                        { if state.is_resolving() { "Loading…" } else { "Open" } }
                    </button>
                    <button type="button" class="secondary" onclick={on_scan_toggle}>
                        { if *props.scanning { "Stop scanner" } else { "Start scanner" } }
                    </button>
                </div>
            </form>
        }
    }

    #[derive(Properties, PartialEq)]
    struct HistoryListProps {
        history: HistoryBundle,
    }

    #[function_component(HistoryList)]
    fn history_list(props: &HistoryListProps) -> Html {
        let Some(store) = use_context::<ViewerContext>() else {
            return Html::default();
        };
        let entries = props.history.entries();

        html! {
            <section class="viewer-card viewer-history">
                <header>
                    <h3>{"Versions"}</h3>
                    <span class="viewer-count">{ entries.len() }</span>
                </header>
                <ul>
                    {
                        if entries.is_empty() {
                            html! { <li class="viewer-empty">{"The server returned no versions."}</li> }
                        } else {
                            html! { for entries.into_iter().map(|entry| render_history_entry(entry, &store)) }
                        }
                    }
                </ul>
            </section>
        }
    }

    fn render_history_entry(entry: HistoryEntry, store: &ViewerContext) -> Html {
        let title = match (&entry.resource_type, &entry.id) {
            (Some(kind), Some(id)) => format!("{kind}/{id}"),
            _ => "Deleted or empty version".to_string(),
        };
        let version = entry
            .version_id
            .as_deref()
            .map(|v| format!("version {v}"))
            .unwrap_or_else(|| "no version".to_string());
        let meta = [
            Some(version),
            entry.last_updated.clone(),
            entry.status.clone(),
            entry.method.clone(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" · ");

        let onclick = {
            let store = store.clone();
            Callback::from(move |_| store.dispatch(ViewEvent::HistoryEntryChosen(entry.clone())))
        };

        html! {
            <li>
                <div class="viewer-item-title">{ title }</div>
                <div class="viewer-item-meta">{ meta }</div>
                <button type="button" onclick={onclick}>{"Open this version"}</button>
            </li>
        }
    }

    #[derive(Properties, PartialEq)]
    struct DashboardViewProps {
        dashboard: Dashboard,
        raw: String,
    }

    #[function_component(DashboardView)]
    fn dashboard_view(props: &DashboardViewProps) -> Html {
        let dashboard = &props.dashboard;

        html! {
            <>
                {
                    if dashboard.is_empty() {
                        html! { <p class="viewer-empty">{"The bundle contains nothing to display."}</p> }
                    } else {
                        Html::default()
                    }
                }
                <div class="viewer-grid">
                    { dashboard.patient.as_ref().map(render_patient).unwrap_or_default() }
                    { render_orders(&dashboard.outstanding_orders, dashboard.total_orders) }
                    { render_card("Diagnostic reports", dashboard.reports.len(), "No reports", dashboard.reports.iter().map(render_report).collect()) }
                    { render_card("Imaging studies", dashboard.imaging.len(), "No imaging studies", dashboard.imaging.iter().map(render_imaging).collect()) }
                    { render_observations(&dashboard.observations, dashboard.more_observations) }
                </div>
                <details class="viewer-raw">
                    <summary>{"Raw JSON"}</summary>
                    <pre>{ props.raw.clone() }</pre>
                </details>
            </>
        }
    }

    fn render_card(title: &str, count: usize, empty_label: &str, items: Vec<Html>) -> Html {
        html! {
            <section class="viewer-card">
                <header>
                    <h3>{ title }</h3>
                    <span class="viewer-count">{ count }</span>
                </header>
                <ul>
                    {
                        if items.is_empty() {
                            html! { <li class="viewer-empty">{ empty_label }</li> }
                        } else {
                            html! { for items }
                        }
                    }
                </ul>
            </section>
        }
    }

    fn render_patient(patient: &PatientSummary) -> Html {
        let age = match (patient.birth_date, patient.age) {
            (Some(birth), Some(age)) => format!("{birth} ({age} years)"),
            (Some(birth), None) => birth.to_string(),
            _ => "--".to_string(),
        };

        html! {
            <section class="viewer-card">
                <header>
                    <h3>{ patient.display_name.clone().unwrap_or_else(|| "Unnamed patient".to_string()) }</h3>
                </header>
                <div class="viewer-patient">
                    {
                        patient.photo.as_ref().map(|photo| html! {
                            <img src={photo.src().to_string()} alt="Patient photo" />
                        }).unwrap_or_default()
                    }
                    <dl>
                        <dt>{"Born"}</dt><dd>{ age }</dd>
                        <dt>{"Gender"}</dt><dd>{ or_dash(patient.gender.as_deref()) }</dd>
                        <dt>{"Identifier"}</dt><dd>{ or_dash(patient.identifier.as_deref()) }</dd>
                        <dt>{"Address"}</dt><dd>{ or_dash(patient.address.as_deref()) }</dd>
                        <dt>{"Contact"}</dt><dd>{ or_dash(patient.contact.as_deref()) }</dd>
                    </dl>
                </div>
            </section>
        }
    }

    fn render_orders(orders: &[OrderCard], total: usize) -> Html {
        let title = format!("Outstanding orders ({} of {total})", orders.len());
        render_card(
            &title,
            orders.len(),
            "No outstanding orders",
            orders.iter().map(render_order).collect(),
        )
    }

    fn render_order(order: &OrderCard) -> Html {
        let meta = join_present(&[
            order.status.as_deref(),
            order.priority.as_deref(),
            order.category.as_deref(),
            order.requisition.as_deref(),
        ]);

        html! {
            <li>
                <div class="viewer-item-title">{ or_dash(order.code.as_deref()) }</div>
                <div class="viewer-item-meta">{ meta }</div>
                <div class="viewer-item-meta">
                    { format!("{} · {}", format_timestamp(order.authored_on), or_dash(order.requester.as_deref())) }
                </div>
                { for order.notes.iter().map(|note| html! { <p class="viewer-item-meta">{ note.clone() }</p> }) }
            </li>
        }
    }

    fn render_report(report: &ReportCard) -> Html {
        let meta = format!(
            "{} · {} · {} results",
            or_dash(report.status.as_deref()),
            format_timestamp(report.issued),
            report.result_count
        );

        html! {
            <li>
                <div class="viewer-item-title">{ or_dash(report.code.as_deref()) }</div>
                <div class="viewer-item-meta">{ meta }</div>
                { report.conclusion.as_ref().map(|text| html! { <p>{ text.clone() }</p> }).unwrap_or_default() }
            </li>
        }
    }

    fn render_imaging(study: &ImagingCard) -> Html {
        let meta = format!(
            "{} · {} · {} series, {} instances",
            or_dash(study.modality.as_deref()),
            format_timestamp(study.started),
            study.series_count,
            study.instance_count
        );

        html! {
            <li>
                <div class="viewer-item-title">{ or_dash(study.description.as_deref()) }</div>
                <div class="viewer-item-meta">{ meta }</div>
            </li>
        }
    }

    fn render_observations(observations: &[ObservationCard], more: usize) -> Html {
        let mut items: Vec<Html> = observations.iter().map(render_observation).collect();
        if more > 0 {
            items.push(html! { <li class="viewer-more">{ format!("+{more} more") }</li> });
        }
        render_card(
            "Observations",
            observations.len() + more,
            "No observations",
            items,
        )
    }

    fn render_observation(observation: &ObservationCard) -> Html {
        html! {
            <li>
                <div class="viewer-item-title">{ or_dash(observation.code.as_deref()) }</div>
                <div>{ or_dash(observation.value.as_deref()) }</div>
                <div class="viewer-item-meta">
                    { format!("{} · {}", or_dash(observation.status.as_deref()), format_timestamp(observation.effective)) }
                </div>
            </li>
        }
    }

    #[derive(Clone, PartialEq)]
    enum WorklistState {
        Idle,
        Loading,
        Loaded(Vec<WorklistRow>),
        Failed(String),
    }

    #[derive(Properties, PartialEq)]
    struct WorklistPanelProps {
        config: ViewerConfig,
    }

    #[function_component(WorklistPanel)]
    fn worklist_panel(props: &WorklistPanelProps) -> Html {
        let Some(store) = use_context::<ViewerContext>() else {
            return Html::default();
        };
        let worklist = use_state(|| WorklistState::Idle);

        let on_load = {
            let worklist = worklist.clone();
            let config = ViewerConfig {
                base_url: store.0.base_url.trim().to_string(),
                ..props.config.clone()
            };
            Callback::from(move |_| {
                let worklist = worklist.clone();
                let config = config.clone();
                worklist.set(WorklistState::Loading);
                spawn_local(async move {
                    let transport = HttpTransport::default();
                    let next = match recent_orders(&transport, &config.base_url, Utc::now(), &config)
                        .await
                    {
                        Ok(rows) => WorklistState::Loaded(rows),
                        Err(err) => WorklistState::Failed(err.to_string()),
                    };
                    worklist.set(next);
                });
            })
        };

        let loading = matches!(*worklist, WorklistState::Loading);
        let content = match &*worklist {
            WorklistState::Idle => Html::default(),
            WorklistState::Loading => html! { <p class="viewer-status">{"Loading recent orders…"}</p> },
            WorklistState::Failed(message) => html! { <div class="viewer-error">{ message.clone() }</div> },
            WorklistState::Loaded(rows) if rows.is_empty() => {
                html! { <p class="viewer-empty">{"No orders were updated recently."}</p> }
            }
            WorklistState::Loaded(rows) => html! {
                <table>
                    <thead>
                        <tr>
                            <th>{"Requisition"}</th>
                            <th>{"Patient"}</th>
                            <th>{"Order"}</th>
                            <th>{"Category"}</th>
                            <th>{"Status"}</th>
                            <th></th>
                        </tr>
                    </thead>
                    <tbody>
                        { for rows.iter().map(|row| render_worklist_row(row, &store)) }
                    </tbody>
                </table>
            },
        };

        html! {
            <section class="viewer-card viewer-worklist">
                <header>
                    <h3>{ format!("Recently updated orders (last {} h)", props.config.worklist_window_hours) }</h3>
                    <button type="button" disabled={loading} onclick={on_load}>{"Refresh"}</button>
                </header>
                { content }
            </section>
        }
    }

    fn render_worklist_row(row: &WorklistRow, store: &ViewerContext) -> Html {
        let open = row.locator.clone().map(|locator| {
            let store = store.clone();
            let disabled = store.0.is_resolving();
            let onclick = Callback::from(move |_| {
                store.dispatch(ViewEvent::ModeChanged(InputMode::DirectUrl));
                store.dispatch(ViewEvent::LocatorEdited(locator.clone()));
                store.dispatch(ViewEvent::Submitted);
            });
            html! { <button type="button" class="row-link" disabled={disabled} onclick={onclick}>{"Open"}</button> }
        });

        html! {
            <tr>
                <td>{ or_dash(row.requisition.as_deref().or(row.id.as_deref())) }</td>
                <td>{ row.subject_name.clone().unwrap_or_else(|| "N/A".to_string()) }</td>
                <td>{ or_dash(row.code.as_deref()) }</td>
                <td>{ or_dash(row.category.as_deref()) }</td>
                <td>{ or_dash(row.status.as_deref()) }</td>
                <td>{ open.unwrap_or_default() }</td>
            </tr>
        }
    }

    fn or_dash(value: Option<&str>) -> String {
        value.unwrap_or("--").to_string()
    }

    fn join_present(parts: &[Option<&str>]) -> String {
        let present: Vec<&str> = parts.iter().flatten().copied().collect();
        if present.is_empty() {
            "--".to_string()
        } else {
            present.join(" · ")
        }
    }

    fn format_timestamp(timestamp: Option<DateTime<Utc>>) -> String {
        timestamp
            .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "--".to_string())
    }

    #[wasm_bindgen]
    pub fn mount_viewer(selector: &str, config: Option<JsValue>) -> Result<(), JsValue> {
        let window: Window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
        let document: Document = window
            .document()
            .ok_or_else(|| JsValue::from_str("Cannot access document"))?;

        let target: Element = document
            .query_selector(selector)
            .map_err(|err| JsValue::from_str(&format!("Invalid selector: {err:?}")))?
            .ok_or_else(|| JsValue::from_str("No element matches the selector"))?;

        let config: ViewerConfig = match config {
            Some(value) if !value.is_undefined() && !value.is_null() => from_value(value)?,
            _ => ViewerConfig::default(),
        };

        yew::Renderer::<ViewerApp>::with_root_and_props(target, ViewerAppProps { config }).render();
        Ok(())
    }

    /// Feeds a decoded QR value into the mounted viewer as a scanned locator.
    #[wasm_bindgen]
    pub fn push_scanned_locator(value: &str) -> Result<(), JsValue> {
        let sink = SCAN_SINK.with(|slot| slot.borrow().clone());
        match sink {
            Some(callback) => {
                callback.emit(value.trim().to_string());
                Ok(())
            }
            None => Err(JsValue::from_str("No requisition viewer is mounted")),
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_ui::{mount_viewer, push_scanned_locator};

#[cfg(not(target_arch = "wasm32"))]
pub fn mount_viewer(
    _: &str,
    _: Option<wasm_bindgen::JsValue>,
) -> Result<(), wasm_bindgen::JsValue> {
    Err(wasm_bindgen::JsValue::from_str(
        "requisition-ui only supports the wasm32 target",
    ))
}

#[cfg(not(target_arch = "wasm32"))]
pub fn push_scanned_locator(_: &str) -> Result<(), wasm_bindgen::JsValue> {
    Err(wasm_bindgen::JsValue::from_str(
        "requisition-ui only supports the wasm32 target",
    ))
}
