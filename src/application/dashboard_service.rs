// Dashboard service - Import, polling and display use cases over the series store
use crate::application::debounce::Debouncer;
use crate::application::events::{DashboardEvent, EventChannel};
use crate::application::poller::Poller;
use crate::application::scalar_api::{
    ApiResponse, FileListBody, ImportFileRequest, NewFileBody, ScalarApi, ScalarDataRequest,
};
use crate::application::series_store::{Selection, SharedStore, TagScope};
use crate::application::single_flight::{SingleFlight, Superseded};
use crate::domain::series::{GraphRequest, SeriesDelta, SmoothingConfig};
use crate::infrastructure::host_message::{HostEvent, OutboundEvent, OutboundMessage};
use indexmap::IndexMap;
use serde::Serialize;
use std::convert::Infallible;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// The backend answered `result: false`; the message has already been surfaced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct BackendFailure(pub String);

#[derive(Debug, Clone, Copy)]
pub struct DashboardSettings {
    pub new_file_interval: Duration,
    pub smoothing_debounce: Duration,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            new_file_interval: Duration::from_secs(10),
            smoothing_debounce: Duration::from_millis(500),
        }
    }
}

/// Language and theme last announced by the host window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostContext {
    pub language: String,
    pub is_dark: bool,
    pub base_url: Option<String>,
}

impl Default for HostContext {
    fn default() -> Self {
        Self {
            language: "enUS".to_string(),
            is_dark: true,
            base_url: None,
        }
    }
}

type PollerSlot = Arc<Mutex<Option<Poller>>>;

#[derive(Clone)]
pub struct DashboardService {
    api: Arc<dyn ScalarApi>,
    store: SharedStore,
    events: EventChannel,
    chart_flight: SingleFlight,
    chart_poller: PollerSlot,
    new_file_poller: PollerSlot,
    smoothing_debounce: Arc<Debouncer>,
    host: Arc<Mutex<HostContext>>,
    settings: DashboardSettings,
}

fn lock_slot(slot: &PollerSlot) -> MutexGuard<'_, Option<Poller>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stops whatever runs in `slot` before starting and installing its successor.
fn replace_poller(slot: &PollerSlot, start: impl FnOnce() -> Option<Poller>) {
    let mut current = lock_slot(slot);
    if let Some(previous) = current.take() {
        previous.clear();
    }
    *current = start();
}

impl DashboardService {
    pub fn new(
        api: Arc<dyn ScalarApi>,
        store: SharedStore,
        events: EventChannel,
        settings: DashboardSettings,
    ) -> Self {
        let mut host = HostContext::default();
        host.base_url = api.base_url();
        Self {
            api,
            store,
            events,
            chart_flight: SingleFlight::new("chart data"),
            chart_poller: Arc::new(Mutex::new(None)),
            new_file_poller: Arc::new(Mutex::new(None)),
            smoothing_debounce: Arc::new(Debouncer::new(settings.smoothing_debounce)),
            host: Arc::new(Mutex::new(host)),
            settings,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn host_context(&self) -> HostContext {
        let mut context = self
            .host
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        context.base_url = self.api.base_url();
        context
    }

    /// Replaces everything with the files of `path`.
    pub async fn import_project(&self, path: &str) -> Result<(), BackendFailure> {
        tracing::info!("Importing project {}", path);
        self.events.emit(DashboardEvent::Loading(true));
        let request = ImportFileRequest {
            append: false,
            path_list: vec![path.to_string()],
        };
        let response = ApiResponse::from_outcome(self.api.import_file(&request).await);
        self.events.emit(DashboardEvent::Loading(false));

        let body = self.accept_response(response)?;
        self.start_new_file_polling();
        {
            let mut store = self.store.lock();
            store.clear_file_list();
            store.add_file(&body.data);
        }
        self.reload_chart_data();
        Ok(())
    }

    fn accept_response<T: Default>(&self, response: ApiResponse<T>) -> Result<T, BackendFailure> {
        if !response.result {
            let message = response.message().to_string();
            self.events.notify(message.clone());
            return Err(BackendFailure(message));
        }
        Ok(response.body.unwrap_or_default())
    }

    /// Restarts chart-data polling at the store's current step. Each cycle
    /// asks for the points past the offsets the store holds at that moment.
    pub fn reload_chart_data(&self) {
        let step = Duration::from_secs(self.store.lock().step_secs());
        let api = self.api.clone();
        let store = self.store.clone();
        let flight = self.chart_flight.clone();

        let fetch = move || {
            let api = api.clone();
            let store = store.clone();
            let flight = flight.clone();
            async move {
                let request = { store.lock().get_graph_list() };
                if request.graph_list.is_empty() {
                    return Ok::<_, Superseded>(ApiResponse::success((request, Vec::new())));
                }
                let body = ScalarDataRequest {
                    graph_list: request.graph_list.clone(),
                };
                let response = flight.call(api.get_scalar_data(&body)).await?;
                Ok(response.map(|data| (request, data.data)))
            }
        };

        let store = self.store.clone();
        let on_result = move |(request, deltas): (GraphRequest, Vec<SeriesDelta>)| {
            if !deltas.is_empty() {
                let report = store.lock().add_data(&request, deltas);
                if report.skipped > 0 {
                    tracing::debug!(
                        "Chart poll merged {} deltas, skipped {}",
                        report.applied,
                        report.skipped
                    );
                }
            }
            ControlFlow::Continue(())
        };

        self.chart_flight.cancel();
        let events = self.events.clone();
        replace_poller(&self.chart_poller, || {
            Some(Poller::start("chart data", step, fetch, on_result, events))
        });
    }

    /// Watches for new files until some show up; the queue then waits for
    /// the user to accept or dismiss it.
    pub fn start_new_file_polling(&self) {
        let api = self.api.clone();
        let fetch = move || {
            let api = api.clone();
            async move { Ok::<_, Infallible>(ApiResponse::from_outcome(api.get_add_files().await)) }
        };

        let store = self.store.clone();
        let on_result = move |body: NewFileBody| {
            if body.data.is_empty() {
                return ControlFlow::Continue(());
            }
            tracing::info!("{} directories have new files", body.data.len());
            store.lock().modify_new_file_list(body.data);
            ControlFlow::Break(())
        };

        let interval = self.settings.new_file_interval;
        let events = self.events.clone();
        replace_poller(&self.new_file_poller, || {
            Some(Poller::start("new files", interval, fetch, on_result, events))
        });
    }

    /// Imports the picked files (`dir -> [file]`) next to the current ones.
    /// An empty pick dismisses the queue.
    pub async fn accept_new_files(
        &self,
        selected: IndexMap<String, Vec<String>>,
    ) -> Result<(), BackendFailure> {
        let path_list: Vec<String> = selected
            .iter()
            .flat_map(|(dir, files)| files.iter().map(move |file| format!("{}/{}", dir, file)))
            .collect();

        if !path_list.is_empty() {
            let request = ImportFileRequest {
                append: true,
                path_list,
            };
            let response = ApiResponse::from_outcome(self.api.import_file(&request).await);
            let body = self.accept_response(response)?;
            self.store.lock().add_file(&body.data);
        }

        self.store.lock().modify_new_file_list(Vec::new());
        self.start_new_file_polling();
        Ok(())
    }

    /// Registers any file of the backend's catalogue the store has not seen.
    pub async fn refresh_catalogue(&self) -> Result<(), BackendFailure> {
        let response = ApiResponse::from_outcome(self.api.get_all_graph().await);
        let body: FileListBody = self.accept_response(response)?;
        self.store.lock().add_file(&body.data);
        Ok(())
    }

    pub fn set_step(&self, secs: u64) -> u64 {
        let (step, has_tags) = {
            let mut store = self.store.lock();
            let step = store.modify_step(secs);
            (step, !store.get_tag_list().is_empty())
        };
        if has_tags {
            self.reload_chart_data();
        }
        step
    }

    pub fn set_check(&self, selection: Selection) {
        self.store.lock().modify_check(selection);
        self.reload_chart_data();
    }

    /// Entering aggregation mode starts from the first checked files of the
    /// shown tags.
    pub fn set_tag_polymerize(&self, enabled: bool) {
        {
            let mut store = self.store.lock();
            store.modify_is_tag_polymerize(enabled);
            if enabled {
                let shown = store.show_tag_list().to_vec();
                let defaults = store.aggregation_defaults(&shown);
                store.modify_check(Selection::Aggregate(defaults));
            }
        }
        self.reload_chart_data();
    }

    pub fn set_show_tags(&self, tags: Vec<String>) {
        self.store.lock().modify_show_tag_list(tags);
        self.reload_chart_data();
    }

    /// Applies the latest edit once edits stop for the debounce period.
    /// Every edit restarts the timer; a latest edit without an algorithm
    /// applies nothing.
    pub fn edit_smoothing(&self, scope: TagScope, config: SmoothingConfig) {
        let store = self.store.clone();
        let events = self.events.clone();
        self.smoothing_debounce.call(async move {
            if config.algorithm.is_empty() {
                tracing::debug!("Ignoring smoothing edit without an algorithm");
                return;
            }
            store.lock().modify_smoothing_config(&scope, config);
            events.emit(DashboardEvent::ReloadChartData);
        });
    }

    pub fn stop_polling(&self) {
        replace_poller(&self.chart_poller, || None);
        replace_poller(&self.new_file_poller, || None);
        self.chart_flight.cancel();
        self.smoothing_debounce.cancel();
    }

    /// Back to the empty initial state with nothing polling.
    pub fn reset(&self) {
        self.stop_polling();
        self.store.lock().clear_file_list();
    }

    pub fn mounted(&self) -> OutboundMessage {
        OutboundMessage::new(OutboundEvent::PluginMounted)
    }

    /// Applies a host event and returns what should be posted back.
    pub fn handle_host_event(&self, event: HostEvent) -> Vec<OutboundMessage> {
        tracing::debug!("Host event {:?}", event);
        match event {
            HostEvent::WakeupPlugin { url } => {
                self.api.set_base_url(&url);
                vec![
                    OutboundMessage::new(OutboundEvent::GetLanguage),
                    OutboundMessage::new(OutboundEvent::GetTheme),
                ]
            }
            HostEvent::SwitchLanguage { lang } => {
                self.host
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .language = lang;
                Vec::new()
            }
            HostEvent::SetTheme { is_dark } => {
                self.host
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_dark = is_dark;
                Vec::new()
            }
            HostEvent::RemoteImport { project_name } => {
                self.events.emit(DashboardEvent::ImportFile(project_name));
                Vec::new()
            }
            HostEvent::RemoteRemove | HostEvent::RemoteReset => {
                self.reset();
                self.events.emit(DashboardEvent::FilesRemoved);
                Vec::new()
            }
        }
    }

    /// Subscribes before spawning so nothing emitted after this call is missed.
    pub fn spawn_event_loop(&self) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        let service = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(DashboardEvent::ReloadChartData) => service.reload_chart_data(),
                    Ok(DashboardEvent::ImportFile(path)) => {
                        if let Err(e) = service.import_project(&path).await {
                            tracing::warn!("Import of {} failed: {}", path, e);
                        }
                    }
                    Ok(DashboardEvent::FilesRemoved) => service.stop_polling(),
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Dashboard event loop lagged by {} events", n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
