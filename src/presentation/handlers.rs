// HTTP request handlers
use crate::application::dashboard_service::{BackendFailure, HostContext};
use crate::application::scalar_api::ApiResponse;
use crate::application::series_store::{FileListResult, FileModel, Selection, StoreVersion, TagScope};
use crate::domain::comparison::Comparison;
use crate::domain::series::{NewFileEntry, SmoothingConfig};
use crate::domain::view::{paginate, LenInfo, Page, SeriesView, TableRow, DEFAULT_PAGE_SIZE};
use crate::infrastructure::csv_export::{comparison_csv, export_file_name, table_csv};
use crate::infrastructure::host_message::{parse_host_message, OutboundMessage};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::Stream;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::{wrappers::WatchStream, StreamExt};

/// Failure envelope with an HTTP status.
pub struct HandlerError {
    status: StatusCode,
    message: String,
}

impl From<BackendFailure> for HandlerError {
    fn from(failure: BackendFailure) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: failure.0,
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::failure(self.message))).into_response()
    }
}

/// `a,b` names several tags, `a` a single one.
fn parse_scope(tags: &str) -> TagScope {
    scope_of(
        tags.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Exactly one tag is a single-tag view.
fn scope_of(mut tags: Vec<String>) -> TagScope {
    if tags.len() == 1 {
        TagScope::One(tags.remove(0))
    } else {
        TagScope::Many(tags)
    }
}

#[derive(Deserialize)]
pub struct ScopeQuery {
    #[serde(default)]
    pub tags: String,
}

#[derive(Deserialize)]
pub struct TableQuery {
    #[serde(default)]
    pub tags: String,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    #[serde(default)]
    pub smoothing: bool,
}

#[derive(Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub comparison: bool,
}

#[derive(Deserialize)]
pub struct FilesQuery {
    pub model: Option<FileModel>,
}

#[derive(Deserialize)]
pub struct ImportBody {
    pub path: String,
}

#[derive(Deserialize)]
pub struct AcceptBody {
    #[serde(default)]
    pub selected: IndexMap<String, Vec<String>>,
}

#[derive(Deserialize)]
pub struct ShowTagsBody {
    pub tags: Vec<String>,
}

#[derive(Deserialize, Serialize)]
pub struct StepBody {
    pub step: u64,
}

#[derive(Deserialize)]
pub struct PolymerizeBody {
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct SmoothingBody {
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub config: SmoothingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsResponse {
    pub tags: Vec<String>,
    pub show_tags: Vec<String>,
    pub is_tag_polymerize: bool,
    pub step: u64,
    pub version: StoreVersion,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePage {
    pub columns: Vec<String>,
    pub len: LenInfo,
    pub page: Page<TableRow>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn host_mounted(State(state): State<Arc<AppState>>) -> Json<OutboundMessage> {
    Json(state.dashboard.mounted())
}

/// Raw host window message, either an object or a JSON-encoded string.
pub async fn host_message(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Json<Vec<OutboundMessage>> {
    let replies = parse_host_message(&body)
        .map(|event| state.dashboard.handle_host_event(event))
        .unwrap_or_default();
    Json(replies)
}

pub async fn host_context(State(state): State<Arc<AppState>>) -> Json<HostContext> {
    Json(state.dashboard.host_context())
}

pub async fn import_project(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ImportBody>,
) -> Result<Json<ApiResponse<Vec<String>>>, HandlerError> {
    state.dashboard.import_project(&body.path).await?;
    let tags = state.dashboard.store().lock().get_tag_list();
    Ok(Json(ApiResponse::success(tags)))
}

pub async fn new_files(State(state): State<Arc<AppState>>) -> Json<Vec<NewFileEntry>> {
    Json(state.dashboard.store().lock().new_file_list().to_vec())
}

pub async fn accept_new_files(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AcceptBody>,
) -> Result<StatusCode, HandlerError> {
    state.dashboard.accept_new_files(body.selected).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> Result<StatusCode, HandlerError> {
    state.dashboard.refresh_catalogue().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tags(State(state): State<Arc<AppState>>) -> Json<TagsResponse> {
    let store = state.dashboard.store().lock();
    Json(TagsResponse {
        tags: store.get_tag_list(),
        show_tags: store.show_tag_list().to_vec(),
        is_tag_polymerize: store.is_tag_polymerize(),
        step: store.step_secs(),
        version: store.version(),
    })
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FilesQuery>,
) -> Json<Vec<FileListResult>> {
    let model = query.model.unwrap_or(FileModel::Checked);
    Json(state.dashboard.store().lock().get_file_list_by_model(model))
}

pub async fn set_show_tags(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ShowTagsBody>,
) -> StatusCode {
    state.dashboard.set_show_tags(body.tags);
    StatusCode::NO_CONTENT
}

pub async fn set_step(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StepBody>,
) -> Json<StepBody> {
    let step = state.dashboard.set_step(body.step);
    Json(StepBody { step })
}

pub async fn set_polymerize(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PolymerizeBody>,
) -> StatusCode {
    state.dashboard.set_tag_polymerize(body.enabled);
    StatusCode::NO_CONTENT
}

pub async fn set_check(
    State(state): State<Arc<AppState>>,
    Json(selection): Json<Selection>,
) -> StatusCode {
    state.dashboard.set_check(selection);
    StatusCode::NO_CONTENT
}

/// Applied after the debounce period.
pub async fn edit_smoothing(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SmoothingBody>,
) -> StatusCode {
    let scope = scope_of(body.tags);
    let config = SmoothingConfig::new(body.config.algorithm, body.config.weight);
    state.dashboard.edit_smoothing(scope, config);
    StatusCode::ACCEPTED
}

pub async fn view(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScopeQuery>,
) -> Json<SeriesView> {
    let scope = parse_scope(&query.tags);
    Json(state.dashboard.store().lock().get_data_by_tag(&scope))
}

pub async fn table(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TableQuery>,
) -> Json<TablePage> {
    let scope = parse_scope(&query.tags);
    let view = state.dashboard.store().lock().get_data_by_tag(&scope);
    let table = if query.smoothing {
        view.smoothing_table()
    } else {
        view.table()
    };
    let page = paginate(
        &table.rows,
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    );
    Json(TablePage {
        columns: table.columns,
        len: table.len,
        page,
    })
}

pub async fn comparison(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScopeQuery>,
) -> Json<Option<Comparison>> {
    let scope = parse_scope(&query.tags);
    let view = state.dashboard.store().lock().get_data_by_tag(&scope);
    Json(Comparison::from_view(&view))
}

pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Response {
    let scope = parse_scope(&query.tags);
    let view = state.dashboard.store().lock().get_data_by_tag(&scope);
    let csv = if query.comparison {
        Comparison::from_view(&view).and_then(|c| comparison_csv(&c))
    } else {
        table_csv(&view.table())
    };

    match csv {
        Some(csv) => {
            let disposition = format!(
                "attachment; filename=\"{}\"",
                export_file_name(&scope, query.comparison)
            );
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                csv,
            )
                .into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub async fn notifications(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.notifications.recent())
}

/// Store change counters, pushed whenever any of them moves.
pub async fn store_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.dashboard.store().lock().subscribe();
    let stream = WatchStream::new(rx)
        .map(|version: StoreVersion| Event::default().event("store").json_data(version));
    Sse::new(stream).keep_alive(KeepAlive::default())
}
