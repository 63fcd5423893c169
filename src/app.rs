#![cfg(feature = "web")]

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::services::ServeDir;

use crate::card::{CardLine, card_lines};
use crate::config::{AppConfig, ColumnMapping};
use crate::downloader::{collect_headers, to_csv, to_xlsx};
use crate::loader::read_sheet;
use crate::login::{self, AdminCredentials, Auth, AuthError, SessionStore};
use crate::merge::merge_grades;
use crate::record::{NodeId, Record, Sheet};
use crate::storage::{Dataset, DatasetKind, DatasetStore, NewDataset, StorageError};
use crate::tree::{ALL_DIRECTORATES, DirectorateRoot, OrgTree};
use crate::validator::{validate_grades, validate_organogram};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Errors that stop the server from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Request failures, rendered as `{success: false, message}` JSON
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Não autorizado")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Validation { message: String, errors: Vec<String> },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Storage(StorageError::NotFound(_) | StorageError::VersionUnavailable { .. }) => {
                StatusCode::NOT_FOUND
            }
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match self {
            AppError::Validation { message, errors } => json!({
                "success": false,
                "message": message,
                "errors": errors,
            }),
            other if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!("{}", other);
                json!({ "success": false, "message": "Erro ao processar a requisição" })
            }
            other => json!({ "success": false, "message": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Merged and indexed chart data for one pair of dataset versions
pub struct ChartSnapshot {
    /// (organogram, grades) versions the snapshot was built from
    pub versions: (u64, u64),
    pub tree: OrgTree,
}

impl ChartSnapshot {
    fn build(org: &Dataset, grades: &Dataset, mapping: &ColumnMapping) -> Result<Self, AppError> {
        let org_sheet = parse_stored(org, DatasetKind::Org)?;
        let grade_sheet = parse_stored(grades, DatasetKind::Grades)?;
        let merged = merge_grades(org_sheet.rows, &grade_sheet.rows, mapping);
        Ok(Self {
            versions: (org.source.version(), grades.source.version()),
            tree: OrgTree::build(merged, mapping),
        })
    }
}

fn parse_stored(dataset: &Dataset, kind: DatasetKind) -> Result<Sheet, AppError> {
    read_sheet(&dataset.bytes, &dataset.source.file_name())
        .map_err(|e| AppError::Internal(format!("stored {} sheet is unreadable: {}", kind, e)))
}

pub struct AppState {
    pub config: AppConfig,
    pub store: DatasetStore,
    pub auth: Auth,
    chart: RwLock<Option<Arc<ChartSnapshot>>>,
}

impl FromRef<Arc<AppState>> for Auth {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.auth.clone()
    }
}

impl AppState {
    /// Hash the admin secret and open the dataset store
    pub async fn new(config: AppConfig) -> Result<Self, StartupError> {
        let credentials = AdminCredentials::from_secret(&config.admin_secret)?;
        let ttl = Duration::from_secs(config.session_ttl_hours.saturating_mul(60 * 60));
        let sessions = SessionStore::new(ttl);
        let store = DatasetStore::open(&config.data_dir, &config.bundled_data_dir).await?;

        Ok(Self {
            config,
            store,
            auth: Auth::new(credentials, sessions),
            chart: RwLock::new(None),
        })
    }

    /// Chart data for the current datasets, rebuilt when a version moved
    pub async fn chart(&self) -> Result<Arc<ChartSnapshot>, AppError> {
        let versions = self.store.versions().await;
        if let Some(snapshot) = self.chart.read().await.as_ref() {
            if snapshot.versions == versions {
                return Ok(snapshot.clone());
            }
        }

        let (org, grades) = self.store.fetch_pair().await?;
        let snapshot = Arc::new(ChartSnapshot::build(&org, &grades, &self.config.mapping)?);
        debug!(
            "rebuilt chart snapshot for versions {:?} ({} employees)",
            snapshot.versions,
            snapshot.tree.len()
        );
        *self.chart.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes.saturating_mul(2).saturating_add(1024 * 1024);

    let admin = Router::new()
        .route("/admin/dashboard", get(serve_dashboard))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            login::require_admin,
        ));

    Router::new()
        .route("/", get(serve_chart_page))
        .route("/admin/login", get(login::serve_login_page))
        .route("/api/login", post(login::handle_login))
        .route("/api/logout", get(login::handle_logout))
        .route("/api/upload", post(handle_upload))
        .route("/api/data-urls", get(get_data_urls))
        .route("/data/:kind", get(get_dataset))
        .route("/api/chart", get(get_chart))
        .route("/api/employees/:id", get(get_employee))
        .route("/api/export", get(export_chart))
        .route("/health", get(health))
        .merge(admin)
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Start the server and block until it stops
pub async fn run(config: AppConfig) -> Result<(), StartupError> {
    let addr = config.addr;
    let state = Arc::new(AppState::new(config).await?);
    let (org_version, grades_version) = state.store.versions().await;
    info!(
        "datasets at versions org={} grades={} (0 = bundled default)",
        org_version, grades_version
    );

    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await.map_err(StartupError::Serve)?;

    Ok(())
}

async fn serve_chart_page() -> Html<&'static str> {
    Html(include_str!("./static/index.html"))
}

async fn serve_dashboard() -> Html<&'static str> {
    Html(include_str!("./static/dashboard.html"))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    org_url: String,
    grades_url: String,
    org_version: u64,
    grades_version: u64,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("O envio excede o tamanho máximo permitido.".to_string())
    } else {
        AppError::BadRequest(format!("Requisição inválida: {}", e.body_text()))
    }
}

/// Replace both datasets
///
/// Both files are parsed and validated before anything is stored, so a
/// rejected upload leaves the current datasets in place.
async fn handle_upload(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    if !state.auth.sessions.is_authenticated(&jar) {
        warn!("upload rejected: no valid session");
        return Err(AppError::Unauthorized);
    }

    let limit = state.config.max_upload_bytes;
    let mut org: Option<NewDataset> = None;
    let mut grades: Option<NewDataset> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let kind = match field.name() {
            Some("organogramData") => DatasetKind::Org,
            Some("gradesData") => DatasetKind::Grades,
            _ => continue,
        };
        let original_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| kind.bundled_file_name().to_string());
        let bytes = field.bytes().await.map_err(multipart_error)?;

        if bytes.len() > limit {
            warn!(
                "upload rejected: {} is {} bytes (limit {})",
                original_name,
                bytes.len(),
                limit
            );
            return Err(AppError::PayloadTooLarge(format!(
                "O arquivo \"{}\" excede o limite de {:.1} MB.",
                original_name,
                limit as f64 / 1_000_000.0
            )));
        }
        if bytes.is_empty() {
            continue;
        }

        let upload = NewDataset {
            original_name,
            bytes: bytes.to_vec(),
        };
        match kind {
            DatasetKind::Org => org = Some(upload),
            DatasetKind::Grades => grades = Some(upload),
        }
    }

    let (Some(org), Some(grades)) = (org, grades) else {
        return Err(AppError::BadRequest("Arquivos ausentes".to_string()));
    };

    let mapping = &state.config.mapping;
    let org_sheet = parse_upload(&org)?;
    let grade_sheet = parse_upload(&grades)?;

    let mut errors = validate_organogram(&org_sheet.rows, mapping).errors;
    errors.extend(
        validate_grades(&grade_sheet.rows, mapping)
            .errors
            .into_iter()
            .map(|e| format!("[Grades] {}", e)),
    );
    if !errors.is_empty() {
        warn!("upload rejected with {} validation errors", errors.len());
        return Err(AppError::Validation {
            message: "As planilhas enviadas contêm erros.".to_string(),
            errors,
        });
    }

    let (org, grades) = state.store.put_pair(org, grades).await?;
    info!(
        "datasets replaced: org v{} ({} rows), grades v{} ({} rows)",
        org.version,
        org_sheet.rows.len(),
        grades.version,
        grade_sheet.rows.len()
    );

    Ok(Json(UploadResponse {
        success: true,
        org_url: org.url(),
        grades_url: grades.url(),
        org_version: org.version,
        grades_version: grades.version,
    }))
}

fn parse_upload(upload: &NewDataset) -> Result<Sheet, AppError> {
    read_sheet(&upload.bytes, &upload.original_name).map_err(|e| {
        warn!("upload rejected: {} could not be read: {}", upload.original_name, e);
        AppError::BadRequest(format!(
            "Não foi possível ler o arquivo \"{}\": {}",
            upload.original_name, e
        ))
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataUrls {
    org_data_url: Option<String>,
    grades_data_url: Option<String>,
}

async fn get_data_urls(State(state): State<Arc<AppState>>) -> Json<DataUrls> {
    let (org, grades) = tokio::join!(
        state.store.current(DatasetKind::Org),
        state.store.current(DatasetKind::Grades),
    );
    Json(DataUrls {
        org_data_url: org.map(|h| h.url()),
        grades_data_url: grades.map(|h| h.url()),
    })
}

#[derive(Debug, Deserialize)]
struct VersionQuery {
    version: Option<u64>,
}

async fn get_dataset(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Response, AppError> {
    let kind = DatasetKind::parse(&kind)
        .ok_or_else(|| AppError::NotFound(format!("Conjunto de dados desconhecido: {}", kind)))?;
    let dataset = state.store.fetch(kind, query.version).await?;

    let file_name = dataset.source.file_name();
    let content_type = if file_name.to_lowercase().ends_with(".csv") {
        "text/csv; charset=utf-8"
    } else {
        XLSX_CONTENT_TYPE
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, attachment(&file_name)),
        ],
        dataset.bytes,
    )
        .into_response())
}

fn attachment(file_name: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    )
}

#[derive(Debug, Deserialize)]
struct ChartQuery {
    directorate: Option<String>,
}

impl ChartQuery {
    /// Directorate to filter on, `None` meaning everybody
    fn filter(&self) -> Option<&str> {
        match self.directorate.as_deref().map(str::trim) {
            None | Some("") | Some(ALL_DIRECTORATES) => None,
            Some(d) => Some(d),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChartResponse<'a> {
    active_filter: &'a str,
    directorates: Vec<String>,
    nodes: Vec<Record>,
    warning: Option<String>,
    mapping: &'a ColumnMapping,
}

fn filter_warning(directorate: &str, outcome: &DirectorateRoot) -> String {
    match outcome {
        DirectorateRoot::NoMembers => format!(
            "Nenhum colaborador encontrado na diretoria \"{}\".",
            directorate
        ),
        DirectorateRoot::Ambiguous(count) => format!(
            "A diretoria \"{}\" tem {} possíveis gestores principais; o organograma filtrado não pode ser montado.",
            directorate, count
        ),
        DirectorateRoot::Found(_) | DirectorateRoot::NoCandidate => format!(
            "Não foi possível identificar o gestor principal da diretoria \"{}\".",
            directorate
        ),
    }
}

/// Nodes of a chart view, with a warning when a filter cannot be applied
fn chart_view(tree: &OrgTree, filter: Option<&str>) -> (Vec<Record>, Option<String>) {
    let Some(directorate) = filter else {
        return (tree.records(), None);
    };
    match tree.directorate_view(directorate) {
        Ok(nodes) => (nodes, None),
        Err(outcome) => {
            warn!(
                "could not determine a unique root for directorate {:?} ({:?})",
                directorate, outcome
            );
            (Vec::new(), Some(filter_warning(directorate, &outcome)))
        }
    }
}

async fn get_chart(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChartQuery>,
) -> Result<Response, AppError> {
    let snapshot = state.chart().await?;
    let tree = &snapshot.tree;
    let filter = query.filter();

    let mut directorates = vec![ALL_DIRECTORATES.to_string()];
    directorates.extend(tree.directorates());

    let (nodes, warning) = chart_view(tree, filter);
    let response = ChartResponse {
        active_filter: filter.unwrap_or(ALL_DIRECTORATES),
        directorates,
        nodes,
        warning,
        mapping: &state.config.mapping,
    };
    Ok(Json(response).into_response())
}

async fn get_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CardLine>>, AppError> {
    let snapshot = state.chart().await?;
    let record = snapshot
        .tree
        .get(&NodeId::new(id.trim()))
        .ok_or_else(|| AppError::NotFound(format!("Colaborador \"{}\" não encontrado.", id)))?;
    Ok(Json(card_lines(record, &state.config.mapping)))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    directorate: Option<String>,
    format: Option<String>,
}

/// Download the current chart view as a spreadsheet
async fn export_chart(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let chart_query = ChartQuery {
        directorate: query.directorate,
    };
    let filter = chart_query.filter();

    let snapshot = state.chart().await?;
    let records = snapshot.tree.view(filter);

    let mapping = &state.config.mapping;
    let preferred = [
        mapping.id.as_str(),
        mapping.parent.as_str(),
        mapping.display_name.as_str(),
        mapping.title.as_str(),
        mapping.directorate.as_str(),
    ];
    let headers = collect_headers(&records, &preferred);
    let base_name = format!("organograma-{}", filter.unwrap_or(ALL_DIRECTORATES).to_lowercase());

    let (content_type, file_name, body) = match query.format.as_deref().unwrap_or("xlsx") {
        "csv" => (
            "text/csv; charset=utf-8",
            format!("{}.csv", base_name),
            to_csv(&records, &headers).into_bytes(),
        ),
        "xlsx" => {
            let bytes = to_xlsx(&records, &headers)
                .map_err(|e| AppError::Internal(format!("XLSX export failed: {}", e)))?;
            (XLSX_CONTENT_TYPE, format!("{}.xlsx", base_name), bytes)
        }
        other => {
            return Err(AppError::BadRequest(format!(
                "Formato de exportação não suportado: {}",
                other
            )));
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, attachment(&file_name)),
        ],
        body,
    )
        .into_response())
}
