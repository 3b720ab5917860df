//! HTTP Server for the geosheet API.
//!
//! Provides REST endpoints for each workflow step. Uploads are multipart
//! forms; responses are JSON.
//!
//! # API Endpoints
//!
//! | Method | Path                  | Description                                  |
//! |--------|-----------------------|----------------------------------------------|
//! | GET    | `/health`             | Health check                                 |
//! | GET    | `/api/sessions`       | List sessions                                |
//! | POST   | `/api/sessions`       | Create a session                             |
//! | GET    | `/api/sessions/{id}`  | Session details                              |
//! | DELETE | `/api/sessions/{id}`  | Drop a session                               |
//! | DELETE | `/api/sessions/{id}/document` | Clear the active document            |
//! | POST   | `/api/combine`        | Combine GeoJSON files (`files`, `session`?)  |
//! | POST   | `/api/export`         | GeoJSON (`file`, `geojson` or `session`) to CSV |
//! | POST   | `/api/import`         | Edited CSV (`file`) to GeoJSON               |
//! | POST   | `/api/join`           | `main` + `addition` joined on `key`          |
//! | GET    | `/api/logs`           | SSE stream for real-time logs                |
//!
//! Request bodies are capped at `GEOSHEET_MAX_UPLOAD_BYTES` (200 MiB by default).

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{delete, get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{collections::HashMap, convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::LOG_BROADCASTER;
use super::types::{error_response, CombineResponse, ExportResponse, ImportResponse, JoinResponse};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::models::FEATURE_ID_COLUMN;
use crate::session::{SessionInfo, SessionStore};
use crate::transform::pipeline::{
    combine_files, export_collection, export_geojson, import_csv, join_files, ExportOptions,
    ImportOptions, JoinOptions, NamedInput,
};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SESSION_IDLE_SECS: i64 = 3600;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Server settings, read from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Sessions unused for longer than this are dropped
    pub session_idle: chrono::Duration,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            session_idle: chrono::Duration::seconds(DEFAULT_SESSION_IDLE_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Read `GEOSHEET_HOST`, `GEOSHEET_PORT`, `GEOSHEET_SESSION_IDLE_SECS` and
    /// `GEOSHEET_MAX_UPLOAD_BYTES`.
    ///
    /// Unset variables keep their defaults; unparseable ones are an error.
    pub fn from_env() -> ServerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ServerResult<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("GEOSHEET_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("GEOSHEET_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ServerError::Config(format!("GEOSHEET_PORT '{}' is not a port", port)))?;
        }
        if let Some(secs) = lookup("GEOSHEET_SESSION_IDLE_SECS") {
            let secs: i64 = secs.trim().parse().map_err(|_| {
                ServerError::Config(format!("GEOSHEET_SESSION_IDLE_SECS '{}' is not a number", secs))
            })?;
            config.session_idle = chrono::Duration::seconds(secs);
        }
        if let Some(bytes) = lookup("GEOSHEET_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = bytes.trim().parse().map_err(|_| {
                ServerError::Config(format!("GEOSHEET_MAX_UPLOAD_BYTES '{}' is not a size", bytes))
            })?;
        }

        Ok(config)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<SessionStore>>,
    pub session_idle: chrono::Duration,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(SessionStore::new())),
            session_idle: config.session_idle,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the router (separate from [`start_server`] so it can be mounted elsewhere)
pub fn router(state: AppState) -> Router {
    // Permissive CORS for local frontends
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/document", delete(clear_session_document))
        .route("/api/combine", post(combine))
        .route("/api/export", post(export))
        .route("/api/import", post(import))
        .route("/api/join", post(join))
        .route("/api/logs", get(sse_logs))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(AppState::new(&config));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    println!("🚀 geosheet server running on http://{}", addr);
    println!("   POST /api/combine  - Combine GeoJSON files");
    println!("   POST /api/export   - GeoJSON to CSV");
    println!("   POST /api/import   - Edited CSV to GeoJSON");
    println!("   POST /api/join     - Join attributes");
    println!("   GET  /api/logs     - SSE log stream");
    println!("   GET  /health       - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "geosheet",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "combine": "POST /api/combine",
            "export": "POST /api/export",
            "import": "POST /api/import",
            "join": "POST /api/join",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip what they missed
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// =============================================================================
// Sessions
// =============================================================================

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    let store = state.sessions.read().await;
    Json(store.list().into_iter().map(|s| s.info()).collect())
}

async fn create_session(State(state): State<AppState>) -> Json<SessionInfo> {
    let mut store = state.sessions.write().await;
    let purged = store.purge_idle(state.session_idle);
    if !purged.is_empty() {
        println!("🧹 Dropped {} idle session(s)", purged.len());
    }

    Json(store.create().info())
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<SessionInfo> {
    let store = state.sessions.read().await;
    store
        .get(&id)
        .map(|s| Json(s.info()))
        .ok_or_else(|| reject(ServerError::SessionNotFound(id)))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let mut store = state.sessions.write().await;
    match store.remove(&id) {
        Some(_) => Ok(Json(json!({ "status": "deleted", "id": id }))),
        None => Err(reject(ServerError::SessionNotFound(id))),
    }
}

async fn clear_session_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionInfo> {
    let mut store = state.sessions.write().await;
    let session = store
        .get_mut(&id)
        .ok_or_else(|| reject(ServerError::SessionNotFound(id.clone())))?;
    session.clear();
    Ok(Json(session.info()))
}

// =============================================================================
// Workflow steps
// =============================================================================

/// Combine uploaded GeoJSON files
async fn combine(State(state): State<AppState>, multipart: Multipart) -> ApiResult<CombineResponse> {
    let form = read_form(multipart).await.map_err(reject)?;
    let files = form.files_named("files");
    if files.is_empty() {
        return Err(reject(ServerError::BadRequest("No files provided".into())));
    }

    print_banner(&format!("🔄 COMBINE: {} file(s)", files.len()));
    let result = combine_files(files).map_err(pipeline_reject)?;

    let session_id = match form.text("session") {
        Some(id) => {
            let mut store = state.sessions.write().await;
            let session = store
                .get_mut(id)
                .ok_or_else(|| reject(ServerError::SessionNotFound(id.to_string())))?;
            session.set_active(result.collection.clone());
            Some(id.to_string())
        }
        None => None,
    };

    let mut response = CombineResponse::from(result);
    response.session_id = session_id;
    Ok(Json(response))
}

/// GeoJSON to CSV, from an upload, pasted text or the session's active document
async fn export(State(state): State<AppState>, multipart: Multipart) -> ApiResult<ExportResponse> {
    let form = read_form(multipart).await.map_err(reject)?;
    export_form(&state, &form).await
}

async fn export_form(state: &AppState, form: &Form) -> ApiResult<ExportResponse> {
    let mut options = ExportOptions::default();
    if let Some(d) = form.delimiter("delimiter").map_err(reject)? {
        options.delimiter = d;
    }
    options.bom = form.flag("bom");

    let result = if let Some(file) = form.file("file") {
        print_banner(&format!("📥 EXPORT: {} ({} bytes)", file.name, file.bytes.len()));
        export_geojson(&file.bytes, &options).map_err(pipeline_reject)?
    } else if let Some(text) = form.text("geojson") {
        print_banner(&format!("📥 EXPORT: pasted GeoJSON ({} bytes)", text.len()));
        export_geojson(text.as_bytes(), &options).map_err(pipeline_reject)?
    } else if let Some(id) = form.text("session") {
        let mut store = state.sessions.write().await;
        let session = store
            .get_mut(id)
            .ok_or_else(|| reject(ServerError::SessionNotFound(id.to_string())))?;
        session.touch();
        let collection = session.active().ok_or_else(|| {
            reject(ServerError::BadRequest(format!("Session {} has no active document", id)))
        })?;
        print_banner(&format!("📥 EXPORT: session {} ({} features)", id, collection.len()));
        export_collection(collection, &options).map_err(pipeline_reject)?
    } else {
        return Err(reject(ServerError::BadRequest("No file, GeoJSON text or session provided".into())));
    };

    Ok(Json(ExportResponse::from(result)))
}

/// Edited CSV to GeoJSON
async fn import(multipart: Multipart) -> ApiResult<ImportResponse> {
    let form = read_form(multipart).await.map_err(reject)?;
    let options = ImportOptions {
        delimiter: form.delimiter("delimiter").map_err(reject)?,
    };
    let file = form
        .file("file")
        .ok_or_else(|| reject(ServerError::BadRequest("No file provided".into())))?;

    print_banner(&format!("📤 IMPORT: {} ({} bytes)", file.name, file.bytes.len()));
    let result = import_csv(&file.bytes, &options).map_err(pipeline_reject)?;

    Ok(Json(ImportResponse::from(result)))
}

/// Join an attribute file onto a main file
async fn join(multipart: Multipart) -> ApiResult<JoinResponse> {
    let form = read_form(multipart).await.map_err(reject)?;
    let (main, addition) = match (form.file("main"), form.file("addition")) {
        (Some(main), Some(addition)) => (main, addition),
        _ => {
            return Err(reject(ServerError::BadRequest(
                "Both 'main' and 'addition' files must be uploaded".into(),
            )))
        }
    };
    let key = form.text("key").unwrap_or(FEATURE_ID_COLUMN);

    let mut options = JoinOptions::default();
    if let Some(d) = form.delimiter("delimiter").map_err(reject)? {
        options.output_delimiter = d;
    }
    options.bom = form.flag("bom");

    print_banner(&format!("🧩 JOIN: {} + {} on '{}'", main.name, addition.name, key));
    let result = join_files(main, addition, key, &options).map_err(pipeline_reject)?;

    Ok(Json(JoinResponse::from(result)))
}

// =============================================================================
// Helpers
// =============================================================================

/// Multipart form contents: uploaded files and plain text fields
#[derive(Debug, Default)]
struct Form {
    files: Vec<(String, NamedInput)>,
    fields: HashMap<String, String>,
}

impl Form {
    fn file(&self, field: &str) -> Option<&NamedInput> {
        self.files.iter().find(|(f, _)| f == field).map(|(_, input)| input)
    }

    fn files_named(&self, field: &str) -> Vec<NamedInput> {
        self.files
            .iter()
            .filter(|(f, _)| f == field)
            .map(|(_, input)| input.clone())
            .collect()
    }

    /// Non-blank text field
    fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    fn flag(&self, field: &str) -> bool {
        matches!(self.text(field), Some("true" | "1" | "on" | "yes"))
    }

    fn delimiter(&self, field: &str) -> ServerResult<Option<char>> {
        match self.fields.get(field).map(String::as_str) {
            None | Some("") => Ok(None),
            Some(raw) => parse_delimiter(raw)
                .map(Some)
                .ok_or_else(|| ServerError::BadRequest(format!("Invalid delimiter '{}'", raw))),
        }
    }
}

/// Accepts a single character, or `tab` / `\t`
pub fn parse_delimiter(raw: &str) -> Option<char> {
    match raw {
        "tab" | "TAB" | "\\t" => Some('\t'),
        _ => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii() => Some(c),
                _ => None,
            }
        }
    }
}

async fn read_form(mut multipart: Multipart) -> ServerResult<Form> {
    let mut form = Form::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(|s| s.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;

        match file_name {
            Some(file_name) => form.files.push((name, NamedInput::new(file_name, bytes.to_vec()))),
            None => {
                form.fields.insert(name, String::from_utf8_lossy(&bytes).into_owned());
            }
        }
    }

    Ok(form)
}

fn status_for(err: &ServerError) -> StatusCode {
    match err {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        ServerError::Pipeline(PipelineError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        ServerError::Pipeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServerError::Config(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ServerError) -> ApiError {
    eprintln!("❌ {}", err);
    (status_for(&err), Json(error_response(&err.to_string())))
}

fn pipeline_reject(err: PipelineError) -> ApiError {
    reject(ServerError::Pipeline(err))
}

fn print_banner(title: &str) {
    println!("\n{}", "=".repeat(70));
    println!("{}", title);
    println!("{}\n", "=".repeat(70));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CodecError, JoinError, JoinSide};

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 3000);
        assert_eq!(config.session_idle, chrono::Duration::seconds(3600));
        assert_eq!(config.max_upload_bytes, 200 * 1024 * 1024);
    }

    #[test]
    fn test_config_from_env_values() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("GEOSHEET_HOST", "127.0.0.1"),
            ("GEOSHEET_PORT", " 8080 "),
            ("GEOSHEET_SESSION_IDLE_SECS", "60"),
            ("GEOSHEET_MAX_UPLOAD_BYTES", "52428800"),
        ]))
        .unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.session_idle, chrono::Duration::seconds(60));
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(AppState::new(&config).max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.with_port(9000).port, 9000);
    }

    #[test]
    fn test_config_rejects_bad_port() {
        let err = ServerConfig::from_lookup(lookup(&[("GEOSHEET_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));

        let err = ServerConfig::from_lookup(lookup(&[("GEOSHEET_MAX_UPLOAD_BYTES", "200MB")])).unwrap_err();
        assert!(err.to_string().contains("GEOSHEET_MAX_UPLOAD_BYTES"));
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(";"), Some(';'));
        assert_eq!(parse_delimiter("tab"), Some('\t'));
        assert_eq!(parse_delimiter("\\t"), Some('\t'));
        assert_eq!(parse_delimiter(";;"), None);
        assert_eq!(parse_delimiter("§"), None);
    }

    #[test]
    fn test_form_fields() {
        let mut form = Form::default();
        form.fields.insert("key".into(), "  code ".into());
        form.fields.insert("bom".into(), "true".into());
        form.fields.insert("delimiter".into(), "|".into());
        form.files.push(("files".into(), NamedInput::new("a.geojson", b"{}".to_vec())));
        form.files.push(("files".into(), NamedInput::new("b.geojson", b"{}".to_vec())));

        assert_eq!(form.text("key"), Some("code"));
        assert_eq!(form.text("session"), None);
        assert!(form.flag("bom"));
        assert_eq!(form.delimiter("delimiter").unwrap(), Some('|'));
        assert_eq!(form.files_named("files").len(), 2);
        assert_eq!(form.file("files").map(|f| f.name.as_str()), Some("a.geojson"));
        assert!(form.file("main").is_none());
    }

    #[test]
    fn test_status_mapping() {
        let join_err = PipelineError::Join(JoinError::KeyNotFound {
            side: JoinSide::Main,
            key: "k".into(),
            available: vec![],
        });
        assert_eq!(status_for(&ServerError::Pipeline(join_err)), StatusCode::UNPROCESSABLE_ENTITY);

        let codec_err = PipelineError::Codec(CodecError::MissingColumn("geometry_json".into()));
        let (status, body) = reject(ServerError::Pipeline(codec_err));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.0["error"].as_str().unwrap().contains("geometry_json"));

        assert_eq!(status_for(&ServerError::SessionNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&ServerError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_session_handler() {
        let state = AppState::new(&ServerConfig::default());
        let Json(info) = create_session(State(state.clone())).await;

        assert!(state.sessions.read().await.get(&info.id).is_some());
        assert_eq!(info.active_features, None);

        let deleted = delete_session(State(state.clone()), Path(info.id.clone())).await;
        assert!(deleted.is_ok());
        let missing = get_session(State(state), Path(info.id)).await;
        assert_eq!(missing.unwrap_err().0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_export_pasted_geojson() {
        let state = AppState::new(&ServerConfig::default());
        let mut form = Form::default();
        form.fields.insert(
            "geojson".into(),
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","id":"a","geometry":null,"properties":{"name":"Kebun"}}]}"#.into(),
        );

        let Json(response) = export_form(&state, &form).await.unwrap();
        assert!(response.csv.contains("Kebun"));

        let empty = export_form(&state, &Form::default()).await.unwrap_err();
        assert_eq!(empty.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_clear_session_document() {
        let state = AppState::new(&ServerConfig::default());
        let id = {
            let mut store = state.sessions.write().await;
            let session = store.create();
            session.set_active(
                serde_json::from_value(json!({ "type": "FeatureCollection", "features": [{ "id": "a" }] }))
                    .unwrap(),
            );
            session.id.clone()
        };

        let Json(info) = clear_session_document(State(state.clone()), Path(id)).await.unwrap();
        assert_eq!(info.active_features, None);

        let missing = clear_session_document(State(state), Path("nope".into())).await;
        assert_eq!(missing.unwrap_err().0, StatusCode::NOT_FOUND);
    }
}
