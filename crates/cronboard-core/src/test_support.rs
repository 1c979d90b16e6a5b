//! In-memory plugin-runtime backend for tests
//!
//! Serves the console's HTTP contract on an ephemeral localhost port.
//! Knobs on [`MockState`] simulate a slow probe, ETag-guarded config
//! writes and failing endpoints.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Multipart, Path as UrlPath, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::config::ConsoleConfig;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";

#[derive(Debug, Default, Clone)]
pub struct Counters {
    pub status_probes: usize,
    pub logouts: usize,
    pub enables: usize,
    pub runs: usize,
    pub adds: usize,
    pub uploads: usize,
    pub updates: usize,
    pub deletes: usize,
    pub validations: usize,
    pub config_reads: usize,
    pub config_writes: usize,
}

#[derive(Debug)]
pub struct MockState {
    pub tokens: HashSet<String>,
    next_token: u64,
    /// Plugin records keyed by name, in wire shape
    pub plugins: BTreeMap<String, Value>,
    /// The aggregate plugin config document
    pub aggregate: Value,
    pub config_version: u64,
    pub emit_etag: bool,
    pub system: Value,
    pub status_delay: Option<Duration>,
    pub fail_list: bool,
    /// Config changes applied by "another operator" right before the next PUT lands
    pub concurrent_edit: Option<(String, Value)>,
    /// Field change (plugin, field, value) applied right after the next single-plugin read
    pub edit_after_read: Option<(String, String, Value)>,
    pub last_upload: Option<(String, Vec<u8>, BTreeMap<String, String>)>,
    pub counters: Counters,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            tokens: HashSet::new(),
            next_token: 1,
            plugins: BTreeMap::new(),
            aggregate: json!({ "plugins": {} }),
            config_version: 1,
            emit_etag: false,
            system: json!({
                "version": "1.0.0",
                "storage_type": "local",
                "env_vars": { "TZ": "Asia/Shanghai" }
            }),
            status_delay: None,
            fail_list: false,
            concurrent_edit: None,
            edit_after_read: None,
            last_upload: None,
            counters: Counters::default(),
        }
    }
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Shared,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock addr");
        let app = router().with_state(state.clone());
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Console config pointed at this backend with the token file under `dir`
    pub fn config(&self, dir: &Path) -> ConsoleConfig {
        ConsoleConfig {
            api_url: self.url(),
            request_timeout_secs: 5,
            validate_timeout_ms: 2_000,
            token_path: Some(dir.join("session.json")),
            ..Default::default()
        }
    }

    /// Mint a token the backend will accept
    pub fn issue_token(&self) -> String {
        let mut state = self.state.lock();
        issue(&mut state)
    }

    pub fn seed_plugin(&self, name: &str, enabled: bool) {
        let record = json!({
            "name": name,
            "description": format!("{} plugin", name),
            "enabled": enabled,
            "status": "idle",
            "schedule": "0 */6 * * *",
            "parameters": { "limit": 10 },
            "module_path": format!("custom.{}", name),
            "function_name": "entry",
        });
        self.state.lock().plugins.insert(name.to_string(), record);
    }

    pub fn counters(&self) -> Counters {
        self.state.lock().counters.clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router() -> Router<Shared> {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/status", get(status))
        .route("/api/logs", get(logs))
        .route("/api/plugins", get(list_plugins))
        .route("/api/plugins/add", post(add_plugin))
        .route("/api/plugins/upload", post(upload_plugin))
        .route("/api/plugins/:name", get(get_plugin).put(update_plugin))
        .route("/api/plugins/:name/status", get(get_plugin))
        .route("/api/plugins/:name/enable", post(enable_plugin))
        .route("/api/plugins/:name/disable", post(disable_plugin))
        .route("/api/plugins/:name/run", post(run_plugin))
        .route("/api/plugins/:name/validate", post(validate_plugin_config))
        .route("/api/plugins/:name/delete", delete(delete_plugin))
        .route(
            "/api/config/plugin",
            get(get_plugin_config).put(put_plugin_config),
        )
        .route(
            "/api/config/system",
            get(get_system_config).put(put_system_config),
        )
        .route("/api/config/system/validate", post(validate_system_config))
}

fn issue(state: &mut MockState) -> String {
    let token = format!("token-{}", state.next_token);
    state.next_token += 1;
    state.tokens.insert(token.clone());
    token
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn ok(body: Value) -> Response {
    reply(StatusCode::OK, body)
}

fn fail(status: StatusCode, error: &str) -> Response {
    reply(status, json!({ "success": false, "error": error }))
}

fn authorize(state: &MockState, headers: &HeaderMap) -> Result<(), Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some(token) if state.tokens.contains(token) => Ok(()),
        Some(_) => Err(fail(StatusCode::UNAUTHORIZED, "Session expired or invalid")),
        None => Err(fail(
            StatusCode::UNAUTHORIZED,
            "Missing or invalid authorization header",
        )),
    }
}

macro_rules! guard {
    ($state:expr, $headers:expr) => {
        if let Err(resp) = authorize(&$state, &$headers) {
            return resp;
        }
    };
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let username = body.get("username").and_then(Value::as_str);
    let password = body.get("password").and_then(Value::as_str);
    if username == Some(ADMIN_USER) && password == Some(ADMIN_PASSWORD) {
        let token = issue(&mut state.lock());
        ok(json!({ "success": true, "token": token, "message": "Login successful" }))
    } else {
        fail(StatusCode::UNAUTHORIZED, "Invalid credentials")
    }
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock();
    state.counters.logouts += 1;
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        state.tokens.remove(token);
    }
    ok(json!({ "success": true, "message": "Logout successful" }))
}

async fn status(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let delay = {
        let mut state = state.lock();
        state.counters.status_probes += 1;
        state.status_delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let state = state.lock();
    guard!(state, headers);
    let active = state
        .plugins
        .values()
        .filter(|p| p["enabled"].as_bool().unwrap_or(false))
        .count();
    ok(json!({
        "success": true,
        "data": {
            "total_plugins": state.plugins.len(),
            "active_plugins": active,
            "running_tasks": 0,
            "system_uptime": "0h 5m 0s",
            "last_update": "2026-10-16T09:00:00",
        }
    }))
}

async fn logs(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = state.lock();
    guard!(state, headers);
    ok(json!({
        "success": true,
        "data": [
            { "timestamp": "2026-10-16T09:00:00", "level": "INFO", "message": "system started" },
            { "timestamp": "2026-10-16T09:00:01", "level": "INFO", "message": "plugin manager ready" },
        ]
    }))
}

async fn list_plugins(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = state.lock();
    guard!(state, headers);
    if state.fail_list {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "plugin registry unavailable");
    }
    let plugins: Vec<Value> = state.plugins.values().cloned().collect();
    ok(json!({ "success": true, "data": plugins }))
}

fn definition_record(name: &str, body: &Value) -> Value {
    json!({
        "name": name,
        "description": body.get("description").cloned().unwrap_or(json!(format!("{} plugin", name))),
        "enabled": body.get("enabled").cloned().unwrap_or(json!(true)),
        "status": "idle",
        "schedule": body.get("schedule").cloned().unwrap_or(json!("")),
        "parameters": body.get("parameters").cloned().unwrap_or(json!({})),
        "module_path": body.get("module_path").cloned().unwrap_or(json!(format!("subscribe.scripts.{}", name))),
        "function_name": body.get("function_name").cloned().unwrap_or(json!("main")),
        "timeout": body.get("timeout").cloned().unwrap_or(json!(300)),
        "max_retries": body.get("max_retries").cloned().unwrap_or(json!(3)),
    })
}

async fn add_plugin(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock();
    guard!(state, headers);
    state.counters.adds += 1;
    let Some(name) = body.get("name").and_then(Value::as_str).map(str::to_string) else {
        return fail(StatusCode::BAD_REQUEST, "name is required");
    };
    if state.plugins.contains_key(&name) {
        return fail(StatusCode::CONFLICT, &format!("plugin {} already exists", name));
    }
    let record = definition_record(&name, &body);
    state.plugins.insert(name.clone(), record);
    ok(json!({ "success": true, "message": format!("plugin {} added", name) }))
}

async fn upload_plugin(
    State(state): State<Shared>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let authorized = authorize(&state.lock(), &headers);
    if let Err(resp) = authorized {
        return resp;
    }

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut fields = BTreeMap::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().unwrap_or_default().to_string();
        if field_name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            file = Some((file_name, bytes));
        } else {
            let text = field.text().await.unwrap_or_default();
            fields.insert(field_name, text);
        }
    }

    let mut state = state.lock();
    state.counters.uploads += 1;
    let Some((file_name, bytes)) = file else {
        return fail(StatusCode::BAD_REQUEST, "no file uploaded");
    };
    let stem = file_name.trim_end_matches(".py").to_string();
    let name = fields.get("name").cloned().unwrap_or(stem);
    if state.plugins.contains_key(&name) {
        return fail(StatusCode::CONFLICT, &format!("plugin {} already exists", name));
    }
    let mut body = json!({});
    for (key, value) in &fields {
        let parsed = match key.as_str() {
            "enabled" => json!(value == "true"),
            "parameters" => serde_json::from_str(value).unwrap_or(json!({})),
            "timeout" | "max_retries" => value.parse::<u64>().map(|n| json!(n)).unwrap_or(Value::Null),
            _ => json!(value),
        };
        body[key.as_str()] = parsed;
    }
    let record = definition_record(&name, &body);
    state.plugins.insert(name.clone(), record);
    state.last_upload = Some((file_name, bytes, fields));
    ok(json!({ "success": true, "message": format!("plugin {} uploaded", name) }))
}

async fn get_plugin(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(name): UrlPath<String>,
) -> Response {
    let mut state = state.lock();
    guard!(state, headers);
    let Some(record) = state.plugins.get(&name).cloned() else {
        return fail(StatusCode::NOT_FOUND, "plugin not found");
    };
    if let Some((plugin, field, value)) = state.edit_after_read.take() {
        if let Some(target) = state.plugins.get_mut(&plugin) {
            target[field.as_str()] = value;
        }
    }
    ok(json!({ "success": true, "data": record }))
}

async fn update_plugin(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(name): UrlPath<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock();
    guard!(state, headers);
    state.counters.updates += 1;
    let Some(record) = state.plugins.get_mut(&name) else {
        return fail(StatusCode::NOT_FOUND, "plugin not found");
    };
    if let Some(fields) = body.as_object() {
        for (key, value) in fields {
            if key != "name" {
                record[key.as_str()] = value.clone();
            }
        }
    }
    ok(json!({ "success": true, "message": format!("plugin {} updated", name) }))
}

fn set_enabled(state: Shared, headers: HeaderMap, name: String, enabled: bool) -> Response {
    let mut state = state.lock();
    guard!(state, headers);
    state.counters.enables += 1;
    match state.plugins.get_mut(&name) {
        Some(record) => {
            record["enabled"] = json!(enabled);
            ok(json!({ "success": true }))
        }
        None => fail(StatusCode::BAD_REQUEST, "failed to toggle plugin"),
    }
}

async fn enable_plugin(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(name): UrlPath<String>,
) -> Response {
    set_enabled(state, headers, name, true)
}

async fn disable_plugin(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(name): UrlPath<String>,
) -> Response {
    set_enabled(state, headers, name, false)
}

async fn run_plugin(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(name): UrlPath<String>,
) -> Response {
    let mut state = state.lock();
    guard!(state, headers);
    state.counters.runs += 1;
    match state.plugins.get(&name) {
        Some(record) if record["enabled"].as_bool() == Some(true) => {
            ok(json!({ "success": true, "message": format!("plugin {} started", name) }))
        }
        Some(_) => fail(StatusCode::BAD_REQUEST, "plugin is disabled"),
        None => fail(StatusCode::NOT_FOUND, "plugin not found"),
    }
}

async fn validate_plugin_config(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(_name): UrlPath<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock();
    guard!(state, headers);
    state.counters.validations += 1;
    match body.get("timeout") {
        Some(t) if t.as_f64().map_or(true, |n| n < 1.0) => ok(json!({
            "success": false,
            "message": "config validation failed: timeout must be at least 1"
        })),
        _ => ok(json!({ "success": true, "message": "config is valid" })),
    }
}

async fn delete_plugin(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(name): UrlPath<String>,
) -> Response {
    let mut state = state.lock();
    guard!(state, headers);
    state.counters.deletes += 1;
    match state.plugins.remove(&name) {
        Some(_) => ok(json!({ "success": true, "message": format!("plugin {} deleted", name) })),
        None => fail(StatusCode::NOT_FOUND, "plugin not found"),
    }
}

fn etag(version: u64) -> String {
    format!("\"v{}\"", version)
}

async fn get_plugin_config(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock();
    guard!(state, headers);
    state.counters.config_reads += 1;
    let mut resp = ok(json!({ "success": true, "data": state.aggregate }));
    if state.emit_etag {
        if let Ok(value) = etag(state.config_version).parse() {
            resp.headers_mut().insert(header::ETAG, value);
        }
    }
    resp
}

async fn put_plugin_config(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock();
    guard!(state, headers);

    if let Some((name, config)) = state.concurrent_edit.take() {
        state.aggregate["plugins"][name.as_str()] = config;
        state.config_version += 1;
    }

    if let Some(expected) = headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok()) {
        if expected != etag(state.config_version) {
            return fail(
                StatusCode::PRECONDITION_FAILED,
                "plugin config changed since it was read",
            );
        }
    }

    state.counters.config_writes += 1;
    state.aggregate = body;
    state.config_version += 1;
    ok(json!({ "success": true, "message": "plugin config updated" }))
}

async fn get_system_config(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = state.lock();
    guard!(state, headers);
    ok(json!({ "success": true, "data": state.system }))
}

async fn put_system_config(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock();
    guard!(state, headers);
    if let Some(env_vars) = body.get("env_vars").and_then(Value::as_object) {
        for (key, value) in env_vars {
            state.system["env_vars"][key.as_str()] = value.clone();
        }
    }
    ok(json!({ "success": true, "message": "system config updated" }))
}

async fn validate_system_config(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let state = state.lock();
    guard!(state, headers);
    match body.get("api_port").and_then(Value::as_u64) {
        Some(port) if port == 0 || port > 65_535 => ok(json!({
            "success": false,
            "message": "config validation failed: api_port out of range"
        })),
        _ => ok(json!({ "success": true, "message": "config is valid" })),
    }
}
