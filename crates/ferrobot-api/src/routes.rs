//! Route table and handlers.
//!
//! | Method | Path (under the base path) | Reply |
//! |---|---|---|
//! | GET | `/` | manager document |
//! | GET | `/commands` | manager command names |
//! | GET, POST | `/commands/:command` | command result |
//! | GET | `/events/:event` | SSE stream of manager events |
//! | GET | `/robots` | robots |
//! | GET | `/robots/:robot` | one robot |
//! | GET | `/robots/:robot/commands` | robot command names |
//! | GET, POST | `/robots/:robot/commands/:command` | command result |
//! | GET | `/robots/:robot/events/:event` | SSE stream of robot events |
//! | GET | `/robots/:robot/devices` | devices |
//! | GET | `/robots/:robot/devices/:device` | one device |
//! | GET | `/robots/:robot/devices/:device/commands` | device command names |
//! | GET, POST | `/robots/:robot/devices/:device/commands/:command` | command result |
//! | GET | `/robots/:robot/devices/:device/events/:event` | SSE stream of device events |
//! | GET | `/robots/:robot/connections` | connections |
//! | GET | `/robots/:robot/connections/:connection` | one connection |

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::{self, Next};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use ferrobot_hal::Device;
use ferrobot_kernel::{Manager, Robot};
use ferrobot_middleware::{CommandHandler, EventReceiver};
use ferrobot_types::{FerroError, Params, Value};
use futures_util::Stream;
use futures_util::stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::auth::{BasicAuth, require_basic_auth};
use crate::config::ApiConfig;
use crate::server::{ServerState, ServerStatus};

pub const JSON_UTF8: &str = "application/json; charset=utf-8";
pub const UNKNOWN_COMMAND: &str = "Unknown Command";

#[derive(Clone)]
pub(crate) struct AppState {
    manager: Manager,
    status: Arc<ServerStatus>,
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Serialize `body` with the JSON content type used by every route.
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(CONTENT_TYPE, JSON_UTF8)], bytes).into_response(),
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONTENT_TYPE, JSON_UTF8)],
                r#"{"error":"serialization failed"}"#,
            )
                .into_response()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Command(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Command(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        json_response(status, &serde_json::json!({ "error": self.to_string() }))
    }
}

type ApiResult = Result<Response, ApiError>;

fn ok<T: Serialize + ?Sized>(body: &T) -> ApiResult {
    Ok(json_response(StatusCode::OK, body))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the application: routes, then basic auth, availability, CORS and
/// request tracing from the inside out.
///
/// # Errors
///
/// An invalid CORS method or header name.
pub fn router(
    manager: Manager,
    config: &ApiConfig,
    status: Arc<ServerStatus>,
) -> Result<Router, FerroError> {
    let base = config.normalized_base_path();
    let p = |suffix: &str| format!("{base}{suffix}");

    let mut routes = Router::new()
        .route(&p("/commands"), get(manager_commands))
        .route(&p("/commands/:command"), get(manager_command).post(manager_command))
        .route(&p("/events/:event"), get(manager_events))
        .route(&p("/robots"), get(robots))
        .route(&p("/robots/:robot"), get(robot))
        .route(&p("/robots/:robot/commands"), get(robot_commands))
        .route(
            &p("/robots/:robot/commands/:command"),
            get(robot_command).post(robot_command),
        )
        .route(&p("/robots/:robot/events/:event"), get(robot_events))
        .route(&p("/robots/:robot/devices"), get(devices))
        .route(&p("/robots/:robot/devices/:device"), get(device))
        .route(&p("/robots/:robot/devices/:device/commands"), get(device_commands))
        .route(
            &p("/robots/:robot/devices/:device/commands/:command"),
            get(device_command).post(device_command),
        )
        .route(&p("/robots/:robot/devices/:device/events/:event"), get(device_events))
        .route(&p("/robots/:robot/connections"), get(connections))
        .route(&p("/robots/:robot/connections/:connection"), get(connection))
        .route(&p("/"), get(manager_json));
    if !base.is_empty() {
        routes = routes.route(&base, get(manager_json));
    }

    let mut app = routes
        .fallback(not_found)
        .with_state(AppState {
            manager,
            status: Arc::clone(&status),
        });
    if let Some((username, password)) = config.basic_auth() {
        let auth = Arc::new(BasicAuth::new(username, password));
        app = app.layer(middleware::from_fn_with_state(auth, require_basic_auth));
    }
    app = app.layer(middleware::from_fn_with_state(status, require_running));
    if let Some(cors) = &config.cors {
        app = app.layer(cors.layer()?);
    }
    Ok(app.layer(TraceLayer::new_for_http()))
}

async fn require_running(
    State(status): State<Arc<ServerStatus>>,
    request: Request,
    next: Next,
) -> Response {
    match status.get() {
        ServerState::Running => next.run(request).await,
        state => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &serde_json::json!({ "error": format!("api is {state}") }),
        ),
    }
}

async fn not_found() -> ApiError {
    ApiError::NotFound("no such route".into())
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

fn find_robot(manager: &Manager, name: &str) -> Result<Arc<Robot>, ApiError> {
    manager
        .robot(name)
        .ok_or_else(|| ApiError::NotFound(format!("no robot named '{name}'")))
}

fn find_device(manager: &Manager, robot: &str, name: &str) -> Result<Arc<dyn Device>, ApiError> {
    find_robot(manager, robot)?
        .device(name)
        .ok_or_else(|| ApiError::NotFound(format!("robot '{robot}' has no device named '{name}'")))
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

async fn manager_json(State(state): State<AppState>) -> ApiResult {
    ok(&state.manager.to_json())
}

async fn manager_commands(State(state): State<AppState>) -> ApiResult {
    ok(&state.manager.commander().commands())
}

async fn robots(State(state): State<AppState>) -> ApiResult {
    let robots: Vec<_> = state.manager.robots().iter().map(|r| r.to_json()).collect();
    ok(&robots)
}

async fn robot(State(state): State<AppState>, Path(robot): Path<String>) -> ApiResult {
    ok(&find_robot(&state.manager, &robot)?.to_json())
}

async fn robot_commands(State(state): State<AppState>, Path(robot): Path<String>) -> ApiResult {
    ok(&find_robot(&state.manager, &robot)?.commander().commands())
}

async fn devices(State(state): State<AppState>, Path(robot): Path<String>) -> ApiResult {
    let devices: Vec<_> = find_robot(&state.manager, &robot)?
        .devices()
        .iter()
        .map(|d| d.to_json())
        .collect();
    ok(&devices)
}

async fn device(
    State(state): State<AppState>,
    Path((robot, device)): Path<(String, String)>,
) -> ApiResult {
    ok(&find_device(&state.manager, &robot, &device)?.to_json())
}

async fn device_commands(
    State(state): State<AppState>,
    Path((robot, device)): Path<(String, String)>,
) -> ApiResult {
    ok(&find_device(&state.manager, &robot, &device)?.commander().commands())
}

async fn connections(State(state): State<AppState>, Path(robot): Path<String>) -> ApiResult {
    let connections: Vec<_> = find_robot(&state.manager, &robot)?
        .connections()
        .iter()
        .map(|c| c.to_json())
        .collect();
    ok(&connections)
}

async fn connection(
    State(state): State<AppState>,
    Path((robot, name)): Path<(String, String)>,
) -> ApiResult {
    let connection = find_robot(&state.manager, &robot)?.connection(&name).ok_or_else(|| {
        ApiError::NotFound(format!("robot '{robot}' has no connection named '{name}'"))
    })?;
    ok(&connection.to_json())
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

type QueryParams = Query<BTreeMap<String, String>>;

/// Query string first, then the JSON body on top of it.
fn merge_params(query: BTreeMap<String, String>, body: &[u8]) -> Result<Params, ApiError> {
    let mut params: Params = query.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(params);
    }
    let parsed: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;
    match parsed {
        serde_json::Value::Object(fields) => {
            params.extend(fields.into_iter().map(|(k, v)| (k, Value::from(v))));
            Ok(params)
        }
        serde_json::Value::Null => Ok(params),
        _ => Err(ApiError::BadRequest("command body must be a JSON object".into())),
    }
}

/// Maps and lists pass through; anything else becomes a one-element list.
fn wrap_result(value: Value) -> Value {
    match value {
        Value::Map(_) | Value::List(_) => value,
        scalar => Value::List(vec![scalar]),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "command handler panicked".to_string())
}

fn dispatch(name: &str, handler: Option<CommandHandler>, params: &Params) -> ApiResult {
    let Some(handler) = handler else {
        warn!(command = %name, "unknown command");
        return ok(&[UNKNOWN_COMMAND]);
    };
    match std::panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
        Ok(Ok(value)) => ok(&wrap_result(value)),
        Ok(Err(e)) => {
            warn!(command = %name, error = %e, "command failed");
            Err(ApiError::Command(e.to_string()))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(command = %name, panic = %message, "command handler panicked");
            Err(ApiError::Command(message))
        }
    }
}

async fn manager_command(
    State(state): State<AppState>,
    Path(command): Path<String>,
    Query(query): QueryParams,
    body: Bytes,
) -> ApiResult {
    let params = merge_params(query, &body)?;
    dispatch(&command, state.manager.commander().command(&command), &params)
}

async fn robot_command(
    State(state): State<AppState>,
    Path((robot, command)): Path<(String, String)>,
    Query(query): QueryParams,
    body: Bytes,
) -> ApiResult {
    let found = find_robot(&state.manager, &robot)?;
    let mut params = merge_params(query, &body)?;
    params.insert("robot".into(), Value::String(robot));
    dispatch(&command, found.commander().command(&command), &params)
}

async fn device_command(
    State(state): State<AppState>,
    Path((robot, device, command)): Path<(String, String, String)>,
    Query(query): QueryParams,
    body: Bytes,
) -> ApiResult {
    let found = find_device(&state.manager, &robot, &device)?;
    let params = merge_params(query, &body)?;
    dispatch(&command, found.commander().command(&command), &params)
}

// ---------------------------------------------------------------------------
// Event streams
// ---------------------------------------------------------------------------

/// Ends when the topic closes or the server leaves `Running`.
fn event_stream(
    receiver: EventReceiver,
    status: watch::Receiver<ServerState>,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    stream::unfold((receiver, status), |(mut receiver, mut status)| async move {
        loop {
            let received = tokio::select! {
                _ = status.wait_for(|state| *state != ServerState::Running) => return None,
                received = receiver.recv() => received,
            };
            match received {
                Ok(event) => {
                    let data = serde_json::to_string(&event.payload)
                        .unwrap_or_else(|_| "null".to_string());
                    return Some((Ok(SseEvent::default().data(data)), (receiver, status)));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged; oldest payloads dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

fn sse(
    state: &AppState,
    receiver: Option<EventReceiver>,
    what: impl FnOnce() -> String,
) -> ApiResult {
    let receiver = receiver.ok_or_else(|| ApiError::NotFound(what()))?;
    Ok(Sse::new(event_stream(receiver, state.status.subscribe()))
        .keep_alive(KeepAlive::default())
        .into_response())
}

async fn manager_events(State(state): State<AppState>, Path(event): Path<String>) -> ApiResult {
    sse(&state, state.manager.eventer().subscribe(&event), || {
        format!("manager has no event named '{event}'")
    })
}

async fn robot_events(
    State(state): State<AppState>,
    Path((robot, event)): Path<(String, String)>,
) -> ApiResult {
    let found = find_robot(&state.manager, &robot)?;
    sse(&state, found.eventer().subscribe(&event), || {
        format!("robot '{robot}' has no event named '{event}'")
    })
}

async fn device_events(
    State(state): State<AppState>,
    Path((robot, device, event)): Path<(String, String, String)>,
) -> ApiResult {
    let found = find_device(&state.manager, &robot, &device)?;
    let receiver = found.eventer().and_then(|e| e.subscribe(&event));
    sse(&state, receiver, || format!("device '{device}' has no event named '{event}'"))
}
