use std::time::Duration;

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::Redirect,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use tokio::net::TcpListener;

/// Body served by `GET /`.
pub const HELLO_BODY: &str = "Hello World!";

/// Body served with every status produced by `GET /status/{code}`.
pub const STATUS_BODY: &str = "server error";

/// How long `GET /slow` waits before answering.
pub const SLOW_RESPONSE_DELAY: Duration = Duration::from_secs(10);

pub fn app() -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/redirect", get(redirect))
        .route("/echo", post(echo).put(echo).patch(echo))
        .route("/records/{id}", delete(delete_record))
        .route("/headers", get(headers))
        .route("/status/{code}", get(status))
        .route("/slow", get(slow))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Serve the same routes on a UNIX domain socket.
#[cfg(unix)]
pub async fn run_unix(listener: tokio::net::UnixListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn hello() -> &'static str {
    HELLO_BODY
}

async fn redirect() -> Redirect {
    Redirect::temporary("/")
}

async fn echo(body: String) -> String {
    body
}

async fn delete_record(Path(id): Path<String>) -> String {
    id
}

/// Reflect the request headers as a JSON object. Repeated headers are joined
/// with `", "` in arrival order.
async fn headers(headers: HeaderMap) -> Json<Value> {
    let mut map = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_string(), Value::String(joined));
    }
    Json(Value::Object(map))
}

async fn status(Path(code): Path<u16>) -> (StatusCode, &'static str) {
    let code = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, STATUS_BODY)
}

async fn slow() -> &'static str {
    tokio::time::sleep(SLOW_RESPONSE_DELAY).await;
    "too late"
}
