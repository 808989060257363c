//! Purpose: Provide the HTTP/JSON admin server for topic record inspection and publishing.
//! Exports: `ServeConfig`, `validate_config`, `router`, `serve`.
//! Role: Axum-based server exposing `RecordReader` and `RecordWriter` over HTTP.
//! Invariants: Error envelopes carry a stable `kind`; not-found kinds map to 404.
//! Invariants: Loopback-only unless explicitly allowed.
//! Notes: Reads block for up to the poll timeout and run on the blocking pool.

use std::collections::BTreeMap;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path as AxumPath, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::api::{
    DEFAULT_POLL_TIMEOUT, Error, ErrorKind, Include, ReadRequest, RecordReader, RecordWriter,
    WriteRequest,
};
use crate::broker::HandleFactory;

const API_VERSION: &str = "1";
const DEFAULT_LOG_FILTER: &str = "info";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub allow_non_loopback: bool,
    pub default_limit: usize,
    pub max_limit: usize,
    pub poll_timeout: Duration,
    pub max_body_bytes: u64,
}

impl ServeConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            allow_non_loopback: false,
            default_limit: 20,
            max_limit: 100,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            max_body_bytes: 1024 * 1024,
        }
    }

    /// Request body cap in bytes, checked against the platform's address width.
    pub fn body_limit(&self) -> Result<usize, Error> {
        if self.max_body_bytes == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("--max-body-bytes must be greater than zero")
                .with_hint("Use a positive value like 1048576."));
        }
        usize::try_from(self.max_body_bytes).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("--max-body-bytes exceeds platform limits")
                .with_hint("Use a smaller value that fits in memory.")
                .with_source(err)
        })
    }
}

struct AppState {
    reader: RecordReader,
    writer: RecordWriter,
    default_limit: usize,
    max_limit: usize,
}

pub async fn serve(config: ServeConfig, factory: Arc<dyn HandleFactory>) -> Result<(), Error> {
    init_tracing();

    let app = router(&config, factory)?;
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(io_error("failed to bind server"))?;
    tracing::info!(
        bind = %config.bind,
        default_limit = config.default_limit,
        max_limit = config.max_limit,
        poll_timeout_ms = config.poll_timeout.as_millis() as u64,
        "serving record admin API"
    );

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = stop_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    let drained = tokio::select! {
        result = &mut server => return result.map_err(io_error("server failed")),
        () = shutdown_signal() => {
            tracing::info!("shutting down; draining in-flight requests");
            let _ = stop_tx.send(());
            tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await
        }
    };
    match drained {
        Ok(result) => result.map_err(io_error("server failed")),
        Err(_) => Err(Error::new(ErrorKind::Io)
            .with_message("server shutdown timed out")
            .with_hint("A read may still be waiting on its poll timeout.")),
    }
}

fn io_error(message: &'static str) -> impl FnOnce(std::io::Error) -> Error {
    move |err| Error::new(ErrorKind::Io).with_message(message).with_source(err)
}

/// Builds the admin router after validating `config`.
pub fn router(config: &ServeConfig, factory: Arc<dyn HandleFactory>) -> Result<Router, Error> {
    validate_config(config)?;
    let body_limit = config.body_limit()?;

    let state = Arc::new(AppState {
        reader: RecordReader::new(Arc::clone(&factory)).with_poll_timeout(config.poll_timeout),
        writer: RecordWriter::new(factory),
        default_limit: config.default_limit,
        max_limit: config.max_limit,
    });

    Ok(Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/v1/topics/:topic/records",
            get(consume_records).post(produce_record),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

pub fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !config.bind.ip().is_loopback() && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.default_limit == 0 || config.max_limit == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("record limits must be greater than zero")
            .with_hint("Use positive values like --default-limit 20 --max-limit 100."));
    }

    if config.default_limit > config.max_limit {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--default-limit exceeds --max-limit")
            .with_hint("Raise --max-limit or lower --default-limit."));
    }

    if config.poll_timeout.is_zero() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--poll-timeout-ms must be greater than zero")
            .with_hint("Use a positive value like 2000."));
    }

    config.body_limit().map(|_| ())
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Deserialize)]
struct RecordsQuery {
    partition: Option<i32>,
    offset: Option<i64>,
    timestamp: Option<String>,
    limit: Option<usize>,
    include: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProduceRequest {
    partition: Option<i32>,
    timestamp: Option<String>,
    key: Option<String>,
    value: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
}

async fn healthz() -> Response {
    json_response(StatusCode::OK, json!({ "ok": true }))
}

async fn consume_records(
    State(state): State<Arc<AppState>>,
    AxumPath(topic): AxumPath<String>,
    query: Result<Query<RecordsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return error_response(rejected(rejection.body_text(), &topic)),
    };
    let request = match read_request(&state, topic, query) {
        Ok(request) => request,
        Err(err) => return error_response(err),
    };
    let reader = state.reader.clone();
    let result = tokio::task::spawn_blocking(move || reader.read(&request)).await;
    match result {
        Ok(Ok(page)) => json_response(StatusCode::OK, page),
        Ok(Err(err)) => error_response(err),
        Err(err) => error_response(
            Error::new(ErrorKind::Internal)
                .with_message("read task failed")
                .with_source(err),
        ),
    }
}

async fn produce_record(
    State(state): State<Arc<AppState>>,
    AxumPath(topic): AxumPath<String>,
    payload: Result<Json<ProduceRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(rejected(rejection.body_text(), &topic)),
    };
    let request = WriteRequest {
        topic,
        partition: payload.partition,
        timestamp: payload.timestamp,
        key: payload.key,
        value: payload.value,
        headers: payload.headers,
    };
    let pending = match state.writer.write(request) {
        Ok(pending) => pending,
        Err(err) => return error_response(err),
    };
    match pending.await {
        Ok(record) => json_response(StatusCode::CREATED, record),
        Err(err) => error_response(err),
    }
}

fn read_request(state: &AppState, topic: String, query: RecordsQuery) -> Result<ReadRequest, Error> {
    let limit = query.limit.unwrap_or(state.default_limit);
    if limit == 0 || limit > state.max_limit {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("limit must be between 1 and {}", state.max_limit))
            .with_topic(topic));
    }
    let include = match query.include.as_deref() {
        Some(names) => Include::parse(names.split(','))?,
        None => Include::all(),
    };
    Ok(ReadRequest {
        topic,
        partition: query.partition,
        offset: query.offset,
        timestamp: query.timestamp,
        limit,
        include,
    })
}

fn rejected(detail: String, topic: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(detail)
        .with_topic(topic)
        .with_hint("Check the query parameters and JSON body against the records API.")
}

fn json_response(status: StatusCode, payload: impl Serialize) -> Response {
    let mut response = (status, Json(payload)).into_response();
    response
        .headers_mut()
        .insert("recordops-version", HeaderValue::from_static(API_VERSION));
    response
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Usage | ErrorKind::InvalidTimestamp => StatusCode::BAD_REQUEST,
        ErrorKind::NoSuchTopic | ErrorKind::NoSuchPartition => StatusCode::NOT_FOUND,
        ErrorKind::Broker => StatusCode::BAD_GATEWAY,
        ErrorKind::Io | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(err.kind());
    if status.is_server_error() {
        tracing::warn!(error = %err, "request failed");
    }
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
            topic: err.topic().map(str::to_string),
            partition: err.partition(),
            offset: err.offset(),
        },
    };
    json_response(status, body)
}

#[cfg(test)]
mod tests {
    use super::{ServeConfig, router, serve, status_for, validate_config};
    use crate::api::ErrorKind;
    use crate::broker::memory::MemoryBroker;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use std::time::Duration;

    fn loopback() -> ServeConfig {
        ServeConfig::new("127.0.0.1:0".parse().expect("bind"))
    }

    #[tokio::test]
    async fn serve_rejects_non_loopback_bind() {
        let config = ServeConfig::new("0.0.0.0:0".parse().expect("bind"));
        let err = serve(config, Arc::new(MemoryBroker::new()))
            .await
            .expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn non_loopback_allowed_with_flag() {
        let mut config = ServeConfig::new("0.0.0.0:0".parse().expect("bind"));
        config.allow_non_loopback = true;
        validate_config(&config).expect("config ok");
    }

    #[test]
    fn default_limit_must_not_exceed_max() {
        let mut config = loopback();
        config.default_limit = 500;
        let err = validate_config(&config).expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn safety_limits_require_positive_values() {
        let mut config = loopback();
        config.max_body_bytes = 0;
        assert!(validate_config(&config).is_err());

        let mut config = loopback();
        config.poll_timeout = Duration::ZERO;
        assert!(validate_config(&config).is_err());

        let mut config = loopback();
        config.max_limit = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn body_limit_fits_the_platform() {
        let mut config = loopback();
        assert_eq!(config.body_limit().expect("default limit"), 1024 * 1024);
        config.max_body_bytes = 0;
        let err = config.body_limit().expect_err("zero limit");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn router_validates_config() {
        let mut config = loopback();
        config.default_limit = 0;
        let err = router(&config, Arc::new(MemoryBroker::new())).expect_err("invalid");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::NoSuchTopic), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::NoSuchPartition), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::InvalidTimestamp), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Usage), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Broker), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
