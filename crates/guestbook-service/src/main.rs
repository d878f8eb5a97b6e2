use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use clap::Parser;
use guestbook_api::{
    EntryView, GuestbookApi, ListingLimits, API_CONTRACT_VERSION, DEFAULT_GUESTBOOK_LIMIT,
    DEFAULT_SUMMARY_LIMIT,
};
use guestbook_core::{StoreError, Summary};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";

#[derive(Debug, Clone)]
struct ServiceState {
    api: GuestbookApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct SignForm {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Parser)]
#[command(name = "guestbook-service")]
#[command(about = "HTTP service for the guestbook record store")]
struct Args {
    #[arg(long, default_value = "./guestbook.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
    #[arg(long, default_value_t = DEFAULT_SUMMARY_LIMIT)]
    list_limit: usize,
    #[arg(long, default_value_t = DEFAULT_GUESTBOOK_LIMIT)]
    guestbook_limit: usize,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl ServiceError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, service_contract_version: SERVICE_CONTRACT_VERSION, error: message.into() }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::InvalidKeyFormat(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        warn!(status = status.as_u16(), error = %err, "guestbook request failed");
        Self::new(status, err.to_string())
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/", get(list_summaries))
        .route("/guestbook", get(guestbook))
        .route("/item/:token", get(item))
        .route("/sign", post(sign))
        .with_state(state)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let limits = ListingLimits { summaries: args.list_limit, guestbook: args.guestbook_limit };
    let api = GuestbookApi::with_limits(args.db, limits);
    api.migrate(false)?;

    let state = ServiceState { api };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(bind = %args.bind, "guestbook service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

// Store calls block on SQLite, so they run off the async workers.
async fn with_api<T, F>(state: ServiceState, op: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce(&GuestbookApi) -> Result<T, StoreError> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || op(&state.api)).await.map_err(|err| {
        warn!(error = %err, "guestbook worker task failed");
        ServiceError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    })?;
    Ok(joined?)
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn list_summaries(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<Vec<Summary>>>, ServiceError> {
    let summaries = with_api(state, |api| api.list_summaries(None)).await?;
    Ok(Json(envelope(summaries)))
}

async fn guestbook(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<Vec<EntryView>>>, ServiceError> {
    let entries = with_api(state, |api| api.list_full(None)).await?;
    Ok(Json(envelope(entries)))
}

async fn item(
    State(state): State<ServiceState>,
    Path(token): Path<String>,
) -> Result<Response, ServiceError> {
    let record = with_api(state, move |api| api.get_item(&token)).await?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], record.content)
        .into_response())
}

async fn sign(
    State(state): State<ServiceState>,
    Form(form): Form<SignForm>,
) -> Result<&'static str, ServiceError> {
    with_api(state, move |api| api.sign(form.content.as_bytes())).await?;
    Ok("ok")
}
