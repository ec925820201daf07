//! HTTP surface of the ledger: append, list, tail and validate.
//!
//! Mining is CPU-bound, so every append runs on tokio's blocking pool and
//! never on a runtime worker. The ledger itself serializes appends.

mod constants;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use constants::{DEFAULT_CHAIN_LIMIT, MAX_BLOCKS_PER_REQUEST};
use ledger_core::{Block, ChainValidation, Ledger, LedgerError, MiningError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct AppendIn {
    pub payload: Value,
    #[serde(default)]
    pub difficulty: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ChainQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChainOut {
    pub length: usize,
    pub blocks: Vec<Block>,
}

/// `Json` body extractor whose rejections answer with an `{error}` body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query` extractor whose rejections answer with an `{error}` body.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    Worker(tokio::task::JoinError),
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Ledger(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Worker(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Ledger(e) => match e {
                LedgerError::NotInitialized | LedgerError::AlreadyInitialized => {
                    StatusCode::CONFLICT
                }
                LedgerError::PayloadSerialization(_) | LedgerError::InvalidDifficulty(_) => {
                    StatusCode::BAD_REQUEST
                }
                LedgerError::Mining(MiningError::Timeout { .. })
                | LedgerError::Mining(MiningError::Cancelled { .. }) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                LedgerError::Store(_) | LedgerError::CorruptStore { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let message = match &self {
            ApiError::Ledger(e) => e.to_string(),
            ApiError::Worker(e) => format!("mining worker failed: {e}"),
            ApiError::BadRequest(m) => m.clone(),
        };
        if status.is_server_error() {
            error!(%status, %message, "request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/blocks", post(append_block))
        .route("/chain", get(chain))
        .route("/chain/tail", get(tail))
        .route("/chain/validate", get(validate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn append_block(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AppendIn>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    let ledger = Arc::clone(&state.ledger);
    let difficulty = body
        .difficulty
        .unwrap_or(ledger.config().default_difficulty);
    let block =
        tokio::task::spawn_blocking(move || ledger.append(&body.payload, difficulty)).await??;
    info!(index = block.index(), hash = %block.hash(), "block appended");
    Ok((StatusCode::CREATED, Json(block)))
}

async fn chain(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ChainQuery>,
) -> Result<Json<ChainOut>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_CHAIN_LIMIT)
        .min(MAX_BLOCKS_PER_REQUEST);
    let blocks = state.ledger.chain(Some(limit))?;
    Ok(Json(ChainOut {
        length: state.ledger.len(),
        blocks,
    }))
}

async fn tail(State(state): State<AppState>) -> Result<Json<Block>, ApiError> {
    Ok(Json(state.ledger.tail()?))
}

// Rehashes every block, so keep it off the runtime workers too.
async fn validate(State(state): State<AppState>) -> Result<Json<ChainValidation>, ApiError> {
    let ledger = Arc::clone(&state.ledger);
    let validation = tokio::task::spawn_blocking(move || ledger.validate_chain()).await?;
    Ok(Json(validation))
}
