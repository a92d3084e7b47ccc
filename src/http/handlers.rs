//! Request handlers. Every mutation answers with the resulting `SessionSnapshot`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::encoder::ClientContext;
use crate::http::server::AppState;
use crate::intent::address::is_valid_address;
use crate::intent::{AckInput, SignIntent, SignRequest};
use crate::session::{Effect, OrchestratorStopped, SessionSnapshot};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Stopped(#[from] OrchestratorStopped),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Stopped(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

type ApiResult = Result<Json<SessionSnapshot>, ApiError>;

/// Sign request plus the device it came from.
#[derive(Debug, Deserialize)]
pub struct SignBody {
    #[serde(flatten)]
    pub request: SignRequest,
    #[serde(default)]
    pub client: ClientContext,
}

#[derive(Debug, Deserialize)]
pub struct AccountBody {
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
    pub uuid: String,
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn sign(State(state): State<AppState>, Json(body): Json<SignBody>) -> ApiResult {
    let intent = SignIntent::from(body.request);
    tracing::debug!(kind = intent.kind.name(), mobile = body.client.mobile, "Sign request received");
    Ok(Json(state.handle.start(intent, body.client).await?))
}

pub async fn acknowledge(State(state): State<AppState>, Json(input): Json<AckInput>) -> ApiResult {
    Ok(Json(state.handle.acknowledge(input).await?))
}

pub async fn agree(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.handle.agree().await?))
}

pub async fn cancel(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.handle.cancel().await?))
}

pub async fn restart(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.handle.restart().await?))
}

pub async fn set_account(State(state): State<AppState>, Json(body): Json<AccountBody>) -> ApiResult {
    if let Some(address) = &body.address {
        if !is_valid_address(address) {
            return Err(ApiError::BadRequest(format!("invalid address: {}", address)));
        }
    }
    Ok(Json(state.handle.set_account(body.address).await?))
}

pub async fn sign_out(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.handle.sign_out().await?))
}

pub async fn session(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.handle.snapshot().await?))
}

/// Mobile return path: the wallet app sends the user back with `?uuid=<reference>`.
pub async fn return_redirect(State(state): State<AppState>, Query(query): Query<ReturnQuery>) -> ApiResult {
    let reference = Uuid::parse_str(&query.uuid)
        .map_err(|_| ApiError::BadRequest(format!("invalid reference: {}", query.uuid)))?;
    Ok(Json(state.handle.return_redirect(reference.to_string()).await?))
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn events(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let effects = state.handle.subscribe();
    ws.on_upgrade(move |socket| stream_effects(socket, effects))
}

async fn stream_effects(socket: WebSocket, mut effects: broadcast::Receiver<Effect>) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            effect = effects.recv() => {
                match effect {
                    Ok(effect) => {
                        let text = match serde_json::to_string(&effect) {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to encode effect");
                                continue;
                            }
                        };
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Effect subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    tracing::debug!("Effect stream closed");
}
