//! Error types for CDP operations.

use intercept_common::{ConfigError, SessionId, TargetId};
use thiserror::Error;

/// Failures surfaced by the transport, session manager, and service layer.
///
/// Per-event CDP failures are swallowed inside the pipeline (the event
/// degrades to pass-through); these errors reach callers only from explicit
/// operations such as attaching targets or loading rules.
#[derive(Debug, Error)]
pub enum CdpError {
    #[error("devtools endpoint unreachable: {0}")]
    DevToolsUnreachable(String),

    #[error("no matching page target")]
    NoTarget,

    #[error("target {0} exposes no webSocketDebuggerUrl")]
    NoDebuggerUrl(TargetId),

    #[error("websocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("target connection closed")]
    ConnectionClosed,

    #[error("undecodable response body")]
    BodyDecode,

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("event stream already subscribed")]
    AlreadySubscribed,

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("serialization failure: {0}")]
    Json(#[from] serde_json::Error),
}
