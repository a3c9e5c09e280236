//! Downstream upgrade: token extraction and rejection.

use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::Response;
use serde::Deserialize;
use tracing::warn;

use orderwire_core::protocol::{MISSING_TOKEN_REASON, close_code};

use crate::pair;
use crate::server::AppState;
use crate::upstream::downstream_close;

/// How long a rejected socket waits for the client's close reply.
const REJECT_LINGER: Duration = Duration::from_secs(1);

/// Query parameters accepted on the upgrade path.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    /// Bearer token supplied by clients that cannot set headers.
    pub token: Option<String>,
}

/// Token from the `token` query parameter, else from `Authorization: Bearer`.
pub fn extract_token(query: &TokenQuery, headers: &HeaderMap) -> Option<String> {
    let from_query = query.token.as_deref().map(str::trim);
    let from_header = || {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
    };
    from_query
        .filter(|t| !t.is_empty())
        .or_else(|| from_header().filter(|t| !t.is_empty()))
        .map(str::to_owned)
}

/// `GET <path>` upgrade handler.
pub(crate) async fn upgrade_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let token = extract_token(&query, &headers);
    ws.on_upgrade(move |socket| async move {
        match token {
            Some(token) => pair::run(socket, token, state).await,
            None => reject(socket).await,
        }
    })
}

/// Close an unauthenticated socket with a policy violation.
async fn reject(mut socket: WebSocket) {
    warn!("stream upgrade without token, closing");
    if socket
        .send(downstream_close(close_code::POLICY, MISSING_TOKEN_REASON))
        .await
        .is_ok()
    {
        let _ = tokio::time::timeout(REJECT_LINGER, socket.recv()).await;
    }
}
