//! Upstream leg: handshake and frame conversion.

use std::time::Duration;

use axum::extract::ws::{CloseFrame as DownstreamClose, Message as DownstreamMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamClose;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use orderwire_core::protocol::sendable_close_code;

use crate::errors::{BridgeError, Result};

/// Socket type of the upstream leg.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the upstream socket, authenticating with `token`.
pub async fn connect(url: &str, token: &str, timeout: Duration) -> Result<UpstreamSocket> {
    let mut request = url
        .into_client_request()
        .map_err(|e| BridgeError::InvalidRequest(e.to_string()))?;
    let bearer =
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| BridgeError::InvalidToken)?;
    let _ = request.headers_mut().insert(AUTHORIZATION, bearer);

    let (socket, _response) = tokio::time::timeout(timeout, connect_async(request))
        .await
        .map_err(|_| BridgeError::Timeout(timeout))?
        .map_err(|e| BridgeError::Handshake(e.to_string()))?;
    Ok(socket)
}

/// Convert a downstream data frame for the upstream leg.
///
/// Control frames are answered by each side's own WebSocket stack and are
/// not forwarded; `None` is returned for them and for close frames.
pub(crate) fn to_upstream(message: DownstreamMessage) -> Option<UpstreamMessage> {
    match message {
        DownstreamMessage::Text(text) => Some(UpstreamMessage::Text(text.as_str().into())),
        DownstreamMessage::Binary(data) => Some(UpstreamMessage::Binary(data)),
        DownstreamMessage::Ping(_) | DownstreamMessage::Pong(_) | DownstreamMessage::Close(_) => {
            None
        }
    }
}

/// Convert an upstream data frame for the downstream leg.
pub(crate) fn to_downstream(message: UpstreamMessage) -> Option<DownstreamMessage> {
    match message {
        UpstreamMessage::Text(text) => Some(DownstreamMessage::Text(text.as_str().into())),
        UpstreamMessage::Binary(data) => Some(DownstreamMessage::Binary(data)),
        UpstreamMessage::Ping(_)
        | UpstreamMessage::Pong(_)
        | UpstreamMessage::Close(_)
        | UpstreamMessage::Frame(_) => None,
    }
}

/// Close frame for the downstream leg mirroring an upstream close.
pub(crate) fn close_for_downstream(frame: Option<UpstreamClose>) -> Option<DownstreamClose> {
    frame.map(|frame| DownstreamClose {
        code: sendable_close_code(u16::from(frame.code)),
        reason: frame.reason.as_str().into(),
    })
}

/// Close frame for the upstream leg mirroring a downstream close.
pub(crate) fn close_for_upstream(frame: Option<DownstreamClose>) -> Option<UpstreamClose> {
    frame.map(|frame| UpstreamClose {
        code: CloseCode::from(sendable_close_code(frame.code)),
        reason: frame.reason.as_str().into(),
    })
}

/// Upstream close frame with an explicit code.
pub(crate) fn upstream_close(code: u16, reason: &str) -> UpstreamMessage {
    UpstreamMessage::Close(Some(UpstreamClose {
        code: CloseCode::from(code),
        reason: reason.into(),
    }))
}

/// Downstream close frame with an explicit code.
pub(crate) fn downstream_close(code: u16, reason: &str) -> DownstreamMessage {
    DownstreamMessage::Close(Some(DownstreamClose {
        code,
        reason: reason.into(),
    }))
}
