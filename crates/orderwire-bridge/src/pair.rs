//! One downstream/upstream pair.

use axum::extract::ws::{Message as DownstreamMessage, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tracing::{debug, info, warn};

use orderwire_core::protocol::{ErrorFrame, close_code};

use crate::server::AppState;
use crate::upstream::{
    self, close_for_downstream, close_for_upstream, downstream_close, to_downstream, to_upstream,
    upstream_close,
};

type DownstreamSink = SplitSink<WebSocket, DownstreamMessage>;

/// Drive a pair until either leg closes.
pub(crate) async fn run(downstream: WebSocket, token: String, state: AppState) {
    let guard = state.connections.register();
    let connection_id = guard.id();
    let shutdown = state.shutdown.token();
    let (mut down_tx, mut down_rx) = downstream.split();
    info!(%connection_id, "downstream connected, opening upstream");

    let connecting = upstream::connect(
        &state.config.upstream_url,
        &token,
        state.config.upstream_connect_timeout,
    );
    tokio::pin!(connecting);

    // Frames arriving before the upstream leg is open are dropped.
    let opened = loop {
        tokio::select! {
            result = &mut connecting => break result,
            message = down_rx.next() => match message {
                Some(Ok(DownstreamMessage::Close(_)) | Err(_)) | None => {
                    info!(%connection_id, "downstream left before upstream opened");
                    return;
                }
                Some(Ok(_)) => debug!(%connection_id, "upstream not open, dropping frame"),
            },
            () = shutdown.cancelled() => {
                let _ = down_tx
                    .send(downstream_close(close_code::GOING_AWAY, "server shutting down"))
                    .await;
                return;
            }
        }
    };

    let upstream = match opened {
        Ok(socket) => socket,
        Err(e) => {
            warn!(%connection_id, error = %e, "upstream connection failed");
            fail_downstream(&mut down_tx, &e.to_string()).await;
            return;
        }
    };
    info!(%connection_id, "upstream connected");
    let (mut up_tx, mut up_rx) = upstream.split();

    loop {
        tokio::select! {
            message = down_rx.next() => match message {
                Some(Ok(DownstreamMessage::Close(frame))) => {
                    debug!(%connection_id, code = ?frame.as_ref().map(|f| f.code), "downstream closed");
                    let _ = up_tx.send(UpstreamMessage::Close(close_for_upstream(frame))).await;
                    break;
                }
                Some(Ok(message)) => {
                    let Some(message) = to_upstream(message) else { continue };
                    if let Err(e) = up_tx.send(message).await {
                        warn!(%connection_id, error = %e, "upstream send failed");
                        fail_downstream(&mut down_tx, &e.to_string()).await;
                        break;
                    }
                }
                Some(Err(e)) => {
                    debug!(%connection_id, error = %e, "downstream errored");
                    let _ = up_tx.send(upstream_close(close_code::INTERNAL, "downstream error")).await;
                    break;
                }
                None => {
                    debug!(%connection_id, "downstream disconnected");
                    let _ = up_tx.send(upstream_close(close_code::NORMAL, "downstream disconnected")).await;
                    break;
                }
            },
            message = up_rx.next() => match message {
                Some(Ok(UpstreamMessage::Close(frame))) => {
                    debug!(%connection_id, code = ?frame.as_ref().map(|f| u16::from(f.code)), "upstream closed");
                    let _ = down_tx.send(DownstreamMessage::Close(close_for_downstream(frame))).await;
                    break;
                }
                Some(Ok(message)) => {
                    let Some(message) = to_downstream(message) else { continue };
                    if down_tx.send(message).await.is_err() {
                        debug!(%connection_id, "downstream send failed");
                        let _ = up_tx.send(upstream_close(close_code::NORMAL, "downstream disconnected")).await;
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(%connection_id, error = %e, "upstream errored");
                    fail_downstream(&mut down_tx, &e.to_string()).await;
                    break;
                }
                None => {
                    warn!(%connection_id, "upstream ended without close frame");
                    fail_downstream(&mut down_tx, "upstream connection ended").await;
                    break;
                }
            },
            () = shutdown.cancelled() => {
                let _ = up_tx.send(upstream_close(close_code::GOING_AWAY, "bridge shutting down")).await;
                let _ = down_tx.send(downstream_close(close_code::GOING_AWAY, "server shutting down")).await;
                break;
            }
        }
    }

    info!(%connection_id, "pair closed");
}

/// Best-effort error frame, then close with 1011.
async fn fail_downstream(down_tx: &mut DownstreamSink, reason: &str) {
    let frame = ErrorFrame::internal(reason).to_json();
    let _ = down_tx.send(DownstreamMessage::Text(frame.into())).await;
    let _ = down_tx
        .send(downstream_close(close_code::INTERNAL, "upstream connection error"))
        .await;
}
