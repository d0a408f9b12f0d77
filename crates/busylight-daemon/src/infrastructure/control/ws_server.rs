//! WebSocket server: accept loop and per-connection handlers.
//!
//! Each accepted TCP connection is upgraded to a WebSocket and handled in its
//! own Tokio task.  A connection is strictly request/reply: one JSON text
//! frame in, one JSON text frame out.  The accept loop polls a shared
//! `running` flag every 200 ms so `main.rs` can stop it on Ctrl+C.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::service::ServiceHandle;
use crate::infrastructure::control::messages::{dispatch, ControlReply, ControlRequest};

const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the control listener.
///
/// # Errors
///
/// Returns an error if the address is in use or the process lacks permission
/// to bind it.
pub async fn bind_listener(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind control listener on {addr}"))?;
    info!("control server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Binds `addr` and serves until `running` is cleared.
pub async fn run_server(
    addr: SocketAddr,
    handle: ServiceHandle,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = bind_listener(addr).await?;
    serve(listener, handle, running).await;
    Ok(())
}

/// Accepts connections on an already bound listener until `running` is
/// cleared.
pub async fn serve(listener: TcpListener, handle: ServiceHandle, running: Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("control connection from {peer_addr}");
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, handle).await;
                });
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            // No connection in the last poll interval.
            Err(_) => {}
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, handle: ServiceHandle) {
    match run_connection(stream, peer_addr, handle).await {
        Ok(()) => debug!("control connection {peer_addr} closed"),
        Err(e) => warn!("control connection {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handle: ServiceHandle,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Binary(_)) => {
                warn!("{peer_addr}: unexpected binary frame (ignored)");
                continue;
            }
            Ok(_) => continue,
            Err(WsError::ConnectionClosed | WsError::Protocol(_)) => break,
            Err(e) => return Err(e).context("WebSocket read failed"),
        };

        let reply = match serde_json::from_str::<ControlRequest>(&text) {
            Ok(request) => {
                debug!("{peer_addr}: {request:?}");
                dispatch(request, &handle).await
            }
            Err(e) => {
                warn!("{peer_addr}: invalid control message: {e}");
                ControlReply::error(format!("invalid request: {e}"))
            }
        };

        let json = serde_json::to_string(&reply).context("failed to encode reply")?;
        ws_tx
            .send(WsMessage::Text(json))
            .await
            .context("WebSocket send failed")?;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
