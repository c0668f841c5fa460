//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.
//!
//! The socket is split into a reader (this task) and a writer task that
//! drains the session's outbound queue. Inbound frames become
//! [`SessionEvent`]s for the connection's [`SessionRouter`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use lanchat_core::Profile;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::registry::Registry;
use crate::router::{CloseReason, SessionEvent, SessionRouter};
use crate::session::{Frame, SessionHandle};

/// Inbound events buffered between the reader and the router.
const EVENT_QUEUE: usize = 64;

/// Shared state every connection needs.
#[derive(Clone)]
pub struct ConnectionContext {
    /// Live session table.
    pub registry: Arc<Registry>,
    /// Protocol profile.
    pub profile: Profile,
    /// Outbound queue length per connection.
    pub send_queue_capacity: usize,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
}

/// Run a WebSocket session until the client leaves or the server shuts down.
#[instrument(skip_all, fields(remote = %remote))]
pub async fn serve_connection(socket: WebSocket, remote: SocketAddr, ctx: ConnectionContext) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (handle, outbox) = SessionHandle::open(remote, ctx.send_queue_capacity);
    let session_id = handle.id().clone();
    let eviction = handle.eviction();

    let writer = tokio::spawn(write_frames(
        ws_tx,
        outbox,
        ctx.shutdown.clone(),
        eviction.clone(),
    ));

    let (events, events_rx) = mpsc::channel(EVENT_QUEUE);
    let router = SessionRouter::new(handle, ctx.registry.clone(), ctx.profile);
    let router_task = tokio::spawn(router.run(events_rx));
    let _ = events.send(SessionEvent::Connected).await;

    let reason = loop {
        let msg = tokio::select! {
            () = ctx.shutdown.cancelled() => break CloseReason::Shutdown,
            () = eviction.cancelled() => break CloseReason::Fault("send queue full".into()),
            msg = ws_rx.next() => msg,
        };
        let event = match msg {
            Some(Ok(Message::Text(text))) => SessionEvent::Received(text.as_str().to_owned()),
            Some(Ok(Message::Binary(data))) => {
                debug!(session_id = %session_id, len = data.len(), "binary frame");
                SessionEvent::Unsupported("binary")
            }
            // Pongs are answered by the transport
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => break CloseReason::Client,
            Some(Err(e)) => break CloseReason::Fault(e.to_string()),
        };
        if events.send(event).await.is_err() {
            break CloseReason::Fault("router stopped".into());
        }
    };

    let _ = events.send(SessionEvent::Closed(reason)).await;
    drop(events);
    let _ = router_task.await;
    // The router and registry have released the handle, so the writer sees
    // the queue close once it has flushed what is left.
    let _ = writer.await;
    debug!(session_id = %session_id, "session finished");
}

/// Forward queued frames to the socket. On shutdown or eviction send a
/// Close frame instead.
async fn write_frames(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::Receiver<Frame>,
    shutdown: CancellationToken,
    eviction: CancellationToken,
) {
    loop {
        let close = tokio::select! {
            biased;
            () = shutdown.cancelled() => CloseFrame {
                code: close_code::AWAY,
                reason: "server shutting down".into(),
            },
            () = eviction.cancelled() => CloseFrame {
                code: close_code::AGAIN,
                reason: "client too slow".into(),
            },
            frame = outbox.recv() => {
                let Some(frame) = frame else {
                    let _ = ws_tx.close().await;
                    return;
                };
                if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                    return;
                }
                continue;
            }
        };
        let _ = ws_tx.send(Message::Close(Some(close))).await;
        return;
    }
}
