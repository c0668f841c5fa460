//! Live session state: the send side of one WebSocket connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lanchat_core::{Contact, Outbound, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// One serialized outbound envelope, shared across fan-out recipients.
pub type Frame = Arc<String>;

/// Handle to a connected client: identity plus its outbound queue.
///
/// The queue is drained by the connection's writer task. Sends never block.
/// Chat frames are best-effort and a full queue drops them. Frames the
/// client cannot do without (presence, registration ack) evict the session
/// instead, so it is never left holding a stale contact list.
pub struct SessionHandle {
    id: SessionId,
    remote_addr: SocketAddr,
    tx: mpsc::Sender<Frame>,
    dropped_frames: AtomicU64,
    evicted: CancellationToken,
}

impl SessionHandle {
    /// Wrap an existing outbound queue.
    pub fn new(id: SessionId, remote_addr: SocketAddr, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            remote_addr,
            tx,
            dropped_frames: AtomicU64::new(0),
            evicted: CancellationToken::new(),
        }
    }

    /// Mint a fresh id and queue for a new connection.
    pub fn open(remote_addr: SocketAddr, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self::new(SessionId::new(), remote_addr, tx)), rx)
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Peer socket address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Peer IP as shown in the contact list (IPv4-mapped addresses unwrapped).
    pub fn ip(&self) -> String {
        self.remote_addr.ip().to_canonical().to_string()
    }

    /// Queue a best-effort frame. Returns `false` if the queue is full or
    /// the connection's writer has gone away.
    pub fn send(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                warn!(session_id = %self.id, frame_len = frame.len(), "send queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a frame that must not be lost. A full queue evicts the session.
    pub fn send_or_evict(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                warn!(session_id = %self.id, "send queue full, evicting session");
                self.evicted.cancel();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Serialize and queue one envelope that must not be lost.
    pub fn send_envelope(&self, envelope: &Outbound) -> bool {
        match envelope.to_json() {
            Ok(json) => self.send_or_evict(Arc::new(json)),
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "failed to serialize envelope");
                false
            }
        }
    }

    /// Whether the session fell too far behind and must be disconnected.
    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }

    /// Cancelled once the session is evicted.
    pub fn eviction(&self) -> CancellationToken {
        self.evicted.clone()
    }

    /// Frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a registry entry.
#[derive(Clone, Debug)]
pub struct Session {
    /// Send handle.
    pub handle: Arc<SessionHandle>,
    /// Display name, `None` until registration succeeds.
    pub display_name: Option<String>,
}

impl Session {
    /// Session id.
    pub fn id(&self) -> &SessionId {
        self.handle.id()
    }
}

pub(crate) fn contact_of(handle: &SessionHandle, display_name: Option<&str>) -> Option<Contact> {
    display_name.map(|name| Contact {
        id: handle.id().clone(),
        username: name.to_owned(),
        ip: handle.ip(),
    })
}
