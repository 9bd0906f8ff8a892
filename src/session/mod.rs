//! Connected identities, presence tracking and message fan-out

pub mod broadcast;
pub mod registry;

pub use broadcast::{Broadcaster, Echo};
pub use registry::ConnectionRegistry;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Externally authenticated username
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live transport session bound to one identity
#[derive(Debug, Clone)]
pub struct Connection {
    id: Uuid,
    identity: Identity,
    authenticated: bool,
    outbound: mpsc::UnboundedSender<ServerMsg>,
    superseded: Arc<Notify>,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue
    pub fn new(
        identity: Identity,
        authenticated: bool,
    ) -> (Self, mpsc::UnboundedReceiver<ServerMsg>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let conn = Self {
            id: Uuid::new_v4(),
            identity,
            authenticated,
            outbound,
            superseded: Arc::new(Notify::new()),
        };
        (conn, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Queue a message for delivery. Returns false if the socket is gone.
    pub fn send(&self, msg: ServerMsg) -> bool {
        self.outbound.send(msg).is_ok()
    }

    /// Mark this connection as replaced by a newer one for the same identity
    pub(crate) fn supersede(&self) {
        self.superseded.notify_one();
    }

    /// Resolves once a newer connection has taken over this identity
    pub async fn superseded(&self) {
        self.superseded.notified().await;
    }
}
