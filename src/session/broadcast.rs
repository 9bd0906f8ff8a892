//! Room-scoped and global message fan-out

use std::sync::Arc;

use tracing::trace;

use crate::game::Match;
use crate::ws::protocol::ServerMsg;

use super::{ConnectionRegistry, Identity};

/// Whether the originator of an event receives its own relay
#[derive(Debug, Clone, Copy)]
pub enum Echo<'a> {
    Everyone,
    ExcludeSender(&'a Identity),
}

/// Delivers server messages to connections resolved through the registry.
///
/// Delivery is fire-and-forget; per-connection ordering comes from the
/// outbound channel.
#[derive(Clone)]
pub struct Broadcaster {
    connections: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }

    /// Send to every roster member of a match that is currently connected
    pub fn to_room(&self, game: &Match, msg: ServerMsg, echo: Echo<'_>) -> usize {
        let mut delivered = 0;
        for identity in game.roster.keys() {
            if let Echo::ExcludeSender(sender) = echo {
                if sender == identity {
                    continue;
                }
            }
            if self.to_one(identity, msg.clone()) {
                delivered += 1;
            }
        }
        trace!(match_id = %game.id, delivered, "Room broadcast");
        delivered
    }

    /// Send to every connected identity regardless of match membership
    pub fn to_all(&self, msg: ServerMsg) -> usize {
        self.connections.send_all(&msg)
    }

    pub fn to_one(&self, identity: &Identity, msg: ServerMsg) -> bool {
        self.connections
            .lookup(identity)
            .map(|conn| conn.send(msg))
            .unwrap_or(false)
    }
}
