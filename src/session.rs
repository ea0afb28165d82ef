//! Connected player sessions.
//!
//! Each connected player has one bounded outbound channel carrying encoded
//! MessagePack frames. Quest notifications for players that are offline or
//! too slow to keep up are dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::protocol::{encode_quest_message, QuestMessage};
use crate::quest::hooks::{PlayerId, QuestNotifier};

struct SessionSender {
    generation: u64,
    tx: mpsc::Sender<Vec<u8>>,
}

pub struct SessionRegistry {
    senders: DashMap<PlayerId, SessionSender>,
    next_generation: AtomicU64,
    buffer: usize,
}

impl SessionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            senders: DashMap::new(),
            next_generation: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a player's message sender for unicast. A newer connection
    /// replaces an older one; the returned generation identifies this one.
    pub fn connect(&self, player: PlayerId) -> (u64, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        if self
            .senders
            .insert(player, SessionSender { generation, tx })
            .is_some()
        {
            debug!("Replaced existing session for {}", player);
        }
        debug!("Registered sender for {}", player);
        (generation, rx)
    }

    /// Unregister a player's sender, unless a newer connection took over
    pub fn disconnect(&self, player: PlayerId, generation: u64) {
        if self
            .senders
            .remove_if(&player, |_, session| session.generation == generation)
            .is_some()
        {
            debug!("Unregistered sender for {}", player);
        }
    }

    pub fn is_connected(&self, player: PlayerId) -> bool {
        self.senders.contains_key(&player)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }
}

impl QuestNotifier for SessionRegistry {
    fn notify(&self, player: PlayerId, message: QuestMessage) {
        let bytes = match encode_quest_message(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Dropping {} for {}: {}", message.msg_type(), player, e);
                return;
            }
        };

        let closed = {
            let Some(session) = self.senders.get(&player) else {
                debug!("No sender registered for {}", player);
                return;
            };
            match session.tx.try_send(bytes) {
                Ok(()) => None,
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue full for {}, dropping {}", player, message.msg_type());
                    None
                }
                Err(TrySendError::Closed(_)) => Some(session.generation),
            }
        };

        if let Some(generation) = closed {
            self.disconnect(player, generation);
        }
    }
}
