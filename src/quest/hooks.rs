//! Quest Collaborators
//!
//! Stable identifiers and the traits the engine uses to reach the rest of
//! the world: outbound notifications, reward delivery and item creation.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::protocol::QuestMessage;

/// Stable numeric player identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// Stable numeric identifier of a creature in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreatureId(pub u64);

/// Identifier of a created item instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

/// An item created for a quest reward
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemInstance {
    pub object_id: ObjectId,
    pub template: String,
    pub display_name: String,
}

/// Outbound notification channel. Delivery is fire-and-forget.
pub trait QuestNotifier: Send + Sync {
    fn notify(&self, player: PlayerId, message: QuestMessage);
}

/// Receives the parts of a reward that live outside the quest journal
pub trait RewardSink: Send + Sync {
    fn grant_experience(&self, player: PlayerId, experience_type: &str, amount: i32);
    fn add_bank_credits(&self, player: PlayerId, amount: i64);
    fn place_in_inventory(&self, player: PlayerId, item: ItemInstance);
}

/// Builds item instances. `None` means the item could not be created.
pub trait ItemFactory: Send + Sync {
    fn create_by_name(&self, name: &str) -> Option<ItemInstance>;
    fn create_from_template(&self, template: &str) -> Option<ItemInstance>;
}

/// Collaborators handed to the engine when it starts
#[derive(Clone)]
pub struct QuestHooks {
    pub notifier: Arc<dyn QuestNotifier>,
    pub rewards: Arc<dyn RewardSink>,
    pub items: Arc<dyn ItemFactory>,
}
