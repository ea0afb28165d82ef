//! Quest System Module
//!
//! TOML-defined quests made of task graphs. The engine advances each
//! player's tasks in response to commands, kills and timers, and fires the
//! effects attached to every task that becomes active.

pub mod catalog;
pub mod definition;
pub mod effects;
pub mod engine;
pub mod error;
pub mod events;
pub mod hooks;
pub mod rewards;
pub mod scheduler;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::QuestCatalog;
pub use engine::{EngineSettings, QuestEngine};
pub use error::{QuestOutcome, QuestRejection};
pub use events::{KillEvent, TriggerAdapter};
pub use hooks::{PlayerId, QuestHooks};
