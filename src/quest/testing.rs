//! Recording collaborators and builders shared by the quest tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::protocol::QuestMessage;

use super::definition::{Quest, QuestDefinition, TaskDefinition, TaskKind};
use super::hooks::{ItemFactory, ItemInstance, ObjectId, PlayerId, QuestHooks, QuestNotifier, RewardSink};

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(PlayerId, QuestMessage)>>,
}

impl RecordingNotifier {
    pub fn messages(&self, player: PlayerId) -> Vec<QuestMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == player)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl QuestNotifier for RecordingNotifier {
    fn notify(&self, player: PlayerId, message: QuestMessage) {
        self.messages.lock().unwrap().push((player, message));
    }
}

#[derive(Default)]
pub struct RecordingRewards {
    experience: Mutex<Vec<(PlayerId, String, i32)>>,
    credits: Mutex<HashMap<PlayerId, i64>>,
    items: Mutex<Vec<(PlayerId, ItemInstance)>>,
}

impl RecordingRewards {
    pub fn experience(&self, player: PlayerId) -> Vec<(String, i32)> {
        self.experience
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _, _)| *to == player)
            .map(|(_, kind, amount)| (kind.clone(), *amount))
            .collect()
    }

    pub fn credits(&self, player: PlayerId) -> i64 {
        self.credits.lock().unwrap().get(&player).copied().unwrap_or(0)
    }

    pub fn items(&self, player: PlayerId) -> Vec<ItemInstance> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == player)
            .map(|(_, item)| item.clone())
            .collect()
    }
}

impl RewardSink for RecordingRewards {
    fn grant_experience(&self, player: PlayerId, experience_type: &str, amount: i32) {
        self.experience
            .lock()
            .unwrap()
            .push((player, experience_type.to_string(), amount));
    }

    fn add_bank_credits(&self, player: PlayerId, amount: i64) {
        *self.credits.lock().unwrap().entry(player).or_insert(0) += amount;
    }

    fn place_in_inventory(&self, player: PlayerId, item: ItemInstance) {
        self.items.lock().unwrap().push((player, item));
    }
}

/// Creates only the items it was told about
#[derive(Default)]
pub struct StubItems {
    known: Mutex<HashMap<String, String>>,
    next_id: AtomicU64,
}

impl StubItems {
    /// Make `name` creatable, both by loot name and by `template`
    pub fn allow(&self, name: &str, template: &str) {
        self.known
            .lock()
            .unwrap()
            .insert(name.to_string(), template.to_string());
    }

    fn make(&self, template: &str, display_name: &str) -> ItemInstance {
        ItemInstance {
            object_id: ObjectId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
            template: template.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

impl ItemFactory for StubItems {
    fn create_by_name(&self, name: &str) -> Option<ItemInstance> {
        let template = self.known.lock().unwrap().get(name).cloned()?;
        Some(self.make(&template, name))
    }

    fn create_from_template(&self, template: &str) -> Option<ItemInstance> {
        let name = self
            .known
            .lock()
            .unwrap()
            .iter()
            .find(|(_, known)| known.as_str() == template)
            .map(|(name, _)| name.clone())?;
        Some(self.make(template, &name))
    }
}

pub struct TestHooks {
    pub notifier: Arc<RecordingNotifier>,
    pub rewards: Arc<RecordingRewards>,
    pub items: Arc<StubItems>,
}

impl TestHooks {
    pub fn new() -> Self {
        Self {
            notifier: Arc::new(RecordingNotifier::default()),
            rewards: Arc::new(RecordingRewards::default()),
            items: Arc::new(StubItems::default()),
        }
    }

    pub fn hooks(&self) -> QuestHooks {
        QuestHooks {
            notifier: self.notifier.clone(),
            rewards: self.rewards.clone(),
            items: self.items.clone(),
        }
    }
}

/// Invisible task with no successors
pub fn task(index: usize, kind: TaskKind) -> TaskDefinition {
    TaskDefinition {
        index,
        visible: false,
        next_tasks_on_complete: Vec::new(),
        grant_quest_on_complete: None,
        kind,
    }
}

pub fn chain(mut task: TaskDefinition, next: &[usize]) -> TaskDefinition {
    task.next_tasks_on_complete = next.to_vec();
    task
}

pub fn quest(
    name: &str,
    repeatable: bool,
    complete_when_tasks_complete: bool,
    tasks: Vec<TaskDefinition>,
) -> Quest {
    Quest {
        definition: QuestDefinition {
            name: name.to_string(),
            title: name.to_string(),
            repeatable,
            complete_when_tasks_complete,
        },
        tasks,
    }
}
