//! Quest State Tracking
//!
//! Per-player journal: which tasks of each accepted quest are active or
//! completed, destroy counters, and completion/reward flags.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Progress of one quest in a player's journal.
///
/// A task index is never both active and completed. Counters only exist for
/// tasks that were armed as destroy tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestProgress {
    active_tasks: BTreeSet<usize>,
    completed_tasks: BTreeSet<usize>,
    counters: BTreeMap<usize, i32>,
    complete: bool,
    reward_received: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuestProgress {
    pub fn new() -> Self {
        Self {
            active_tasks: BTreeSet::new(),
            completed_tasks: BTreeSet::new(),
            counters: BTreeMap::new(),
            complete: false,
            reward_received: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Make a task active. Returns false if it is already active or was
    /// already completed.
    pub fn activate_task(&mut self, task: usize) -> bool {
        if self.completed_tasks.contains(&task) {
            return false;
        }
        self.active_tasks.insert(task)
    }

    /// Move a task from active to completed. Returns false if the task was
    /// not active, so only one caller ever wins a given completion.
    pub fn complete_task(&mut self, task: usize) -> bool {
        if !self.active_tasks.remove(&task) {
            return false;
        }
        self.completed_tasks.insert(task);
        true
    }

    pub fn is_active(&self, task: usize) -> bool {
        self.active_tasks.contains(&task)
    }

    pub fn is_task_completed(&self, task: usize) -> bool {
        self.completed_tasks.contains(&task)
    }

    pub fn active_tasks(&self) -> impl Iterator<Item = usize> + '_ {
        self.active_tasks.iter().copied()
    }

    pub fn completed_tasks(&self) -> impl Iterator<Item = usize> + '_ {
        self.completed_tasks.iter().copied()
    }

    pub fn has_active_tasks(&self) -> bool {
        !self.active_tasks.is_empty()
    }

    /// Reset a destroy counter to zero
    pub fn arm_counter(&mut self, task: usize) {
        self.counters.insert(task, 0);
    }

    /// Increment an armed counter. Unarmed tasks are left alone.
    pub fn increment_counter(&mut self, task: usize) -> Option<i32> {
        let counter = self.counters.get_mut(&task)?;
        *counter += 1;
        Some(*counter)
    }

    pub fn counter(&self, task: usize) -> Option<i32> {
        self.counters.get(&task).copied()
    }

    /// Returns false if the quest was already complete
    pub fn mark_complete(&mut self) -> bool {
        if self.complete {
            return false;
        }
        self.complete = true;
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn reward_received(&self) -> bool {
        self.reward_received
    }

    /// Returns false if the reward was already received
    pub fn mark_reward_received(&mut self) -> bool {
        !std::mem::replace(&mut self.reward_received, true)
    }
}

impl Default for QuestProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// All quest state for a single player
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerQuestState {
    quests: BTreeMap<String, QuestProgress>,
    faction_points: BTreeMap<String, i32>,
}

impl PlayerQuestState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_journal(&self, quest_name: &str) -> bool {
        self.quests.contains_key(quest_name)
    }

    pub fn is_complete(&self, quest_name: &str) -> bool {
        self.quests.get(quest_name).is_some_and(QuestProgress::is_complete)
    }

    pub fn reward_received(&self, quest_name: &str) -> bool {
        self.quests
            .get(quest_name)
            .is_some_and(QuestProgress::reward_received)
    }

    /// Add a quest with fresh progress, replacing any earlier run of it
    pub fn add_quest(&mut self, quest_name: &str) -> &mut QuestProgress {
        let progress = self.quests.entry(quest_name.to_string()).or_default();
        *progress = QuestProgress::new();
        progress
    }

    pub fn remove_quest(&mut self, quest_name: &str) -> Option<QuestProgress> {
        self.quests.remove(quest_name)
    }

    pub fn quest(&self, quest_name: &str) -> Option<&QuestProgress> {
        self.quests.get(quest_name)
    }

    pub fn quest_mut(&mut self, quest_name: &str) -> Option<&mut QuestProgress> {
        self.quests.get_mut(quest_name)
    }

    pub fn incomplete_quest_names(&self) -> Vec<String> {
        self.quests
            .iter()
            .filter(|(_, progress)| !progress.is_complete())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns the new total for the faction
    pub fn adjust_faction_points(&mut self, faction: &str, amount: i32) -> i32 {
        let points = self.faction_points.entry(faction.to_string()).or_insert(0);
        *points = points.saturating_add(amount);
        *points
    }

    pub fn faction_points(&self, faction: &str) -> i32 {
        self.faction_points.get(faction).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_sets_stay_disjoint() {
        let mut progress = QuestProgress::new();
        assert!(progress.activate_task(0));
        assert!(!progress.activate_task(0));

        assert!(progress.complete_task(0));
        assert!(!progress.complete_task(0));
        assert!(progress.is_task_completed(0));
        assert!(!progress.is_active(0));

        // A completed task cannot come back
        assert!(!progress.activate_task(0));
        assert!(!progress.has_active_tasks());
        assert_eq!(progress.completed_tasks().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_counters_need_arming() {
        let mut progress = QuestProgress::new();
        assert_eq!(progress.increment_counter(1), None);

        progress.arm_counter(1);
        assert_eq!(progress.counter(1), Some(0));
        assert_eq!(progress.increment_counter(1), Some(1));
        assert_eq!(progress.increment_counter(1), Some(2));
        assert_eq!(progress.counter(2), None);
    }

    #[test]
    fn test_flags_flip_once() {
        let mut progress = QuestProgress::new();
        assert!(progress.mark_complete());
        assert!(!progress.mark_complete());
        assert!(progress.completed_at.is_some());

        assert!(progress.mark_reward_received());
        assert!(!progress.mark_reward_received());
    }

    #[test]
    fn test_add_quest_resets_progress() {
        let mut state = PlayerQuestState::new();
        {
            let progress = state.add_quest("courier");
            progress.activate_task(0);
            progress.complete_task(0);
            progress.mark_complete();
        }
        assert!(state.is_complete("courier"));
        assert!(state.incomplete_quest_names().is_empty());

        state.add_quest("courier");
        assert!(state.in_journal("courier"));
        assert!(!state.is_complete("courier"));
        assert_eq!(state.incomplete_quest_names(), vec!["courier".to_string()]);
    }

    #[test]
    fn test_faction_points() {
        let mut state = PlayerQuestState::new();
        assert_eq!(state.adjust_faction_points("rebel", 25), 25);
        assert_eq!(state.adjust_faction_points("rebel", -5), 20);
        assert_eq!(state.faction_points("imperial"), 0);
    }
}
