//! Quest Engine
//!
//! Sole mutator of player quest state. Each player has one async mutex;
//! every operation (commands, kill events, timer firings) holds it for the
//! whole read-modify-write including the synchronous part of the cascade.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::protocol::{string_crc, ChatChannel, ProseArg, QuestMessage, QUEST_SYSTEM_TABLE};

use super::catalog::QuestCatalog;
use super::definition::{Quest, TaskDefinition};
use super::effects::{self, EffectContext, TaskOutcome};
use super::error::{QuestOutcome, QuestRejection};
use super::hooks::{PlayerId, QuestHooks, QuestNotifier};
use super::rewards::RewardGrantor;
use super::scheduler::{DeferredCompletion, DeferredTaskScheduler, TimerHandle};
use super::state::PlayerQuestState;

/// Tunables the engine passes down to its handlers
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Played for every visible task that becomes active
    pub journal_sound: String,
    pub comm_duration_secs: f32,
    /// How long shutdown waits for the timer worker
    pub shutdown_grace: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            journal_sound: "sound/ui_journal_updated.snd".to_string(),
            comm_duration_secs: 10.0,
            shutdown_grace: Duration::from_millis(1000),
        }
    }
}

/// Everything guarded by one player's lock
#[derive(Default)]
struct PlayerSlot {
    state: PlayerQuestState,
    /// Outstanding timers keyed by (quest, task)
    timers: HashMap<(String, usize), TimerHandle>,
}

struct EngineShared {
    catalog: Arc<QuestCatalog>,
    notifier: Arc<dyn QuestNotifier>,
    grantor: RewardGrantor,
    scheduler: DeferredTaskScheduler,
    settings: EngineSettings,
    players: DashMap<PlayerId, Arc<Mutex<PlayerSlot>>>,
    stop: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Cheaply cloneable handle to the running engine
#[derive(Clone)]
pub struct QuestEngine {
    shared: Arc<EngineShared>,
}

impl QuestEngine {
    /// Create the engine with its scheduler and start the timer worker.
    /// Must be called from within a tokio runtime.
    pub fn start(catalog: Arc<QuestCatalog>, hooks: QuestHooks, settings: EngineSettings) -> Self {
        let (scheduler, fired) = DeferredTaskScheduler::new();
        let shared = Arc::new(EngineShared {
            catalog,
            notifier: hooks.notifier.clone(),
            grantor: RewardGrantor::new(&hooks),
            scheduler,
            settings,
            players: DashMap::new(),
            stop: CancellationToken::new(),
            worker: Mutex::new(None),
        });

        let worker = tokio::spawn(run_timer_worker(
            Arc::downgrade(&shared),
            fired,
            shared.stop.clone(),
        ));
        if let Ok(mut slot) = shared.worker.try_lock() {
            *slot = Some(worker);
        }

        info!("Quest engine started with {} quests", shared.catalog.len());
        Self { shared }
    }

    pub fn catalog(&self) -> &Arc<QuestCatalog> {
        &self.shared.catalog
    }

    /// Add a quest to the player's journal with task 0 active
    pub async fn grant_quest(&self, player: PlayerId, quest_name: &str) -> QuestOutcome {
        if self.shared.catalog.definition(quest_name).is_none() {
            warn!("{} was granted unknown quest {}", player, quest_name);
            return QuestOutcome::Rejected(QuestRejection::UnknownQuest(quest_name.to_string()));
        }
        self.with_player(player, |pass| pass.grant(quest_name)).await
    }

    /// Drop an incomplete quest from the journal
    pub async fn abandon_quest(&self, player: PlayerId, quest_name: &str) -> QuestOutcome {
        self.with_existing_player(player, |pass| pass.abandon(quest_name))
            .await
            .unwrap_or_else(|| self.not_in_journal(player, quest_name))
    }

    /// Complete the given active tasks and continue from their successors
    pub async fn advance_quest(
        &self,
        player: PlayerId,
        quest_name: &str,
        tasks: &[usize],
    ) -> QuestOutcome {
        self.with_existing_player(player, |pass| pass.advance(quest_name, tasks))
            .await
            .unwrap_or_else(|| self.cannot_advance(player, quest_name))
    }

    /// Advance every task that is currently active
    pub async fn advance_active_tasks(&self, player: PlayerId, quest_name: &str) -> QuestOutcome {
        self.with_existing_player(player, |pass| {
            let tasks = pass.active_tasks(quest_name);
            pass.advance(quest_name, &tasks)
        })
        .await
        .unwrap_or_else(|| self.cannot_advance(player, quest_name))
    }

    /// Mark the quest complete, notifying the player only the first time
    pub async fn complete_quest(&self, player: PlayerId, quest_name: &str) -> QuestOutcome {
        self.with_existing_player(player, |pass| pass.complete(quest_name))
            .await
            .unwrap_or_else(|| self.not_in_journal(player, quest_name))
    }

    /// One-shot reward claim
    pub async fn claim_reward(&self, player: PlayerId, quest_name: &str) -> QuestOutcome {
        self.with_existing_player(player, |pass| pass.claim_reward(quest_name))
            .await
            .unwrap_or_else(|| self.not_in_journal(player, quest_name))
    }

    /// Snapshot of the player's journal
    pub async fn journal(&self, player: PlayerId) -> PlayerQuestState {
        let Some(slot) = self.existing_slot(player) else {
            return PlayerQuestState::default();
        };
        let guard = slot.lock().await;
        guard.state.clone()
    }

    /// Cancel every outstanding timer and stop the worker
    pub async fn shutdown(&self) {
        self.shared.scheduler.shutdown();
        self.shared.stop.cancel();

        let worker = self.shared.worker.lock().await.take();
        if let Some(worker) = worker {
            let grace = self.shared.settings.shutdown_grace;
            match tokio::time::timeout(grace, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Quest timer worker failed: {}", e),
                Err(_) => warn!("Quest timer worker did not stop within {:?}", grace),
            }
        }

        info!("Quest engine stopped");
    }

    /// Run `f` while holding the player's lock, creating the player's slot
    /// if this is their first quest
    async fn with_player<R>(
        &self,
        player: PlayerId,
        f: impl FnOnce(&mut QuestPass<'_>) -> R,
    ) -> R {
        let slot = self
            .shared
            .players
            .entry(player)
            .or_default()
            .value()
            .clone();
        let mut guard = slot.lock().await;
        let mut pass = QuestPass {
            shared: &self.shared,
            player,
            slot: &mut guard,
        };
        f(&mut pass)
    }

    /// Run `f` while holding the lock of a player who has been granted a
    /// quest before. Returns `None` without creating a slot otherwise.
    pub(crate) async fn with_existing_player<R>(
        &self,
        player: PlayerId,
        f: impl FnOnce(&mut QuestPass<'_>) -> R,
    ) -> Option<R> {
        let slot = self.existing_slot(player)?;
        let mut guard = slot.lock().await;
        let mut pass = QuestPass {
            shared: &self.shared,
            player,
            slot: &mut guard,
        };
        Some(f(&mut pass))
    }

    /// Rejection for a player with no journal at all
    fn not_in_journal(&self, player: PlayerId, quest_name: &str) -> QuestOutcome {
        warn!("{} has no quest journal, rejecting {}", player, quest_name);
        QuestOutcome::Rejected(QuestRejection::NotInJournal(quest_name.to_string()))
    }

    /// Advance checks the catalog before the journal
    fn cannot_advance(&self, player: PlayerId, quest_name: &str) -> QuestOutcome {
        if self.shared.catalog.definition(quest_name).is_none() {
            warn!("{} advanced unknown quest {}", player, quest_name);
            return QuestOutcome::Rejected(QuestRejection::UnknownQuest(quest_name.to_string()));
        }
        self.not_in_journal(player, quest_name)
    }

    /// Complete a timer task, unless the timer was cancelled or replaced
    /// while it was in flight
    pub(crate) async fn complete_deferred(&self, fired: DeferredCompletion) {
        let Some(slot) = self.existing_slot(fired.player) else {
            debug!("Dropping timer {} for unknown {}", fired.timer_id, fired.player);
            return;
        };
        let mut guard = slot.lock().await;

        let key = (fired.quest_name.clone(), fired.task);
        let current = guard.timers.get(&key).map(TimerHandle::id);
        if current != Some(fired.timer_id) {
            debug!(
                "Dropping stale timer {} for {} quest '{}' task {}",
                fired.timer_id, fired.player, fired.quest_name, fired.task
            );
            return;
        }
        guard.timers.remove(&key);

        let mut pass = QuestPass {
            shared: &self.shared,
            player: fired.player,
            slot: &mut guard,
        };
        pass.complete_timer(&fired.quest_name, fired.task);
    }

    fn existing_slot(&self, player: PlayerId) -> Option<Arc<Mutex<PlayerSlot>>> {
        self.shared
            .players
            .get(&player)
            .map(|slot| slot.value().clone())
    }

    #[cfg(test)]
    pub(crate) async fn pending_timer(&self, player: PlayerId, quest_name: &str, task: usize) -> Option<u64> {
        let slot = self.existing_slot(player)?;
        let guard = slot.lock().await;
        guard
            .timers
            .get(&(quest_name.to_string(), task))
            .map(TimerHandle::id)
    }
}

async fn run_timer_worker(
    engine: Weak<EngineShared>,
    mut fired: mpsc::UnboundedReceiver<DeferredCompletion>,
    stop: CancellationToken,
) {
    loop {
        let completion = tokio::select! {
            _ = stop.cancelled() => break,
            completion = fired.recv() => completion,
        };
        let Some(completion) = completion else {
            break;
        };
        let Some(shared) = engine.upgrade() else {
            break;
        };
        QuestEngine { shared }.complete_deferred(completion).await;
    }
    debug!("Quest timer worker exited");
}

/// One locked pass over a single player's quest state
pub(crate) struct QuestPass<'a> {
    shared: &'a EngineShared,
    player: PlayerId,
    slot: &'a mut PlayerSlot,
}

impl<'a> QuestPass<'a> {
    pub(crate) fn player(&self) -> PlayerId {
        self.player
    }

    pub(crate) fn catalog(&self) -> &'a QuestCatalog {
        let shared: &'a EngineShared = self.shared;
        &shared.catalog
    }

    pub(crate) fn notify(&self, message: QuestMessage) {
        self.shared.notifier.notify(self.player, message);
    }

    pub(crate) fn grant(&mut self, quest_name: &str) -> QuestOutcome {
        let Some(quest) = self.catalog().get(quest_name) else {
            warn!("{} was granted unknown quest {}", self.player, quest_name);
            return QuestOutcome::Rejected(QuestRejection::UnknownQuest(quest_name.to_string()));
        };
        if !quest.definition.repeatable && self.slot.state.in_journal(quest_name) {
            warn!("{} already had non-repeatable quest {}", self.player, quest_name);
            return QuestOutcome::Rejected(QuestRejection::AlreadyHeld(quest_name.to_string()));
        }

        self.cancel_timers(quest_name);
        self.slot.state.add_quest(quest_name).activate_task(0);
        info!("{} received quest {}", self.player, quest_name);

        self.run_cascade(quest, vec![0]);
        self.notify(QuestMessage::system(
            ChatChannel::Quest,
            QUEST_SYSTEM_TABLE,
            "quest_received",
            Some(ProseArg::To(quest.definition.title.clone())),
        ));
        QuestOutcome::Applied
    }

    pub(crate) fn abandon(&mut self, quest_name: &str) -> QuestOutcome {
        if !self.slot.state.in_journal(quest_name) {
            warn!("{} abandoned quest {} that was not in their journal", self.player, quest_name);
            return QuestOutcome::Rejected(QuestRejection::NotInJournal(quest_name.to_string()));
        }
        if self.slot.state.is_complete(quest_name) {
            warn!("{} attempted to abandon completed quest {}", self.player, quest_name);
            return QuestOutcome::Rejected(QuestRejection::AlreadyCompleted(quest_name.to_string()));
        }

        self.cancel_timers(quest_name);
        self.slot.state.remove_quest(quest_name);
        info!("{} abandoned quest {}", self.player, quest_name);
        QuestOutcome::Applied
    }

    pub(crate) fn advance(&mut self, quest_name: &str, tasks: &[usize]) -> QuestOutcome {
        let Some(quest) = self.catalog().get(quest_name) else {
            warn!("{} advanced unknown quest {}", self.player, quest_name);
            return QuestOutcome::Rejected(QuestRejection::UnknownQuest(quest_name.to_string()));
        };
        if !self.slot.state.in_journal(quest_name) {
            warn!(
                "{} advanced quest {} that was not in their quest journal",
                self.player, quest_name
            );
            return QuestOutcome::Rejected(QuestRejection::NotInJournal(quest_name.to_string()));
        }

        let mut finished = Vec::new();
        let mut newly_active = Vec::new();
        for &index in tasks {
            let Some(task) = quest.task(index) else {
                error!("Quest '{}' has no task {}", quest_name, index);
                continue;
            };
            if !self.is_task_active(quest_name, index) {
                debug!(
                    "{} advanced inactive task {} of quest {}",
                    self.player, index, quest_name
                );
                continue;
            }
            let successors = self.finish_task(quest_name, task);
            finished.push(index);
            for next in successors {
                debug!("{} advanced quest {}, activated task {}", self.player, quest_name, next);
                newly_active.push(next);
            }
        }

        let no_active_tasks = !self
            .slot
            .state
            .quest(quest_name)
            .is_some_and(|p| p.has_active_tasks());
        let completes_quest = no_active_tasks
            && quest.definition.complete_when_tasks_complete
            && self.mark_quest_complete(quest_name);

        let dispatch = if completes_quest {
            // Final effects of the tasks that finished the quest
            for &index in &finished {
                if let Some(task) = quest.task(index) {
                    if let TaskOutcome::Scheduled(handle) = self.dispatch_effects(quest_name, task) {
                        handle.cancel();
                    }
                }
            }
            finished
        } else {
            self.run_cascade(quest, newly_active.clone());
            newly_active
        };

        for index in dispatch {
            let chained = quest
                .task(index)
                .and_then(|task| task.grant_quest_on_complete.as_deref());
            if let Some(chained) = chained {
                self.grant(chained);
            }
        }

        QuestOutcome::Applied
    }

    pub(crate) fn complete(&mut self, quest_name: &str) -> QuestOutcome {
        if !self.slot.state.in_journal(quest_name) {
            warn!("{} completed quest {} that was not in their journal", self.player, quest_name);
            return QuestOutcome::Rejected(QuestRejection::NotInJournal(quest_name.to_string()));
        }
        if !self.mark_quest_complete(quest_name) {
            debug!("{} already completed quest {}", self.player, quest_name);
            return QuestOutcome::Rejected(QuestRejection::AlreadyCompleted(quest_name.to_string()));
        }
        QuestOutcome::Applied
    }

    pub(crate) fn claim_reward(&mut self, quest_name: &str) -> QuestOutcome {
        let Some(progress) = self.slot.state.quest_mut(quest_name) else {
            warn!(
                "{} claimed reward for quest {} that was not in their journal",
                self.player, quest_name
            );
            return QuestOutcome::Rejected(QuestRejection::NotInJournal(quest_name.to_string()));
        };
        if !progress.mark_reward_received() {
            warn!(
                "{} attempted to claim reward for quest {} but they have already received it",
                self.player, quest_name
            );
            return QuestOutcome::Rejected(QuestRejection::RewardAlreadyReceived(
                quest_name.to_string(),
            ));
        }
        info!("{} claimed reward for quest {}", self.player, quest_name);
        QuestOutcome::Applied
    }

    /// Bump the counter of an active, armed task
    pub(crate) fn increment_counter(&mut self, quest_name: &str, task: usize) -> Option<i32> {
        let progress = self.slot.state.quest_mut(quest_name)?;
        if !progress.is_active(task) {
            return None;
        }
        progress.increment_counter(task)
    }

    pub(crate) fn is_task_active(&self, quest_name: &str, task: usize) -> bool {
        self.slot
            .state
            .quest(quest_name)
            .is_some_and(|p| p.is_active(task))
    }

    pub(crate) fn active_tasks(&self, quest_name: &str) -> Vec<usize> {
        self.slot
            .state
            .quest(quest_name)
            .map(|p| p.active_tasks().collect())
            .unwrap_or_default()
    }

    pub(crate) fn is_quest_complete(&self, quest_name: &str) -> bool {
        self.slot.state.is_complete(quest_name)
    }

    pub(crate) fn incomplete_quests(&self) -> Vec<String> {
        self.slot.state.incomplete_quest_names()
    }

    fn complete_timer(&mut self, quest_name: &str, index: usize) {
        let Some(quest) = self.catalog().get(quest_name) else {
            return;
        };
        let Some(task) = quest.task(index) else {
            error!("Quest '{}' has no task {}", quest_name, index);
            return;
        };
        if !self.is_task_active(quest_name, index) {
            debug!(
                "Timer for {} quest '{}' task {} found the task inactive",
                self.player, quest_name, index
            );
            return;
        }

        debug!("{} timer finished quest {} task {}", self.player, quest_name, index);
        let successors = self.finish_task(quest_name, task);
        self.run_cascade(quest, successors);
    }

    /// Move an active task to completed and activate its successors.
    /// Returns the successors that were not already active or completed.
    fn finish_task(&mut self, quest_name: &str, task: &TaskDefinition) -> Vec<usize> {
        if !self.is_task_active(quest_name, task.index) {
            return Vec::new();
        }
        if let Some(timer) = self.slot.timers.remove(&(quest_name.to_string(), task.index)) {
            timer.cancel();
        }

        let Some(progress) = self.slot.state.quest_mut(quest_name) else {
            return Vec::new();
        };
        if !progress.complete_task(task.index) {
            return Vec::new();
        }
        task.next_tasks_on_complete
            .iter()
            .copied()
            .filter(|&next| progress.activate_task(next))
            .collect()
    }

    /// Dispatch effects for `initial` and everything that completes
    /// synchronously after it
    fn run_cascade(&mut self, quest: &Quest, initial: Vec<usize>) {
        let quest_name = quest.name();
        let mut queue: VecDeque<usize> = initial.into();
        let mut visited = HashSet::new();

        while let Some(index) = queue.pop_front() {
            if !visited.insert(index) {
                warn!(
                    "Cascade for {} quest '{}' revisited task {}",
                    self.player, quest_name, index
                );
                continue;
            }
            let Some(task) = quest.task(index) else {
                error!("Quest '{}' has no task {}", quest_name, index);
                continue;
            };
            if !self.is_task_active(quest_name, index) {
                trace!("Skipping inactive task {} of quest '{}'", index, quest_name);
                continue;
            }

            match self.dispatch_effects(quest_name, task) {
                TaskOutcome::Completed => queue.extend(self.finish_task(quest_name, task)),
                TaskOutcome::CompleteQuest => {
                    self.mark_quest_complete(quest_name);
                    queue.extend(self.finish_task(quest_name, task));
                }
                TaskOutcome::Scheduled(handle) => {
                    let key = (quest_name.to_string(), index);
                    if let Some(previous) = self.slot.timers.insert(key, handle) {
                        previous.cancel();
                    }
                }
                TaskOutcome::Pending | TaskOutcome::Skipped => {}
            }
        }
    }

    fn dispatch_effects(&mut self, quest_name: &str, task: &TaskDefinition) -> TaskOutcome {
        let shared = self.shared;
        let mut ctx = EffectContext {
            player: self.player,
            quest_name,
            state: &mut self.slot.state,
            notifier: shared.notifier.as_ref(),
            grantor: &shared.grantor,
            scheduler: &shared.scheduler,
            settings: &shared.settings,
        };
        effects::dispatch(&mut ctx, task)
    }

    /// Returns false if the quest was missing or already complete
    fn mark_quest_complete(&mut self, quest_name: &str) -> bool {
        let Some(progress) = self.slot.state.quest_mut(quest_name) else {
            return false;
        };
        if !progress.mark_complete() {
            return false;
        }

        self.cancel_timers(quest_name);
        self.notify(QuestMessage::QuestCompleted {
            quest_name: quest_name.to_string(),
            quest_crc: string_crc(quest_name),
        });
        info!("{} completed quest {}", self.player, quest_name);
        true
    }

    fn cancel_timers(&mut self, quest_name: &str) {
        self.slot.timers.retain(|(quest, _), handle| {
            if quest == quest_name {
                handle.cancel();
                false
            } else {
                true
            }
        });
    }
}
