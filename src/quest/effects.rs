//! Task effect handlers.
//!
//! `dispatch` runs the side effects of one newly active task and reports
//! whether the task completed on the spot. The engine owns the cascade;
//! handlers never touch the task graph themselves.

use tracing::{debug, trace};

use crate::protocol::{shared_template, string_crc, QuestMessage};

use super::definition::{TaskDefinition, TaskKind};
use super::engine::EngineSettings;
use super::hooks::{PlayerId, QuestNotifier};
use super::rewards::RewardGrantor;
use super::scheduler::{DeferredTaskScheduler, TimerHandle};
use super::state::PlayerQuestState;

/// What the engine should do with a task after its effects ran
#[derive(Debug)]
pub enum TaskOutcome {
    /// Finished synchronously; successors continue the cascade
    Completed,
    /// Finished synchronously and the whole quest is now complete
    CompleteQuest,
    /// Completes later when the timer fires
    Scheduled(TimerHandle),
    /// Waits for an external trigger
    Pending,
    /// No handler for this task type
    Skipped,
}

/// Everything a handler may touch while the player's state is locked
pub struct EffectContext<'a> {
    pub player: PlayerId,
    pub quest_name: &'a str,
    pub state: &'a mut PlayerQuestState,
    pub notifier: &'a dyn QuestNotifier,
    pub grantor: &'a RewardGrantor,
    pub scheduler: &'a DeferredTaskScheduler,
    pub settings: &'a EngineSettings,
}

impl EffectContext<'_> {
    fn notify(&self, message: QuestMessage) {
        self.notifier.notify(self.player, message);
    }
}

pub fn dispatch(ctx: &mut EffectContext<'_>, task: &TaskDefinition) -> TaskOutcome {
    if task.visible {
        ctx.notify(QuestMessage::PlayMusic {
            sound: ctx.settings.journal_sound.clone(),
        });
    }

    trace!(
        "Dispatching {} task {} of quest '{}' for {}",
        task.kind.type_name(),
        task.index,
        ctx.quest_name,
        ctx.player
    );

    match &task.kind {
        TaskKind::CommPlayer {
            text,
            npc_appearance,
        } => {
            ctx.notify(QuestMessage::CommPlayer {
                text: text.clone(),
                appearance_crc: appearance_crc(npc_appearance.as_deref()),
                duration_secs: ctx.settings.comm_duration_secs,
            });
            TaskOutcome::Completed
        }
        TaskKind::CompleteQuest => TaskOutcome::CompleteQuest,
        TaskKind::Timer { min_time, max_time } => {
            let delay = DeferredTaskScheduler::random_delay(*min_time, *max_time);
            let handle = ctx
                .scheduler
                .schedule(ctx.player, ctx.quest_name, task.index, delay);
            TaskOutcome::Scheduled(handle)
        }
        TaskKind::ShowMessageBox { title, text } => {
            ctx.notify(QuestMessage::message_box(title, text));
            TaskOutcome::Completed
        }
        TaskKind::DestroyMulti { count, .. } => {
            if let Some(progress) = ctx.state.quest_mut(ctx.quest_name) {
                progress.arm_counter(task.index);
            }
            ctx.notify(QuestMessage::task_counter(ctx.quest_name, task.index, 0, *count));
            TaskOutcome::Pending
        }
        TaskKind::Reward(reward) => {
            ctx.grantor.grant(ctx.player, ctx.state, reward);
            TaskOutcome::Completed
        }
        TaskKind::Unsupported { type_name } => {
            debug!(
                "No handler for task type '{}' (quest '{}' task {})",
                type_name, ctx.quest_name, task.index
            );
            TaskOutcome::Skipped
        }
    }
}

/// Without an NPC template the client shows the player's own character
fn appearance_crc(npc_appearance: Option<&str>) -> u32 {
    npc_appearance.map_or(0, |template| string_crc(&shared_template(template)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::definition::KillTarget;
    use crate::quest::testing::{task, TestHooks};

    fn run(hooks: &TestHooks, state: &mut PlayerQuestState, task: &TaskDefinition) -> TaskOutcome {
        let (scheduler, _rx) = DeferredTaskScheduler::new();
        let grantor = RewardGrantor::new(&hooks.hooks());
        let settings = EngineSettings::default();
        let mut ctx = EffectContext {
            player: PlayerId(1),
            quest_name: "courier",
            state,
            notifier: &*hooks.notifier,
            grantor: &grantor,
            scheduler: &scheduler,
            settings: &settings,
        };
        dispatch(&mut ctx, task)
    }

    #[test]
    fn test_visible_task_plays_journal_sound() {
        let hooks = TestHooks::new();
        let mut state = PlayerQuestState::new();
        let mut def = task(
            0,
            TaskKind::ShowMessageBox {
                title: "Welcome".to_string(),
                text: "Report to the captain.".to_string(),
            },
        );
        def.visible = true;

        assert!(matches!(run(&hooks, &mut state, &def), TaskOutcome::Completed));

        let messages = hooks.notifier.messages(PlayerId(1));
        assert_eq!(
            messages[0],
            QuestMessage::PlayMusic {
                sound: "sound/ui_journal_updated.snd".to_string()
            }
        );
        assert_eq!(messages[1], QuestMessage::message_box("Welcome", "Report to the captain."));
    }

    #[test]
    fn test_comm_appearance() {
        let hooks = TestHooks::new();
        let mut state = PlayerQuestState::new();
        let def = task(
            0,
            TaskKind::CommPlayer {
                text: "@quest/ground/courier:comm".to_string(),
                npc_appearance: Some("object/mobile/dressed_rebel_trooper.iff".to_string()),
            },
        );
        run(&hooks, &mut state, &def);

        let fallback = task(
            1,
            TaskKind::CommPlayer {
                text: "hello".to_string(),
                npc_appearance: None,
            },
        );
        run(&hooks, &mut state, &fallback);

        let messages = hooks.notifier.messages(PlayerId(1));
        let expected = string_crc("object/mobile/shared_dressed_rebel_trooper.iff");
        assert!(matches!(
            messages[0],
            QuestMessage::CommPlayer { appearance_crc, duration_secs, .. }
                if appearance_crc == expected && duration_secs == 10.0
        ));
        assert!(matches!(messages[1], QuestMessage::CommPlayer { appearance_crc: 0, .. }));
    }

    #[test]
    fn test_destroy_multi_arms_counter() {
        let hooks = TestHooks::new();
        let mut state = PlayerQuestState::new();
        state.add_quest("courier").activate_task(2);

        let def = task(
            2,
            TaskKind::DestroyMulti {
                target: KillTarget {
                    social_group: Some("womp_rat".to_string()),
                    server_template: None,
                },
                count: 5,
            },
        );
        assert!(matches!(run(&hooks, &mut state, &def), TaskOutcome::Pending));
        assert_eq!(state.quest("courier").and_then(|p| p.counter(2)), Some(0));
        assert_eq!(
            hooks.notifier.messages(PlayerId(1)),
            vec![QuestMessage::task_counter("courier", 2, 0, 5)]
        );
    }

    #[test]
    fn test_unsupported_is_silent() {
        let hooks = TestHooks::new();
        let mut state = PlayerQuestState::new();
        let def = task(
            0,
            TaskKind::Unsupported {
                type_name: "quest.task.ground.go_to_location".to_string(),
            },
        );
        assert!(matches!(run(&hooks, &mut state, &def), TaskOutcome::Skipped));
        assert!(hooks.notifier.messages(PlayerId(1)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_is_scheduled() {
        let hooks = TestHooks::new();
        let mut state = PlayerQuestState::new();
        let def = task(
            0,
            TaskKind::Timer {
                min_time: 0,
                max_time: 1,
            },
        );
        let outcome = run(&hooks, &mut state, &def);
        assert!(matches!(outcome, TaskOutcome::Scheduled(ref handle) if !handle.is_cancelled()));
    }
}
