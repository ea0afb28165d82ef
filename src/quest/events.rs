//! Quest Event Types
//!
//! World events that drive quest progress, and the adapter that turns them
//! into counter increments and advances on the engine.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::protocol::{ChatChannel, ProseArg, QuestMessage, GROUND_QUESTS_TABLE};

use super::definition::TaskKind;
use super::engine::QuestEngine;
use super::hooks::{CreatureId, PlayerId};

/// Where an AI creature came from. Only spawned creatures count for quests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnerInfo {
    #[serde(default)]
    pub social_group: Option<String>,
    /// Server template the creature was spawned from
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpse {
    pub creature_id: CreatureId,
    /// `None` for anything that is not an AI creature
    #[serde(default)]
    pub spawner: Option<SpawnerInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Killer {
    pub creature_id: CreatureId,
    /// Owning player, if the killer is a player or a player's pet
    #[serde(default)]
    pub owner: Option<PlayerId>,
}

/// A creature died
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillEvent {
    pub corpse: Corpse,
    pub killer: Killer,
}

/// One destroy task that counted a kill
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KillProgress {
    pub quest_name: String,
    pub task: usize,
    pub counter: i32,
    pub remaining: i32,
}

/// Feeds kill events into the engine
#[derive(Clone)]
pub struct TriggerAdapter {
    engine: QuestEngine,
}

impl TriggerAdapter {
    pub fn new(engine: QuestEngine) -> Self {
        Self { engine }
    }

    /// Count a kill against every matching active destroy task of every
    /// incomplete quest the killer's owner holds
    pub async fn handle_kill(&self, event: &KillEvent) -> Vec<KillProgress> {
        let Some(spawner) = event.corpse.spawner.as_ref() else {
            trace!("Ignoring kill of non-AI creature {:?}", event.corpse.creature_id);
            return Vec::new();
        };
        let Some(owner) = event.killer.owner else {
            trace!("Ignoring kill by ownerless {:?}", event.killer.creature_id);
            return Vec::new();
        };

        self.engine
            .with_existing_player(owner, |pass| {
                let catalog = pass.catalog();
                let mut progress = Vec::new();

                for quest_name in pass.incomplete_quests() {
                    for index in pass.active_tasks(&quest_name) {
                        let Some(task) = catalog.task(&quest_name, index) else {
                            continue;
                        };
                        let TaskKind::DestroyMulti { target, count } = &task.kind else {
                            continue;
                        };
                        if !target.matches(spawner.social_group.as_deref(), &spawner.template) {
                            continue;
                        }
                        // An earlier match in this kill may have completed the quest
                        if pass.is_quest_complete(&quest_name) {
                            break;
                        }
                        let Some(counter) = pass.increment_counter(&quest_name, index) else {
                            continue;
                        };

                        let remaining = count - counter;
                        debug!(
                            "{} remaining kills required on quest {} for {}",
                            remaining,
                            quest_name,
                            pass.player()
                        );
                        pass.notify(QuestMessage::task_counter(&quest_name, index, counter, *count));
                        pass.notify(QuestMessage::system(
                            ChatChannel::Personal,
                            GROUND_QUESTS_TABLE,
                            "destroy_multiple_success",
                            Some(ProseArg::Di(remaining)),
                        ));

                        progress.push(KillProgress {
                            quest_name: quest_name.clone(),
                            task: index,
                            counter,
                            remaining,
                        });

                        if remaining <= 0 {
                            pass.advance(&quest_name, &[index]);
                        }
                    }
                }

                progress
            })
            .await
            .unwrap_or_default()
    }

    /// Consume kill events until the sender side closes
    pub async fn run(self, mut kills: mpsc::Receiver<KillEvent>) {
        info!("Kill event adapter started");
        while let Some(event) = kills.recv().await {
            let progress = self.handle_kill(&event).await;
            if !progress.is_empty() {
                trace!("Kill of {:?} counted for {} tasks", event.corpse.creature_id, progress.len());
            }
        }
        info!("Kill event adapter stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::quest::catalog::QuestCatalog;
    use crate::quest::definition::{KillTarget, Quest, TaskDefinition};
    use crate::quest::engine::EngineSettings;
    use crate::quest::testing::{chain, quest, task, TestHooks};

    const P: PlayerId = PlayerId(1);

    fn destroy(index: usize, social_group: Option<&str>, template: Option<&str>, count: i32) -> TaskDefinition {
        task(
            index,
            TaskKind::DestroyMulti {
                target: KillTarget {
                    social_group: social_group.map(str::to_string),
                    server_template: template.map(str::to_string),
                },
                count,
            },
        )
    }

    fn kill(social_group: Option<&str>, template: &str, owner: Option<PlayerId>) -> KillEvent {
        KillEvent {
            corpse: Corpse {
                creature_id: CreatureId(100),
                spawner: Some(SpawnerInfo {
                    social_group: social_group.map(str::to_string),
                    template: template.to_string(),
                }),
            },
            killer: Killer {
                creature_id: CreatureId(200),
                owner,
            },
        }
    }

    fn rat_kill() -> KillEvent {
        kill(Some("womp_rat"), "object/mobile/womp_rat.iff", Some(P))
    }

    fn setup(quests: Vec<Quest>) -> (QuestEngine, TriggerAdapter, TestHooks) {
        let hooks = TestHooks::new();
        let catalog = QuestCatalog::from_quests(quests).unwrap();
        let engine = QuestEngine::start(Arc::new(catalog), hooks.hooks(), EngineSettings::default());
        let adapter = TriggerAdapter::new(engine.clone());
        (engine, adapter, hooks)
    }

    #[tokio::test]
    async fn test_three_kills_complete_task() {
        let quests = vec![quest(
            "rats",
            false,
            true,
            vec![chain(destroy(0, Some("womp_rat"), None, 3), &[1]), destroy(1, Some("tusken"), None, 1)],
        )];
        let (engine, adapter, hooks) = setup(quests);
        engine.grant_quest(P, "rats").await;

        let counters: Vec<i32> = [
            adapter.handle_kill(&rat_kill()).await,
            adapter.handle_kill(&rat_kill()).await,
            adapter.handle_kill(&rat_kill()).await,
        ]
        .iter()
        .flat_map(|progress| progress.iter().map(|p| p.counter))
        .collect();
        assert_eq!(counters, vec![1, 2, 3]);

        let journal = engine.journal(P).await;
        let progress = journal.quest("rats").unwrap();
        assert!(progress.is_task_completed(0));
        assert_eq!(progress.active_tasks().collect::<Vec<_>>(), vec![1]);
        assert_eq!(progress.counter(0), Some(3));

        // A fourth kill changes nothing
        assert!(adapter.handle_kill(&rat_kill()).await.is_empty());
        let journal = engine.journal(P).await;
        assert_eq!(journal.quest("rats").unwrap().counter(0), Some(3));

        let remaining: Vec<i32> = hooks
            .notifier
            .messages(P)
            .into_iter()
            .filter_map(|m| match m {
                QuestMessage::SystemMessage {
                    prose: Some(ProseArg::Di(remaining)),
                    ..
                } => Some(remaining),
                _ => None,
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_one_kill_counts_for_two_quests() {
        let quests = vec![
            quest("rats", false, true, vec![destroy(0, Some("womp_rat"), None, 5)]),
            quest(
                "pests",
                false,
                true,
                vec![destroy(0, None, Some("object/mobile/womp_rat.iff"), 2)],
            ),
        ];
        let (engine, adapter, _hooks) = setup(quests);
        engine.grant_quest(P, "rats").await;
        engine.grant_quest(P, "pests").await;

        let progress = adapter.handle_kill(&rat_kill()).await;
        assert_eq!(progress.len(), 2);

        let journal = engine.journal(P).await;
        assert_eq!(journal.quest("rats").unwrap().counter(0), Some(1));
        assert_eq!(journal.quest("pests").unwrap().counter(0), Some(1));
    }

    #[tokio::test]
    async fn test_social_group_ignores_case() {
        let quests = vec![quest("rats", false, true, vec![destroy(0, Some("Womp_Rat"), None, 1)])];
        let (engine, adapter, _hooks) = setup(quests);
        engine.grant_quest(P, "rats").await;

        adapter
            .handle_kill(&kill(Some("WOMP_RAT"), "object/mobile/other.iff", Some(P)))
            .await;
        assert!(engine.journal(P).await.is_complete("rats"));
    }

    #[tokio::test]
    async fn test_ignored_kills() {
        let quests = vec![quest("rats", false, true, vec![destroy(0, Some("womp_rat"), None, 2)])];
        let (engine, adapter, _hooks) = setup(quests);
        engine.grant_quest(P, "rats").await;

        // No owner
        adapter
            .handle_kill(&kill(Some("womp_rat"), "object/mobile/womp_rat.iff", None))
            .await;
        // Not an AI creature
        let mut not_ai = rat_kill();
        not_ai.corpse.spawner = None;
        adapter.handle_kill(&not_ai).await;
        // Wrong target
        adapter
            .handle_kill(&kill(Some("tusken"), "object/mobile/tusken.iff", Some(P)))
            .await;
        // Different player
        adapter
            .handle_kill(&kill(Some("womp_rat"), "object/mobile/womp_rat.iff", Some(PlayerId(9))))
            .await;

        let journal = engine.journal(P).await;
        assert_eq!(journal.quest("rats").unwrap().counter(0), Some(0));
    }

    #[tokio::test]
    async fn test_kill_stops_counting_once_quest_completes() {
        let quests = vec![quest(
            "rats",
            false,
            false,
            vec![
                chain(
                    task(
                        0,
                        TaskKind::CommPlayer {
                            text: "go".to_string(),
                            npc_appearance: None,
                        },
                    ),
                    &[1, 2],
                ),
                chain(destroy(1, Some("womp_rat"), None, 1), &[3]),
                destroy(2, Some("womp_rat"), None, 5),
                task(3, TaskKind::CompleteQuest),
            ],
        )];
        let (engine, adapter, _hooks) = setup(quests);
        engine.grant_quest(P, "rats").await;

        let progress = adapter.handle_kill(&rat_kill()).await;
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].task, 1);

        let journal = engine.journal(P).await;
        let rats = journal.quest("rats").unwrap();
        assert!(rats.is_complete());
        assert_eq!(rats.counter(2), Some(0));
    }

    #[tokio::test]
    async fn test_kill_for_player_without_quests() {
        let quests = vec![quest("rats", false, true, vec![destroy(0, Some("womp_rat"), None, 1)])];
        let (engine, adapter, _hooks) = setup(quests);

        let progress = adapter
            .handle_kill(&kill(Some("womp_rat"), "object/mobile/womp_rat.iff", Some(PlayerId(42))))
            .await;
        assert!(progress.is_empty());
        assert_eq!(engine.journal(PlayerId(42)).await, Default::default());
    }

    #[tokio::test]
    async fn test_completed_quests_are_skipped() {
        let quests = vec![quest("rats", false, false, vec![destroy(0, Some("womp_rat"), None, 2)])];
        let (engine, adapter, _hooks) = setup(quests);
        engine.grant_quest(P, "rats").await;
        engine.complete_quest(P, "rats").await;

        assert!(adapter.handle_kill(&rat_kill()).await.is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let quests = vec![quest("rats", false, true, vec![destroy(0, Some("womp_rat"), None, 2)])];
        let (engine, adapter, _hooks) = setup(quests);
        engine.grant_quest(P, "rats").await;

        let (tx, rx) = mpsc::channel(4);
        let worker = tokio::spawn(adapter.run(rx));
        tx.send(rat_kill()).await.unwrap();
        tx.send(rat_kill()).await.unwrap();
        drop(tx);
        worker.await.unwrap();

        assert!(engine.journal(P).await.is_complete("rats"));
    }

    #[test]
    fn test_kill_event_from_json() {
        let event: KillEvent = serde_json::from_str(
            r#"{
                "corpse": {"creature_id": 42, "spawner": {"social_group": "womp_rat", "template": "object/mobile/womp_rat.iff"}},
                "killer": {"creature_id": 7, "owner": 1}
            }"#,
        )
        .unwrap();
        assert_eq!(event.killer.owner, Some(PlayerId(1)));
        assert_eq!(
            event.corpse.spawner.and_then(|s| s.social_group).as_deref(),
            Some("womp_rat")
        );

        let ownerless: KillEvent = serde_json::from_str(
            r#"{"corpse": {"creature_id": 42}, "killer": {"creature_id": 7}}"#,
        )
        .unwrap();
        assert_eq!(ownerless.killer.owner, None);
        assert_eq!(ownerless.corpse.spawner, None);
    }
}
