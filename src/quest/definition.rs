//! Quest Definition Structures
//!
//! Raw structures are deserialized from TOML quest files and then resolved
//! into typed definitions where each task kind carries only its own fields.

use serde::{Deserialize, Serialize};

use super::error::CatalogError;

/// Task types may be written with or without this prefix
const TASK_TYPE_PREFIX: &str = "quest.task.ground.";

/// A quest file as it appears on disk
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestFile {
    pub quest: RawQuest,
}

/// Raw quest data as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuest {
    pub name: String,
    /// Journal title shown when the quest is received
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub complete_when_tasks_complete: bool,
    #[serde(default)]
    pub tasks: Vec<RawTask>,
}

/// Raw task as it appears in TOML. Every type-specific field is optional
/// here; resolution keeps only what the task type needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTask {
    /// Optional explicit index, must match the task's position
    pub index: Option<usize>,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub next_tasks: Vec<usize>,
    pub grant_quest_on_complete: Option<String>,

    // timer
    pub min_time: Option<u32>,
    pub max_time: Option<u32>,

    // show_message_box
    pub message_box_title: Option<String>,
    pub message_box_text: Option<String>,

    // comm_player
    pub comm_message_text: Option<String>,
    pub npc_appearance_template: Option<String>,

    // reward
    pub experience_type: Option<String>,
    #[serde(default)]
    pub experience_amount: i32,
    pub faction_name: Option<String>,
    #[serde(default)]
    pub faction_amount: i32,
    #[serde(default)]
    pub bank_credits: i64,
    pub loot_name: Option<String>,
    #[serde(default)]
    pub loot_count: u32,
    pub item_template: Option<String>,
    #[serde(default)]
    pub item_count: u32,

    // destroy_multi
    pub social_group: Option<String>,
    pub target_template: Option<String>,
    #[serde(default = "default_count")]
    pub count: i32,
}

fn default_count() -> i32 {
    1
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Resolved Quest Structures
// ============================================================================

/// Quest-level metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestDefinition {
    pub name: String,
    pub title: String,
    pub repeatable: bool,
    /// Complete the quest when an advance leaves no task active
    pub complete_when_tasks_complete: bool,
}

/// Which creatures count towards a destroy_multi task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KillTarget {
    pub social_group: Option<String>,
    pub server_template: Option<String>,
}

impl KillTarget {
    /// Social group matches case-insensitively, template must match exactly
    pub fn matches(&self, social_group: Option<&str>, template: &str) -> bool {
        let group_match = match (self.social_group.as_deref(), social_group) {
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            _ => false,
        };
        group_match || self.server_template.as_deref() == Some(template)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperienceReward {
    pub experience_type: String,
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactionReward {
    pub faction: String,
    pub amount: i32,
}

/// `count` copies of an item identified by loot name or template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemGrant {
    pub name: String,
    pub count: u32,
}

/// Everything a reward task can hand out. Absent parts are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskReward {
    pub experience: Option<ExperienceReward>,
    pub faction: Option<FactionReward>,
    pub bank_credits: i64,
    pub loot: Option<ItemGrant>,
    pub items: Option<ItemGrant>,
}

impl TaskReward {
    fn from_raw(raw: &RawTask) -> Self {
        Self {
            experience: non_blank(&raw.experience_type).map(|experience_type| ExperienceReward {
                experience_type,
                amount: raw.experience_amount,
            }),
            faction: non_blank(&raw.faction_name).map(|faction| FactionReward {
                faction,
                amount: raw.faction_amount,
            }),
            bank_credits: raw.bank_credits,
            loot: non_blank(&raw.loot_name)
                .filter(|_| raw.loot_count > 0)
                .map(|name| ItemGrant { name, count: raw.loot_count }),
            items: non_blank(&raw.item_template)
                .filter(|_| raw.item_count > 0)
                .map(|name| ItemGrant { name, count: raw.item_count }),
        }
    }
}

/// Closed set of task kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaskKind {
    CommPlayer {
        text: String,
        npc_appearance: Option<String>,
    },
    CompleteQuest,
    /// Completes by itself after a random delay in `[min_time, max_time)` seconds
    Timer { min_time: u32, max_time: u32 },
    ShowMessageBox { title: String, text: String },
    DestroyMulti { target: KillTarget, count: i32 },
    Reward(TaskReward),
    /// Type this server has no handler for; dispatch skips it
    Unsupported { type_name: String },
}

impl TaskKind {
    pub fn from_raw(raw: &RawTask) -> Self {
        let type_name = raw.task_type.trim();
        let short = type_name.strip_prefix(TASK_TYPE_PREFIX).unwrap_or(type_name);

        match short {
            "comm_player" => TaskKind::CommPlayer {
                text: raw.comm_message_text.clone().unwrap_or_default(),
                npc_appearance: non_blank(&raw.npc_appearance_template),
            },
            "complete_quest" => TaskKind::CompleteQuest,
            "timer" => {
                let min_time = raw.min_time.unwrap_or(0);
                TaskKind::Timer {
                    min_time,
                    max_time: raw.max_time.unwrap_or(min_time),
                }
            }
            "show_message_box" => TaskKind::ShowMessageBox {
                title: raw.message_box_title.clone().unwrap_or_default(),
                text: raw.message_box_text.clone().unwrap_or_default(),
            },
            "destroy_multi" => TaskKind::DestroyMulti {
                target: KillTarget {
                    social_group: non_blank(&raw.social_group),
                    server_template: non_blank(&raw.target_template),
                },
                count: raw.count,
            },
            "reward" => TaskKind::Reward(TaskReward::from_raw(raw)),
            _ => TaskKind::Unsupported {
                type_name: type_name.to_string(),
            },
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            TaskKind::CommPlayer { .. } => "comm_player",
            TaskKind::CompleteQuest => "complete_quest",
            TaskKind::Timer { .. } => "timer",
            TaskKind::ShowMessageBox { .. } => "show_message_box",
            TaskKind::DestroyMulti { .. } => "destroy_multi",
            TaskKind::Reward(_) => "reward",
            TaskKind::Unsupported { type_name } => type_name,
        }
    }
}

/// A resolved task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDefinition {
    /// Position in the quest's task list
    pub index: usize,
    pub visible: bool,
    /// Successors activated when this task completes
    pub next_tasks_on_complete: Vec<usize>,
    /// Quest granted once this task is reached by an advance
    pub grant_quest_on_complete: Option<String>,
    pub kind: TaskKind,
}

impl TaskDefinition {
    pub fn from_raw(index: usize, raw: &RawTask) -> Self {
        Self {
            index,
            visible: raw.visible,
            next_tasks_on_complete: raw.next_tasks.clone(),
            grant_quest_on_complete: non_blank(&raw.grant_quest_on_complete),
            kind: TaskKind::from_raw(raw),
        }
    }
}

/// A fully resolved quest: metadata plus its ordered task list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quest {
    pub definition: QuestDefinition,
    pub tasks: Vec<TaskDefinition>,
}

impl Quest {
    /// Create a Quest from raw TOML data
    pub fn from_raw(raw: &RawQuest) -> Result<Self, CatalogError> {
        let mut tasks = Vec::with_capacity(raw.tasks.len());
        for (position, raw_task) in raw.tasks.iter().enumerate() {
            if let Some(declared) = raw_task.index {
                if declared != position {
                    return Err(CatalogError::TaskIndexMismatch {
                        quest: raw.name.clone(),
                        position,
                        declared,
                    });
                }
            }
            tasks.push(TaskDefinition::from_raw(position, raw_task));
        }

        let title = if raw.title.trim().is_empty() {
            raw.name.clone()
        } else {
            raw.title.clone()
        };

        let quest = Self {
            definition: QuestDefinition {
                name: raw.name.clone(),
                title,
                repeatable: raw.repeatable,
                complete_when_tasks_complete: raw.complete_when_tasks_complete,
            },
            tasks,
        };
        quest.validate()?;
        Ok(quest)
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn task(&self, index: usize) -> Option<&TaskDefinition> {
        self.tasks.get(index)
    }

    /// Check that every index in the task graph points inside the task list
    pub fn validate(&self) -> Result<(), CatalogError> {
        let name = &self.definition.name;
        if self.tasks.is_empty() {
            return Err(CatalogError::NoTasks { quest: name.clone() });
        }

        for (position, task) in self.tasks.iter().enumerate() {
            if task.index != position {
                return Err(CatalogError::TaskIndexMismatch {
                    quest: name.clone(),
                    position,
                    declared: task.index,
                });
            }
            if let Some(&next) = task
                .next_tasks_on_complete
                .iter()
                .find(|&&next| next >= self.tasks.len())
            {
                return Err(CatalogError::TaskIndexOutOfRange {
                    quest: name.clone(),
                    task: position,
                    next,
                });
            }
            if let TaskKind::Timer { min_time, max_time } = task.kind {
                if min_time > max_time {
                    return Err(CatalogError::InvalidTimer {
                        quest: name.clone(),
                        task: position,
                        min_time,
                        max_time,
                    });
                }
            }
        }

        Ok(())
    }

    /// Find a task that sits on a cycle of the task graph, if any.
    /// Assumes `validate` passed.
    pub fn find_cycle(&self) -> Option<usize> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(tasks: &[TaskDefinition], index: usize, marks: &mut [Mark]) -> Option<usize> {
            match marks[index] {
                Mark::Done => return None,
                Mark::InProgress => return Some(index),
                Mark::Unvisited => {}
            }
            marks[index] = Mark::InProgress;
            for &next in &tasks[index].next_tasks_on_complete {
                if let Some(found) = visit(tasks, next, marks) {
                    return Some(found);
                }
            }
            marks[index] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::Unvisited; self.tasks.len()];
        (0..self.tasks.len()).find_map(|index| visit(&self.tasks, index, &mut marks))
    }
}
