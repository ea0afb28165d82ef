//! Quest error types

use std::path::PathBuf;

use thiserror::Error;

/// Content problems found while loading the quest catalog.
/// Any of these stops the server from starting.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("quest '{quest}' is defined more than once")]
    DuplicateQuest { quest: String },

    #[error("quest '{quest}' has no tasks")]
    NoTasks { quest: String },

    #[error("quest '{quest}' task at position {position} declares index {declared}")]
    TaskIndexMismatch {
        quest: String,
        position: usize,
        declared: usize,
    },

    #[error("quest '{quest}' task {task} activates missing task {next}")]
    TaskIndexOutOfRange {
        quest: String,
        task: usize,
        next: usize,
    },

    #[error("quest '{quest}' task {task} has min_time {min_time} above max_time {max_time}")]
    InvalidTimer {
        quest: String,
        task: usize,
        min_time: u32,
        max_time: u32,
    },
}

/// Why an engine operation turned into a no-op
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestRejection {
    #[error("quest '{0}' is not in the catalog")]
    UnknownQuest(String),

    #[error("non-repeatable quest '{0}' is already in the journal")]
    AlreadyHeld(String),

    #[error("quest '{0}' is not in the journal")]
    NotInJournal(String),

    #[error("quest '{0}' is already complete")]
    AlreadyCompleted(String),

    #[error("reward for quest '{0}' was already received")]
    RewardAlreadyReceived(String),
}

/// Result of an engine operation. Rejections are already logged by the
/// engine; callers are free to ignore them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestOutcome {
    Applied,
    Rejected(QuestRejection),
}

impl QuestOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, QuestOutcome::Applied)
    }

    pub fn rejection(&self) -> Option<&QuestRejection> {
        match self {
            QuestOutcome::Applied => None,
            QuestOutcome::Rejected(reason) => Some(reason),
        }
    }
}
