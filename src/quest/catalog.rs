//! Quest Catalog
//!
//! Loads quest definitions from TOML files once at startup. The catalog is
//! immutable afterwards and shared by every player.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::definition::{Quest, QuestDefinition, RawQuestFile, TaskDefinition};
use super::error::CatalogError;

/// Read-only lookup of quest definitions by name
#[derive(Debug, Default)]
pub struct QuestCatalog {
    quests: HashMap<String, Arc<Quest>>,
}

impl QuestCatalog {
    /// Load every `*.toml` under `<data_dir>/quests`, including subdirectories.
    /// Any parse or index error is fatal.
    pub fn load_from_directory(data_dir: &Path) -> Result<Self, CatalogError> {
        let quest_dir = data_dir.join("quests");
        info!("Loading quests from {:?}", quest_dir);

        if !quest_dir.exists() {
            warn!("Quest directory does not exist: {:?}", quest_dir);
            return Ok(Self::default());
        }

        let mut paths = Vec::new();
        collect_toml_files(&quest_dir, &mut paths)?;
        paths.sort();

        let mut quests = Vec::with_capacity(paths.len());
        for path in paths {
            let quest = load_quest_file(&path)?;
            info!("Loaded quest: {} ({} tasks)", quest.definition.name, quest.tasks.len());
            quests.push(quest);
        }

        let catalog = Self::from_quests(quests)?;
        info!("Loaded {} quest definitions", catalog.len());
        Ok(catalog)
    }

    /// Build a catalog from already resolved quests
    pub fn from_quests(quests: impl IntoIterator<Item = Quest>) -> Result<Self, CatalogError> {
        let mut map = HashMap::new();
        for quest in quests {
            quest.validate()?;
            let name = quest.definition.name.clone();
            if map.insert(name.clone(), Arc::new(quest)).is_some() {
                return Err(CatalogError::DuplicateQuest { quest: name });
            }
        }

        let catalog = Self { quests: map };
        catalog.check_references();
        Ok(catalog)
    }

    /// Chained quests and task cycles are allowed but suspicious
    fn check_references(&self) {
        for quest in self.quests.values() {
            for task in &quest.tasks {
                if let Some(ref chained) = task.grant_quest_on_complete {
                    if !self.quests.contains_key(chained) {
                        warn!(
                            "Quest '{}' task {} grants non-existent quest '{}'",
                            quest.definition.name, task.index, chained
                        );
                    }
                }
            }

            if let Some(task) = quest.find_cycle() {
                warn!(
                    "Quest '{}' has a task cycle through task {}",
                    quest.definition.name, task
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Quest>> {
        self.quests.get(name)
    }

    pub fn definition(&self, name: &str) -> Option<&QuestDefinition> {
        self.quests.get(name).map(|quest| &quest.definition)
    }

    pub fn tasks(&self, name: &str) -> Option<&[TaskDefinition]> {
        self.quests.get(name).map(|quest| quest.tasks.as_slice())
    }

    pub fn task(&self, name: &str, index: usize) -> Option<&TaskDefinition> {
        self.quests.get(name).and_then(|quest| quest.task(index))
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }
}

fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), CatalogError> {
    let io_err = |source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    };

    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }

    Ok(())
}

fn load_quest_file(path: &Path) -> Result<Quest, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let raw: RawQuestFile = toml::from_str(&content).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Quest::from_raw(&raw.quest)
}
