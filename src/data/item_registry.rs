use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::quest::hooks::{ItemFactory, ItemInstance, ObjectId};

use super::item_def::{ItemDefinition, RawItemDefinition};

/// Registry for all item definitions. Also hands out item instances for
/// quest rewards.
pub struct ItemRegistry {
    items: HashMap<String, ItemDefinition>,
    /// template -> loot name
    by_template: HashMap<String, String>,
    next_object_id: AtomicU64,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            by_template: HashMap::new(),
            next_object_id: AtomicU64::new(1),
        }
    }

    /// Load all item definitions from `<data_dir>/items/*.toml`
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<(), String> {
        let items_dir = data_dir.join("items");

        if !items_dir.exists() {
            warn!("Items directory does not exist: {:?}", items_dir);
            return Ok(());
        }

        let entries = std::fs::read_dir(&items_dir)
            .map_err(|e| format!("Failed to read items directory: {}", e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

            // Parse as table of items keyed by loot name
            let table: HashMap<String, RawItemDefinition> = toml::from_str(&content)
                .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

            for (loot_name, raw) in table {
                if self.items.contains_key(&loot_name) {
                    warn!("Duplicate item '{}' in {:?}, overwriting", loot_name, path);
                }
                self.insert(ItemDefinition::from_raw(&loot_name, &raw));
            }
        }

        info!("Loaded {} item definitions", self.items.len());

        Ok(())
    }

    pub fn insert(&mut self, item: ItemDefinition) {
        self.by_template
            .insert(item.template.clone(), item.loot_name.clone());
        self.items.insert(item.loot_name.clone(), item);
    }

    /// Get an item definition by loot name
    pub fn get(&self, loot_name: &str) -> Option<&ItemDefinition> {
        self.items.get(loot_name)
    }

    pub fn get_by_template(&self, template: &str) -> Option<&ItemDefinition> {
        self.by_template
            .get(template)
            .and_then(|loot_name| self.items.get(loot_name))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn instantiate(&self, item: &ItemDefinition) -> ItemInstance {
        let object_id = ObjectId(self.next_object_id.fetch_add(1, Ordering::Relaxed));
        debug!("Created item {} ({:?})", item.loot_name, object_id);
        ItemInstance {
            object_id,
            template: item.template.clone(),
            display_name: item.display_name.clone(),
        }
    }
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemFactory for ItemRegistry {
    fn create_by_name(&self, name: &str) -> Option<ItemInstance> {
        self.get(name).map(|item| self.instantiate(item))
    }

    fn create_from_template(&self, template: &str) -> Option<ItemInstance> {
        self.get_by_template(template)
            .map(|item| self.instantiate(item))
    }
}
