//! In-memory player ledger: experience, bank credits and inventory handed
//! out by quest rewards.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::quest::hooks::{ItemInstance, PlayerId, RewardSink};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerEntry {
    /// Experience by type
    pub experience: BTreeMap<String, i64>,
    pub bank_credits: i64,
    pub inventory: Vec<ItemInstance>,
}

#[derive(Default)]
pub struct PlayerLedger {
    entries: DashMap<PlayerId, LedgerEntry>,
}

impl PlayerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, player: PlayerId) -> LedgerEntry {
        self.entries
            .get(&player)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

impl RewardSink for PlayerLedger {
    fn grant_experience(&self, player: PlayerId, experience_type: &str, amount: i32) {
        let mut entry = self.entries.entry(player).or_default();
        *entry
            .experience
            .entry(experience_type.to_string())
            .or_insert(0) += i64::from(amount);
    }

    fn add_bank_credits(&self, player: PlayerId, amount: i64) {
        let mut entry = self.entries.entry(player).or_default();
        entry.bank_credits = entry.bank_credits.saturating_add(amount);
        debug!("{} bank balance is now {}", player, entry.bank_credits);
    }

    fn place_in_inventory(&self, player: PlayerId, item: ItemInstance) {
        self.entries.entry(player).or_default().inventory.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::hooks::ObjectId;

    #[test]
    fn test_ledger_accumulates() {
        let ledger = PlayerLedger::new();
        ledger.grant_experience(PlayerId(1), "combat_general", 100);
        ledger.grant_experience(PlayerId(1), "combat_general", 50);
        ledger.add_bank_credits(PlayerId(1), 200);
        ledger.add_bank_credits(PlayerId(1), -25);
        ledger.place_in_inventory(
            PlayerId(1),
            ItemInstance {
                object_id: ObjectId(9),
                template: "object/tangible/food/rebel_ration.iff".to_string(),
                display_name: "Rebel Ration".to_string(),
            },
        );

        let entry = ledger.snapshot(PlayerId(1));
        assert_eq!(entry.experience.get("combat_general"), Some(&150));
        assert_eq!(entry.bank_credits, 175);
        assert_eq!(entry.inventory.len(), 1);

        assert_eq!(ledger.snapshot(PlayerId(2)), LedgerEntry::default());
    }
}
