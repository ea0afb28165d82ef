//! Reward delivery for reward tasks.
//!
//! Every part of a reward is granted independently. A missing field or an
//! item that cannot be created skips that part only.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::protocol::{ChatChannel, ProseArg, QuestMessage, QUEST_SYSTEM_TABLE};

use super::definition::{ItemGrant, TaskReward};
use super::hooks::{ItemFactory, ItemInstance, PlayerId, QuestHooks, QuestNotifier, RewardSink};
use super::state::PlayerQuestState;

#[derive(Clone)]
pub struct RewardGrantor {
    rewards: Arc<dyn RewardSink>,
    items: Arc<dyn ItemFactory>,
    notifier: Arc<dyn QuestNotifier>,
}

impl RewardGrantor {
    pub fn new(hooks: &QuestHooks) -> Self {
        Self {
            rewards: hooks.rewards.clone(),
            items: hooks.items.clone(),
            notifier: hooks.notifier.clone(),
        }
    }

    /// Grant every present part of `reward`. Faction points live in the
    /// quest state, the rest goes to the reward sink.
    pub fn grant(&self, player: PlayerId, state: &mut PlayerQuestState, reward: &TaskReward) {
        if let Some(ref experience) = reward.experience {
            self.rewards
                .grant_experience(player, &experience.experience_type, experience.amount);
            debug!(
                "Granted {} {} experience to {}",
                experience.amount, experience.experience_type, player
            );
        }

        if let Some(ref faction) = reward.faction {
            let total = state.adjust_faction_points(&faction.faction, faction.amount);
            debug!(
                "Adjusted {} faction points for {} by {} (now {})",
                faction.faction, player, faction.amount, total
            );
        }

        if reward.bank_credits != 0 {
            self.rewards.add_bank_credits(player, reward.bank_credits);
            debug!("Added {} bank credits for {}", reward.bank_credits, player);
        }

        if let Some(ref loot) = reward.loot {
            self.grant_items(player, loot, |name| self.items.create_by_name(name));
        }

        if let Some(ref items) = reward.items {
            self.grant_items(player, items, |template| self.items.create_from_template(template));
        }
    }

    fn grant_items(
        &self,
        player: PlayerId,
        grant: &ItemGrant,
        create: impl Fn(&str) -> Option<ItemInstance>,
    ) {
        for _ in 0..grant.count {
            let Some(item) = create(&grant.name) else {
                warn!("Could not create reward item '{}' for {}", grant.name, player);
                continue;
            };
            self.place(player, item);
        }
    }

    fn place(&self, player: PlayerId, item: ItemInstance) {
        let message = QuestMessage::system(
            ChatChannel::Personal,
            QUEST_SYSTEM_TABLE,
            "placed_in_inventory",
            Some(ProseArg::To(item.display_name.clone())),
        );
        self.rewards.place_in_inventory(player, item);
        self.notifier.notify(player, message);
    }
}
