use serde::Deserialize;

// ============================================================================
// Raw Item Definition (direct from TOML)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawItemDefinition {
    /// Server template the item is created from
    pub template: String,
    pub display_name: Option<String>,
}

// ============================================================================
// Resolved Item Definition
// ============================================================================

/// An item reward can refer to by loot name (the table key) or template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDefinition {
    pub loot_name: String,
    pub template: String,
    pub display_name: String,
}

impl ItemDefinition {
    pub fn from_raw(loot_name: &str, raw: &RawItemDefinition) -> Self {
        Self {
            loot_name: loot_name.to_string(),
            template: raw.template.clone(),
            display_name: raw
                .display_name
                .clone()
                .unwrap_or_else(|| loot_name.to_string()),
        }
    }
}
