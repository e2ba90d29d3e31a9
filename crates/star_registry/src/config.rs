//! Registry configuration.

use serde::{Deserialize, Serialize};
use starnotary_types::DEFAULT_SYMBOL;

/// Configuration for [`crate::StarRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Number of independently locked star partitions.
    pub shard_count: usize,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Symbol given to stars created with an empty symbol.
    pub default_symbol: String,
    /// Name of the star collection as a whole.
    pub collection_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            shard_count: 16,
            event_capacity: 256,
            default_symbol: DEFAULT_SYMBOL.to_string(),
            collection_name: "Star Notary".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Clamp values that would make the registry unusable.
    pub(crate) fn normalised(mut self) -> Self {
        self.shard_count = self.shard_count.max(1);
        self.event_capacity = self.event_capacity.max(1);
        if self.default_symbol.is_empty() {
            self.default_symbol = DEFAULT_SYMBOL.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_are_clamped() {
        let config = RegistryConfig {
            shard_count: 0,
            event_capacity: 0,
            default_symbol: String::new(),
            ..RegistryConfig::default()
        }
        .normalised();

        assert_eq!(config.shard_count, 1);
        assert_eq!(config.event_capacity, 1);
        assert_eq!(config.default_symbol, "SNT");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: RegistryConfig = serde_json::from_str(r#"{"shard_count": 4}"#).unwrap();
        assert_eq!(config.shard_count, 4);
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.collection_name, "Star Notary");
    }
}
