//! Serializable registry snapshots.
//!
//! The registry itself is storage agnostic. Callers that need durability
//! take a [`RegistrySnapshot`] after a successful call and restore from it
//! on start-up.

use crate::config::RegistryConfig;
use crate::errors::*;
use crate::ledger::AccountLedger;
use crate::registry::StarRegistry;
use serde::{Deserialize, Serialize};
use starnotary_types::{AccountId, Amount, Star, StarId};
use std::collections::HashSet;

/// One star with its owner and listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarRecord {
    pub id: StarId,
    pub name: String,
    pub symbol: String,
    pub owner: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Amount>,
}

/// Full registry state, sorted by star id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub stars: Vec<StarRecord>,
}

impl RegistrySnapshot {
    /// Check the ownership invariants a live registry maintains.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.stars.len());
        for record in &self.stars {
            if !seen.insert(record.id) {
                return Err(StarRegistryError::DuplicateIdentifier { star_id: record.id });
            }
            if record.name.is_empty() {
                return Err(StarRegistryError::InvalidArgument(format!(
                    "star {} has an empty name",
                    record.id
                )));
            }
            if record.symbol.is_empty() {
                return Err(StarRegistryError::InvalidArgument(format!(
                    "star {} has an empty symbol",
                    record.id
                )));
            }
            if record.owner.is_null() {
                return Err(StarRegistryError::InvalidArgument(format!(
                    "star {} is owned by the null account",
                    record.id
                )));
            }
            if record.price == Some(0) {
                return Err(StarRegistryError::InvalidArgument(format!(
                    "star {} is listed at price zero",
                    record.id
                )));
            }
        }
        Ok(())
    }
}

impl<L: AccountLedger> StarRegistry<L> {
    /// Consistent copy of every star.
    ///
    /// Holds all shard read locks at once, taken in ascending order.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let guards: Vec<_> = self.shards().iter().map(|shard| shard.read()).collect();
        let mut stars: Vec<StarRecord> = guards
            .iter()
            .flat_map(|shard| {
                shard.stars.iter().filter_map(move |(id, star)| {
                    let owner = shard.owners.get(id)?;
                    Some(StarRecord {
                        id: *id,
                        name: star.name.clone(),
                        symbol: star.symbol.clone(),
                        owner: *owner,
                        price: shard.for_sale.get(id).copied(),
                    })
                })
            })
            .collect();
        drop(guards);

        stars.sort_by_key(|record| record.id);
        RegistrySnapshot { stars }
    }

    /// Rebuild a registry from a snapshot.
    pub fn restore(config: RegistryConfig, snapshot: RegistrySnapshot, ledger: L) -> Result<Self> {
        snapshot.validate()?;

        let registry = Self::with_account_ledger(config, ledger);
        for record in snapshot.stars {
            let mut shard = registry.shard(record.id).write();
            shard.insert(
                record.id,
                Star {
                    name: record.name,
                    symbol: record.symbol,
                },
                record.owner,
            );
            if let Some(price) = record.price {
                shard.for_sale.insert(record.id, price);
            }
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryAccountLedger;

    fn record(id: u64, owner: AccountId) -> StarRecord {
        StarRecord {
            id: StarId(id),
            name: format!("star-{}", id),
            symbol: "SNT".into(),
            owner,
            price: None,
        }
    }

    #[test]
    fn test_snapshot_restore_preserves_state() {
        let alice = AccountId::from_label("alice");
        let bob = AccountId::from_label("bob");
        let registry = StarRegistry::default();
        registry.create_star("One", StarId(1), "", &alice).unwrap();
        registry.create_star("Two", StarId(2), "TW", &bob).unwrap();
        registry.create_star("Seventeen", StarId(17), "", &alice).unwrap();
        registry.put_up_for_sale(StarId(17), 300, &alice).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot.stars.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![StarId(1), StarId(2), StarId(17)]
        );

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: RegistrySnapshot = serde_json::from_str(&json).unwrap();
        let restored = StarRegistry::restore(
            RegistryConfig::default(),
            decoded,
            InMemoryAccountLedger::new(),
        )
        .unwrap();

        assert_eq!(restored.owner_of(StarId(2)).unwrap(), bob);
        assert_eq!(restored.lookup(StarId(2)).unwrap().symbol, "TW");
        assert_eq!(restored.sale_price(StarId(17)).unwrap(), Some(300));
        assert_eq!(restored.stars_of(&alice), vec![StarId(1), StarId(17)]);
        assert_eq!(restored.snapshot(), snapshot);
    }

    #[test]
    fn test_restore_with_different_shard_count() {
        let alice = AccountId::from_label("alice");
        let snapshot = RegistrySnapshot {
            stars: (1..=20).map(|id| record(id, alice)).collect(),
        };
        let restored = StarRegistry::restore(
            RegistryConfig {
                shard_count: 3,
                ..RegistryConfig::default()
            },
            snapshot,
            InMemoryAccountLedger::new(),
        )
        .unwrap();

        assert_eq!(restored.total_supply(), 20);
        assert_eq!(restored.balance_of(&alice), 20);
    }

    #[test]
    fn test_validate_rejects_broken_documents() {
        let alice = AccountId::from_label("alice");

        let duplicate = RegistrySnapshot {
            stars: vec![record(1, alice), record(1, alice)],
        };
        assert!(matches!(
            duplicate.validate(),
            Err(StarRegistryError::DuplicateIdentifier { .. })
        ));

        let null_owner = RegistrySnapshot {
            stars: vec![record(1, AccountId::NULL)],
        };
        assert!(null_owner.validate().is_err());

        let mut zero_price = record(2, alice);
        zero_price.price = Some(0);
        assert!(RegistrySnapshot { stars: vec![zero_price] }.validate().is_err());

        let mut nameless = record(3, alice);
        nameless.name.clear();
        assert!(RegistrySnapshot { stars: vec![nameless] }.validate().is_err());
    }
}
