//! Star registry implementation
//!
//! Stars are partitioned into shards by identifier. Every shard holds the
//! metadata, ownership and listing tables for its stars, plus the matching
//! fragment of the owner index, behind one `RwLock`. A mutation takes the
//! write lock of each shard it touches for its whole duration, so it commits
//! as a unit.
//!
//! Lock order: shards in ascending index, then the account ledger.

use crate::config::RegistryConfig;
use crate::errors::*;
use crate::events::{EventBus, StarEvent};
use crate::ledger::{AccountLedger, InMemoryAccountLedger};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use starnotary_types::{AccountId, Amount, Star, StarId};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Receipt for a completed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub star_id: StarId,
    pub seller: AccountId,
    pub buyer: AccountId,
    /// Amount moved from buyer to seller.
    pub price: Amount,
    /// Attached payment above the price. Never moved by the registry.
    pub excess: Amount,
}

/// Source of the funds attached to a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Funding {
    /// Arrives with the call and is escrowed into the buyer's account.
    Attached,
    /// Drawn from the buyer's existing ledger balance.
    Account,
}

#[derive(Debug, Default)]
pub(crate) struct Shard {
    pub(crate) stars: HashMap<StarId, Star>,
    pub(crate) owners: HashMap<StarId, AccountId>,
    /// Only strictly positive prices are stored.
    pub(crate) for_sale: HashMap<StarId, Amount>,
    pub(crate) owner_to_stars: HashMap<AccountId, BTreeSet<StarId>>,
}

impl Shard {
    fn owner(&self, star_id: StarId) -> Result<AccountId> {
        self.owners
            .get(&star_id)
            .copied()
            .ok_or(StarRegistryError::NotFound { star_id })
    }

    pub(crate) fn insert(&mut self, star_id: StarId, star: Star, owner: AccountId) {
        self.stars.insert(star_id, star);
        self.owners.insert(star_id, owner);
        self.owner_to_stars.entry(owner).or_default().insert(star_id);
    }

    /// Move a star to `new_owner` and drop its listing.
    fn set_owner(&mut self, star_id: StarId, new_owner: AccountId) {
        if let Some(previous) = self.owners.insert(star_id, new_owner) {
            if let Some(held) = self.owner_to_stars.get_mut(&previous) {
                held.remove(&star_id);
                if held.is_empty() {
                    self.owner_to_stars.remove(&previous);
                }
            }
        }
        self.owner_to_stars
            .entry(new_owner)
            .or_default()
            .insert(star_id);
        self.for_sale.remove(&star_id);
    }
}

/// Star Registry
///
/// Ownership ledger for stars. Create once, share behind an `Arc`.
#[derive(Debug)]
pub struct StarRegistry<L: AccountLedger = InMemoryAccountLedger> {
    config: RegistryConfig,
    shards: Vec<RwLock<Shard>>,
    ledger: Mutex<L>,
    events: EventBus,
}

impl StarRegistry<InMemoryAccountLedger> {
    /// Create an empty registry with an empty in-memory ledger.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_account_ledger(config, InMemoryAccountLedger::new())
    }
}

impl Default for StarRegistry<InMemoryAccountLedger> {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl<L: AccountLedger> StarRegistry<L> {
    /// Create an empty registry settling payments through `ledger`.
    pub fn with_account_ledger(config: RegistryConfig, ledger: L) -> Self {
        let config = config.normalised();
        let shards = (0..config.shard_count)
            .map(|_| RwLock::new(Shard::default()))
            .collect();
        let events = EventBus::new(config.event_capacity);
        Self {
            config,
            shards,
            ledger: Mutex::new(ledger),
            events,
        }
    }

    /// Name of the star collection.
    pub fn name(&self) -> &str {
        &self.config.collection_name
    }

    /// Symbol of the star collection.
    pub fn symbol(&self) -> &str {
        &self.config.default_symbol
    }

    /// Subscribe to events for mutations committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StarEvent> {
        self.events.subscribe()
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Create a new star owned by `caller`.
    pub fn create_star(
        &self,
        name: &str,
        star_id: StarId,
        symbol: &str,
        caller: &AccountId,
    ) -> Result<()> {
        self.try_create_star(name, star_id, symbol, caller)
            .inspect_err(|err| log_rejection("create_star", star_id, err))
    }

    /// List a star for sale. A price of zero removes the listing.
    pub fn put_up_for_sale(&self, star_id: StarId, price: Amount, caller: &AccountId) -> Result<()> {
        self.try_put_up_for_sale(star_id, price, caller)
            .inspect_err(|err| log_rejection("put_up_for_sale", star_id, err))
    }

    /// Remove a star's listing.
    pub fn withdraw_from_sale(&self, star_id: StarId, caller: &AccountId) -> Result<()> {
        self.try_put_up_for_sale(star_id, 0, caller)
            .inspect_err(|err| log_rejection("withdraw_from_sale", star_id, err))
    }

    /// Buy a listed star with funds attached to the call.
    ///
    /// `payment` arrives with the call and is escrowed into the buyer's
    /// ledger account. Exactly the listing price then moves to the seller;
    /// the rest is reported as [`Purchase::excess`] and stays with the buyer.
    pub fn buy_star(&self, star_id: StarId, payment: Amount, buyer: &AccountId) -> Result<Purchase> {
        self.try_buy_star(star_id, payment, buyer, Funding::Attached)
            .inspect_err(|err| log_rejection("buy_star", star_id, err))
    }

    /// Buy a listed star, attaching `payment` out of the buyer's ledger balance.
    ///
    /// Fails with [`StarRegistryError::Payment`] when the buyer holds less
    /// than `payment`. Only the price leaves the buyer's account.
    pub fn buy_star_from_account(
        &self,
        star_id: StarId,
        payment: Amount,
        buyer: &AccountId,
    ) -> Result<Purchase> {
        self.try_buy_star(star_id, payment, buyer, Funding::Account)
            .inspect_err(|err| log_rejection("buy_star", star_id, err))
    }

    /// Swap the owners of two stars. `caller` must own at least one of them.
    pub fn exchange_stars(&self, first: StarId, second: StarId, caller: &AccountId) -> Result<()> {
        self.try_exchange_stars(first, second, caller)
            .inspect_err(|err| log_rejection("exchange_stars", first, err))
    }

    /// Hand a star to another account.
    pub fn transfer_star(&self, to: &AccountId, star_id: StarId, caller: &AccountId) -> Result<()> {
        self.try_transfer_star(to, star_id, caller)
            .inspect_err(|err| log_rejection("transfer_star", star_id, err))
    }

    fn try_create_star(
        &self,
        name: &str,
        star_id: StarId,
        symbol: &str,
        caller: &AccountId,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(StarRegistryError::InvalidArgument(
                "star name must not be empty".into(),
            ));
        }
        if caller.is_null() {
            return Err(StarRegistryError::InvalidArgument(
                "null account cannot own a star".into(),
            ));
        }

        let mut shard = self.shard(star_id).write();
        if shard.stars.contains_key(&star_id) {
            return Err(StarRegistryError::DuplicateIdentifier { star_id });
        }

        let star = Star::new(name, symbol, &self.config.default_symbol);
        info!(
            target: "star_registry",
            "Created star {} ({} / {}) for {}",
            star_id,
            star.name,
            star.symbol,
            caller
        );
        shard.insert(star_id, star, *caller);
        self.events.publish(StarEvent::Created {
            star_id,
            owner: *caller,
        });
        Ok(())
    }

    fn try_put_up_for_sale(&self, star_id: StarId, price: Amount, caller: &AccountId) -> Result<()> {
        let mut shard = self.shard(star_id).write();
        if shard.owner(star_id)? != *caller {
            return Err(StarRegistryError::NotOwner { star_id });
        }

        if price == 0 {
            shard.for_sale.remove(&star_id);
            info!(target: "star_registry", "Star {} withdrawn from sale", star_id);
            self.events.publish(StarEvent::Delisted { star_id });
        } else {
            shard.for_sale.insert(star_id, price);
            info!(target: "star_registry", "Star {} listed at {}", star_id, price);
            self.events.publish(StarEvent::Listed { star_id, price });
        }
        Ok(())
    }

    fn try_buy_star(
        &self,
        star_id: StarId,
        payment: Amount,
        buyer: &AccountId,
        funding: Funding,
    ) -> Result<Purchase> {
        if buyer.is_null() {
            return Err(StarRegistryError::InvalidArgument(
                "null account cannot buy a star".into(),
            ));
        }

        let mut shard = self.shard(star_id).write();
        let seller = shard.owner(star_id)?;
        let price = shard
            .for_sale
            .get(&star_id)
            .copied()
            .ok_or(StarRegistryError::NotForSale { star_id })?;
        if seller == *buyer {
            return Err(StarRegistryError::SelfPurchase { star_id });
        }
        if payment < price {
            return Err(StarRegistryError::InsufficientPayment {
                star_id,
                price,
                payment,
            });
        }

        self.settle(buyer, &seller, payment, price, funding)?;
        shard.set_owner(star_id, *buyer);

        info!(
            target: "star_registry",
            "Star {} sold by {} to {} for {}",
            star_id,
            seller,
            buyer,
            price
        );
        self.events.publish(StarEvent::Sold {
            star_id,
            seller,
            buyer: *buyer,
            price,
        });

        Ok(Purchase {
            star_id,
            seller,
            buyer: *buyer,
            price,
            excess: payment - price,
        })
    }

    /// Fund the purchase and move `price` from buyer to seller, all or nothing.
    fn settle(
        &self,
        buyer: &AccountId,
        seller: &AccountId,
        payment: Amount,
        price: Amount,
        funding: Funding,
    ) -> Result<()> {
        let mut ledger = self.ledger.lock();
        match funding {
            Funding::Attached => ledger
                .credit(buyer, payment)
                .map_err(StarRegistryError::Payment)?,
            Funding::Account => {
                let held = ledger.balance(buyer);
                if held < payment {
                    return Err(StarRegistryError::Payment(anyhow::anyhow!(
                        "{} attached {} but holds {}",
                        buyer,
                        payment,
                        held
                    )));
                }
            }
        }

        if let Err(err) = transfer(&mut *ledger, buyer, seller, price) {
            if funding == Funding::Attached {
                if let Err(rollback) = ledger.debit(buyer, payment) {
                    warn!(
                        target: "star_registry",
                        "Failed to release escrowed {} from {}: {}",
                        payment,
                        buyer,
                        rollback
                    );
                }
            }
            return Err(StarRegistryError::Payment(err));
        }
        Ok(())
    }

    fn try_exchange_stars(&self, first: StarId, second: StarId, caller: &AccountId) -> Result<()> {
        if first == second {
            return Err(StarRegistryError::InvalidArgument(format!(
                "cannot exchange star {} with itself",
                first
            )));
        }

        let first_index = self.shard_index(first);
        let second_index = self.shard_index(second);

        if first_index == second_index {
            let mut shard = self.shards[first_index].write();
            let first_owner = shard.owner(first)?;
            let second_owner = shard.owner(second)?;
            authorize_exchange(first, first_owner, second_owner, caller)?;
            shard.set_owner(first, second_owner);
            shard.set_owner(second, first_owner);
            self.commit_exchange(first, second, first_owner, second_owner);
            return Ok(());
        }

        let (low, high) = (first_index.min(second_index), first_index.max(second_index));
        let mut low_guard = self.shards[low].write();
        let mut high_guard = self.shards[high].write();
        let (first_shard, second_shard) = if first_index < second_index {
            (&mut *low_guard, &mut *high_guard)
        } else {
            (&mut *high_guard, &mut *low_guard)
        };

        let first_owner = first_shard.owner(first)?;
        let second_owner = second_shard.owner(second)?;
        authorize_exchange(first, first_owner, second_owner, caller)?;
        first_shard.set_owner(first, second_owner);
        second_shard.set_owner(second, first_owner);
        self.commit_exchange(first, second, first_owner, second_owner);
        Ok(())
    }

    // Runs with the shard guards still held so event order follows commit order.
    fn commit_exchange(
        &self,
        first: StarId,
        second: StarId,
        first_owner: AccountId,
        second_owner: AccountId,
    ) {
        info!(
            target: "star_registry",
            "Exchanged star {} ({} -> {}) with star {} ({} -> {})",
            first,
            first_owner,
            second_owner,
            second,
            second_owner,
            first_owner
        );
        self.events.publish(StarEvent::Exchanged { first, second });
    }

    fn try_transfer_star(&self, to: &AccountId, star_id: StarId, caller: &AccountId) -> Result<()> {
        let mut shard = self.shard(star_id).write();
        let owner = shard.owner(star_id)?;
        if owner != *caller {
            return Err(StarRegistryError::NotOwner { star_id });
        }
        if to.is_null() {
            return Err(StarRegistryError::InvalidArgument(
                "cannot transfer a star to the null account".into(),
            ));
        }
        if to == caller {
            return Err(StarRegistryError::InvalidArgument(
                "transfer target must differ from the owner".into(),
            ));
        }

        shard.set_owner(star_id, *to);
        info!(target: "star_registry", "Star {} transferred from {} to {}", star_id, owner, to);
        self.events.publish(StarEvent::Transferred {
            star_id,
            from: owner,
            to: *to,
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Fetch star metadata.
    pub fn lookup(&self, star_id: StarId) -> Result<Star> {
        self.shard(star_id)
            .read()
            .stars
            .get(&star_id)
            .cloned()
            .ok_or(StarRegistryError::NotFound { star_id })
    }

    /// Fetch just the star's name.
    pub fn lookup_name(&self, star_id: StarId) -> Result<String> {
        self.lookup(star_id).map(|star| star.name)
    }

    /// Resolve star → owner.
    pub fn owner_of(&self, star_id: StarId) -> Result<AccountId> {
        self.shard(star_id).read().owner(star_id)
    }

    /// Current listing price, `None` when the star is not for sale.
    pub fn sale_price(&self, star_id: StarId) -> Result<Option<Amount>> {
        let shard = self.shard(star_id).read();
        shard.owner(star_id)?;
        Ok(shard.for_sale.get(&star_id).copied())
    }

    /// Stars held by `owner`, ascending.
    pub fn stars_of(&self, owner: &AccountId) -> Vec<StarId> {
        let mut held: Vec<StarId> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .owner_to_stars
                    .get(owner)
                    .map(|set| set.iter().copied().collect::<Vec<_>>())
                    .unwrap_or_default()
            })
            .collect();
        held.sort_unstable();
        held
    }

    /// Number of stars held by `owner`.
    pub fn balance_of(&self, owner: &AccountId) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().owner_to_stars.get(owner).map_or(0, BTreeSet::len))
            .sum()
    }

    /// Number of stars in existence.
    pub fn total_supply(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().stars.len()).sum()
    }

    // ---------------------------------------------------------------------
    // Ledger access
    // ---------------------------------------------------------------------

    /// Balance of `account` in the settlement ledger.
    pub fn account_balance(&self, account: &AccountId) -> Amount {
        self.ledger.lock().balance(account)
    }

    /// Run `f` against the settlement ledger.
    ///
    /// `f` must not call back into the registry: the ledger lock is held.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        f(&mut self.ledger.lock())
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn shard_index(&self, star_id: StarId) -> usize {
        (star_id.value() % self.shards.len() as u64) as usize
    }

    pub(crate) fn shard(&self, star_id: StarId) -> &RwLock<Shard> {
        &self.shards[self.shard_index(star_id)]
    }

    pub(crate) fn shards(&self) -> &[RwLock<Shard>] {
        &self.shards
    }
}

/// Move `amount` between accounts, restoring the source if the credit fails.
fn transfer<L: AccountLedger>(
    ledger: &mut L,
    from: &AccountId,
    to: &AccountId,
    amount: Amount,
) -> anyhow::Result<()> {
    ledger.debit(from, amount)?;
    if let Err(err) = ledger.credit(to, amount) {
        if let Err(rollback) = ledger.credit(from, amount) {
            warn!(
                target: "star_registry",
                "Failed to restore {} to {} after rejected settlement: {}",
                amount,
                from,
                rollback
            );
        }
        return Err(err);
    }
    Ok(())
}

fn authorize_exchange(
    first: StarId,
    first_owner: AccountId,
    second_owner: AccountId,
    caller: &AccountId,
) -> Result<()> {
    // Owning either side is enough; the other owner is not consulted.
    if *caller != first_owner && *caller != second_owner {
        return Err(StarRegistryError::NotOwner { star_id: first });
    }
    Ok(())
}

fn log_rejection(operation: &str, star_id: StarId, err: &StarRegistryError) {
    debug!(
        target: "star_registry",
        "{} rejected for star {}: {} ({})",
        operation,
        star_id,
        err,
        err.kind()
    );
}
