//! Account ledger interface for star sale settlement
//!
//! The registry never holds funds of its own. When a star is bought, the
//! price is moved from the buyer to the seller through an [`AccountLedger`]
//! while the star's shard lock is held, so payment and ownership change
//! commit together.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use starnotary_types::{AccountId, Amount};
use std::collections::HashMap;

/// Interface for account balance operations.
pub trait AccountLedger: Send {
    /// Credit an account.
    fn credit(&mut self, account: &AccountId, amount: Amount) -> Result<()>;

    /// Debit an account. Fails without side effects if the balance is short.
    fn debit(&mut self, account: &AccountId, amount: Amount) -> Result<()>;

    /// Retrieve an account's balance.
    fn balance(&self, account: &AccountId) -> Amount;

    /// Total of all balances.
    fn total_supply(&self) -> Amount;

    /// Snapshot of all balances.
    fn balances(&self) -> HashMap<AccountId, Amount>;
}

// -----------------------------------------------------------------------------
// In-memory implementation
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryAccountLedger {
    balances: HashMap<AccountId, Amount>,
    total_supply: Amount,
}

impl InMemoryAccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from existing balances.
    pub fn with_balances(balances: impl IntoIterator<Item = (AccountId, Amount)>) -> Self {
        let mut ledger = Self::new();
        for (account, amount) in balances {
            let entry = ledger.balances.entry(account).or_insert(0);
            *entry = entry.saturating_add(amount);
            ledger.total_supply = ledger.total_supply.saturating_add(amount);
        }
        ledger
    }
}

impl AccountLedger for InMemoryAccountLedger {
    fn credit(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        let current = self.balances.get(account).copied().unwrap_or(0);
        let updated = current
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Balance overflow for {}", account))?;
        self.balances.insert(*account, updated);
        self.total_supply = self.total_supply.saturating_add(amount);
        Ok(())
    }

    fn debit(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        let current = self.balances.get(account).copied().unwrap_or(0);
        if current < amount {
            return Err(anyhow::anyhow!(
                "Insufficient balance for {}: has {}, needs {}",
                account,
                current,
                amount
            ));
        }
        self.balances.insert(*account, current - amount);
        self.total_supply = self.total_supply.saturating_sub(amount);
        Ok(())
    }

    fn balance(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> Amount {
        self.total_supply
    }

    fn balances(&self) -> HashMap<AccountId, Amount> {
        self.balances.clone()
    }
}

// -----------------------------------------------------------------------------
// Mock ledger (records calls, can refuse credits to one account)
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct MockAccountLedger {
    inner: InMemoryAccountLedger,
    credit_calls: Vec<(AccountId, Amount)>,
    debit_calls: Vec<(AccountId, Amount)>,
    rejected_account: Option<AccountId>,
}

impl MockAccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(balances: impl IntoIterator<Item = (AccountId, Amount)>) -> Self {
        Self {
            inner: InMemoryAccountLedger::with_balances(balances),
            ..Self::default()
        }
    }

    /// Make every subsequent credit to `account` fail.
    pub fn reject_credits_to(&mut self, account: AccountId) {
        self.rejected_account = Some(account);
    }

    pub fn credit_calls(&self) -> &[(AccountId, Amount)] {
        &self.credit_calls
    }

    pub fn debit_calls(&self) -> &[(AccountId, Amount)] {
        &self.debit_calls
    }

}

impl AccountLedger for MockAccountLedger {
    fn credit(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        self.credit_calls.push((*account, amount));
        if self.rejected_account.as_ref() == Some(account) {
            return Err(anyhow::anyhow!("Credit rejected for {}", account));
        }
        self.inner.credit(account, amount)
    }

    fn debit(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        self.debit_calls.push((*account, amount));
        self.inner.debit(account, amount)
    }

    fn balance(&self, account: &AccountId) -> Amount {
        self.inner.balance(account)
    }

    fn total_supply(&self) -> Amount {
        self.inner.total_supply()
    }

    fn balances(&self) -> HashMap<AccountId, Amount> {
        self.inner.balances()
    }
}
