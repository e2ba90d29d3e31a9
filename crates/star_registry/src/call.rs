//! Call interface used by execution contexts.
//!
//! An execution context decodes a [`Call`], pairs it with the caller
//! identity and attached value in a [`CallContext`], and hands both to
//! [`StarRegistry::dispatch`]. It persists the resulting state only when
//! dispatch returns `Ok`.
//!
//! Value attached through a [`CallContext`] is drawn from the caller's
//! ledger account, so a caller can never attach more than it holds.

use crate::errors::*;
use crate::ledger::AccountLedger;
use crate::registry::{Purchase, StarRegistry};
use serde::{Deserialize, Serialize};
use starnotary_types::{AccountId, Amount, Star, StarId};

/// Identity and attached funds for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: AccountId,
    /// Attached payment, drawn from the caller's account. Only `buy_star` reads it.
    #[serde(default)]
    pub value: Amount,
}

impl CallContext {
    pub fn new(caller: AccountId) -> Self {
        Self { caller, value: 0 }
    }

    pub fn with_value(caller: AccountId, value: Amount) -> Self {
        Self { caller, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Call {
    CreateStar {
        name: String,
        id: StarId,
        #[serde(default)]
        symbol: String,
    },
    PutUpForSale {
        id: StarId,
        price: Amount,
    },
    WithdrawFromSale {
        id: StarId,
    },
    BuyStar {
        id: StarId,
    },
    ExchangeStars {
        first: StarId,
        second: StarId,
    },
    TransferStar {
        to: AccountId,
        id: StarId,
    },
    Lookup {
        id: StarId,
    },
    LookupName {
        id: StarId,
    },
    OwnerOf {
        id: StarId,
    },
    SalePrice {
        id: StarId,
    },
    BalanceOf {
        owner: AccountId,
    },
    StarsOf {
        owner: AccountId,
    },
    TotalSupply,
}

impl Call {
    /// Whether the call can change registry or ledger state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::CreateStar { .. }
                | Call::PutUpForSale { .. }
                | Call::WithdrawFromSale { .. }
                | Call::BuyStar { .. }
                | Call::ExchangeStars { .. }
                | Call::TransferStar { .. }
        )
    }
}

/// Result of a successful call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum CallOutcome {
    Done,
    Purchased(Purchase),
    Star(Star),
    Name(String),
    Owner(AccountId),
    Price(Option<Amount>),
    Count(usize),
    Stars(Vec<StarId>),
}

impl<L: AccountLedger> StarRegistry<L> {
    /// Route a call to the matching registry operation.
    pub fn dispatch(&self, ctx: &CallContext, call: Call) -> Result<CallOutcome> {
        let caller = &ctx.caller;
        let outcome = match call {
            Call::CreateStar { name, id, symbol } => {
                self.create_star(&name, id, &symbol, caller)?;
                CallOutcome::Done
            }
            Call::PutUpForSale { id, price } => {
                self.put_up_for_sale(id, price, caller)?;
                CallOutcome::Done
            }
            Call::WithdrawFromSale { id } => {
                self.withdraw_from_sale(id, caller)?;
                CallOutcome::Done
            }
            Call::BuyStar { id } => {
                CallOutcome::Purchased(self.buy_star_from_account(id, ctx.value, caller)?)
            }
            Call::ExchangeStars { first, second } => {
                self.exchange_stars(first, second, caller)?;
                CallOutcome::Done
            }
            Call::TransferStar { to, id } => {
                self.transfer_star(&to, id, caller)?;
                CallOutcome::Done
            }
            Call::Lookup { id } => CallOutcome::Star(self.lookup(id)?),
            Call::LookupName { id } => CallOutcome::Name(self.lookup_name(id)?),
            Call::OwnerOf { id } => CallOutcome::Owner(self.owner_of(id)?),
            Call::SalePrice { id } => CallOutcome::Price(self.sale_price(id)?),
            Call::BalanceOf { owner } => CallOutcome::Count(self.balance_of(&owner)),
            Call::StarsOf { owner } => CallOutcome::Stars(self.stars_of(&owner)),
            Call::TotalSupply => CallOutcome::Count(self.total_supply()),
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryAccountLedger;
    use crate::RegistryConfig;

    #[test]
    fn test_calls_decode_from_json() {
        let call: Call =
            serde_json::from_str(r#"{"op":"create_star","name":"Awesome Star!","id":1}"#).unwrap();
        assert_eq!(
            call,
            Call::CreateStar {
                name: "Awesome Star!".into(),
                id: StarId(1),
                symbol: String::new(),
            }
        );
        assert!(call.is_mutation());

        let call: Call = serde_json::from_str(r#"{"op":"total_supply"}"#).unwrap();
        assert_eq!(call, Call::TotalSupply);
        assert!(!call.is_mutation());
    }

    #[test]
    fn test_dispatch_buy_draws_attached_value_from_caller() {
        let alice = AccountId::from_label("alice");
        let bob = AccountId::from_label("bob");
        let registry = StarRegistry::with_account_ledger(
            RegistryConfig::default(),
            InMemoryAccountLedger::with_balances([(bob, 1_000)]),
        );

        let seller = CallContext::new(alice);
        registry
            .dispatch(
                &seller,
                Call::CreateStar {
                    name: "Dispatched".into(),
                    id: StarId(1),
                    symbol: String::new(),
                },
            )
            .unwrap();
        registry
            .dispatch(&seller, Call::PutUpForSale { id: StarId(1), price: 10 })
            .unwrap();

        let err = registry
            .dispatch(&CallContext::with_value(bob, 9), Call::BuyStar { id: StarId(1) })
            .unwrap_err();
        assert!(matches!(err, StarRegistryError::InsufficientPayment { .. }));

        let err = registry
            .dispatch(&CallContext::with_value(bob, 1_001), Call::BuyStar { id: StarId(1) })
            .unwrap_err();
        assert!(matches!(err, StarRegistryError::Payment(_)));
        assert_eq!(registry.owner_of(StarId(1)).unwrap(), alice);
        assert_eq!(registry.sale_price(StarId(1)).unwrap(), Some(10));
        assert_eq!(registry.account_balance(&bob), 1_000);

        let outcome = registry
            .dispatch(&CallContext::with_value(bob, 50), Call::BuyStar { id: StarId(1) })
            .unwrap();
        match outcome {
            CallOutcome::Purchased(purchase) => {
                assert_eq!(purchase.price, 10);
                assert_eq!(purchase.excess, 40);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(registry.account_balance(&alice), 10);
        assert_eq!(registry.account_balance(&bob), 990);

        assert_eq!(
            registry
                .dispatch(&seller, Call::OwnerOf { id: StarId(1) })
                .unwrap(),
            CallOutcome::Owner(bob)
        );
        assert_eq!(
            registry.dispatch(&seller, Call::BalanceOf { owner: bob }).unwrap(),
            CallOutcome::Count(1)
        );
    }

    #[test]
    fn test_outcome_serialises_with_tag() {
        let json = serde_json::to_string(&CallOutcome::Count(3)).unwrap();
        assert_eq!(json, r#"{"result":"count","value":3}"#);
        let json = serde_json::to_string(&CallOutcome::Done).unwrap();
        assert_eq!(json, r#"{"result":"done"}"#);
    }
}
