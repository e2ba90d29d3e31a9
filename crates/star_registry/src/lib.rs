//! Star Registry
//!
//! Ownership ledger for uniquely identified stars. Each star has exactly one
//! owner; owners can list stars for sale, sell them, swap them and hand them
//! over. Every operation is atomic with respect to concurrent callers, and a
//! purchase moves ownership and payment together or not at all.

pub mod call;
pub mod config;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod registry;
pub mod snapshot;

pub use call::{Call, CallContext, CallOutcome};
pub use config::RegistryConfig;
pub use errors::*;
pub use events::StarEvent;
pub use ledger::{AccountLedger, InMemoryAccountLedger, MockAccountLedger};
pub use registry::{Purchase, StarRegistry};
pub use snapshot::{RegistrySnapshot, StarRecord};
pub use starnotary_types::{AccountId, Amount, Star, StarId, DEFAULT_SYMBOL};
