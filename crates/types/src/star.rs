//! Star identifiers, metadata and amounts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbol assigned when a star is created with an empty symbol.
pub const DEFAULT_SYMBOL: &str = "SNT";

/// Amount in the smallest currency unit.
pub type Amount = u128;

/// Caller-supplied unique star identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StarId(pub u64);

impl StarId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for StarId {
    fn from(value: u64) -> Self {
        StarId(value)
    }
}

impl fmt::Display for StarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable star metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Star {
    pub name: String,
    pub symbol: String,
}

impl Star {
    /// Build star metadata, substituting `default_symbol` for an empty symbol.
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        default_symbol: &str,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            name: name.into(),
            symbol: if symbol.is_empty() {
                default_symbol.to_string()
            } else {
                symbol
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_symbol_falls_back_to_default() {
        let star = Star::new("Awesome Star!", "", DEFAULT_SYMBOL);
        assert_eq!(star.symbol, "SNT");
        assert_eq!(star.name, "Awesome Star!");
    }

    #[test]
    fn explicit_symbol_is_kept() {
        let star = Star::new("Awesome Star!", "EZ", DEFAULT_SYMBOL);
        assert_eq!(star.symbol, "EZ");
    }

    #[test]
    fn star_id_serialises_as_plain_integer() {
        assert_eq!(serde_json::to_string(&StarId(42)).unwrap(), "42");
        assert_eq!(StarId(7).to_string(), "#7");
    }
}
