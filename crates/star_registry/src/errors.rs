//! Error types for the star registry

use starnotary_types::{Amount, StarId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StarRegistryError {
    #[error("Star already exists: {star_id}")]
    DuplicateIdentifier { star_id: StarId },

    #[error("Star not found: {star_id}")]
    NotFound { star_id: StarId },

    #[error("Caller does not own star {star_id}")]
    NotOwner { star_id: StarId },

    #[error("Star {star_id} is not for sale")]
    NotForSale { star_id: StarId },

    #[error("Insufficient payment for star {star_id}: price {price}, attached {payment}")]
    InsufficientPayment {
        star_id: StarId,
        price: Amount,
        payment: Amount,
    },

    #[error("Owner cannot buy their own star {star_id}")]
    SelfPurchase { star_id: StarId },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Payment settlement failed: {0}")]
    Payment(#[source] anyhow::Error),
}

impl StarRegistryError {
    /// Stable machine-readable kind, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateIdentifier { .. } => "duplicate_identifier",
            Self::NotFound { .. } => "not_found",
            Self::NotOwner { .. } => "not_owner",
            Self::NotForSale { .. } => "not_for_sale",
            Self::InsufficientPayment { .. } => "insufficient_payment",
            Self::SelfPurchase { .. } => "self_purchase",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Payment(_) => "payment",
        }
    }
}

pub type Result<T> = std::result::Result<T, StarRegistryError>;
