//! Shared primitives for the star notary workspace.

pub mod address;
pub mod star;

pub use address::*;
pub use star::*;
