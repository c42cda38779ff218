//! `stockroom-core` — shared building blocks for the shop inventory.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod quantity;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ItemId, OperatorId};
pub use quantity::{QUANTITY_DECIMALS, add_quantities, normalize_quantity};
