//! Shared domain logic for the warehouse stock ledger
//!
//! Everything here is free of I/O: order lifecycles, batch allocation, alert evaluation and
//! request validation. The backend drives these against locked database rows.

pub mod alerts;
pub mod allocation;
pub mod models;
pub mod types;
pub mod validation;

pub use alerts::*;
pub use allocation::*;
pub use models::*;
pub use types::*;
pub use validation::*;
