//! Domain models for the warehouse ledger

mod order;
mod settings;
mod stock;

pub use order::*;
pub use settings::*;
pub use stock::*;
