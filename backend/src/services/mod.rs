//! Business logic services for the warehouse ledger

pub mod alert;
pub mod catalog;
pub mod idempotency;
pub mod inbound;
pub mod ledger;
pub mod notification;
pub mod outbound;
pub mod settings;
pub mod stock;

pub use idempotency::{IdempotencyKey, IdempotencyStore, InMemoryIdempotencyStore, PgIdempotencyStore};
pub use inbound::InboundService;
pub use notification::NotificationService;
pub use outbound::OutboundService;
pub use settings::SettingsService;
pub use stock::StockService;
