//! Pointbook - state store for a points-based betting and rewards client
//!
//! This library holds the application state (points balance, bets, raffle
//! entries, merchandise cart, shipping address), the pure reducer that
//! transitions it, and the store controller that loads it on start and
//! persists it after changes.

pub mod actions;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod reducer;
pub mod scheduler;
pub mod snapshot;
pub mod state;
pub mod storage;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use actions::Action;
pub use config::Config;
pub use error::{PointbookError, Result};
pub use events::{PersistReason, StoreEvent};
pub use reducer::{reduce, reduce_with, BalancePolicy};
pub use state::{AppState, StatePatch};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::{Lifecycle, Store, StoreOptions};
pub use types::{Bet, BetId, BetOutcome, BetResult, BetSpec, BetStatus, CartItem, ItemId, ShippingInfo};
