// Core modules
pub mod config;
pub mod error;
pub mod execution;
pub mod models;
pub mod persistence;

// Re-export commonly used types
pub use error::{Error, Result};
pub use execution::{PriceMonitor, PriceSimulator, TriggerEngine};
pub use models::*;
pub use persistence::{JsonFileStore, MemoryStore, OrderStore, RedisOrderStore};
