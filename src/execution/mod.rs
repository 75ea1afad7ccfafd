// Trigger evaluation and the price plumbing that drives it
pub mod monitor;
pub mod price_feed;
pub mod trigger_engine;

pub use monitor::{MonitorSummary, PriceMonitor};
pub use price_feed::{spawn_feed, PriceSimulator};
pub use trigger_engine::TriggerEngine;
