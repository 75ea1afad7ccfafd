use std::sync::Arc;
use tokio::sync::mpsc;

use super::TriggerEngine;
use crate::models::PriceSample;
use crate::persistence::OrderStore;

/// Outcome of one monitoring run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorSummary {
    pub samples: usize,
    /// Order indices in the order they fired
    pub triggered: Vec<usize>,
    pub failures: usize,
}

/// Feeds pushed price samples into the trigger engine
///
/// A failed evaluation is logged and counted, and the monitor moves on to the
/// next sample. Retrying is left to whoever owns the feed.
pub struct PriceMonitor<S: OrderStore> {
    engine: Arc<TriggerEngine<S>>,
}

impl<S: OrderStore> PriceMonitor<S> {
    pub fn new(engine: Arc<TriggerEngine<S>>) -> Self {
        Self { engine }
    }

    /// Consume samples until every sender is dropped
    pub async fn run(&self, mut samples: mpsc::Receiver<PriceSample>) -> MonitorSummary {
        let mut summary = MonitorSummary::default();

        while let Some(sample) = samples.recv().await {
            summary.samples += 1;

            match self.engine.process(&sample) {
                Ok(fired) => {
                    for index in fired {
                        tracing::info!(
                            index,
                            market = %sample.market,
                            price = %format!("{:.2}", sample.price),
                            "🚨 Stop loss fired"
                        );
                        summary.triggered.push(index);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        market = %sample.market,
                        price = sample.price,
                        "Failed to evaluate price sample: {}",
                        e
                    );
                    summary.failures += 1;
                }
            }
        }

        tracing::info!(
            samples = summary.samples,
            triggered = summary.triggered.len(),
            failures = summary.failures,
            "Price feed finished"
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{spawn_feed, PriceSimulator};
    use crate::models::Market;
    use crate::persistence::MemoryStore;
    use chrono::Utc;
    use std::time::Duration;

    fn sample(market: Market, price: f64) -> PriceSample {
        PriceSample {
            market,
            price,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_monitor_fires_on_simulated_drop() {
        let engine = Arc::new(TriggerEngine::new(MemoryStore::new()));
        engine.register("ETH", 1900.0, 0.5).unwrap();

        // Slowest possible walk still ends at 1850
        let sim = PriceSimulator::new(Market::Eth, 2000.0, 1700.0, 15, Some(42)).unwrap();
        let (rx, feed) = spawn_feed(sim, Duration::from_millis(1), 4);

        let summary = PriceMonitor::new(engine.clone()).run(rx).await;

        assert_eq!(feed.await.unwrap(), 15);
        assert_eq!(summary.samples, 15);
        assert_eq!(summary.triggered, vec![0]);
        assert_eq!(summary.failures, 0);
        assert!(engine.orders().unwrap()[0].is_triggered());
    }

    #[tokio::test]
    async fn test_monitor_counts_bad_samples_and_continues() {
        let engine = Arc::new(TriggerEngine::new(MemoryStore::new()));
        engine.register("BTC", 45000.0, 0.2).unwrap();

        let (tx, rx) = mpsc::channel(8);
        tx.send(sample(Market::Btc, f64::NAN)).await.unwrap();
        tx.send(sample(Market::Btc, 46000.0)).await.unwrap();
        tx.send(sample(Market::Btc, 44000.0)).await.unwrap();
        drop(tx);

        let summary = PriceMonitor::new(engine).run(rx).await;

        assert_eq!(summary.samples, 3);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.triggered, vec![0]);
    }

    #[tokio::test]
    async fn test_two_feeds_share_one_engine() {
        let engine = Arc::new(TriggerEngine::new(MemoryStore::new()));
        engine.register("ETH", 1900.0, 0.5).unwrap();
        engine.register("BTC", 45000.0, 0.2).unwrap();

        let eth = PriceSimulator::new(Market::Eth, 2000.0, 1500.0, 10, Some(1)).unwrap();
        let btc = PriceSimulator::new(Market::Btc, 50000.0, 30000.0, 10, Some(2)).unwrap();
        let (eth_rx, _) = spawn_feed(eth, Duration::from_millis(1), 4);
        let (btc_rx, _) = spawn_feed(btc, Duration::from_millis(1), 4);

        let eth_task = tokio::spawn({
            let monitor = PriceMonitor::new(engine.clone());
            async move { monitor.run(eth_rx).await }
        });
        let btc_task = tokio::spawn({
            let monitor = PriceMonitor::new(engine.clone());
            async move { monitor.run(btc_rx).await }
        });

        assert_eq!(eth_task.await.unwrap().triggered, vec![0]);
        assert_eq!(btc_task.await.unwrap().triggered, vec![1]);
        assert_eq!(engine.store().save_count(), 2 + 20);
    }
}
