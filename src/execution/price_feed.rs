use crate::error::{Error, Result};
use crate::models::{Market, PriceSample};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Synthetic price walk from `start` towards `target`
///
/// Each step moves by `(target - start) / steps` plus uniform noise of up to
/// half a step either way, so the walk always heads towards the target and
/// never passes it. Yields exactly `steps` samples.
pub struct PriceSimulator {
    rng: StdRng,
    market: Market,
    current: f64,
    target: f64,
    step: f64,
    remaining: usize,
}

impl PriceSimulator {
    /// Create a new simulator
    ///
    /// # Arguments
    /// * `seed` - Fixed seed for reproducible walks, `None` for entropy
    pub fn new(
        market: Market,
        start: f64,
        target: f64,
        steps: usize,
        seed: Option<u64>,
    ) -> Result<Self> {
        for (name, value) in [("start", start), ("target", target)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "{} price must be positive, got {}",
                    name, value
                )));
            }
        }
        if steps == 0 {
            return Err(Error::InvalidParameter("steps must be at least 1".to_string()));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            rng,
            market,
            current: start,
            target,
            step: (target - start) / steps as f64,
            remaining: steps,
        })
    }

    pub fn market(&self) -> Market {
        self.market
    }
}

impl Iterator for PriceSimulator {
    type Item = PriceSample;

    fn next(&mut self) -> Option<PriceSample> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let noise = self.rng.gen_range(-0.5_f64..=0.5) * self.step.abs();
        self.current += self.step + noise;

        let overshot = (self.step < 0.0 && self.current < self.target)
            || (self.step > 0.0 && self.current > self.target);
        if overshot {
            self.current = self.target;
        }

        Some(PriceSample {
            market: self.market,
            price: self.current,
            timestamp: Utc::now(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Push `samples` into a channel, one per `interval` tick
///
/// The task stops early when the receiver is dropped and resolves to the
/// number of samples delivered.
pub fn spawn_feed<I>(
    samples: I,
    interval: Duration,
    capacity: usize,
) -> (mpsc::Receiver<PriceSample>, JoinHandle<usize>)
where
    I: IntoIterator<Item = PriceSample> + Send + 'static,
    I::IntoIter: Send,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let handle = tokio::spawn(async move {
        // tokio intervals panic on a zero period
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut sent = 0;
        for sample in samples {
            ticker.tick().await;

            tracing::info!(
                market = %sample.market,
                price = %format!("{:.2}", sample.price),
                "Price sample"
            );

            if tx.send(sample).await.is_err() {
                tracing::debug!("Price receiver closed, stopping feed");
                break;
            }
            sent += 1;
        }
        sent
    });

    (rx, handle)
}
