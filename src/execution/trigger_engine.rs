use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::models::{
    validate_price, Market, PriceSample, RegisteredOrder, RegistrationReceipt,
    RegistrationRequest, StopLossOrder,
};
use crate::persistence::{OrderStore, StoreLock};

type WorkingSet = Option<Vec<StopLossOrder>>;

/// Registry of stop-loss orders and the evaluator that fires them
///
/// Every mutation is a read-modify-write against the store: it takes the
/// engine mutex and then the store's own lock, reads the collection fresh,
/// changes a copy and writes the whole set back. Engines in other processes
/// sharing the store therefore never overwrite each other's changes. The
/// last committed set is cached for [`TriggerEngine::orders`] and replaced
/// only after the store accepted a write.
pub struct TriggerEngine<S: OrderStore> {
    store: S,
    working_set: Mutex<WorkingSet>,
}

impl<S: OrderStore> TriggerEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            working_set: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, WorkingSet> {
        self.working_set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the store and read the collection as it is persisted right now
    fn begin(&self) -> Result<(StoreLock, Vec<StopLossOrder>)> {
        let held = self.store.lock()?;
        let orders = self.store.load()?;
        Ok((held, orders))
    }

    /// Persist `orders` and make them the cached set
    fn commit(&self, slot: &mut WorkingSet, orders: Vec<StopLossOrder>) -> Result<()> {
        self.store.save(&orders)?;
        *slot = Some(orders);
        Ok(())
    }

    /// Register a new pending order
    ///
    /// # Returns
    /// Position of the new order in the collection
    pub fn register(&self, market: &str, threshold: f64, size: f64) -> Result<usize> {
        self.add(market.parse()?, threshold, size)
    }

    fn add(&self, market: Market, threshold: f64, size: f64) -> Result<usize> {
        let order = StopLossOrder::new(market, threshold, size)?;

        let mut slot = self.lock();
        let (_held, mut orders) = self.begin()?;
        orders.push(order);
        let index = orders.len() - 1;
        self.commit(&mut slot, orders)?;

        tracing::info!(
            index,
            market = %market,
            threshold,
            size,
            "Registered stop loss"
        );

        Ok(index)
    }

    /// Register from an outer caller's request, echoing its metadata
    pub fn register_request(&self, request: RegistrationRequest) -> Result<RegistrationReceipt> {
        let market: Market = request.market.parse()?;
        let index = self.add(market, request.threshold, request.size)?;

        Ok(RegistrationReceipt {
            status: "success".to_string(),
            message: format!("Stop loss registered for {}", market),
            index,
            data: RegisteredOrder {
                market,
                threshold: request.threshold,
                size: request.size,
                wallet_address: request.wallet_address,
                transaction_hash: request.transaction_hash,
            },
        })
    }

    /// Fire every pending `market` order whose threshold is at or above `price`
    ///
    /// Saves the collection once per call.
    ///
    /// # Returns
    /// Indices that fired in this call, in collection order
    pub fn evaluate(&self, market: Market, price: f64) -> Result<Vec<usize>> {
        let price = validate_price(price)?;

        let mut slot = self.lock();
        let (_held, mut orders) = self.begin()?;

        let now = Utc::now();
        let mut fired = Vec::new();
        for (index, order) in orders.iter_mut().enumerate() {
            if order.should_trigger(market, price) && order.fire(now) {
                tracing::info!(
                    index,
                    market = %market,
                    price,
                    threshold = order.threshold(),
                    size = order.size(),
                    "Stop loss triggered"
                );
                fired.push(index);
            }
        }

        self.commit(&mut slot, orders)?;

        tracing::debug!(market = %market, price, fired = fired.len(), "Evaluated price");

        Ok(fired)
    }

    pub fn process(&self, sample: &PriceSample) -> Result<Vec<usize>> {
        self.evaluate(sample.market, sample.price)
    }

    /// Snapshot of the last committed set, loading it on first use
    ///
    /// Changes made through other engines show up after the next mutation
    /// or [`TriggerEngine::reload`].
    pub fn orders(&self) -> Result<Vec<StopLossOrder>> {
        let mut slot = self.lock();
        if let Some(orders) = slot.as_ref() {
            return Ok(orders.clone());
        }

        let loaded = self.store.load()?;
        tracing::info!("Loaded {} orders from store", loaded.len());
        *slot = Some(loaded.clone());
        Ok(loaded)
    }

    /// Replace the whole collection with an empty one
    pub fn reset(&self) -> Result<()> {
        let mut slot = self.lock();
        let _held = self.store.lock()?;
        self.commit(&mut slot, Vec::new())?;
        tracing::info!("Cleared all stop loss orders");
        Ok(())
    }

    /// Drop the cached set and read it again from the store
    ///
    /// On failure the previous cache stays in place.
    pub fn reload(&self) -> Result<usize> {
        let mut slot = self.lock();
        let loaded = self.store.load()?;
        let count = loaded.len();
        *slot = Some(loaded);
        Ok(count)
    }
}
