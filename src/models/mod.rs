use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Supported markets. Matching is case-sensitive on the ticker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Market {
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "BTC")]
    Btc,
}

impl Market {
    pub const ALL: [Market; 2] = [Market::Eth, Market::Btc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Eth => "ETH",
            Market::Btc => "BTC",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Market {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Market::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::InvalidMarket(s.to_string()))
    }
}

/// Pending until the first qualifying price, then Fired for good
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Fired,
}

/// A standing "sell if price falls to or below threshold" instruction
///
/// Fields are private: the only mutation an order supports is [`StopLossOrder::fire`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopLossOrder {
    market: Market,
    threshold: f64,
    size: f64,
    triggered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    triggered_at: Option<DateTime<Utc>>,
}

impl StopLossOrder {
    /// Create a pending order after validating threshold and size
    pub fn new(market: Market, threshold: f64, size: f64) -> Result<Self> {
        validate_positive("threshold", threshold)?;
        validate_positive("size", size)?;

        Ok(Self {
            market,
            threshold,
            size,
            triggered: false,
            id: Some(Uuid::new_v4()),
            triggered_at: None,
        })
    }

    pub fn market(&self) -> Market {
        self.market
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Reserved identifier. Records written before ids existed have none.
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn triggered_at(&self) -> Option<DateTime<Utc>> {
        self.triggered_at
    }

    pub fn status(&self) -> OrderStatus {
        if self.triggered {
            OrderStatus::Fired
        } else {
            OrderStatus::Pending
        }
    }

    /// True when a pending order on `market` should fire at `price`
    pub fn should_trigger(&self, market: Market, price: f64) -> bool {
        !self.triggered && self.market == market && price <= self.threshold
    }

    /// Flip to fired. Returns false (and changes nothing) if already fired.
    pub fn fire(&mut self, at: DateTime<Utc>) -> bool {
        if self.triggered {
            return false;
        }
        self.triggered = true;
        self.triggered_at = Some(at);
        true
    }
}

/// A single `(market, price)` observation from a price source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSample {
    pub market: Market,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(market: Market, price: f64) -> Result<Self> {
        Ok(Self {
            market,
            price: validate_price(price)?,
            timestamp: Utc::now(),
        })
    }

    /// Build a sample from raw feed text
    pub fn parse(market: &str, price: &str) -> Result<Self> {
        let market = market.parse::<Market>()?;
        let price = price
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::InvalidPriceSample(format!("not a number: {:?}", price)))?;
        Self::new(market, price)
    }
}

/// Registration input as supplied by an outer caller
///
/// Wallet and transaction fields are opaque and only echoed back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub market: String,
    pub threshold: f64,
    pub size: f64,
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default)]
    pub transaction_hash: String,
}

/// Order fields plus the pass-through metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredOrder {
    pub market: Market,
    pub threshold: f64,
    pub size: f64,
    pub wallet_address: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrationReceipt {
    pub status: String,
    pub message: String,
    pub index: usize,
    pub data: RegisteredOrder,
}

pub(crate) fn validate_price(price: f64) -> Result<f64> {
    if !price.is_finite() {
        return Err(Error::InvalidPriceSample(format!("non-finite price {}", price)));
    }
    if price < 0.0 {
        return Err(Error::InvalidPriceSample(format!("negative price {}", price)));
    }
    Ok(price)
}

fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "{} must be a positive number, got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_parsing_is_case_sensitive() {
        assert_eq!("ETH".parse::<Market>().unwrap(), Market::Eth);
        assert_eq!("BTC".parse::<Market>().unwrap(), Market::Btc);
        assert!(matches!("eth".parse::<Market>(), Err(Error::InvalidMarket(_))));
        assert!(matches!("XRP".parse::<Market>(), Err(Error::InvalidMarket(_))));
    }

    #[test]
    fn test_order_creation() {
        let order = StopLossOrder::new(Market::Eth, 1900.0, 0.5).unwrap();

        assert_eq!(order.market(), Market::Eth);
        assert_eq!(order.threshold(), 1900.0);
        assert_eq!(order.size(), 0.5);
        assert!(!order.is_triggered());
        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(order.id().is_some());
    }

    #[test]
    fn test_rejects_non_positive_parameters() {
        assert!(matches!(
            StopLossOrder::new(Market::Eth, 0.0, 0.5),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            StopLossOrder::new(Market::Eth, 1900.0, -1.0),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            StopLossOrder::new(Market::Btc, f64::NAN, 1.0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_trigger_condition() {
        let order = StopLossOrder::new(Market::Eth, 1900.0, 0.5).unwrap();

        assert!(!order.should_trigger(Market::Eth, 2000.0));
        assert!(order.should_trigger(Market::Eth, 1900.0)); // inclusive
        assert!(order.should_trigger(Market::Eth, 1850.0));
        assert!(!order.should_trigger(Market::Btc, 1850.0));
    }

    #[test]
    fn test_fire_is_one_way() {
        let mut order = StopLossOrder::new(Market::Btc, 45000.0, 0.2).unwrap();
        let first = Utc::now();

        assert!(order.fire(first));
        assert_eq!(order.status(), OrderStatus::Fired);
        assert_eq!(order.triggered_at(), Some(first));

        // Second fire keeps the original timestamp
        assert!(!order.fire(first + chrono::Duration::seconds(5)));
        assert_eq!(order.triggered_at(), Some(first));
        assert!(!order.should_trigger(Market::Btc, 1.0));
    }

    #[test]
    fn test_legacy_record_without_id() {
        let json = r#"{"market":"ETH","threshold":1900.0,"size":0.5,"triggered":true}"#;
        let order: StopLossOrder = serde_json::from_str(json).unwrap();

        assert!(order.is_triggered());
        assert_eq!(order.id(), None);
        assert_eq!(serde_json::to_string(&order).unwrap(), json);
    }

    #[test]
    fn test_price_sample_parse() {
        let sample = PriceSample::parse("BTC", "42000.5").unwrap();
        assert_eq!(sample.market, Market::Btc);
        assert_eq!(sample.price, 42000.5);

        assert!(matches!(
            PriceSample::parse("BTC", "abc"),
            Err(Error::InvalidPriceSample(_))
        ));
        assert!(matches!(
            PriceSample::parse("BTC", "inf"),
            Err(Error::InvalidPriceSample(_))
        ));
        assert!(matches!(
            PriceSample::parse("DOGE", "1.0"),
            Err(Error::InvalidMarket(_))
        ));
    }

    #[test]
    fn test_registration_request_camel_case() {
        let json = r#"{"market":"ETH","threshold":1900,"size":0.5,"walletAddress":"0xabc","transactionHash":"0xdef"}"#;
        let request: RegistrationRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.wallet_address, "0xabc");
        assert_eq!(request.transaction_hash, "0xdef");
        assert_eq!(request.threshold, 1900.0);
    }
}
