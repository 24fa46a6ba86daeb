//! Order-related types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::{Price, Size};
use crate::market::TradingPair;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an order executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum OrderKind {
    /// Resting limit order. `post_only` orders are rejected instead of
    /// taking liquidity.
    Limit { price: Price, post_only: bool },
    /// Immediate execution at the touch.
    Market,
    /// Stop-market order that fires once the price crosses `trigger_price`:
    /// buys fire on `price >= trigger`, sells on `price <= trigger`.
    Trigger { trigger_price: Price },
}

impl OrderKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Limit {
                post_only: true, ..
            } => "post_only",
            Self::Limit { .. } => "limit",
            Self::Market => "market",
            Self::Trigger { .. } => "trigger",
        }
    }
}

/// Client order ID for idempotency.
///
/// Every submission carries a fresh id so a retried request can be told
/// apart from a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Format: `pmm_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().simple().to_string()[..8];
        Self(format!("pmm_{ts}_{uuid_short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exchange-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderHandle(String);

impl OrderHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully-quantized order ready for the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_id: ClientOrderId,
    pub pair: TradingPair,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub size: Size,
}

impl OrderRequest {
    pub fn new(pair: TradingPair, side: OrderSide, kind: OrderKind, size: Size) -> Self {
        Self {
            client_id: ClientOrderId::new(),
            pair,
            side,
            kind,
            size,
        }
    }
}

/// Order lifecycle as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum OrderStatus {
    Open,
    /// Some size executed, `remaining` is still working.
    PartiallyFilled { remaining: f64, avg_price: f64 },
    Filled { avg_price: f64 },
    /// Cancelled by us, expired, or rejected (post-only cross).
    Cancelled,
}

impl OrderStatus {
    /// True while the order can still execute.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Open | Self::PartiallyFilled { .. })
    }
}
