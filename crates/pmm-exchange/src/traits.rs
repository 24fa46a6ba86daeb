//! Collaborator traits for order execution and price history.
//!
//! Both traits are dyn-compatible so the application can run against the
//! in-memory `PaperExchange` or a venue adapter behind the same
//! `Arc<dyn Exchange>`.

use std::pin::Pin;
use std::sync::Arc;

use pmm_core::{OrderHandle, OrderRequest, OrderStatus, TradingPair};
use serde::{Deserialize, Serialize};

use crate::error::ExchangeResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Spendable balances for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    /// Base asset amount.
    pub inventory_amount: f64,
    /// Quote asset amount.
    pub quote_amount: f64,
}

/// Best bid and ask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub bid: f64,
    pub ask: f64,
}

impl TopOfBook {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// Order placement, cancellation and account queries.
pub trait Exchange: Send + Sync {
    fn mid_price<'a>(&'a self, pair: &'a TradingPair) -> BoxFuture<'a, ExchangeResult<f64>>;

    fn top_of_book<'a>(&'a self, pair: &'a TradingPair)
        -> BoxFuture<'a, ExchangeResult<TopOfBook>>;

    fn balances<'a>(&'a self, pair: &'a TradingPair) -> BoxFuture<'a, ExchangeResult<Balances>>;

    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, ExchangeResult<OrderHandle>>;

    fn cancel_order<'a>(&'a self, handle: &'a OrderHandle) -> BoxFuture<'a, ExchangeResult<()>>;

    fn order_status<'a>(
        &'a self,
        handle: &'a OrderHandle,
    ) -> BoxFuture<'a, ExchangeResult<OrderStatus>>;
}

/// Recent mid prices, oldest first.
pub trait PriceFeed: Send + Sync {
    fn latest_prices<'a>(
        &'a self,
        pair: &'a TradingPair,
        n: usize,
    ) -> BoxFuture<'a, ExchangeResult<Vec<f64>>>;
}

/// Arc wrapper for Exchange trait objects.
pub type DynExchange = Arc<dyn Exchange>;

/// Arc wrapper for PriceFeed trait objects.
pub type DynPriceFeed = Arc<dyn PriceFeed>;
