//! Exchange and price-feed collaborators.
//!
//! - `Exchange` / `PriceFeed`: dyn-compatible traits consumed by the
//!   quoting and hedge loops
//! - `PaperExchange`: in-memory single-pair implementation of both
//! - `RetryPolicy`: bounded exponential backoff for `ExecutionFailure`

pub mod error;
pub mod paper;
pub mod retry;
pub mod traits;

pub use error::{ExchangeError, ExchangeResult};
pub use paper::PaperExchange;
pub use retry::RetryPolicy;
pub use traits::{
    Balances, BoxFuture, DynExchange, DynPriceFeed, Exchange, PriceFeed, TopOfBook,
};
