//! Trading pair identity and market precision.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::{Price, Size};
use crate::error::Result;
use crate::order::OrderSide;

/// A spot trading pair, e.g. `SUI/USDC`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    /// Inventory asset.
    pub base: String,
    /// Quote asset.
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Exchange precision for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSpec {
    /// Minimum price increment.
    pub tick_size: Price,
    /// Minimum size increment.
    pub lot_size: Size,
}

impl MarketSpec {
    pub fn new(tick_size: Price, lot_size: Size) -> Self {
        Self {
            tick_size,
            lot_size,
        }
    }

    /// Snap a limit/trigger price onto the tick grid, rounding away from
    /// the touch: bids down, asks up.
    pub fn quantize_price(&self, side: OrderSide, price: f64) -> Result<Price> {
        let raw = Price::from_f64(price)?;
        Ok(match side {
            OrderSide::Buy => raw.floor_to_tick(self.tick_size),
            OrderSide::Sell => raw.ceil_to_tick(self.tick_size),
        })
    }

    /// Snap a size down onto the lot grid. Returns `None` when nothing is
    /// left to submit.
    pub fn quantize_size(&self, size: f64) -> Result<Option<Size>> {
        let rounded = Size::from_f64(size)?.round_to_lot(self.lot_size);
        if rounded.0.is_sign_negative() || rounded.is_zero() {
            return Ok(None);
        }
        Ok(Some(rounded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spec() -> MarketSpec {
        MarketSpec::new(Price::new(dec!(0.01)), Size::new(dec!(0.1)))
    }

    #[test]
    fn test_pair_display() {
        assert_eq!(TradingPair::new("SUI", "USDC").to_string(), "SUI/USDC");
    }

    #[test]
    fn test_quantize_price_rounds_away_from_touch() {
        let spec = spec();
        assert_eq!(
            spec.quantize_price(OrderSide::Buy, 1.2345).unwrap().0,
            dec!(1.23)
        );
        assert_eq!(
            spec.quantize_price(OrderSide::Sell, 1.2345).unwrap().0,
            dec!(1.24)
        );
    }

    #[test]
    fn test_quantize_size_drops_dust() {
        let spec = spec();
        assert_eq!(spec.quantize_size(0.05).unwrap(), None);
        assert_eq!(spec.quantize_size(1.29).unwrap(), Some(Size::new(dec!(1.2))));
    }
}
