//! Quote ladders.

use serde::{Deserialize, Serialize};

/// One price/size pair in a quote ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub price: f64,
    pub size: f64,
}

impl Bin {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }

    #[inline]
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

/// Bid and ask bins, each side ordered by increasing distance from mid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ladder {
    pub bids: Vec<Bin>,
    pub asks: Vec<Bin>,
}

impl Ladder {
    pub fn new(bids: Vec<Bin>, asks: Vec<Bin>) -> Self {
        Self { bids, asks }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Quote currency committed by all bids.
    pub fn bid_notional(&self) -> f64 {
        self.bids.iter().map(Bin::notional).sum()
    }

    pub fn bid_size(&self) -> f64 {
        self.bids.iter().map(|b| b.size).sum()
    }

    /// Inventory committed by all asks.
    pub fn ask_size(&self) -> f64 {
        self.asks.iter().map(|b| b.size).sum()
    }

    /// Size-weighted average bid price, `None` without bids.
    pub fn vwap_bid_price(&self) -> Option<f64> {
        let size = self.bid_size();
        if size > 0.0 {
            Some(self.bid_notional() / size)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_totals() {
        let ladder = Ladder::new(
            vec![Bin::new(99.0, 1.0), Bin::new(98.0, 2.0)],
            vec![Bin::new(101.0, 0.5)],
        );
        assert!((ladder.bid_notional() - 295.0).abs() < 1e-12);
        assert!((ladder.bid_size() - 3.0).abs() < 1e-12);
        assert!((ladder.ask_size() - 0.5).abs() < 1e-12);

        let vwap = ladder.vwap_bid_price().unwrap();
        assert!((vwap * ladder.bid_size() - ladder.bid_notional()).abs() < 1e-9);
    }

    #[test]
    fn test_empty_ladder() {
        let ladder = Ladder::default();
        assert!(ladder.is_empty());
        assert_eq!(ladder.vwap_bid_price(), None);
    }
}
