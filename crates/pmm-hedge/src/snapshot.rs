//! Immutable per-tick view of the account.
//!
//! The snapshot task publishes one `Arc<TickSnapshot>` per tick on a
//! `watch` channel; the quoting loop and both hedge controllers read the
//! latest value without locking.

use std::sync::Arc;

use pmm_core::{ExposureSignal, Position, TradingPair};
use pmm_exchange::Exchange;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::HedgeResult;

/// Position and exposure read together, tagged with a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickSnapshot {
    pub seq: u64,
    pub position: Position,
    pub exposure: ExposureSignal,
    /// Unix milliseconds.
    pub taken_at_ms: i64,
}

/// Latest snapshot; `None` until the first one is taken.
pub type SnapshotReceiver = watch::Receiver<Option<Arc<TickSnapshot>>>;
pub type SnapshotSender = watch::Sender<Option<Arc<TickSnapshot>>>;

impl TickSnapshot {
    pub fn new(seq: u64, position: Position, init_iqv_ratio: f64) -> HedgeResult<Self> {
        let exposure = ExposureSignal::from_position(&position, init_iqv_ratio)?;
        Ok(Self {
            seq,
            position,
            exposure,
            taken_at_ms: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Read mid price and balances from the exchange.
    pub async fn capture(
        exchange: &dyn Exchange,
        pair: &TradingPair,
        seq: u64,
        init_iqv_ratio: f64,
    ) -> HedgeResult<Self> {
        let price = exchange.mid_price(pair).await?;
        let balances = exchange.balances(pair).await?;
        let position = Position::new(price, balances.inventory_amount, balances.quote_amount);
        Self::new(seq, position, init_iqv_ratio)
    }

    pub fn iqv_move_ratio(&self) -> f64 {
        self.exposure.iqv_move_ratio
    }
}

/// Channel pair for publishing snapshots.
pub fn snapshot_channel() -> (SnapshotSender, SnapshotReceiver) {
    watch::channel(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HedgeError;
    use pmm_exchange::{Balances, PaperExchange};

    #[tokio::test]
    async fn test_capture_reads_exchange() {
        let pair = TradingPair::new("SUI", "USDC");
        let exchange = PaperExchange::new(
            pair.clone(),
            100.0,
            10.0,
            Balances {
                inventory_amount: 10.0,
                quote_amount: 500.0,
            },
        );
        let snapshot = TickSnapshot::capture(&exchange, &pair, 7, 1000.0 / 1500.0)
            .await
            .unwrap();
        assert_eq!(snapshot.seq, 7);
        assert!((snapshot.exposure.iqv_ratio - 1000.0 / 1500.0).abs() < 1e-12);
        assert!(snapshot.iqv_move_ratio().abs() < 1e-12);
    }

    #[test]
    fn test_invalid_position_is_rejected() {
        let position = Position::new(0.0, 10.0, 500.0);
        assert!(TickSnapshot::new(1, position, 0.5).is_err());
    }

    #[test]
    fn test_capture_fails_without_market() {
        let exchange = PaperExchange::new(
            TradingPair::new("SUI", "USDC"),
            100.0,
            10.0,
            Balances {
                inventory_amount: 10.0,
                quote_amount: 500.0,
            },
        );
        let other = TradingPair::new("ETH", "USDC");
        let result = tokio_test::block_on(TickSnapshot::capture(&exchange, &other, 1, 0.5));
        assert!(matches!(result, Err(HedgeError::Exchange(_))));
    }
}
