//! Inventory-Quote Value (IQV) exposure signal.
//!
//! Both the strategy engine and the hedge controller act on the IQV move
//! ratio. It is computed once per snapshot and passed down so every consumer
//! of a tick sees the same value.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Balances and mid price read from the exchange in one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub price: f64,
    pub inventory_amount: f64,
    pub quote_amount: f64,
}

impl Position {
    pub fn new(price: f64, inventory_amount: f64, quote_amount: f64) -> Self {
        Self {
            price,
            inventory_amount,
            quote_amount,
        }
    }

    /// Inventory valued in quote currency.
    #[inline]
    pub fn inventory_value(&self) -> f64 {
        self.inventory_amount * self.price
    }

    #[inline]
    pub fn total_value(&self) -> f64 {
        self.inventory_value() + self.quote_amount
    }
}

// ============================================================================
// ExposureConfig
// ============================================================================

/// Immutable per-run exposure thresholds, expressed as IQV move ratios
/// (except `init_iqv_ratio`, which is a plain IQV ratio).
///
/// Ordering: `iqv_down_limit < quote_rb_iqv_ratio <= inventory_rb_iqv_ratio < iqv_up_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureConfig {
    pub init_iqv_ratio: f64,
    /// Move ratio at which bids are fully suppressed.
    pub iqv_up_limit: f64,
    /// Move ratio at which asks are fully suppressed.
    pub iqv_down_limit: f64,
    /// Bids start shrinking above this move ratio.
    pub inventory_rb_iqv_ratio: f64,
    /// Asks start shrinking below this move ratio.
    pub quote_rb_iqv_ratio: f64,
}

impl ExposureConfig {
    /// Build and validate.
    pub fn new(
        init_iqv_ratio: f64,
        iqv_up_limit: f64,
        iqv_down_limit: f64,
        inventory_rb_iqv_ratio: f64,
        quote_rb_iqv_ratio: f64,
    ) -> Result<Self> {
        let config = Self {
            init_iqv_ratio,
            iqv_up_limit,
            iqv_down_limit,
            inventory_rb_iqv_ratio,
            quote_rb_iqv_ratio,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject threshold orderings that would make the rebalance bands
    /// overlap the hard limits.
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("init_iqv_ratio", self.init_iqv_ratio),
            ("iqv_up_limit", self.iqv_up_limit),
            ("iqv_down_limit", self.iqv_down_limit),
            ("inventory_rb_iqv_ratio", self.inventory_rb_iqv_ratio),
            ("quote_rb_iqv_ratio", self.quote_rb_iqv_ratio),
        ];
        if let Some((name, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(CoreError::InvalidConfig(format!(
                "{name} must be finite, got {value}"
            )));
        }
        if self.init_iqv_ratio <= 0.0 || self.init_iqv_ratio > 1.0 {
            return Err(CoreError::InvalidConfig(format!(
                "init_iqv_ratio must be in (0, 1], got {}",
                self.init_iqv_ratio
            )));
        }
        if !(self.iqv_down_limit < self.quote_rb_iqv_ratio
            && self.quote_rb_iqv_ratio <= self.inventory_rb_iqv_ratio
            && self.inventory_rb_iqv_ratio < self.iqv_up_limit)
        {
            return Err(CoreError::InvalidConfig(format!(
                "exposure thresholds must satisfy iqv_down_limit ({}) < quote_rb_iqv_ratio ({}) \
                 <= inventory_rb_iqv_ratio ({}) < iqv_up_limit ({})",
                self.iqv_down_limit,
                self.quote_rb_iqv_ratio,
                self.inventory_rb_iqv_ratio,
                self.iqv_up_limit
            )));
        }
        Ok(())
    }

    /// IQV ratio of the starting balances at `price`.
    pub fn init_iqv_ratio_from(
        init_inventory_amount: f64,
        init_quote_amount: f64,
        price: f64,
    ) -> Result<f64> {
        let position = Position::new(price, init_inventory_amount, init_quote_amount);
        check_position(&position)?;
        let total = position.total_value();
        if total <= 0.0 {
            return Err(CoreError::InvalidInput(
                "initial balances are both zero".to_string(),
            ));
        }
        Ok(position.inventory_value() / total)
    }
}

// ============================================================================
// ExposureSignal
// ============================================================================

/// Exposure derived from one `Position`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureSignal {
    /// inventory value / (inventory value + quote value)
    pub iqv_ratio: f64,
    /// (iqv_ratio - init) / init
    pub iqv_move_ratio: f64,
}

impl ExposureSignal {
    /// Compute the signal. Fails with `InvalidInput` on negative balances,
    /// a non-positive price or a zero `init_iqv_ratio`.
    pub fn compute(
        inventory_amount: f64,
        price: f64,
        quote_amount: f64,
        init_iqv_ratio: f64,
    ) -> Result<Self> {
        Self::from_position(
            &Position::new(price, inventory_amount, quote_amount),
            init_iqv_ratio,
        )
    }

    pub fn from_position(position: &Position, init_iqv_ratio: f64) -> Result<Self> {
        check_position(position)?;
        if init_iqv_ratio == 0.0 || !init_iqv_ratio.is_finite() {
            return Err(CoreError::InvalidInput(format!(
                "init_iqv_ratio must be non-zero and finite, got {init_iqv_ratio}"
            )));
        }

        let total = position.total_value();
        let iqv_ratio = if total > 0.0 {
            position.inventory_value() / total
        } else {
            0.0
        };

        Ok(Self {
            iqv_ratio,
            iqv_move_ratio: (iqv_ratio - init_iqv_ratio) / init_iqv_ratio,
        })
    }
}

fn check_position(position: &Position) -> Result<()> {
    if !position.inventory_amount.is_finite() || position.inventory_amount < 0.0 {
        return Err(CoreError::InvalidInput(format!(
            "inventory_amount must be >= 0, got {}",
            position.inventory_amount
        )));
    }
    if !position.quote_amount.is_finite() || position.quote_amount < 0.0 {
        return Err(CoreError::InvalidInput(format!(
            "quote_amount must be >= 0, got {}",
            position.quote_amount
        )));
    }
    if !position.price.is_finite() || position.price <= 0.0 {
        return Err(CoreError::InvalidInput(format!(
            "price must be > 0, got {}",
            position.price
        )));
    }
    Ok(())
}
