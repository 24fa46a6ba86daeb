//! Hedge controller configuration (`[hedge]` section).

use std::time::Duration;

use pmm_exchange::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{HedgeError, HedgeResult};

/// Parameters shared by the active and passive hedge controllers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeConfig {
    /// IQV move ratio beyond which the active hedge fires.
    /// Also scales the restore target: `N = init_iqv_ratio * active_hedge_iqv_ratio`.
    #[serde(default = "default_active_hedge_iqv_ratio")]
    pub active_hedge_iqv_ratio: f64,

    /// Active hedge evaluation period.
    #[serde(default = "default_active_hedge_interval_ms")]
    pub active_hedge_interval_ms: u64,

    /// How long a post-only hedge may rest before the remainder goes to market.
    #[serde(default = "default_post_only_grace_ms")]
    pub post_only_grace_ms: u64,

    /// Trigger distance from mid, as a fraction of price.
    #[serde(default = "default_passive_hedge_ratio")]
    pub passive_hedge_ratio: f64,

    /// Stop distance from entry, as a fraction of price.
    #[serde(default = "default_passive_hedge_sp_ratio")]
    pub passive_hedge_sp_ratio: f64,

    /// Fraction of inventory committed to each trigger.
    #[serde(default = "default_passive_hedge_proportion")]
    pub passive_hedge_proportion: f64,

    /// Armed triggers are re-priced only while `|m|` is within this ratio.
    #[serde(default = "default_passive_hedge_refresh_iqv_ratio")]
    pub passive_hedge_refresh_iqv_ratio: f64,

    #[serde(default = "default_passive_hedge_refresh_interval_secs")]
    pub passive_hedge_refresh_interval_secs: u64,

    /// Hedge in both directions (buy-side active hedge, long trigger).
    #[serde(default = "default_dual_sided_hedge")]
    pub dual_sided_hedge: bool,

    /// Hedges smaller than this are not sent; also the de-duplication tolerance.
    #[serde(default)]
    pub min_hedge_order_size: f64,

    /// Active hedges are refused while the taker price is this far from mid.
    #[serde(default = "default_max_price_deviation")]
    pub max_price_deviation: f64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_active_hedge_iqv_ratio() -> f64 {
    0.7
}

fn default_active_hedge_interval_ms() -> u64 {
    1_000
}

fn default_post_only_grace_ms() -> u64 {
    3_000
}

fn default_passive_hedge_ratio() -> f64 {
    0.01
}

fn default_passive_hedge_sp_ratio() -> f64 {
    0.005
}

fn default_passive_hedge_proportion() -> f64 {
    0.5
}

fn default_passive_hedge_refresh_iqv_ratio() -> f64 {
    0.2
}

fn default_passive_hedge_refresh_interval_secs() -> u64 {
    30
}

fn default_dual_sided_hedge() -> bool {
    true
}

fn default_max_price_deviation() -> f64 {
    0.02
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            active_hedge_iqv_ratio: default_active_hedge_iqv_ratio(),
            active_hedge_interval_ms: default_active_hedge_interval_ms(),
            post_only_grace_ms: default_post_only_grace_ms(),
            passive_hedge_ratio: default_passive_hedge_ratio(),
            passive_hedge_sp_ratio: default_passive_hedge_sp_ratio(),
            passive_hedge_proportion: default_passive_hedge_proportion(),
            passive_hedge_refresh_iqv_ratio: default_passive_hedge_refresh_iqv_ratio(),
            passive_hedge_refresh_interval_secs: default_passive_hedge_refresh_interval_secs(),
            dual_sided_hedge: default_dual_sided_hedge(),
            min_hedge_order_size: 0.0,
            max_price_deviation: default_max_price_deviation(),
            retry: RetryPolicy::default(),
        }
    }
}

impl HedgeConfig {
    pub fn active_interval(&self) -> Duration {
        Duration::from_millis(self.active_hedge_interval_ms)
    }

    pub fn post_only_grace(&self) -> Duration {
        Duration::from_millis(self.post_only_grace_ms)
    }

    pub fn passive_interval(&self) -> Duration {
        Duration::from_secs(self.passive_hedge_refresh_interval_secs)
    }

    pub fn validate(&self) -> HedgeResult<()> {
        let positive = [
            ("active_hedge_iqv_ratio", self.active_hedge_iqv_ratio),
            ("passive_hedge_ratio", self.passive_hedge_ratio),
            ("passive_hedge_sp_ratio", self.passive_hedge_sp_ratio),
            ("passive_hedge_refresh_iqv_ratio", self.passive_hedge_refresh_iqv_ratio),
            ("max_price_deviation", self.max_price_deviation),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(HedgeError::Config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        // Ratios applied as price offsets must keep the short-side price positive.
        if self.passive_hedge_ratio >= 1.0 || self.passive_hedge_sp_ratio >= 1.0 {
            return Err(HedgeError::Config(format!(
                "passive_hedge_ratio ({}) and passive_hedge_sp_ratio ({}) must be below 1",
                self.passive_hedge_ratio, self.passive_hedge_sp_ratio
            )));
        }
        let proportion = self.passive_hedge_proportion;
        if !(proportion > 0.0 && proportion <= 1.0) {
            return Err(HedgeError::Config(format!(
                "passive_hedge_proportion must be in (0, 1], got {proportion}"
            )));
        }
        if !(self.min_hedge_order_size.is_finite() && self.min_hedge_order_size >= 0.0) {
            return Err(HedgeError::Config(format!(
                "min_hedge_order_size must be non-negative, got {}",
                self.min_hedge_order_size
            )));
        }
        if self.active_hedge_interval_ms == 0 || self.passive_hedge_refresh_interval_secs == 0 {
            return Err(HedgeError::Config(
                "hedge intervals must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(HedgeError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
