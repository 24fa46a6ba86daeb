//! Realized volatility from sampled mid prices.
//!
//! Blends short-window, long-window and EWMA volatility of log returns into
//! a single `effective_vol` used by auto mode. One estimator per pair; the
//! EWMA variance is carried between updates.

use pmm_core::CoreError;
use serde::Serialize;

use crate::config::VolatilityConfig;
use crate::error::{StrategyError, StrategyResult};

const SHORT_WEIGHT: f64 = 0.3;
const EWMA_WEIGHT: f64 = 0.4;
const LONG_WEIGHT: f64 = 0.3;

/// Fewest log returns that give a sample standard deviation.
pub const MIN_RETURNS: usize = 2;

/// Output of one estimator update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolatilityReading {
    pub short_vol: f64,
    pub long_vol: f64,
    pub ewma_vol: f64,
    /// Weighted blend scaled by the annualization factor.
    pub effective_vol: f64,
}

#[derive(Debug, Clone)]
pub struct VolatilityEstimator {
    config: VolatilityConfig,
    ewma_variance: Option<f64>,
}

impl VolatilityEstimator {
    pub fn new(config: VolatilityConfig) -> Self {
        Self {
            config,
            ewma_variance: None,
        }
    }

    pub fn ewma_variance(&self) -> Option<f64> {
        self.ewma_variance
    }

    /// Update from a chronological price window (oldest first).
    ///
    /// The first successful call seeds the EWMA with the first squared
    /// return and folds in the rest of the window. Later calls fold in only
    /// the newest return, matching a sampler that appends one price per
    /// update.
    pub fn update(&mut self, prices: &[f64]) -> StrategyResult<VolatilityReading> {
        let returns = log_returns(prices)?;
        if returns.len() < MIN_RETURNS {
            return Err(StrategyError::InsufficientData {
                needed: MIN_RETURNS,
                available: returns.len(),
            });
        }

        let lambda = self.config.ewma_lambda;
        let variance = match self.ewma_variance {
            None => returns[1..]
                .iter()
                .fold(returns[0] * returns[0], |var, r| {
                    lambda * var + (1.0 - lambda) * r * r
                }),
            Some(prev) => {
                let latest = returns[returns.len() - 1];
                lambda * prev + (1.0 - lambda) * latest * latest
            }
        };
        self.ewma_variance = Some(variance);

        let short_vol = sample_std(tail(&returns, self.config.short_window));
        let long_vol = sample_std(tail(&returns, self.config.long_window));
        let ewma_vol = variance.sqrt();
        let blended = SHORT_WEIGHT * short_vol + EWMA_WEIGHT * ewma_vol + LONG_WEIGHT * long_vol;
        let effective_vol = blended * self.config.annualization_factor;

        Ok(VolatilityReading {
            short_vol,
            long_vol,
            ewma_vol,
            effective_vol,
        })
    }
}

fn log_returns(prices: &[f64]) -> StrategyResult<Vec<f64>> {
    if let Some(bad) = prices.iter().find(|p| !(p.is_finite() && **p > 0.0)) {
        return Err(CoreError::InvalidInput(format!(
            "volatility prices must be positive, got {bad}"
        ))
        .into());
    }
    Ok(prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect())
}

fn tail(values: &[f64], window: usize) -> &[f64] {
    &values[values.len().saturating_sub(window)..]
}

/// Sample (n - 1) standard deviation.
fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> VolatilityEstimator {
        VolatilityEstimator::new(VolatilityConfig::default())
    }

    #[test]
    fn test_constant_prices_have_zero_vol() {
        let mut est = estimator();
        let reading = est.update(&[10.0; 50]).unwrap();
        assert_eq!(reading.short_vol, 0.0);
        assert_eq!(reading.long_vol, 0.0);
        assert_eq!(reading.ewma_vol, 0.0);
        assert_eq!(reading.effective_vol, 0.0);
    }

    #[test]
    fn test_insufficient_data() {
        let mut est = estimator();
        assert!(matches!(
            est.update(&[10.0, 10.1]),
            Err(StrategyError::InsufficientData {
                needed: 2,
                available: 1
            })
        ));
        assert!(est.update(&[]).is_err());
        // nothing was seeded
        assert_eq!(est.ewma_variance(), None);
    }

    #[test]
    fn test_rejects_non_positive_prices() {
        let mut est = estimator();
        assert!(matches!(
            est.update(&[10.0, 0.0, 10.0]),
            Err(StrategyError::Core(CoreError::InvalidInput(_)))
        ));
    }

    #[test]
    fn test_sample_std_of_known_returns() {
        // returns alternate +r, -r: mean 0, sample var = 4r^2 / 3 for four returns
        let r = 0.01f64;
        let up = r.exp();
        let prices = [100.0, 100.0 * up, 100.0, 100.0 * up, 100.0];
        let mut est = estimator();
        let reading = est.update(&prices).unwrap();

        let expected = (4.0 * r * r / 3.0).sqrt();
        assert!((reading.short_vol - expected).abs() < 1e-12);
        assert!((reading.long_vol - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ewma_seed_and_persistence() {
        let mut est = estimator();
        let r = 0.02f64;
        let mut prices = vec![100.0, 100.0 * r.exp(), 100.0 * (2.0 * r).exp()];
        let first = est.update(&prices).unwrap();

        // seed r^2, then 0.94 * r^2 + 0.06 * r^2 = r^2
        assert!((first.ewma_vol - r).abs() < 1e-12);

        // a flat sample only decays the variance
        prices.push(100.0 * (2.0 * r).exp());
        let second = est.update(&prices).unwrap();
        assert!((second.ewma_vol - (0.94 * r * r).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_effective_vol_blend() {
        let mut est = estimator();
        let prices: Vec<f64> = (0..100).map(|i| 100.0 + (i % 3) as f64).collect();
        let reading = est.update(&prices).unwrap();
        let blend = 0.3 * reading.short_vol + 0.4 * reading.ewma_vol + 0.3 * reading.long_vol;
        assert!((reading.effective_vol - blend * 60.0).abs() < 1e-9);
        assert!(reading.short_vol > 0.0);
    }
}
