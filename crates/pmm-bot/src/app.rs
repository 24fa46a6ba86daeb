//! Main application orchestration.
//!
//! Spawns one task per loop, all reading the same snapshot channel:
//! - snapshot task (mid price + balances -> exposure signal)
//! - volatility sampler
//! - quoting loop
//! - active hedge
//! - passive hedge
//! - simulated price walk (paper backend with `random_walk_bps > 0`)
//!
//! A ctrl-c cancels the shared token; each task finishes its tick and exits.

use std::sync::Arc;
use std::time::Duration;

use pmm_core::{ExposureConfig, MarketSpec, TradingPair};
use pmm_exchange::{Balances, DynExchange, DynPriceFeed, PaperExchange};
use pmm_hedge::{snapshot_channel, ActiveHedger, PassiveHedger, SnapshotSender, TickSnapshot};
use pmm_strategy::{build_strategy, StrategyError, VolatilityConfig, VolatilityEstimator};
use pmm_telemetry::Metrics;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::quoting::QuotingLoop;

/// Main application.
pub struct Application {
    config: AppConfig,
    pair: TradingPair,
    market: MarketSpec,
    exchange: DynExchange,
    feed: DynPriceFeed,
    /// Resolved by `preflight()` at the live mid price.
    exposure: Option<ExposureConfig>,
    /// Set when running against the paper exchange.
    paper: Option<Arc<PaperExchange>>,
    shutdown: CancellationToken,
}

impl Application {
    /// Create a new application over the given collaborators.
    ///
    /// Call `preflight()` before `run()`.
    pub fn new(config: AppConfig, exchange: DynExchange, feed: DynPriceFeed) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            pair: config.market.pair(),
            market: config.market.spec(),
            config,
            exchange,
            feed,
            exposure: None,
            paper: None,
            shutdown: CancellationToken::new(),
        })
    }

    /// Application backed by a `PaperExchange` seeded from `[paper]` and the
    /// starting balances in `[exposure]`.
    pub fn paper(config: AppConfig) -> AppResult<Self> {
        let exchange = Arc::new(PaperExchange::new(
            config.market.pair(),
            config.paper.initial_price,
            config.paper.spread_bps,
            Balances {
                inventory_amount: config.exposure.init_inventory_amount,
                quote_amount: config.exposure.init_quote_amount,
            },
        ));
        info!(
            pair = %exchange.pair(),
            initial_price = config.paper.initial_price,
            spread_bps = config.paper.spread_bps,
            random_walk_bps = config.paper.random_walk_bps,
            "Using paper exchange"
        );
        let mut app = Self::new(config, exchange.clone(), exchange.clone())?;
        app.paper = Some(exchange);
        Ok(app)
    }

    /// Token that stops every task when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn exposure(&self) -> Option<&ExposureConfig> {
        self.exposure.as_ref()
    }

    /// Read the live mid price and balances and fix the exposure
    /// configuration for the session.
    pub async fn preflight(&mut self) -> AppResult<()> {
        let mid = self.exchange.mid_price(&self.pair).await?;
        let balances = self.exchange.balances(&self.pair).await?;
        let exposure = self.config.exposure.resolve(mid)?;

        info!(
            pair = %self.pair,
            mid,
            inventory = balances.inventory_amount,
            quote = balances.quote_amount,
            init_iqv_ratio = exposure.init_iqv_ratio,
            iqv_up_limit = exposure.iqv_up_limit,
            iqv_down_limit = exposure.iqv_down_limit,
            "Preflight complete"
        );
        self.exposure = Some(exposure);
        Ok(())
    }

    /// Run every loop until ctrl-c or the shutdown token is cancelled.
    pub async fn run(self) -> AppResult<()> {
        let exposure = self.exposure.ok_or_else(|| {
            AppError::Preflight("Exposure not resolved. Call preflight() first.".to_string())
        })?;
        let strategy = build_strategy(&self.config.strategy, exposure)?;

        info!(
            pair = %self.pair,
            mode = %self.config.strategy.mode,
            "Starting application"
        );

        let (snapshot_tx, snapshot_rx) = snapshot_channel();
        let (vol_tx, vol_rx) = watch::channel(None);
        let token = self.shutdown.clone();

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        tasks.push((
            "snapshot",
            tokio::spawn(snapshot_loop(
                self.exchange.clone(),
                self.pair.clone(),
                exposure.init_iqv_ratio,
                Duration::from_millis(self.config.snapshot_interval_ms),
                snapshot_tx,
                token.clone(),
            )),
        ));

        tasks.push((
            "volatility",
            tokio::spawn(volatility_loop(
                self.feed.clone(),
                self.pair.clone(),
                self.config.volatility.clone(),
                vol_tx,
                token.clone(),
            )),
        ));

        let quoting = QuotingLoop::new(
            strategy,
            self.pair.clone(),
            self.market,
            self.exchange.clone(),
            self.config.hedge.retry,
            Duration::from_millis(self.config.strategy.update_interval_ms),
        );
        tasks.push((
            "quoting",
            tokio::spawn(quoting.run(snapshot_rx.clone(), vol_rx, token.clone())),
        ));

        let active = ActiveHedger::new(
            self.config.hedge.clone(),
            exposure.init_iqv_ratio,
            self.pair.clone(),
            self.market,
            self.exchange.clone(),
        );
        tasks.push((
            "active_hedge",
            tokio::spawn(active.run(snapshot_rx.clone(), token.clone())),
        ));

        let passive = PassiveHedger::new(
            self.config.hedge.clone(),
            self.pair.clone(),
            self.market,
            self.exchange.clone(),
        );
        tasks.push((
            "passive_hedge",
            tokio::spawn(passive.run(snapshot_rx, token.clone())),
        ));

        if let Some(paper) = self.paper.clone() {
            let walk = &self.config.paper;
            if walk.random_walk_bps > 0.0 {
                let rng = match walk.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                tasks.push((
                    "price_walk",
                    tokio::spawn(price_walk_loop(
                        paper,
                        walk.random_walk_bps,
                        Duration::from_millis(walk.price_step_ms),
                        rng,
                        token.clone(),
                    )),
                ));
            }
        }

        let signal_token = token.clone();
        let signal_handle = tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        info!("Shutdown signal received");
                        signal_token.cancel();
                    }
                    Err(e) => error!(error = %e, "Failed to listen for ctrl-c"),
                },
                () = signal_token.cancelled() => {}
            }
        });

        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "Task exited abnormally");
                token.cancel();
            }
        }
        signal_handle.abort();

        info!(pair = %self.pair, "Application stopped");
        Ok(())
    }
}

// ============================================================================
// Background loops
// ============================================================================

/// Publish a fresh snapshot every `interval`. A failed capture keeps the
/// previous snapshot in place.
async fn snapshot_loop(
    exchange: DynExchange,
    pair: TradingPair,
    init_iqv_ratio: f64,
    interval: Duration,
    tx: SnapshotSender,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seq = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = shutdown.cancelled() => break,
        }

        match TickSnapshot::capture(exchange.as_ref(), &pair, seq + 1, init_iqv_ratio).await {
            Ok(snapshot) => {
                seq = snapshot.seq;
                Metrics::exposure(snapshot.exposure.iqv_ratio, snapshot.exposure.iqv_move_ratio);
                debug!(
                    seq,
                    price = snapshot.position.price,
                    iqv_ratio = snapshot.exposure.iqv_ratio,
                    iqv_move_ratio = snapshot.exposure.iqv_move_ratio,
                    "Snapshot published"
                );
                tx.send_replace(Some(Arc::new(snapshot)));
            }
            Err(e) => {
                Metrics::order_failure("snapshot");
                if e.is_degraded() {
                    Metrics::degraded("snapshot");
                }
                warn!(%pair, error = %e, "Snapshot failed, keeping previous");
            }
        }
    }

    info!(seq, "Snapshot task stopped");
}

/// Sample the price feed and publish the effective volatility.
async fn volatility_loop(
    feed: DynPriceFeed,
    pair: TradingPair,
    config: VolatilityConfig,
    tx: watch::Sender<Option<f64>>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.sample_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let history_limit = config.history_limit;
    let mut estimator = VolatilityEstimator::new(config);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = shutdown.cancelled() => break,
        }

        let prices = match feed.latest_prices(&pair, history_limit).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!(%pair, error = %e, "Price history unavailable");
                continue;
            }
        };

        match estimator.update(&prices) {
            Ok(reading) => {
                Metrics::effective_vol(reading.effective_vol);
                debug!(
                    short_vol = reading.short_vol,
                    long_vol = reading.long_vol,
                    ewma_vol = reading.ewma_vol,
                    effective_vol = reading.effective_vol,
                    "Volatility updated"
                );
                tx.send_replace(Some(reading.effective_vol));
            }
            Err(StrategyError::InsufficientData { needed, available }) => {
                debug!(needed, available, "Not enough price history for volatility");
            }
            Err(e) => warn!(error = %e, "Volatility update failed"),
        }
    }

    info!("Volatility task stopped");
}

/// Move the paper mid by a uniform step of at most `step_bps` each
/// `interval`. Resting orders and triggers fill as the price crosses them.
async fn price_walk_loop(
    exchange: Arc<PaperExchange>,
    step_bps: f64,
    interval: Duration,
    mut rng: StdRng,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let max_step = step_bps / 10_000.0;
    let mut steps = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = shutdown.cancelled() => break,
        }

        let step: f64 = rng.gen_range(-max_step..=max_step);
        let mid = exchange.mid() * (1.0 + step);
        exchange.set_mid_price(mid);
        steps += 1;
        if steps % 60 == 0 {
            debug!(steps, mid, "Paper price walk");
        }
    }

    info!(steps, mid = exchange.mid(), "Price walk stopped");
}
