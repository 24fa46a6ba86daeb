//! Hedge controllers for the IQV market maker.
//!
//! - `ActiveHedger`: taker-backed rebalance once the IQV move ratio leaves
//!   the `active_hedge_iqv_ratio` band
//! - `PassiveHedger`: trigger/stop state machine around the mid
//! - `TickSnapshot`: the immutable per-tick input both controllers share

pub mod active;
pub mod config;
pub mod error;
pub mod passive;
pub mod snapshot;

pub use active::{hedge_size, ActiveHedgePlan, ActiveHedgeState, ActiveHedger, HedgeExecution};
pub use config::HedgeConfig;
pub use error::{HedgeError, HedgeResult};
pub use passive::{
    Leg, PassiveAction, PassiveHedgeState, PassiveHedger, PassiveObservation, PassivePolicy,
    TriggerLeg, TriggerPlan,
};
pub use snapshot::{snapshot_channel, SnapshotReceiver, SnapshotSender, TickSnapshot};
