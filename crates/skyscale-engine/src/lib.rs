//! skyscale-engine — policy-bounded scaling decisions.
//!
//! A [`Trigger`] names an application and an adjustment (`"+1"`, `"-50%"`).
//! The [`ScalingEngine`] reads the application's policy and its current
//! instance count, computes the new count clamped to the policy bounds,
//! and applies it unless it is unchanged.
//!
//! ```text
//! policy ──► current count ──► compute + clamp ──► equal? ──► set count
//!   │             │                  │               │           │
//!   ▼             ▼                  ▼               ▼           ▼
//! PolicyUnavailable  ComputeUnavailable  InvalidAdjustment  (no-op)  ComputeUpdateFailed
//! ```
//!
//! Every call leaves one [`ScalingHistory`](skyscale_state::ScalingHistory)
//! entry behind.

pub mod adjustment;
pub mod backend;
pub mod engine;
pub mod trigger;

pub use adjustment::{
    Adjustment, AdjustmentError, Limit, clamp_instances, compute_new_instance_count,
};
pub use backend::{BoxFuture, ComputeClient, HistoryRecorder, PolicySource};
pub use engine::{ScaleError, ScalingDecision, ScalingEngine};
pub use trigger::Trigger;
