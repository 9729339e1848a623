//! The per-ticket processing pipeline.
//!
//! One run per ticket flows through:
//! 1. attachment retrieval
//! 2. multi-agent extraction (`crate::extract`)
//! 3. classification into ready / more-info
//! 4. ban + identifier reconciliation (`crate::ban`)
//! 5. per-bucket reply and tag delivery
//! 6. exactly one outcome notification

pub mod classify;
pub mod dispatch;
pub mod processor;
pub mod types;
