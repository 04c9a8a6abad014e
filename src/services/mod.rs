pub mod access_policy;
pub mod aggregation;
pub mod keyed_lock;

pub use access_policy::{AccessDecision, AccessPolicy, DenyReason};
pub use aggregation::AggregationEngine;
pub use keyed_lock::KeyedLocks;
