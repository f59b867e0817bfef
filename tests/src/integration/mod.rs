//! # Integration Scenarios

mod cache_persistence;
mod host_runtime;
mod lifecycle_flows;
mod shared_state_flows;
