//! FleetOps Integration Tests
//!
//! These tests run against a deployed API (set FLEETOPS_API_URL environment
//! variable).
//!
//! Run with: cargo test --package fleetops-integration-tests

pub mod client;
pub mod fixtures;

pub use client::FleetOpsClient;
pub use fixtures::*;
