//! Integration tests for Surge
//!
//! These tests drive the dispatcher, policies and simulation harness together
//! and check behaviour that only shows up across component boundaries.

#[path = "integration/concrete_scenarios.rs"]
mod concrete_scenarios;
#[path = "integration/conservation.rs"]
mod conservation;
#[path = "integration/policy_behaviour.rs"]
mod policy_behaviour;
#[path = "integration/config_loading.rs"]
mod config_loading;
