//! Local failover router in front of two interactive coding-assistant CLIs.
//!
//! See the individual modules for the seven components: state store,
//! provider adapters, error classifier, cooldown policy, handoff builder,
//! router, and turn driver.

pub mod cli;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod provider;
pub mod router;
pub mod state;
pub mod turn;
