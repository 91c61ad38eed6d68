//! Counterparty flow maps for wallets: graph building, per-pair transaction
//! expansion, and a pendulum force layout ready for rendering.

pub mod config;
pub mod expansion;
pub mod flow;
pub mod geometry;
pub mod layout;
pub mod session;
pub mod util;
