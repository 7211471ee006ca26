//! Bonder node: event sync, liquidity accounting and lifecycle watchers for
//! a cross-chain token bridge

pub mod api;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod db;
pub mod error;
pub mod hash;
pub mod liquidity;
pub mod merkle;
pub mod metrics;
pub mod notifier;
pub mod relay;
pub mod retry;
pub mod state;
pub mod sync;
pub mod types;
pub mod watchers;
