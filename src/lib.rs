//! Validator entity resolution.
//!
//! Labels every beacon-chain validator with the entity that controls it by correlating
//! deposits, aggregator funding traces, curated address registries and the liquid-staking
//! operator registry's events, then overlays exit status. [`engine::LabelEngine`] is the
//! entry point.

pub mod cache;
pub mod deposits;
pub mod directory;
pub mod engine;
pub mod error;
pub mod events;
pub mod exits;
pub mod funding;
pub mod http;
pub mod model;
pub mod pipeline;
pub mod runtime;
pub mod utils;
pub mod warehouse;

pub mod config {
    pub mod known;
}

pub use error::{LabelError, Result};
