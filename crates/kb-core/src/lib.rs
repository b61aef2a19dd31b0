//! Domain types and extraction logic for the Slack knowledge base.
//!
//! Nothing here talks to Slack, Anthropic or HTTP directly; those sit behind
//! the traits in [`ports`] and live in the adapter crates.

pub mod channels;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod ports;
pub mod store;
pub mod utils;
pub mod validation;

pub use errors::{Error, Result};
