//! Driving the external keyword indexer executable
//!
//! This module owns everything that touches the indexer subprocess: its
//! configuration, the one-shot process runner, and the three subcommands
//! (`add` builds, `query` searches, `status` reports corpus drift).

pub mod build;
pub mod config;
pub mod error;
pub mod process;
pub mod query;
pub mod results;
pub mod staleness;
