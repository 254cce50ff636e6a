//! `dailypapers` crate (library surface).
//!
//! The primary entrypoint for end users is the `dailypapers` binary. This library
//! exposes the pipeline pieces so they can be driven (and tested) with other
//! feeds, providers and document sources.

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod snapshot;

pub use dailypapers_core as core;
pub use dailypapers_local as local;
