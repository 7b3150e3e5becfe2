//! Live News - a single-feed news collector
//!
//! Polls one RSS feed, normalizes and deduplicates its items, keeps them in a
//! pluggable key-value store and serves them through a small web interface.

pub mod config;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod models;
pub mod news;
pub mod normalizer;
pub mod parser;
pub mod routes;
pub mod store;

pub use error::{Error, Result};
