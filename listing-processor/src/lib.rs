//! Kafka service running the listing pipeline.
//!
//! Raw listings are validated and re-keyed by identity so that every sighting of a URL lands on
//! the same partition. A second stage deduplicates against the feedback and recovery views,
//! normalizes, and routes each listing to the success or rejected topic. Accepted listings are
//! re-published to the feedback topic, which the view materializers replay into memory.

pub mod config;
pub mod health;
pub mod kafka;
pub mod metrics_consts;
pub mod server;
pub mod service;
pub mod sink;
pub mod views;
