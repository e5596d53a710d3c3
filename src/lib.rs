//! # fizzq
//!
//! Asynchronous request/processing/poll pattern over a partitioned log.
//!
//! A caller submits an integer and gets an identifier back at once. A worker
//! in the consumer group picks the item off the ingest topic, classifies it
//! and writes the result and a `Processed` status into the status store,
//! where the caller's polls find it.

pub mod api;
pub mod broker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod rule;
pub mod service;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod worker;
