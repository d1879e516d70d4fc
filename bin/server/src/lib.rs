//! flowhook HTTP and event-bus front end.
//!
//! This crate wires the pipeline to its production adapters: a PostgreSQL
//! flow store, the NATS JetStream event bus and reqwest-based provider
//! clients.

pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod routes;
