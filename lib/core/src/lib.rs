//! Core domain types and utilities for flowhook.
//!
//! This crate provides the identifier newtypes and the error handling
//! foundation shared by the flow, provider and pipeline crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{FlowId, NodeId, OrganizationId, WebhookId};
