//! Database access for flowhook.
//!
//! Flow graphs and nodes are written by the authoring system; this service
//! only looks them up.

pub mod flow;

pub use flow::PgFlowStore;
