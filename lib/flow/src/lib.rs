//! Flow graph model and event propagation for flowhook.
//!
//! This crate provides:
//!
//! - **Model**: Flow graphs and nodes as stored by the authoring system
//! - **Flattening**: Nested JSON payloads to a flat, prefixed key space
//! - **Fan-out**: One derived event per child node, published to the event bus
//! - **NATS**: JetStream-backed event bus

pub mod bus;
pub mod envelope;
pub mod error;
pub mod event;
pub mod fanout;
pub mod flatten;
pub mod model;
pub mod nats;
pub mod retry;
pub mod store;

pub use bus::EventBus;
pub use error::{BusError, EnvelopeError, StoreError};
pub use event::{BusConfig, BusEntry, DerivedEvent};
pub use fanout::{ChildDelivery, FanoutPublisher, FanoutReport, PublishResult};
pub use flatten::{FlatPayload, flatten};
pub use model::{ActionMeta, FlowGraph, FlowNode, NodeMeta};
pub use retry::RetryPolicy;
pub use store::FlowStore;
