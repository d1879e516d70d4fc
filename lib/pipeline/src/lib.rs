//! Entry points for flowhook events.
//!
//! This crate provides:
//!
//! - **Validation**: Transport identity, pause flags, shared secret and event
//!   whitelist checks for public webhook deliveries
//! - **Pipeline**: The webhook entry (validate, flatten, fan out) and the
//!   action-event entry (pause check, dispatch provider actions)
//!
//! Neither entry returns an error. Every outcome is logged and returned as a
//! value so the caller can acknowledge the delivery unconditionally.

pub mod delivery;
pub mod error;
pub mod pipeline;
pub mod validate;

pub use delivery::{ActionDetail, ActionEvent, DeliveryHeaders, WebhookDelivery};
pub use error::ValidationFailure;
pub use pipeline::{ActionEventOutcome, HandlerPipeline, WebhookOutcome};
pub use validate::{GITLAB, ProviderSignature, ValidatedDelivery, ValidationResult, WebhookValidator};
