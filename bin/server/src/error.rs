//! Domain error types for server operations.

use flowhook_flow::EnvelopeError;
use std::fmt;

/// Action consumer errors.
#[derive(Debug)]
pub enum ConsumerError {
    /// The stream or durable consumer could not be set up.
    Setup { message: String },
    /// The message stream failed.
    Stream { message: String },
    /// A message is not a bus entry this build can read.
    Envelope(EnvelopeError),
}

impl fmt::Display for ConsumerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup { message } => write!(f, "consumer setup failed: {message}"),
            Self::Stream { message } => write!(f, "consumer stream failed: {message}"),
            Self::Envelope(e) => write!(f, "failed to decode bus entry: {e}"),
        }
    }
}

impl std::error::Error for ConsumerError {}

impl From<EnvelopeError> for ConsumerError {
    fn from(e: EnvelopeError) -> Self {
        Self::Envelope(e)
    }
}
