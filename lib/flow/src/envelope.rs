//! Wire format of bus entries.
//!
//! Entries travel as `{"version": N, "payload": ...}`. Readers look at the
//! version first and only decode the payload when they know its shape, so a
//! newer writer may change the payload freely.

use crate::error::EnvelopeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The envelope version this build writes and reads.
pub const CURRENT_VERSION: u32 = 1;

#[derive(Serialize)]
struct Outgoing<'a, T> {
    version: u32,
    payload: &'a T,
}

/// Just the version; the payload is skipped without being typed.
#[derive(Deserialize)]
struct Header {
    version: u32,
}

#[derive(Deserialize)]
struct Incoming<T> {
    payload: T,
}

/// Wraps a payload in the current envelope version.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&Outgoing {
        version: CURRENT_VERSION,
        payload,
    })
}

/// Reads the envelope version, then decodes the payload if the version is
/// the current one.
///
/// # Errors
///
/// Returns [`EnvelopeError::UnsupportedVersion`] for any other version,
/// whatever its payload looks like, and [`EnvelopeError::Malformed`] when the
/// bytes are not an envelope or the payload does not have the expected shape.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EnvelopeError> {
    let header: Header = serde_json::from_slice(bytes).map_err(malformed)?;
    if header.version != CURRENT_VERSION {
        return Err(EnvelopeError::UnsupportedVersion {
            version: header.version,
        });
    }

    let incoming: Incoming<T> = serde_json::from_slice(bytes).map_err(malformed)?;
    Ok(incoming.payload)
}

fn malformed(e: serde_json::Error) -> EnvelopeError {
    EnvelopeError::Malformed {
        reason: e.to_string(),
    }
}
