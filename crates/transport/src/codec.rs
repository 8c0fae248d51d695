//! Frame codec.
//!
//! A frame is one version byte followed by the bincode encoding of the
//! payload. Frames with an unknown version byte are rejected rather than
//! guessed at.

use bytes::{BufMut, Bytes, BytesMut};
use corelib::TransportError;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const WIRE_VERSION: u8 = 1;

pub fn encode<T: Serialize>(payload: &T) -> Result<Bytes, TransportError> {
    let body = bincode::serialize(payload).map_err(|e| TransportError::Codec(e.to_string()))?;
    let mut frame = BytesMut::with_capacity(body.len() + 1);
    frame.put_u8(WIRE_VERSION);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, TransportError> {
    match frame.split_first() {
        Some((&WIRE_VERSION, body)) => {
            bincode::deserialize(body).map_err(|e| TransportError::Codec(e.to_string()))
        }
        Some((version, _)) => Err(TransportError::Codec(format!(
            "unsupported wire version {version}"
        ))),
        None => Err(TransportError::Codec("empty frame".into())),
    }
}
