//! Messages exchanged between peers.
//!
//! A peer request is addressed as `<base_url><group>/<key>` with both segments percent-escaped,
//! the [`Request`] message therefore never travels as a body. The response body is a single
//! [`Response`] encoded with `postcard`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The content type of encoded peer responses.
pub const CONTENT_TYPE: &str = "application/octet-stream";

/// A lookup of `key` in the group named `group` on a remote peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub group: String,
    pub key: String,
}

/// The value a peer returned for a [`Request`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub value: Bytes,
}

impl Response {
    /// Encodes the response into its wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_stdvec(self)
    }

    /// Decodes a response from its wire representation.
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }
}
