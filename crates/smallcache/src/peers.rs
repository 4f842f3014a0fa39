//! Capabilities for locating and querying the peer that owns a key.
//!
//! ```text
//!                              yes                                     yes
//! key -> owned by a remote peer? ---> fetch from that peer ---> success? ---> return value
//!              | no                                               | no
//!              +--------------------------------------------------+---> load from local source
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::StatusCode;

use crate::protocol::{Request, Response};

/// Failure while fetching a value from a remote peer.
///
/// These failures are recoverable, the caller falls back to loading the value itself.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or the connection failed.
    #[error("failed to send peer request")]
    Request(#[source] reqwest::Error),
    /// The peer answered with a non-success status.
    #[error("server returned: {0}")]
    Status(StatusCode),
    /// The response body could not be read.
    #[error("reading response body")]
    Body(#[source] reqwest::Error),
    /// The response body is not a valid [`Response`].
    #[error("decoding response body")]
    Decode(#[from] postcard::Error),
}

/// The client half of the peer protocol.
pub trait PeerGetter: Send + Sync + fmt::Debug {
    /// Asks the peer for `request.key` in `request.group`.
    fn get<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>>;

    /// A human readable address of the peer, used for diagnostics.
    fn address(&self) -> &str;
}

/// Locates the peer owning a key.
pub trait PeerPicker: Send + Sync + fmt::Debug {
    /// Returns the peer owning `key`, or `None` if the local shard owns it or no peers are known.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}
