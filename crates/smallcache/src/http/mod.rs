//! The HTTP transport between peers.
//!
//! Every shard runs an [`HttpPool`], which serves the shard's groups to its peers under a common
//! base path and picks the peer owning a key for outgoing lookups.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

mod client;
mod pool;
mod server;

pub use client::HttpGetter;
pub use pool::{HttpPool, PoolOptions};
pub use server::ServeError;

/// The path prefix under which peers serve each other by default.
pub const DEFAULT_BASE_PATH: &str = "/_smallcache/";

/// The default number of virtual nodes per peer on the hash ring.
pub const DEFAULT_REPLICAS: usize = 50;

/// Characters escaped in a path segment, everything except the unreserved set of RFC 3986.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn escape_segment(segment: &str) -> String {
    percent_encoding::utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

fn unescape_segment(segment: &str) -> Option<String> {
    percent_encoding::percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_segment() {
        assert_eq!(escape_segment("Tom"), "Tom");
        assert_eq!(escape_segment("a/b c?"), "a%2Fb%20c%3F");
        assert_eq!(escape_segment("ünï-code_~."), "%C3%BCn%C3%AF-code_~.");
    }

    #[test]
    fn test_unescape_segment() {
        assert_eq!(unescape_segment("a%2Fb%20c%3F").as_deref(), Some("a/b c?"));
        assert_eq!(unescape_segment("plain").as_deref(), Some("plain"));
        assert_eq!(unescape_segment("%FF"), None);
    }
}
