use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;

use crate::lru::Value;

/// An immutable view of a cached value.
///
/// The underlying buffer is reference counted, so cloning a `ByteView` is cheap and never hands
/// out mutable access to the cached bytes. Use [`byte_slice`](Self::byte_slice) to obtain an
/// owned copy that may be modified freely.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    bytes: Bytes,
}

impl ByteView {
    /// Creates a view by copying the given bytes.
    ///
    /// The copy guarantees that a source loader holding on to its buffer cannot change the cached
    /// contents afterwards.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(data),
        }
    }

    /// The number of bytes in this view.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the view contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns an owned copy of the bytes.
    pub fn byte_slice(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Interprets the bytes as UTF-8, replacing invalid sequences.
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Returns a cheap handle to the underlying buffer.
    ///
    /// [`Bytes`] cannot be mutated, so this shares the cached contents without copying them.
    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }
}

impl From<Bytes> for ByteView {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        Self { bytes: data.into() }
    }
}

impl Value for ByteView {
    fn len(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str_lossy())
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ByteView").field(&self.as_str_lossy()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_slice_is_a_copy() {
        let view = ByteView::copy_from_slice(b"630");

        let mut copy = view.byte_slice();
        copy[0] = b'9';

        assert_eq!(copy, b"930");
        assert_eq!(view.to_string(), "630");
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn test_copy_from_slice_detaches_source() {
        let mut source = b"hello".to_vec();
        let view = ByteView::copy_from_slice(&source);
        source[0] = b'j';

        assert_eq!(view.as_str_lossy(), "hello");
    }
}
