//! Content accepted by `put_file`.

use std::fmt;

use crate::provider::{bytes_stream, ByteStream};

/// File content in any of the accepted forms. Every variant is normalized
/// to a [`ByteStream`] before it reaches a provider.
pub enum Content {
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Live byte stream, consumed at most once.
    Stream(ByteStream),
}

impl Content {
    /// Normalize into a byte stream.
    pub fn into_stream(self) -> ByteStream {
        match self {
            Content::Bytes(data) => bytes_stream(data),
            Content::Text(text) => bytes_stream(text.into_bytes()),
            Content::Stream(stream) => stream,
        }
    }

    /// Known length, for buffered variants.
    pub fn len_hint(&self) -> Option<usize> {
        match self {
            Content::Bytes(data) => Some(data.len()),
            Content::Text(text) => Some(text.len()),
            Content::Stream(_) => None,
        }
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Bytes(data) => write!(f, "Content::Bytes({} bytes)", data.len()),
            Content::Text(text) => write!(f, "Content::Text({} bytes)", text.len()),
            Content::Stream(_) => write!(f, "Content::Stream"),
        }
    }
}

impl From<Vec<u8>> for Content {
    fn from(data: Vec<u8>) -> Self {
        Content::Bytes(data)
    }
}

impl From<&[u8]> for Content {
    fn from(data: &[u8]) -> Self {
        Content::Bytes(data.to_vec())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<ByteStream> for Content {
    fn from(stream: ByteStream) -> Self {
        Content::Stream(stream)
    }
}
