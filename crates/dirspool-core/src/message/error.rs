//! Error types for message encoding and decoding

use thiserror::Error;

/// Errors that can occur while (de)serializing a message
#[derive(Error, Debug)]
pub enum MessageError {
    /// Serialized form is not a valid JSON envelope
    #[error("Invalid message JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Serialized form or text body is not valid UTF-8
    #[error("Invalid UTF-8 in message: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Body claims base64 encoding but does not decode
    #[error("Invalid base64 body: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// Unknown token in the `encoding` field
    #[error("Decoding not supported: {0}")]
    UnsupportedEncoding(String),

    /// Known compression token without a codec in this build
    #[error("Decoding supported but not available: {0}")]
    DecoderUnavailable(String),

    /// Compressor or decompressor failed
    #[error("Compression error: {0}")]
    Compression(#[source] std::io::Error),
}
