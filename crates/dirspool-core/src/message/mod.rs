//! Transport-independent message envelope
//!
//! A message has a header (string keys to string values) and a body that is
//! either text or binary. Both can be empty. Queues store messages as their
//! serialized form: the UTF-8 encoding of a JSON object.
//!
//! # JSON Mapping
//!
//! ```json
//! {
//!   "header": {"subject": "demo", "destination": "/topic/test"},
//!   "body": "YWJj7g==",
//!   "encoding": "base64"
//! }
//! ```
//!
//! - `header`: omitted when empty
//! - `body`: omitted when empty
//! - `text`: `true` for a text body, omitted otherwise
//! - `encoding`: `+`-separated transformations applied to the body, in
//!   order. `utf8`, a compression token, then `base64`.
//!
//! ```text
//!     Message  --jsonify-->    Envelope  --JSON-->  String  --UTF-8-->  bytes
//!     Message  <--dejsonify--  Envelope  <--JSON--  String  <--UTF-8--  bytes
//!              \________________ stringify / serialize ________________/
//! ```

mod error;

pub use error::MessageError;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::{ZlibDecoder, ZlibEncoder};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Read;

/// Bodies shorter than this are never compressed
const MIN_COMPRESS_LEN: usize = 255;

/// Compressed output must be smaller than this fraction of the input
const MIN_COMPRESS_GAIN: f64 = 0.9;

/// Body compression codec
///
/// `zlib` is what other implementations of this envelope write and read;
/// `zstd` compresses better but only this crate understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Zlib,
    Zstd,
}

impl Compression {
    /// Token used in the `encoding` field.
    pub fn token(self) -> &'static str {
        match self {
            Compression::Zlib => "zlib",
            Compression::Zstd => "zstd",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "zlib" => Some(Compression::Zlib),
            "zstd" => Some(Compression::Zstd),
            _ => None,
        }
    }

    fn compress(self, data: &[u8]) -> Result<Vec<u8>, MessageError> {
        match self {
            Compression::Zlib => {
                let mut out = Vec::new();
                ZlibEncoder::new(data, flate2::Compression::default())
                    .read_to_end(&mut out)
                    .map_err(MessageError::Compression)?;
                Ok(out)
            }
            Compression::Zstd => zstd::encode_all(data, 0).map_err(MessageError::Compression),
        }
    }

    fn decompress(self, data: &[u8]) -> Result<Vec<u8>, MessageError> {
        match self {
            Compression::Zlib => {
                let mut out = Vec::new();
                ZlibDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(MessageError::Compression)?;
                Ok(out)
            }
            Compression::Zstd => zstd::decode_all(data).map_err(MessageError::Compression),
        }
    }
}

/// Options for [`Message::serialize`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Compress bodies when it saves at least 10%
    pub compression: Option<Compression>,
}

/// Message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Binary(Vec<u8>),
}

impl Default for Body {
    fn default() -> Self {
        Body::Binary(Vec::new())
    }
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(text) => text.as_bytes(),
            Body::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Body::Text(_))
    }
}

/// JSON object representing a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub text: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// A message: header fields plus a body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub header: BTreeMap<String, String>,
    pub body: Body,
}

impl Message {
    /// Empty message with a binary body.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            header: BTreeMap::new(),
            body: Body::Text(body.into()),
        }
    }

    pub fn binary(body: impl Into<Vec<u8>>) -> Self {
        Self {
            header: BTreeMap::new(),
            body: Body::Binary(body.into()),
        }
    }

    /// Builder-style header setter.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    pub fn is_text(&self) -> bool {
        self.body.is_text()
    }

    /// Approximate size in bytes.
    pub fn size(&self) -> usize {
        self.body.len()
            + 1
            + self
                .header
                .iter()
                .map(|(key, value)| key.len() + value.len() + 2)
                .sum::<usize>()
    }

    /// Hex BLAKE3 digest of the message content, independent of encoding.
    pub fn checksum(&self) -> String {
        self.digest(|data| blake3::hash(data).to_hex().to_string())
    }

    /// Hex MD5 digest, byte-compatible with the `md5` checksum other
    /// implementations of this envelope compute.
    pub fn md5(&self) -> String {
        self.digest(|data| format!("{:x}", Md5::digest(data)))
    }

    /// `hash(text flag || hash(sorted "key:value\n" lines) || hash(body))`
    fn digest(&self, hash: impl Fn(&[u8]) -> String) -> String {
        let mut header = String::new();
        for (key, value) in &self.header {
            header.push_str(key);
            header.push(':');
            header.push_str(value);
            header.push('\n');
        }
        let composed = format!(
            "{}{}{}",
            u8::from(self.is_text()),
            hash(header.as_bytes()),
            hash(self.body.as_bytes())
        );
        hash(composed.as_bytes())
    }

    /// Map the message to its JSON object.
    pub fn jsonify(&self, options: &SerializeOptions) -> Result<Envelope, MessageError> {
        let mut envelope = Envelope {
            header: self.header.clone(),
            ..Envelope::default()
        };

        match &self.body {
            Body::Text(text) => {
                envelope.text = true;
                if let Some(compression) = options.compression
                    && let Some(compressed) = compress_if_worth(compression, text.as_bytes())?
                {
                    envelope.body = Some(BASE64.encode(compressed));
                    envelope.encoding = Some(format!("utf8+{}+base64", compression.token()));
                } else if !text.is_empty() {
                    envelope.body = Some(text.clone());
                }
            }
            Body::Binary(bytes) => {
                if bytes.is_empty() {
                    return Ok(envelope);
                }
                let mut tokens = Vec::new();
                let mut data = Cow::Borrowed(bytes.as_slice());
                if let Some(compression) = options.compression
                    && let Some(compressed) = compress_if_worth(compression, bytes)?
                {
                    data = Cow::Owned(compressed);
                    tokens.push(compression.token());
                }
                if needs_base64(&data) {
                    envelope.body = Some(BASE64.encode(&data));
                    tokens.push("base64");
                } else {
                    envelope.body = Some(std::str::from_utf8(&data)?.to_string());
                }
                if !tokens.is_empty() {
                    envelope.encoding = Some(tokens.join("+"));
                }
            }
        }
        Ok(envelope)
    }

    /// Build a message from its JSON object.
    pub fn dejsonify(envelope: Envelope) -> Result<Self, MessageError> {
        let tokens: Vec<&str> = envelope
            .encoding
            .as_deref()
            .map(|encoding| encoding.split('+').filter(|t| !t.is_empty()).collect())
            .unwrap_or_default();

        let mut compressions = Vec::new();
        for token in &tokens {
            match *token {
                "base64" | "utf8" => {}
                "lz4" | "snappy" => {
                    return Err(MessageError::DecoderUnavailable(token.to_string()));
                }
                other => match Compression::from_token(other) {
                    Some(compression) => compressions.push(compression),
                    None => return Err(MessageError::UnsupportedEncoding(other.to_string())),
                },
            }
        }

        let mut data = envelope.body.unwrap_or_default().into_bytes();
        if tokens.contains(&"base64") {
            data = BASE64.decode(&data)?;
        }
        for compression in compressions.iter().rev() {
            data = compression.decompress(&data)?;
        }

        let body = if envelope.text {
            Body::Text(String::from_utf8(data).map_err(|e| e.utf8_error())?)
        } else {
            Body::Binary(data)
        };
        Ok(Self {
            header: envelope.header,
            body,
        })
    }

    /// JSON text of the message.
    pub fn stringify(&self, options: &SerializeOptions) -> Result<String, MessageError> {
        Ok(serde_json::to_string(&self.jsonify(options)?)?)
    }

    pub fn destringify(s: &str) -> Result<Self, MessageError> {
        let envelope: Envelope = serde_json::from_str(s)?;
        Self::dejsonify(envelope)
    }

    /// UTF-8 bytes of the JSON text; the form stored in queues.
    pub fn serialize(&self, options: &SerializeOptions) -> Result<Vec<u8>, MessageError> {
        Ok(self.stringify(options)?.into_bytes())
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, MessageError> {
        Self::destringify(std::str::from_utf8(bytes)?)
    }
}

fn compress_if_worth(
    compression: Compression,
    data: &[u8],
) -> Result<Option<Vec<u8>>, MessageError> {
    if data.len() < MIN_COMPRESS_LEN {
        return Ok(None);
    }
    let compressed = compression.compress(data)?;
    let ratio = compressed.len() as f64 / data.len() as f64;
    Ok((ratio < MIN_COMPRESS_GAIN).then_some(compressed))
}

/// Control characters and non-ASCII bytes cannot travel as a plain JSON body.
fn needs_base64(data: &[u8]) -> bool {
    data.iter().any(|b| *b < 0x20 || *b >= 0x7f)
}
