//! Channel-level error surface.
//!
//! Every operation on an endpoint returns `Result<_, ChannelError>`.
//! Recovery exists only at the stream layer (a hash mismatch travels back
//! to the sender over the ACK channel); everything else propagates to the
//! caller unchanged. An outbound package over the size cap is not an
//! error at all — `write` signals it with a `None` result.

use thiserror::Error;

use shroud_core::compress::CompressError;
use shroud_core::crypto::CryptoError;
use shroud_core::wire::WireError;

use crate::transform::HookError;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Underlying stream read/write failure. Fatal for the endpoint.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The stream closed in the middle of a frame. Fatal.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A declared length exceeded the package size cap. Raised for
    /// handshake frames and stream chunks; plain datagrams signal the
    /// inbound case with a `None` read result instead.
    #[error("frame of {declared} bytes exceeds the {limit}-byte package size cap")]
    FrameTooLarge { declared: u32, limit: u32 },

    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    /// Inbound payload claimed to be gzip but did not decode. Fatal for
    /// that read.
    #[error("decompression failed: {0}")]
    Decompress(#[from] CompressError),

    /// Stream-layer chunk integrity failure, detected by the receiver.
    #[error("invalid chunk hash: {computed}")]
    HashMismatch { computed: String },

    /// The stream peer answered a chunk with a non-empty ACK.
    #[error("Remote error: {0}")]
    Remote(String),

    /// The handshake failed or was interrupted earlier; the endpoint
    /// accepts no further I/O.
    #[error("channel is broken")]
    Broken,

    /// A peer sent bytes that violate the protocol shape.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("transformer hook failed: {0}")]
    Transform(#[from] HookError),

    #[error("datagram is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("JSON conversion failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<WireError> for ChannelError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::UnexpectedEof => ChannelError::UnexpectedEof,
            WireError::FrameTooLarge { declared, limit } => {
                ChannelError::FrameTooLarge { declared, limit }
            }
            WireError::TruncatedEnvelope { .. } => ChannelError::Protocol(err.to_string()),
            WireError::Io(io) => ChannelError::Connection(io),
        }
    }
}
