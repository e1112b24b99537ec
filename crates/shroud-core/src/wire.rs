//! Shroud wire format — length framing and the stream chunk envelope.
//!
//! Everything in this module is bit-exact and compatibility-critical.
//! All length fields are little-endian and unsigned. There is no magic
//! number and no version header on the wire — compatibility is positional.
//!
//! Three shapes exist:
//!   1. The frame: `len: u32 LE` followed by `len` opaque bytes. Every
//!      datagram and the handshake public key travel as one frame.
//!   2. The password frame: `len: u16 LE` followed by `len` bytes, used
//!      once per connection by the handshake.
//!   3. The stream chunk envelope, carried *inside* a datagram:
//!      `chunk_len: u32 LE ‖ sha256(chunk) ‖ chunk`. A terminator envelope
//!      is `chunk_len = 0` with no hash and no body.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Hard cap on any single frame length in either direction, unless
/// overridden in the channel configuration.
pub const DEFAULT_MAX_PACKAGE_SIZE: u32 = 16_777_211;

/// Bit 7 of the package flag byte: the payload behind it is gzip-compressed.
pub const COMPRESSED_FLAG: u8 = 0x80;

/// Bits 0–6 of the package flag byte: random padding entropy with no
/// semantic meaning. Keeps the flag byte from being a known plaintext.
pub const FLAG_PADDING_MASK: u8 = 0x7f;

/// SHA-256 digest length inside a stream chunk envelope.
pub const CHUNK_HASH_LEN: usize = 32;

/// Length of a server-generated session password when no generator hook
/// is configured.
pub const DEFAULT_PASSWORD_LEN: usize = 48;

/// Default sender chunk size for stream transfers.
pub const DEFAULT_READ_BUFFER_SIZE: u32 = 8192;

// ── Frame codec ───────────────────────────────────────────────────────────────

/// Write one length-prefixed frame: `len_u32_le(payload) ‖ payload`.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes()).await.map_err(map_io)?;
    writer.write_all(payload).await.map_err(map_io)?;
    writer.flush().await.map_err(map_io)?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// If the declared length exceeds `limit`, returns [`WireError::FrameTooLarge`]
/// *without consuming any body bytes* — the stream is desynchronized at that
/// point and the caller is expected to close it.
pub async fn read_frame<R>(reader: &mut R, limit: u32) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).await.map_err(map_io)?;
    let declared = u32::from_le_bytes(prefix);

    if declared > limit {
        return Err(WireError::FrameTooLarge { declared, limit });
    }

    let mut payload = vec![0u8; declared as usize];
    reader.read_exact(&mut payload).await.map_err(map_io)?;
    Ok(payload)
}

/// Write the handshake password frame: `len_u16_le ‖ bytes`.
pub async fn write_password_frame<W>(writer: &mut W, password: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    if password.len() > u16::MAX as usize {
        return Err(WireError::FrameTooLarge {
            declared: password.len() as u32,
            limit: u16::MAX as u32,
        });
    }
    let len = password.len() as u16;
    writer.write_all(&len.to_le_bytes()).await.map_err(map_io)?;
    writer.write_all(password).await.map_err(map_io)?;
    writer.flush().await.map_err(map_io)?;
    Ok(())
}

/// Read the handshake password frame.
pub async fn read_password_frame<R>(reader: &mut R, limit: u32) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 2];
    reader.read_exact(&mut prefix).await.map_err(map_io)?;
    let declared = u16::from_le_bytes(prefix) as u32;

    if declared > limit {
        return Err(WireError::FrameTooLarge { declared, limit });
    }

    let mut password = vec![0u8; declared as usize];
    reader.read_exact(&mut password).await.map_err(map_io)?;
    Ok(password)
}

fn map_io(err: std::io::Error) -> WireError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::UnexpectedEof
    } else {
        WireError::Io(err)
    }
}

// ── Stream chunk envelope ─────────────────────────────────────────────────────

/// A parsed stream-layer chunk envelope, borrowing the datagram it came in.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamChunk<'a> {
    /// `chunk_len = 0`: the transfer is complete.
    Terminator,
    /// A data chunk with its declared SHA-256 digest.
    Data { expected_hash: [u8; 32], body: &'a [u8] },
}

/// Encode a data chunk envelope: `len_u32_le(body) ‖ hash ‖ body`.
pub fn encode_chunk(hash: &[u8; 32], body: &[u8]) -> Vec<u8> {
    let mut envelope = Vec::with_capacity(4 + CHUNK_HASH_LEN + body.len());
    envelope.extend_from_slice(&(body.len() as u32).to_le_bytes());
    envelope.extend_from_slice(hash);
    envelope.extend_from_slice(body);
    envelope
}

/// Encode the terminator envelope. Four zero bytes, nothing else.
pub fn encode_terminator() -> Vec<u8> {
    vec![0u8; 4]
}

/// Decode one chunk envelope.
///
/// A declared chunk length above `limit` yields [`WireError::FrameTooLarge`]
/// so the receiver can answer on the ACK channel before reporting up.
pub fn decode_chunk(envelope: &[u8], limit: u32) -> Result<StreamChunk<'_>, WireError> {
    if envelope.len() < 4 {
        return Err(WireError::TruncatedEnvelope {
            expected: 4,
            got: envelope.len(),
        });
    }

    let chunk_len = u32::from_le_bytes([envelope[0], envelope[1], envelope[2], envelope[3]]);
    if chunk_len == 0 {
        return Ok(StreamChunk::Terminator);
    }
    if chunk_len > limit {
        return Err(WireError::FrameTooLarge {
            declared: chunk_len,
            limit,
        });
    }

    let expected_len = 4 + CHUNK_HASH_LEN + chunk_len as usize;
    if envelope.len() != expected_len {
        return Err(WireError::TruncatedEnvelope {
            expected: expected_len,
            got: envelope.len(),
        });
    }

    let mut expected_hash = [0u8; 32];
    expected_hash.copy_from_slice(&envelope[4..4 + CHUNK_HASH_LEN]);

    Ok(StreamChunk::Data {
        expected_hash,
        body: &envelope[4 + CHUNK_HASH_LEN..],
    })
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised by the frame codec and envelope parser.
#[derive(Debug, Error)]
pub enum WireError {
    /// The stream ended in the middle of a frame.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A declared length exceeds the package size cap.
    #[error("declared length {declared} exceeds the {limit}-byte cap")]
    FrameTooLarge { declared: u32, limit: u32 },

    /// A chunk envelope did not contain as many bytes as it declared.
    #[error("truncated chunk envelope: expected {expected} bytes, got {got}")]
    TruncatedEnvelope { expected: usize, got: usize },

    #[error("stream I/O failed: {0}")]
    Io(std::io::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
