//! Optional gzip stage for package payloads.
//!
//! The policy is three-valued. Left unset, compression is opportunistic:
//! the gzip result is used only when it is strictly smaller than the
//! input. A gzip failure on the send path never fails the send — the
//! uncompressed buffer goes out and the error is recorded on the outcome
//! for the caller to log.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

// ── Policy ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressPolicy {
    /// Compress only when it strictly shrinks the payload. The default.
    Opportunistic,
    /// Always emit gzip output, even when it is larger than the input.
    Always,
    /// Never compress.
    Never,
}

impl From<Option<bool>> for CompressPolicy {
    fn from(flag: Option<bool>) -> Self {
        match flag {
            None => CompressPolicy::Opportunistic,
            Some(true) => CompressPolicy::Always,
            Some(false) => CompressPolicy::Never,
        }
    }
}

// ── Send-side stage ───────────────────────────────────────────────────────────

/// Result of the send-side compression stage.
pub struct CompressOutcome {
    /// The bytes to place behind the flag byte.
    pub data: Vec<u8>,
    /// Whether `data` is gzip output. Sets bit 7 of the flag byte.
    pub compressed: bool,
    /// A gzip failure that forced the uncompressed fallback, if any.
    pub fallback: Option<CompressError>,
}

pub fn compress_payload(policy: CompressPolicy, payload: &[u8]) -> CompressOutcome {
    match policy {
        CompressPolicy::Never => uncompressed(payload, None),
        CompressPolicy::Always => match gzip(payload) {
            Ok(data) => CompressOutcome {
                data,
                compressed: true,
                fallback: None,
            },
            Err(err) => uncompressed(payload, Some(err)),
        },
        CompressPolicy::Opportunistic => match gzip(payload) {
            Ok(data) if data.len() < payload.len() => CompressOutcome {
                data,
                compressed: true,
                fallback: None,
            },
            Ok(_) => uncompressed(payload, None),
            Err(err) => uncompressed(payload, Some(err)),
        },
    }
}

fn uncompressed(payload: &[u8], fallback: Option<CompressError>) -> CompressOutcome {
    CompressOutcome {
        data: payload.to_vec(),
        compressed: false,
        fallback,
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

pub fn gzip(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("gzip failed: {0}")]
    Io(#[from] std::io::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
