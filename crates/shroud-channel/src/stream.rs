//! Chunked stream transfer over the datagram layer.
//!
//! Strict stop-and-wait: one chunk envelope in flight, one ACK string per
//! chunk, so at most one chunk of flow-control window exists. Integrity
//! is end-to-end SHA-256 per chunk, independent of the cipher layer —
//! the cipher carries no MAC, this does.
//!
//! An empty ACK string means success; any other string is the receiver's
//! error message, which the sender surfaces prefixed "Remote error: ".

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use shroud_core::crypto::sha256;
use shroud_core::wire::{self, StreamChunk, WireError};

use crate::endpoint::Endpoint;
use crate::error::ChannelError;

const CHUNK_TOO_BIG: &str = "Chunk is too big!";

impl<S> Endpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send `source` as a chunked stream.
    ///
    /// Reads at most `max_bytes` (unlimited when `None`) in chunks of
    /// `buf_size` (the configured `read_buffer_size` when `None`), and
    /// returns the number of bytes streamed. Aborts with
    /// [`ChannelError::Remote`] as soon as the receiver reports an error.
    pub async fn send_stream<R>(
        &mut self,
        source: &mut R,
        max_bytes: Option<u64>,
        buf_size: Option<usize>,
    ) -> Result<u64, ChannelError>
    where
        R: AsyncRead + Unpin,
    {
        let buf_size = buf_size
            .unwrap_or(self.config().read_buffer_size as usize)
            .max(1);
        let mut buf = vec![0u8; buf_size];
        let mut sent: u64 = 0;

        loop {
            let want = match max_bytes {
                Some(limit) => (limit - sent).min(buf_size as u64) as usize,
                None => buf_size,
            };
            let n = if want == 0 {
                0
            } else {
                source.read(&mut buf[..want]).await?
            };

            if n == 0 {
                self.send_envelope(&wire::encode_terminator()).await?;
                tracing::debug!(bytes = sent, "stream send complete");
                return Ok(sent);
            }

            let chunk = &buf[..n];
            let envelope = wire::encode_chunk(&sha256(chunk), chunk);
            self.send_envelope(&envelope).await?;
            sent += n as u64;

            let ack = self.read_ack().await?;
            if !ack.is_empty() {
                tracing::warn!(error = %ack, "stream peer reported an error");
                return Err(ChannelError::Remote(ack));
            }
        }
    }

    /// Receive a chunked stream into `sink`, returning the number of
    /// bytes written.
    pub async fn recv_stream<W>(&mut self, sink: &mut W) -> Result<u64, ChannelError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut received: u64 = 0;

        loop {
            let envelope = match self.read().await? {
                Some(envelope) => envelope,
                None => return Err(ChannelError::Broken),
            };

            let chunk = match wire::decode_chunk(&envelope, self.config().max_package_size) {
                Ok(chunk) => chunk,
                Err(WireError::FrameTooLarge { declared, limit }) => {
                    self.write(CHUNK_TOO_BIG.as_bytes()).await?;
                    return Err(ChannelError::FrameTooLarge { declared, limit });
                }
                Err(err) => return Err(err.into()),
            };

            let (expected_hash, body) = match chunk {
                StreamChunk::Terminator => {
                    tracing::debug!(bytes = received, "stream receive complete");
                    return Ok(received);
                }
                StreamChunk::Data {
                    expected_hash,
                    body,
                } => (expected_hash, body.to_vec()),
            };

            let computed = sha256(&body);
            if computed != expected_hash {
                let digest = hex::encode(computed);
                self.write(format!("Invalid chunk hash: {digest}").as_bytes())
                    .await?;
                return Err(ChannelError::HashMismatch { computed: digest });
            }

            if let Err(err) = sink.write_all(&body).await {
                self.write(err.to_string().as_bytes()).await?;
                return Err(ChannelError::Connection(err));
            }
            received += body.len() as u64;

            // Empty-string ACK: success, send the next chunk.
            self.write(&[]).await?;
        }
    }

    // ── File helpers ──────────────────────────────────────────────────────────

    /// Stream a file to the peer. Relative paths resolve against the
    /// configured `cwd`.
    pub async fn send_file(&mut self, path: impl AsRef<Path>) -> Result<u64, ChannelError> {
        let path = self.resolve_path(path.as_ref());
        let mut file = File::open(&path).await?;
        tracing::debug!(path = %path.display(), "streaming file to peer");
        self.send_stream(&mut file, None, None).await
    }

    /// Receive a stream from the peer into a file. Relative paths resolve
    /// against the configured `cwd`.
    pub async fn recv_file(&mut self, path: impl AsRef<Path>) -> Result<u64, ChannelError> {
        let path = self.resolve_path(path.as_ref());
        let mut file = File::create(&path).await?;
        let received = self.recv_stream(&mut file).await?;
        file.flush().await?;
        tracing::debug!(path = %path.display(), bytes = received, "file received");
        Ok(received)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match (&self.config().cwd, path.is_relative()) {
            (Some(cwd), true) => cwd.join(path),
            _ => path.to_path_buf(),
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    async fn send_envelope(&mut self, envelope: &[u8]) -> Result<(), ChannelError> {
        match self.write(envelope).await? {
            Some(_) => Ok(()),
            // A silently dropped chunk would deadlock the ACK loop, so a
            // locally-oversized envelope is an error here, not a signal.
            None => Err(ChannelError::FrameTooLarge {
                declared: envelope.len() as u32,
                limit: self.config().max_package_size,
            }),
        }
    }

    async fn read_ack(&mut self) -> Result<String, ChannelError> {
        match self.read().await? {
            Some(bytes) => Ok(String::from_utf8(bytes)?),
            None => Err(ChannelError::Broken),
        }
    }
}
