//! The channel endpoint — datagram layer over a framed, keyed stream.
//!
//! Send path: transform → compress → flag byte → encrypt → frame.
//! Receive path mirrors it exactly in reverse. The first operation in
//! either direction runs the role-appropriate handshake; the session
//! password is set exactly once and never changes for the lifetime of
//! the endpoint.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

use shroud_core::compress::{self, CompressPolicy};
use shroud_core::config::{ChannelConfig, Role};
use shroud_core::crypto::{self, SessionKey};
use shroud_core::wire::{self, COMPRESSED_FLAG, WireError};

use crate::error::ChannelError;
use crate::handshake;
use crate::transform::{Direction, PasswordGenerator, Transformer};

// ── Key state ─────────────────────────────────────────────────────────────────

enum KeyState {
    /// No handshake has run yet.
    Fresh,
    /// A handshake was started and never completed — it failed, or its
    /// task was cancelled mid-exchange. Terminal either way.
    Exchanging,
    Keyed(SessionKey),
    Broken,
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// One side of a secure channel over a reliable ordered byte stream.
pub struct Endpoint<S> {
    role: Role,
    config: ChannelConfig,
    stream: S,
    state: KeyState,
    data_transformer: Option<Arc<dyn Transformer>>,
    handshake_transformer: Option<Arc<dyn Transformer>>,
    password_generator: Option<Arc<dyn PasswordGenerator>>,
}

/// Configures and builds an [`Endpoint`]. Hook slots are builder-only;
/// the scalar options live in [`ChannelConfig`].
pub struct EndpointBuilder {
    role: Role,
    config: ChannelConfig,
    data_transformer: Option<Arc<dyn Transformer>>,
    handshake_transformer: Option<Arc<dyn Transformer>>,
    password_generator: Option<Arc<dyn PasswordGenerator>>,
}

impl EndpointBuilder {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            config: ChannelConfig::default(),
            data_transformer: None,
            handshake_transformer: None,
            password_generator: None,
        }
    }

    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Payload hook, applied before send and after receive.
    pub fn data_transformer(mut self, hook: impl Transformer + 'static) -> Self {
        self.data_transformer = Some(Arc::new(hook));
        self
    }

    /// Handshake hook, applied to the public-key bytes on the wire.
    pub fn handshake_transformer(mut self, hook: impl Transformer + 'static) -> Self {
        self.handshake_transformer = Some(Arc::new(hook));
        self
    }

    /// Server-side session password source.
    pub fn password_generator(mut self, hook: impl PasswordGenerator + 'static) -> Self {
        self.password_generator = Some(Arc::new(hook));
        self
    }

    pub fn build<S>(self, stream: S) -> Endpoint<S>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        Endpoint {
            role: self.role,
            config: self.config,
            stream,
            state: KeyState::Fresh,
            data_transformer: self.data_transformer,
            handshake_transformer: self.handshake_transformer,
            password_generator: self.password_generator,
        }
    }
}

impl<S> Endpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// An endpoint with no hooks. Use [`EndpointBuilder`] to attach
    /// transformer or password-generator hooks.
    pub fn new(stream: S, role: Role, config: ChannelConfig) -> Self {
        EndpointBuilder::new(role).config(config).build(stream)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Whether the handshake has completed on this endpoint.
    pub fn is_keyed(&self) -> bool {
        matches!(self.state, KeyState::Keyed(_))
    }

    /// Run the handshake now if it has not run yet.
    ///
    /// `read` and `write` call this lazily; use it directly to front-load
    /// the key exchange or before [`into_split`](Self::into_split).
    pub async fn ensure_keyed(&mut self) -> Result<(), ChannelError> {
        match self.state {
            KeyState::Keyed(_) => return Ok(()),
            KeyState::Broken | KeyState::Exchanging => return Err(ChannelError::Broken),
            KeyState::Fresh => {}
        }

        self.state = KeyState::Exchanging;
        let result = match self.role {
            Role::Client => {
                handshake::client_handshake(
                    &mut self.stream,
                    &self.config,
                    self.handshake_transformer.as_deref(),
                )
                .await
            }
            Role::Server => {
                handshake::server_handshake(
                    &mut self.stream,
                    &self.config,
                    self.handshake_transformer.as_deref(),
                    self.password_generator.as_deref(),
                )
                .await
            }
        };

        match result {
            Ok(password) => {
                self.state = KeyState::Keyed(SessionKey::from_password(&password));
                tracing::info!(role = ?self.role, "channel keyed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(role = ?self.role, error = %err, "handshake failed");
                self.state = KeyState::Broken;
                Err(err)
            }
        }
    }

    fn session_key(&self) -> Result<SessionKey, ChannelError> {
        match &self.state {
            KeyState::Keyed(key) => Ok(key.clone()),
            _ => Err(ChannelError::Broken),
        }
    }

    /// Send one datagram.
    ///
    /// Returns `Some(len)` — the pre-transform payload length — on
    /// success, or `None` when the package would exceed
    /// `max_package_size`. The oversize case sends nothing and the
    /// endpoint stays fully usable.
    pub async fn write(&mut self, data: &[u8]) -> Result<Option<usize>, ChannelError> {
        self.ensure_keyed().await?;
        let key = self.session_key()?;
        write_datagram(
            &mut self.stream,
            &key,
            &self.config,
            self.data_transformer.as_deref(),
            data,
        )
        .await
    }

    /// Receive one datagram.
    ///
    /// Returns `None` when the peer declared a frame larger than
    /// `max_package_size`. The unread body has desynchronized the stream
    /// at that point, so the endpoint latches broken: only the size-limit
    /// signal escapes, every later call fails with
    /// [`ChannelError::Broken`].
    pub async fn read(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        self.ensure_keyed().await?;
        let key = self.session_key()?;
        match read_datagram(
            &mut self.stream,
            &key,
            &self.config,
            self.data_transformer.as_deref(),
        )
        .await?
        {
            ReadOutcome::Datagram(data) => Ok(Some(data)),
            ReadOutcome::Oversize => {
                self.state = KeyState::Broken;
                Ok(None)
            }
        }
    }

    // ── Text and JSON convenience ─────────────────────────────────────────────

    pub async fn write_text(&mut self, text: &str) -> Result<Option<usize>, ChannelError> {
        self.write(text.as_bytes()).await
    }

    pub async fn read_text(&mut self) -> Result<Option<String>, ChannelError> {
        match self.read().await? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn write_json<T: Serialize>(
        &mut self,
        value: &T,
    ) -> Result<Option<usize>, ChannelError> {
        let bytes = serde_json::to_vec(value)?;
        self.write(&bytes).await
    }

    pub async fn read_json<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ChannelError> {
        match self.read().await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── Splitting ─────────────────────────────────────────────────────────────

    /// Split a keyed endpoint into independently-driven halves, one per
    /// direction — writes stay serialized, reads stay serialized, and the
    /// two directions run concurrently.
    ///
    /// Fails with [`ChannelError::Broken`] unless
    /// [`ensure_keyed`](Self::ensure_keyed) has completed: the handshake
    /// needs both directions at once.
    pub fn into_split(self) -> Result<(SendHalf<S>, RecvHalf<S>), ChannelError> {
        let key = self.session_key()?;
        let (reader, writer) = tokio::io::split(self.stream);
        Ok((
            SendHalf {
                writer,
                key: key.clone(),
                config: self.config.clone(),
                transformer: self.data_transformer.clone(),
            },
            RecvHalf {
                reader,
                key,
                config: self.config,
                transformer: self.data_transformer,
                broken: false,
            },
        ))
    }
}

// ── Halves ────────────────────────────────────────────────────────────────────

/// The write direction of a split endpoint.
pub struct SendHalf<S> {
    writer: WriteHalf<S>,
    key: SessionKey,
    config: ChannelConfig,
    transformer: Option<Arc<dyn Transformer>>,
}

impl<S: AsyncRead + AsyncWrite> SendHalf<S> {
    /// See [`Endpoint::write`].
    pub async fn write(&mut self, data: &[u8]) -> Result<Option<usize>, ChannelError> {
        write_datagram(
            &mut self.writer,
            &self.key,
            &self.config,
            self.transformer.as_deref(),
            data,
        )
        .await
    }
}

/// The read direction of a split endpoint.
pub struct RecvHalf<S> {
    reader: ReadHalf<S>,
    key: SessionKey,
    config: ChannelConfig,
    transformer: Option<Arc<dyn Transformer>>,
    broken: bool,
}

impl<S: AsyncRead + AsyncWrite> RecvHalf<S> {
    /// See [`Endpoint::read`].
    pub async fn read(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        if self.broken {
            return Err(ChannelError::Broken);
        }
        match read_datagram(
            &mut self.reader,
            &self.key,
            &self.config,
            self.transformer.as_deref(),
        )
        .await?
        {
            ReadOutcome::Datagram(data) => Ok(Some(data)),
            ReadOutcome::Oversize => {
                self.broken = true;
                Ok(None)
            }
        }
    }
}

// ── Datagram plumbing ─────────────────────────────────────────────────────────

async fn write_datagram<W>(
    writer: &mut W,
    key: &SessionKey,
    config: &ChannelConfig,
    transformer: Option<&dyn Transformer>,
    data: &[u8],
) -> Result<Option<usize>, ChannelError>
where
    W: AsyncWrite + Unpin,
{
    let original_len = data.len();

    let payload = match transformer {
        Some(hook) => hook.apply(data.to_vec(), Direction::Transform).await?,
        None => data.to_vec(),
    };

    let outcome = compress::compress_payload(CompressPolicy::from(config.compress), &payload);
    if let Some(err) = &outcome.fallback {
        tracing::warn!(error = %err, "gzip failed, sending uncompressed");
    }

    let flag = crypto::flag_padding()
        | if outcome.compressed {
            COMPRESSED_FLAG
        } else {
            0
        };
    let mut package = Vec::with_capacity(1 + outcome.data.len());
    package.push(flag);
    package.extend_from_slice(&outcome.data);

    // CTR preserves length, so the ciphertext size is known before
    // encrypting.
    if package.len() > config.max_package_size as usize {
        tracing::debug!(
            len = package.len(),
            limit = config.max_package_size,
            "package exceeds the size cap, not sent"
        );
        return Ok(None);
    }

    let ciphertext = key.encrypt(&package);
    wire::write_frame(writer, &ciphertext).await?;
    tracing::trace!(
        len = ciphertext.len(),
        compressed = outcome.compressed,
        "datagram sent"
    );
    Ok(Some(original_len))
}

enum ReadOutcome {
    Datagram(Vec<u8>),
    Oversize,
}

async fn read_datagram<R>(
    reader: &mut R,
    key: &SessionKey,
    config: &ChannelConfig,
    transformer: Option<&dyn Transformer>,
) -> Result<ReadOutcome, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let frame = match wire::read_frame(reader, config.max_package_size).await {
        Ok(frame) => frame,
        Err(WireError::FrameTooLarge { declared, limit }) => {
            tracing::warn!(declared, limit, "inbound frame exceeds the size cap");
            return Ok(ReadOutcome::Oversize);
        }
        Err(err) => return Err(err.into()),
    };

    if frame.is_empty() {
        return Ok(ReadOutcome::Datagram(Vec::new()));
    }

    let package = key.decrypt(&frame);
    let flag = package[0];
    let body = &package[1..];

    let body = if flag & COMPRESSED_FLAG != 0 {
        compress::gunzip(body)?
    } else {
        body.to_vec()
    };

    let body = match transformer {
        Some(hook) => hook.apply(body, Direction::Restore).await?,
        None => body,
    };

    tracing::trace!(len = body.len(), "datagram received");
    Ok(ReadOutcome::Datagram(body))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
