//! Session key establishment.
//!
//! One-shot exchange, run lazily by the endpoint the first time a
//! datagram is read or written. The client sends a fresh RSA public key
//! as a u32-framed PEM; the server answers with a u16-framed session
//! password. In `Compatible` mode the password crosses the wire in the
//! clear — exactly what deployed peers do — while `Encrypted` mode wraps
//! it in PKCS#1 v1.5 under the received key. Either way both sides key
//! the package cipher with the plaintext password bytes.
//!
//! There are no timeouts and no retries here: a failure at any step is
//! terminal for the endpoint, and callers layer their own deadlines.

use tokio::io::{AsyncRead, AsyncWrite};
use zeroize::Zeroizing;

use shroud_core::config::{ChannelConfig, HandshakeSecurity};
use shroud_core::crypto::{self, ExchangeKeypair};
use shroud_core::wire::{self, DEFAULT_PASSWORD_LEN};

use crate::error::ChannelError;
use crate::transform::{Direction, PasswordGenerator, Transformer};

// ── Client ────────────────────────────────────────────────────────────────────

pub(crate) async fn client_handshake<S>(
    stream: &mut S,
    config: &ChannelConfig,
    transformer: Option<&dyn Transformer>,
) -> Result<Zeroizing<Vec<u8>>, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::debug!(bits = config.rsa_key_size, "generating exchange keypair");
    let keypair = ExchangeKeypair::generate(config.rsa_key_size)?;

    let mut key_bytes = keypair.public_key_pem()?.into_bytes();
    if let Some(hook) = transformer {
        key_bytes = hook.apply(key_bytes, Direction::Transform).await?;
    }

    wire::write_frame(stream, &key_bytes).await?;
    tracing::trace!(len = key_bytes.len(), "sent public key frame");

    let wire_password = wire::read_password_frame(stream, config.max_package_size).await?;
    let password = match config.handshake_security {
        HandshakeSecurity::Compatible => Zeroizing::new(wire_password),
        HandshakeSecurity::Encrypted => keypair.decrypt_password(&wire_password)?,
    };
    // The private key served exactly one exchange.
    drop(keypair);

    tracing::debug!(len = password.len(), "session password received");
    Ok(password)
}

// ── Server ────────────────────────────────────────────────────────────────────

pub(crate) async fn server_handshake<S>(
    stream: &mut S,
    config: &ChannelConfig,
    transformer: Option<&dyn Transformer>,
    generator: Option<&dyn PasswordGenerator>,
) -> Result<Zeroizing<Vec<u8>>, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut key_bytes = wire::read_frame(stream, config.max_package_size).await?;
    if let Some(hook) = transformer {
        key_bytes = hook.apply(key_bytes, Direction::Restore).await?;
    }

    let pem = String::from_utf8(key_bytes)?;
    let public = crypto::parse_public_key_pem(&pem)?;
    tracing::trace!("peer public key parsed");

    let password: Zeroizing<Vec<u8>> = match generator {
        Some(hook) => Zeroizing::new(hook.generate().await?),
        None => crypto::generate_password(DEFAULT_PASSWORD_LEN),
    };

    let wire_password = match config.handshake_security {
        // Cleartext on the wire; see the module docs.
        HandshakeSecurity::Compatible => password.to_vec(),
        HandshakeSecurity::Encrypted => crypto::encrypt_password(&public, &password)?,
    };
    wire::write_password_frame(stream, &wire_password).await?;

    tracing::debug!(mode = ?config.handshake_security, "session password issued");
    Ok(password)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
