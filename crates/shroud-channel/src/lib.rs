//! shroud-channel — a secure length-framed message channel over any
//! reliable ordered byte stream.
//!
//! An [`Endpoint`] wraps a stream with role Server or Client. The first
//! datagram read or write runs a one-shot key exchange; from then on every
//! datagram is an encrypted, optionally gzip-compressed, length-framed
//! package. A chunked stream layer with per-chunk SHA-256 and stop-and-wait
//! acknowledgement rides on top for arbitrary byte streams.
//!
//! ```no_run
//! use shroud_channel::{ChannelConfig, Endpoint, Role};
//!
//! # async fn run() -> Result<(), shroud_channel::ChannelError> {
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:4433").await?;
//! let mut endpoint = Endpoint::new(stream, Role::Client, ChannelConfig::default());
//! endpoint.write(b"Hello").await?;
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod error;
pub mod transform;

mod handshake;
mod stream;

pub use endpoint::{Endpoint, EndpointBuilder, RecvHalf, SendHalf};
pub use error::ChannelError;
pub use shroud_core::config::{ChannelConfig, HandshakeSecurity, Role};
pub use transform::{
    Direction, FnPasswordGenerator, FnTransformer, PasswordGenerator, Transformer,
};
