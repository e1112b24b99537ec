//! User-supplied byte transforms.
//!
//! Two optional hook slots exist on an endpoint: one for datagram
//! payloads, one for the handshake public key. A hook sees every buffer
//! twice — `Transform` on the sending side, `Restore` on the receiving
//! side — and the receiver's Restore must invert the sender's Transform.
//! An absent hook is the identity.
//!
//! Hooks return a boxed future so asynchronous producers fit naturally;
//! synchronous ones wrap their result in an already-resolved future.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Boxed future returned by hook methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which side of the round trip a hook invocation is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Applied before the payload enters the channel.
    Transform,
    /// Applied after the payload leaves the channel. Must invert
    /// `Transform`.
    Restore,
}

/// A hook failure. Fatal for the operation that invoked the hook.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(pub String);

// ── Transformer ───────────────────────────────────────────────────────────────

pub trait Transformer: Send + Sync {
    fn apply(&self, data: Vec<u8>, direction: Direction)
        -> BoxFuture<'_, Result<Vec<u8>, HookError>>;
}

/// Wrap an infallible synchronous closure as a [`Transformer`].
pub struct FnTransformer<F>(F);

impl<F> FnTransformer<F>
where
    F: Fn(Vec<u8>, Direction) -> Vec<u8> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(Vec<u8>, Direction) -> Vec<u8> + Send + Sync,
{
    fn apply(
        &self,
        data: Vec<u8>,
        direction: Direction,
    ) -> BoxFuture<'_, Result<Vec<u8>, HookError>> {
        let out = (self.0)(data, direction);
        Box::pin(std::future::ready(Ok(out)))
    }
}

// ── Password generator ────────────────────────────────────────────────────────

/// Source of the server-side session password. Without one, the server
/// draws 48 cryptographically random bytes.
pub trait PasswordGenerator: Send + Sync {
    fn generate(&self) -> BoxFuture<'_, Result<Vec<u8>, HookError>>;
}

/// Wrap an infallible synchronous closure as a [`PasswordGenerator`].
pub struct FnPasswordGenerator<F>(F);

impl<F> FnPasswordGenerator<F>
where
    F: Fn() -> Vec<u8> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> PasswordGenerator for FnPasswordGenerator<F>
where
    F: Fn() -> Vec<u8> + Send + Sync,
{
    fn generate(&self) -> BoxFuture<'_, Result<Vec<u8>, HookError>> {
        let out = (self.0)();
        Box::pin(std::future::ready(Ok(out)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
