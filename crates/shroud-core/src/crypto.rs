//! Cryptographic primitives for Shroud.
//!
//! Three concerns live here:
//!   1. Password-to-key derivation — the legacy OpenSSL `EVP_BytesToKey`
//!      construction (MD5, one iteration, no salt), kept byte-compatible
//!      with the deployed protocol. Weak by modern standards; do not
//!      "upgrade" it without breaking the wire.
//!   2. The per-package AES-256-CTR cipher. No authentication tag is
//!      applied: decrypting tampered ciphertext yields garbage bytes,
//!      never an error. Stream transfers add their own SHA-256 per chunk
//!      one layer up.
//!   3. The ephemeral RSA exchange used by the handshake.
//!
//! Key material lives in `Zeroizing` buffers and is wiped on drop.

use aes::cipher::{KeyIvInit, StreamCipher};
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::wire::FLAG_PADDING_MASK;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

// ── Hashing ───────────────────────────────────────────────────────────────────

/// SHA-256 of a byte slice. Used for stream-chunk integrity.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

// ── Key derivation ────────────────────────────────────────────────────────────

/// OpenSSL `EVP_BytesToKey` with MD5, one iteration, no salt.
///
/// Chained digest blocks `D1 = MD5(P)`, `D2 = MD5(D1 ‖ P)`, … are
/// concatenated until 48 bytes are available. Key = bytes 0..32,
/// IV = bytes 32..48. This matches what `createCipher`-era peers derive
/// from the same password.
fn derive_key_iv(password: &[u8]) -> (Zeroizing<[u8; 32]>, Zeroizing<[u8; 16]>) {
    let mut material = Zeroizing::new(Vec::with_capacity(48));
    let mut block = Zeroizing::new(Vec::new());

    while material.len() < 48 {
        let mut hasher = Md5::new();
        hasher.update(block.as_slice());
        hasher.update(password);
        *block = hasher.finalize().to_vec();
        material.extend_from_slice(&block);
    }

    let mut key = Zeroizing::new([0u8; 32]);
    let mut iv = Zeroizing::new([0u8; 16]);
    key.copy_from_slice(&material[..32]);
    iv.copy_from_slice(&material[32..48]);
    (key, iv)
}

// ── Package cipher ────────────────────────────────────────────────────────────

/// Symmetric state shared by every package on a keyed endpoint.
///
/// A fresh CTR instance is created per package: the keystream restarts
/// from the derived IV for every frame. That mirrors the deployed
/// protocol, where each package is ciphered independently, and is
/// required for byte-for-byte wire compatibility.
#[derive(Clone)]
pub struct SessionKey {
    key: Zeroizing<[u8; 32]>,
    iv: Zeroizing<[u8; 16]>,
}

impl SessionKey {
    pub fn from_password(password: &[u8]) -> Self {
        let (key, iv) = derive_key_iv(password);
        Self { key, iv }
    }

    fn cipher(&self) -> Aes256Ctr {
        Aes256Ctr::new((&*self.key).into(), (&*self.iv).into())
    }

    /// Encrypt a package in one pass. Output length equals input length.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut out = plaintext.to_vec();
        self.cipher().apply_keystream(&mut out);
        out
    }

    /// CTR decryption is the same keystream XOR as encryption.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Vec<u8> {
        self.encrypt(ciphertext)
    }
}

// ── Exchange keypair ──────────────────────────────────────────────────────────

/// The client's ephemeral RSA keypair, generated for exactly one handshake
/// and dropped as soon as the password frame has been processed.
pub struct ExchangeKeypair {
    private: RsaPrivateKey,
}

impl ExchangeKeypair {
    /// Generate a fresh keypair.
    ///
    /// The 512-bit default of the deployed protocol is cryptographically
    /// broken; callers who want the encrypted handshake to mean anything
    /// should raise `rsa_key_size`.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits).map_err(CryptoError::KeyGeneration)?;
        Ok(Self { private })
    }

    /// The public half as an ASCII SPKI PEM document.
    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        self.private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Pem(e.to_string()))
    }

    /// Decrypt a password ciphertext produced by [`encrypt_password`].
    pub fn decrypt_password(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.private
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map(Zeroizing::new)
            .map_err(CryptoError::Rsa)
    }
}

/// Parse a peer's public key PEM.
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::Pem(e.to_string()))
}

/// Encrypt the session password under the peer's public key.
///
/// PKCS#1 v1.5 rather than OAEP: OAEP overhead (42 bytes and up) cannot
/// carry a 48-byte password inside the default 512-bit modulus, v1.5's
/// 11 bytes can.
pub fn encrypt_password(public: &RsaPublicKey, password: &[u8]) -> Result<Vec<u8>, CryptoError> {
    public
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, password)
        .map_err(CryptoError::Rsa)
}

// ── Random material ───────────────────────────────────────────────────────────

/// Generate `len` cryptographically random password bytes.
pub fn generate_password(len: usize) -> Zeroizing<Vec<u8>> {
    let mut password = Zeroizing::new(vec![0u8; len]);
    OsRng.fill_bytes(&mut password);
    password
}

/// Seven bits of per-frame entropy for the package flag byte.
/// The high bit stays clear for the compression flag.
pub fn flag_padding() -> u8 {
    rand::thread_rng().gen_range(0..=FLAG_PADDING_MASK)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("RSA key generation failed: {0}")]
    KeyGeneration(rsa::Error),

    #[error("RSA operation failed: {0}")]
    Rsa(rsa::Error),

    #[error("invalid public key PEM: {0}")]
    Pem(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
