// Per-hop hybrid encryption: X25519 key wrapping + XChaCha20-Poly1305 bulk cipher
//
// Wrap (sender, once per hop):
// 1. Generate ephemeral X25519 keypair
// 2. ECDH: ephemeral_secret × hop_public → shared_secret
// 3. KDF: Blake3::derive_key(shared_secret, ephemeral_pub, hop_pub) → key-encryption key
// 4. Seal the 32-byte layer key: XChaCha20-Poly1305(kek, derived_nonce, layer_key)
// 5. Output: ephemeral_pub || sealed_key || tag  (WRAPPED_KEY_LEN bytes)
//
// Unwrap (relay) reverses the same steps with the relay's static secret.
//
// Bulk data never goes through the asymmetric path. Each layer is encrypted
// with its own fresh layer key and a random nonce prepended to the ciphertext.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of an X25519 public key (bytes)
pub const X25519_PUBLIC_KEY_LEN: usize = 32;

/// Size of a per-hop layer key (bytes)
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// Size of the XChaCha20-Poly1305 nonce that prefixes every symmetric blob
pub const IV_LEN: usize = 24;

/// Size of the Poly1305 authentication tag
pub const AEAD_TAG_LEN: usize = 16;

/// Fixed length of the wrapped-key segment at the front of every envelope.
pub const WRAPPED_KEY_LEN: usize = X25519_PUBLIC_KEY_LEN + SYMMETRIC_KEY_LEN + AEAD_TAG_LEN;

/// KDF context for the key-encryption key. Changing this breaks every relay.
const KEK_CONTEXT: &str = "onionnet layer key wrap v1 kek";

/// KDF context for the key-wrap nonce.
const NONCE_CONTEXT: &str = "onionnet layer key wrap v1 nonce";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Key unwrap failed: wrong key or corrupted key segment")]
    Unwrap,
    #[error("Decryption failed: wrong key, corrupted IV, or corrupted ciphertext")]
    Decrypt,
    #[error("Encryption failed")]
    Encrypt,
    #[error("Invalid public key")]
    InvalidPublicKey,
}

/// A relay's long-lived X25519 key pair.
///
/// The secret half stays inside the owning process; `secret_key_bytes`
/// exists only for debug endpoints and tests.
#[derive(Clone)]
pub struct RelayKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl RelayKeyPair {
    /// Generate a new random key pair from the OS CSPRNG
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a key pair from a stored secret
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn public_key_bytes(&self) -> [u8; X25519_PUBLIC_KEY_LEN] {
        self.public.to_bytes()
    }

    /// Export the secret half. Wiped when the returned buffer is dropped.
    pub fn secret_key_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }
}

impl std::fmt::Debug for RelayKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayKeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Generate an asymmetric key pair suitable for wrapping layer keys.
pub fn generate_key_pair() -> RelayKeyPair {
    RelayKeyPair::generate()
}

/// A single-use per-hop layer key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_LEN]);

impl SymmetricKey {
    /// Fresh random key from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; SYMMETRIC_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Generate a fresh random layer key.
pub fn generate_symmetric_key() -> SymmetricKey {
    SymmetricKey::generate()
}

/// Derive the key-encryption key and its nonce from one ECDH exchange.
///
/// Both public keys are bound into the KDF so a modified ephemeral key can
/// never reproduce the original KEK, even where X25519 itself would ignore
/// the modified bits.
fn derive_wrapping_material(
    shared_secret: &SharedSecret,
    ephemeral_public: &[u8; X25519_PUBLIC_KEY_LEN],
    recipient_public: &[u8; X25519_PUBLIC_KEY_LEN],
) -> (Zeroizing<[u8; 32]>, [u8; IV_LEN]) {
    let mut kek_hasher = blake3::Hasher::new_derive_key(KEK_CONTEXT);
    kek_hasher.update(shared_secret.as_bytes());
    kek_hasher.update(ephemeral_public);
    kek_hasher.update(recipient_public);
    let kek = Zeroizing::new(*kek_hasher.finalize().as_bytes());

    let mut nonce_hasher = blake3::Hasher::new_derive_key(NONCE_CONTEXT);
    nonce_hasher.update(shared_secret.as_bytes());
    nonce_hasher.update(ephemeral_public);
    nonce_hasher.update(recipient_public);
    let hash = nonce_hasher.finalize();
    let mut nonce = [0u8; IV_LEN];
    nonce.copy_from_slice(&hash.as_bytes()[..IV_LEN]);

    (kek, nonce)
}

/// Wrap a layer key under a hop's public key.
///
/// Output is always exactly `WRAPPED_KEY_LEN` bytes.
pub fn wrap_key(key: &SymmetricKey, recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);

    let shared_secret = ephemeral_secret.diffie_hellman(recipient);
    if !shared_secret.was_contributory() {
        return Err(CryptoError::InvalidPublicKey);
    }

    let ephemeral_bytes = ephemeral_public.to_bytes();
    let (kek, nonce_bytes) =
        derive_wrapping_material(&shared_secret, &ephemeral_bytes, recipient.as_bytes());

    let cipher = XChaCha20Poly1305::new_from_slice(&kek[..]).map_err(|_| CryptoError::Encrypt)?;
    let sealed = cipher
        .encrypt(
            XNonce::from_slice(&nonce_bytes),
            Payload { msg: key.as_bytes(), aad: &ephemeral_bytes },
        )
        .map_err(|_| CryptoError::Encrypt)?;

    let mut wrapped = Vec::with_capacity(WRAPPED_KEY_LEN);
    wrapped.extend_from_slice(&ephemeral_bytes);
    wrapped.extend_from_slice(&sealed);
    debug_assert_eq!(wrapped.len(), WRAPPED_KEY_LEN);
    Ok(wrapped)
}

/// Recover a layer key with the relay's own key pair.
pub fn unwrap_key(wrapped: &[u8], keys: &RelayKeyPair) -> Result<SymmetricKey, CryptoError> {
    if wrapped.len() != WRAPPED_KEY_LEN {
        return Err(CryptoError::Unwrap);
    }

    let (ephemeral_part, sealed) = wrapped.split_at(X25519_PUBLIC_KEY_LEN);
    let mut ephemeral_bytes = [0u8; X25519_PUBLIC_KEY_LEN];
    ephemeral_bytes.copy_from_slice(ephemeral_part);
    let ephemeral_public = PublicKey::from(ephemeral_bytes);

    let shared_secret = keys.secret.diffie_hellman(&ephemeral_public);
    if !shared_secret.was_contributory() {
        return Err(CryptoError::Unwrap);
    }

    let (kek, nonce_bytes) =
        derive_wrapping_material(&shared_secret, &ephemeral_bytes, keys.public.as_bytes());

    let cipher = XChaCha20Poly1305::new_from_slice(&kek[..]).map_err(|_| CryptoError::Unwrap)?;
    let mut plaintext = cipher
        .decrypt(
            XNonce::from_slice(&nonce_bytes),
            Payload { msg: sealed, aad: &ephemeral_bytes },
        )
        .map_err(|_| CryptoError::Unwrap)?;

    if plaintext.len() != SYMMETRIC_KEY_LEN {
        plaintext.zeroize();
        return Err(CryptoError::Unwrap);
    }

    let mut key_bytes = [0u8; SYMMETRIC_KEY_LEN];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();
    Ok(SymmetricKey(key_bytes))
}

/// Encrypt with a layer key. Returns `nonce || ciphertext || tag`.
///
/// A fresh random nonce is drawn on every call.
pub fn sym_encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce_bytes = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Encrypt)?;
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a blob produced by [`sym_encrypt`].
pub fn sym_decrypt(key: &SymmetricKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < IV_LEN + AEAD_TAG_LEN {
        return Err(CryptoError::Decrypt);
    }

    let (nonce_bytes, ciphertext) = blob.split_at(IV_LEN);
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Decrypt)?;
    cipher
        .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}
