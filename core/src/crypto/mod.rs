// Cryptography module: per-hop key wrapping and layer encryption

pub mod hybrid;

pub use hybrid::{
    generate_key_pair, generate_symmetric_key, sym_decrypt, sym_encrypt, unwrap_key, wrap_key,
    CryptoError, RelayKeyPair, SymmetricKey, AEAD_TAG_LEN, IV_LEN, SYMMETRIC_KEY_LEN,
    WRAPPED_KEY_LEN, X25519_PUBLIC_KEY_LEN,
};
