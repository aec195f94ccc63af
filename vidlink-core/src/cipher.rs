//! Per-payload symmetric encryption.
//!
//! A 128-bit key and IV are derived once per session from a pre-shared
//! secret and an 8-byte salt using OpenSSL's `EVP_BytesToKey` construction
//! (SHA-1, 5 rounds). Each payload is then encrypted independently with
//! AES-128-CBC and PKCS#7 padding, restarting from the derived IV.
//!
//! # Security
//!
//! Restarting every payload from the same IV keeps the wire format
//! compatible with existing peers but leaks equality of payload prefixes:
//! two chunks that start with the same 16-byte block produce the same first
//! ciphertext block. There is no authentication either; tampered ciphertext
//! is only caught if it breaks the padding.

use aes::Aes128;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha1::{Digest, Sha1};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::SecurityConfig;
use crate::error::VidlinkError;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

const KEY_LEN: usize = 16;
const IV_LEN: usize = 16;

/// Ciphertext length for a plaintext of `len` bytes.
///
/// PKCS#7 always adds at least one byte, so block-aligned input grows by a
/// full block.
pub fn ciphertext_len(len: usize) -> usize {
    (len / BLOCK_SIZE + 1) * BLOCK_SIZE
}

// ── KeyMaterial ──────────────────────────────────────────────────

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct KeyMaterial {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

/// `EVP_BytesToKey` with SHA-1.
///
/// `D_1 = H^count(data || salt)`, `D_i = H^count(D_{i-1} || data || salt)`,
/// concatenated until key and IV are filled.
fn bytes_to_key(secret: &[u8], salt: &[u8; 8], rounds: u32) -> KeyMaterial {
    let mut out = Vec::with_capacity(KEY_LEN + IV_LEN + 20);
    let mut prev: Vec<u8> = Vec::new();

    while out.len() < KEY_LEN + IV_LEN {
        let mut hasher = Sha1::new();
        hasher.update(&prev);
        hasher.update(secret);
        hasher.update(salt);
        let mut digest = hasher.finalize();
        for _ in 1..rounds {
            digest = Sha1::digest(digest);
        }
        prev.zeroize();
        prev = digest.to_vec();
        out.extend_from_slice(&digest);
    }
    prev.zeroize();

    let mut material = KeyMaterial {
        key: [0; KEY_LEN],
        iv: [0; IV_LEN],
    };
    material.key.copy_from_slice(&out[..KEY_LEN]);
    material.iv.copy_from_slice(&out[KEY_LEN..KEY_LEN + IV_LEN]);
    out.zeroize();
    material
}

// ── Cipher ───────────────────────────────────────────────────────

/// Session cipher. Cheap to clone; each clone carries its own copy of the
/// key material, wiped on drop.
#[derive(Clone)]
pub struct Cipher {
    material: KeyMaterial,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    /// Derive a cipher from a secret and salt.
    pub fn derive(secret: &[u8], salt: &[u8; 8], rounds: u32) -> Self {
        Self {
            material: bytes_to_key(secret, salt, rounds.max(1)),
        }
    }

    /// Derive a cipher from the security section of the config.
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::derive(
            config.secret.as_bytes(),
            &config.salt_bytes(),
            config.key_rounds,
        )
    }

    /// Encrypt one payload. Output is `ciphertext_len(plaintext.len())` bytes.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128CbcEnc::new(&self.material.key.into(), &self.material.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Decrypt one payload.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, VidlinkError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(VidlinkError::MisalignedCiphertext(ciphertext.len()));
        }
        Aes128CbcDec::new(&self.material.key.into(), &self.material.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| VidlinkError::BadPadding)
    }
}
