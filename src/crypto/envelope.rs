//! Deterministic authenticated encryption of the 32-byte master key.
//!
//! Synthetic-IV construction (an HMAC-SHA-256-based SIV, matching the
//! "AES-SIV-like" wording in the design): the IV is `HMAC-SHA-256(key,
//! plaintext)[..16]`, used as the AES-256-CTR nonce. Sealing the same
//! master key under the same encryption key always yields the same 48
//! bytes; opening recomputes the IV from the decrypted plaintext and
//! rejects the result if it doesn't match the one on the wire, which is
//! the construction's authentication step.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::CryptoError;

type Aes256Ctr = ctr::Ctr64BE<Aes256>;

const MASTER_KEY_LEN: usize = 32;
const ENC_KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
pub const ENVELOPE_LEN: usize = IV_LEN + MASTER_KEY_LEN;

/// A sealed 32-byte master key: `iv[16] || ciphertext[32]`.
pub type Envelope = [u8; ENVELOPE_LEN];

fn synthetic_iv(enc_key: &[u8; ENC_KEY_LEN], plaintext: &[u8; MASTER_KEY_LEN]) -> [u8; IV_LEN] {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(enc_key).expect("HMAC accepts any key length");
    mac.update(plaintext);
    let full = mac.finalize().into_bytes();
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&full[..IV_LEN]);
    iv
}

fn keystream_xor(enc_key: &[u8; ENC_KEY_LEN], iv: &[u8; IV_LEN], data: &mut [u8; MASTER_KEY_LEN]) {
    let mut cipher = Aes256Ctr::new(enc_key.into(), iv.into());
    cipher.apply_keystream(data);
}

/// Seal `master_key` under `enc_key`. Deterministic: identical inputs
/// always produce identical output.
pub fn seal(master_key: &[u8; MASTER_KEY_LEN], enc_key: &[u8; ENC_KEY_LEN]) -> Envelope {
    let iv = synthetic_iv(enc_key, master_key);
    let mut ciphertext = *master_key;
    keystream_xor(enc_key, &iv, &mut ciphertext);

    let mut out = [0u8; ENVELOPE_LEN];
    out[..IV_LEN].copy_from_slice(&iv);
    out[IV_LEN..].copy_from_slice(&ciphertext);
    out
}

/// Open a sealed envelope, recovering the 32-byte master key.
///
/// Fails with [`CryptoError::InvalidLength`] if `envelope` is not exactly
/// 48 bytes, or [`CryptoError::EnvelopeMac`] if the recomputed synthetic
/// IV doesn't match (wrong key or tampered ciphertext).
pub fn open(envelope: &[u8], enc_key: &[u8; ENC_KEY_LEN]) -> Result<[u8; MASTER_KEY_LEN], CryptoError> {
    if envelope.len() != ENVELOPE_LEN {
        return Err(CryptoError::InvalidLength {
            expected: ENVELOPE_LEN,
            actual: envelope.len(),
        });
    }

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&envelope[..IV_LEN]);
    let mut candidate = [0u8; MASTER_KEY_LEN];
    candidate.copy_from_slice(&envelope[IV_LEN..]);

    keystream_xor(enc_key, &iv, &mut candidate);

    let expected_iv = synthetic_iv(enc_key, &candidate);
    if expected_iv != iv {
        return Err(CryptoError::EnvelopeMac);
    }

    Ok(candidate)
}
