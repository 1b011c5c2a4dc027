//! Zeroize-on-drop wrappers for PIN-derived key material, following the
//! same wrapper shape as [`crate::model::MasterKey`]: a newtype with a
//! hand-written `Debug` that never prints the bytes.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 32-byte secret derived from a PIN: an encryption key, an access key,
/// or a single node of the [`crate::keys::DerivedKey`] tree.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey32([u8; 32]);

impl SecretKey32 {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey32(..)")
    }
}

impl PartialEq for SecretKey32 {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// Variable-length secret key bytes, for [`crate::keys::DerivedKeyService::data_for`]'s
/// output — the same derived-key tree, but not every node is a freshly
/// derived 32-byte HMAC output (a synced key arrives as raw `Vec<u8>`
/// from the key-value store).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes(..)")
    }
}

impl PartialEq for SecretBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
