//! Shared data-model types that don't belong to any single component.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 32 random bytes that seed all application-level derived keys.
///
/// Created on first `generate_and_backup`, mutated never (rotation
/// replaces it atomically), zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// 32 cryptographically random bytes via the OS RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterKey(..)")
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// Whether a PIN is purely digits or contains other characters.
///
/// Derived from the PIN at store time, per [`crate::pin::is_numeric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PinType {
    Numeric = 1,
    Alphanumeric = 2,
}

impl PinType {
    /// Classify an already-normalized PIN.
    pub fn of(normalized_pin: &str) -> Self {
        if crate::pin::is_numeric(normalized_pin) {
            PinType::Numeric
        } else {
            PinType::Alphanumeric
        }
    }
}
