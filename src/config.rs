//! Run-time configuration and the caller-supplied device role.

/// Whether this client is running on the account owner's primary device,
/// or on an additional device that only ever receives keys over sync.
///
/// This crate has no `Account` object of its own; the embedding
/// application is the authority on device role and supplies it at
/// construction time (see [`crate::protocol::KeyBackupClient::new`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Primary,
    Linked,
}

impl DeviceRole {
    pub fn is_primary(self) -> bool {
        matches!(self, DeviceRole::Primary)
    }
}

/// Server-enforced ceiling on remaining PIN attempts per backup record.
pub const MAXIMUM_KEY_ATTEMPTS: u32 = 10;

/// Tunables for the enclave client and protocol layer.
#[derive(Debug, Clone)]
pub struct KbsConfig {
    /// Base URL of the enclave host, e.g. `https://kbs.example.org`.
    pub enclave_host: String,
    /// Hex-encoded compile-time service identity. Must decode to a
    /// non-empty byte string (validated at request-build time).
    pub service_id_hex: String,
    /// Name of the enclave the attestation/request path targets.
    pub enclave_name: String,
    /// Per-request timeout for the HTTP transport.
    pub request_timeout_secs: u64,
    /// Ceiling on remaining PIN attempts before the server destroys a
    /// backup record. Fixed at 10 per spec; kept configurable for tests.
    pub maximum_key_attempts: u32,
}

impl Default for KbsConfig {
    fn default() -> Self {
        Self {
            enclave_host: String::new(),
            service_id_hex: String::new(),
            enclave_name: String::new(),
            request_timeout_secs: 30,
            maximum_key_attempts: MAXIMUM_KEY_ATTEMPTS,
        }
    }
}

impl KbsConfig {
    pub fn new(enclave_host: impl Into<String>, service_id_hex: impl Into<String>) -> Self {
        Self {
            enclave_host: enclave_host.into(),
            service_id_hex: service_id_hex.into(),
            ..Default::default()
        }
    }

    pub fn with_enclave_name(mut self, name: impl Into<String>) -> Self {
        self.enclave_name = name.into();
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Decode `service_id_hex`, failing if it is empty or not valid hex.
    pub fn service_id(&self) -> Result<Vec<u8>, crate::error::KbsError> {
        let bytes = hex::decode(&self.service_id_hex)
            .map_err(|e| crate::error::KbsError::assertion(format!("invalid service id hex: {e}")))?;
        if bytes.is_empty() {
            return Err(crate::error::KbsError::assertion("service id must not be empty"));
        }
        Ok(bytes)
    }
}
