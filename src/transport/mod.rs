//! Attested transport: the outer request/response envelope and the
//! [`Transport`] / [`RemoteAttestation`] collaborator traits.
//!
//! This crate only ships the trait boundary plus a `reqwest`-backed
//! default transport. Remote attestation itself (the handshake that
//! yields `Attestation.keys`) is a non-goal; callers supply their own
//! `RemoteAttestation` implementation.

mod http;

#[cfg(feature = "test-support")]
pub mod mock;

pub use http::HttpTransport;

use async_trait::async_trait;
use thiserror::Error;

/// 12-byte IV / 16-byte MAC framing shared by [`Transport`] and
/// `DerivedKeyService`'s own AES-GCM use.
pub const GCM_IV_LEN: usize = 12;
pub const GCM_MAC_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(String),
    #[error("malformed response field {field}: {reason}")]
    MalformedField { field: &'static str, reason: String },
    #[error("server returned status {0}")]
    ServerStatus(u16),
}

#[derive(Error, Debug)]
pub enum AttestationError {
    #[error("attestation failed: {0}")]
    Failed(String),
}

/// Credentials issued for a single call, carried in the outer request.
#[derive(Debug, Clone, Default)]
pub struct RequestAuth {
    pub username: String,
    pub password: String,
}

/// Symmetric keys bound to one attestation: `client_key` encrypts the
/// outer request, `server_key` decrypts the outer response.
pub struct AttestationKeys {
    pub client_key: [u8; 32],
    pub server_key: [u8; 32],
}

/// The yield of a remote-attestation handshake.
pub struct Attestation {
    pub request_id: Vec<u8>,
    pub enclave_name: String,
    pub keys: AttestationKeys,
    pub auth: RequestAuth,
    pub cookies: Vec<String>,
}

/// Abstract remote-attestation collaborator. This crate ships no real
/// implementation — attestation is a non-goal; see [`crate::transport::mock::MockAttestation`]
/// for the deterministic test double.
#[async_trait]
pub trait RemoteAttestation: Send + Sync {
    async fn perform_for_key_backup(&self, auth: Option<RequestAuth>) -> Result<Attestation, AttestationError>;
}

/// The `{requestId, ciphertext, iv, mac, enclaveName, authUsername,
/// authPassword, cookies, requestTypeTag}` outer envelope sent to the
/// enclave.
#[derive(Debug, Clone)]
pub struct OuterRequest {
    pub request_id: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub iv: [u8; GCM_IV_LEN],
    pub mac: [u8; GCM_MAC_LEN],
    pub enclave_name: String,
    pub auth_username: String,
    pub auth_password: String,
    pub cookies: Vec<String>,
    pub request_type_tag: &'static str,
}

/// The base64-decoded `{data, iv, mac}` outer response envelope.
#[derive(Debug, Clone)]
pub struct OuterResponse {
    pub data: Vec<u8>,
    pub iv: [u8; GCM_IV_LEN],
    pub mac: [u8; GCM_MAC_LEN],
}

/// Abstract HTTP boundary: POST the outer envelope, get the outer
/// envelope back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: OuterRequest) -> Result<OuterResponse, TransportError>;
}
