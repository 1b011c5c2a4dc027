//! Deterministic [`Transport`] / [`RemoteAttestation`] doubles for
//! scenario tests (feature `test-support`).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use rand::RngCore;

use super::{
    Attestation, AttestationError, AttestationKeys, OuterRequest, OuterResponse, RemoteAttestation,
    RequestAuth, Transport, TransportError, GCM_IV_LEN, GCM_MAC_LEN,
};

/// Always yields the same request id / enclave name / symmetric keys,
/// so a test fixture can pre-encrypt [`MockTransport`] responses under
/// the same `server_key`.
pub struct MockAttestation {
    pub request_id: Vec<u8>,
    pub enclave_name: String,
    pub client_key: [u8; 32],
    pub server_key: [u8; 32],
}

impl MockAttestation {
    pub fn new(client_key: [u8; 32], server_key: [u8; 32]) -> Self {
        Self {
            request_id: vec![0xAB; 16],
            enclave_name: "test-enclave".to_string(),
            client_key,
            server_key,
        }
    }
}

#[async_trait]
impl RemoteAttestation for MockAttestation {
    async fn perform_for_key_backup(&self, auth: Option<RequestAuth>) -> Result<Attestation, AttestationError> {
        Ok(Attestation {
            request_id: self.request_id.clone(),
            enclave_name: self.enclave_name.clone(),
            keys: AttestationKeys { client_key: self.client_key, server_key: self.server_key },
            auth: auth.unwrap_or_default(),
            cookies: Vec::new(),
        })
    }
}

/// A scripted inner-response plaintext queued for one request-type tag.
type ResponseQueue = VecDeque<Vec<u8>>;

/// Queue scripted inner-response plaintexts per request tag; each call
/// to [`Transport::execute`] pops one, encrypts it under `server_key`
/// (the same key a paired [`MockAttestation`] hands out), and returns
/// the outer envelope. Ignores the inbound ciphertext entirely — this
/// is a response fixture, not a request verifier.
pub struct MockTransport {
    server_key: [u8; 32],
    queues: Mutex<HashMap<&'static str, ResponseQueue>>,
}

impl MockTransport {
    pub fn new(server_key: [u8; 32]) -> Self {
        Self { server_key, queues: Mutex::new(HashMap::new()) }
    }

    pub fn push_response(&self, tag: &'static str, inner_plaintext: Vec<u8>) {
        self.queues.lock().unwrap().entry(tag).or_default().push_back(inner_plaintext);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: OuterRequest) -> Result<OuterResponse, TransportError> {
        let inner = {
            let mut queues = self.queues.lock().unwrap();
            queues
                .get_mut(request.request_type_tag)
                .and_then(|q| q.pop_front())
                .ok_or_else(|| TransportError::Http(format!("no scripted response for {}", request.request_type_tag)))?
        };

        let cipher = Aes256Gcm::new_from_slice(&self.server_key)
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let mut iv = [0u8; GCM_IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);
        let sealed = cipher.encrypt(nonce, inner.as_ref()).map_err(|e| TransportError::Http(e.to_string()))?;

        let (data, mac) = sealed.split_at(sealed.len() - GCM_MAC_LEN);
        let mac: [u8; GCM_MAC_LEN] = mac.try_into().expect("aes-gcm tag is always 16 bytes");

        Ok(OuterResponse { data: data.to_vec(), iv, mac })
    }
}
