//! `reqwest`-backed [`Transport`] implementation.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{OuterRequest, OuterResponse, Transport, TransportError, GCM_IV_LEN, GCM_MAC_LEN};
use crate::config::KbsConfig;

#[derive(Serialize)]
struct WireOuterRequest {
    #[serde(rename = "requestId")]
    request_id: String,
    ciphertext: String,
    iv: String,
    mac: String,
    #[serde(rename = "enclaveName")]
    enclave_name: String,
    #[serde(rename = "authUsername")]
    auth_username: String,
    #[serde(rename = "authPassword")]
    auth_password: String,
    cookies: Vec<String>,
}

#[derive(Deserialize)]
struct WireOuterResponse {
    data: String,
    iv: String,
    mac: String,
}

/// Posts the outer envelope as JSON to `{enclave_host}/{requestTypeTag}`.
pub struct HttpTransport {
    client: reqwest::Client,
    enclave_host: String,
}

impl HttpTransport {
    pub fn new(config: &KbsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("reqwest client configuration is always valid here");
        Self { client, enclave_host: config.enclave_host.clone() }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: OuterRequest) -> Result<OuterResponse, TransportError> {
        let url = format!(
            "{}/{}",
            self.enclave_host.trim_end_matches('/'),
            request.request_type_tag
        );

        let body = WireOuterRequest {
            request_id: BASE64.encode(&request.request_id),
            ciphertext: BASE64.encode(&request.ciphertext),
            iv: BASE64.encode(request.iv),
            mac: BASE64.encode(request.mac),
            enclave_name: request.enclave_name,
            auth_username: request.auth_username,
            auth_password: request.auth_password,
            cookies: request.cookies,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::ServerStatus(response.status().as_u16()));
        }

        let parsed: WireOuterResponse =
            response.json().await.map_err(|e| TransportError::Http(e.to_string()))?;

        decode_response(parsed)
    }
}

fn decode_response(parsed: WireOuterResponse) -> Result<OuterResponse, TransportError> {
    let data = BASE64
        .decode(parsed.data)
        .map_err(|e| TransportError::MalformedField { field: "data", reason: e.to_string() })?;

    let iv_bytes = BASE64
        .decode(parsed.iv)
        .map_err(|e| TransportError::MalformedField { field: "iv", reason: e.to_string() })?;
    let iv: [u8; GCM_IV_LEN] = iv_bytes
        .try_into()
        .map_err(|_| TransportError::MalformedField { field: "iv", reason: "expected 12 bytes".into() })?;

    let mac_bytes = BASE64
        .decode(parsed.mac)
        .map_err(|e| TransportError::MalformedField { field: "mac", reason: e.to_string() })?;
    let mac: [u8; GCM_MAC_LEN] = mac_bytes
        .try_into()
        .map_err(|_| TransportError::MalformedField { field: "mac", reason: "expected 16 bytes".into() })?;

    Ok(OuterResponse { data, iv, mac })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_response_rejects_short_iv() {
        let parsed = WireOuterResponse {
            data: BASE64.encode(b"x"),
            iv: BASE64.encode(b"short"),
            mac: BASE64.encode([0u8; GCM_MAC_LEN]),
        };
        assert!(decode_response(parsed).is_err());
    }

    #[test]
    fn decode_response_accepts_well_formed_fields() {
        let parsed = WireOuterResponse {
            data: BASE64.encode(b"ciphertext"),
            iv: BASE64.encode([1u8; GCM_IV_LEN]),
            mac: BASE64.encode([2u8; GCM_MAC_LEN]),
        };
        let response = decode_response(parsed).unwrap();
        assert_eq!(response.data, b"ciphertext");
        assert_eq!(response.iv, [1u8; GCM_IV_LEN]);
        assert_eq!(response.mac, [2u8; GCM_MAC_LEN]);
    }
}
