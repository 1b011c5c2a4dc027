//! The backup / restore / delete state machine (C7), built on top of
//! [`super::EnclaveClient`].

use std::sync::Arc;

use tracing::instrument;

use super::{BackupOption, BackupStatus, DeleteOption, EnclaveClient, RestoreOption, RestoreStatus};
use crate::clock::{Clock, SystemClock};
use crate::config::KbsConfig;
use crate::crypto;
use crate::crypto::SecretKey32;
use crate::error::KbsError;
use crate::model::{MasterKey, PinType};
use crate::pin;
use crate::store::KeyStore;
use crate::transport::{RemoteAttestation, RequestAuth, Transport};

/// Public entry point: backup/restore/delete over a PIN-gated KBS
/// enclave, generic over the transport and remote-attestation
/// collaborators so callers can swap in real or mock implementations.
pub struct KeyBackupClient<A, T> {
    enclave: EnclaveClient<A, T>,
    key_store: Arc<KeyStore>,
    clock: Arc<dyn Clock>,
    maximum_key_attempts: u32,
}

impl<A: RemoteAttestation, T: Transport> KeyBackupClient<A, T> {
    pub fn new(config: &KbsConfig, attestation: A, transport: T, key_store: Arc<KeyStore>) -> Result<Self, KbsError> {
        let service_id = config.service_id()?;
        Ok(Self {
            enclave: EnclaveClient::new(attestation, transport, service_id),
            key_store,
            clock: Arc::new(SystemClock),
            maximum_key_attempts: config.maximum_key_attempts,
        })
    }

    /// Override the time source, for tests that need a fixed `validFrom`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn valid_from(&self) -> u64 {
        self.clock.now().saturating_sub(86_400)
    }

    /// §4.7 `fetchBackupId`: reuse the persisted token's backup id, or
    /// bootstrap one from the enclave.
    async fn fetch_backup_id(&self, auth: Option<RequestAuth>) -> Result<[u8; 32], KbsError> {
        if let Some(token) = self.key_store.token_store().current()? {
            return Ok(token.backup_id);
        }
        let bootstrap = self.enclave.bootstrap(self.valid_from(), auth).await?;
        self.key_store
            .token_store()
            .update_next(bootstrap.token, Some(bootstrap.backup_id), Some(bootstrap.tries))?;
        Ok(bootstrap.backup_id)
    }

    fn current_token_data(&self) -> Result<[u8; 32], KbsError> {
        let token = self
            .key_store
            .token_store()
            .current()?
            .ok_or_else(|| KbsError::assertion("no token available for this backup id"))?;
        Ok(token.data)
    }

    /// Persist the token from a backup response and classify its
    /// status. Does not perform the `ok`-only verification-string/store
    /// step — callers that need it (`generate_and_backup`) check the
    /// returned status themselves.
    fn finish_backup_response(&self, response: BackupStatus) -> Result<BackupStatus, KbsError> {
        match &response {
            BackupStatus::Ok { token } => {
                self.key_store.token_store().update_next(*token, None, Some(self.maximum_key_attempts))?;
            }
            BackupStatus::AlreadyExists { token } => {
                tracing::info!("backup alreadyExists: token was already spent, continuing with the fresh one");
                self.key_store.token_store().update_next(*token, None, Some(self.maximum_key_attempts))?;
            }
            BackupStatus::NotYetValid => return Err(KbsError::assertion("clock skew (notYetValid)")),
            BackupStatus::TokenMismatch { token } => {
                // Persist the fresh token before failing so a caller that
                // retries per this error's own guidance spends the new
                // token, not the one that was just rejected as spent.
                self.key_store.token_store().update_next(*token, None, None)?;
                return Err(KbsError::assertion("spent token"));
            }
        }
        Ok(response)
    }

    /// §4.7 `restore(pin, auth?)`, the canonical flow: derive keys,
    /// restore, decrypt the envelope, re-backup to reset `tries`, then
    /// persist the recovered master key.
    #[instrument(skip(self, pin, auth))]
    pub async fn restore(&self, pin: &str, auth: Option<RequestAuth>) -> Result<(), KbsError> {
        let backup_id = self.fetch_backup_id(auth.clone()).await?;

        let pin_owned = pin.to_string();
        let (enc_key, access_key) = tokio::task::spawn_blocking(move || {
            crypto::derive_encryption_and_access_key(&pin_owned, &backup_id)
        })
        .await
        .map_err(|e| KbsError::assertion(e.to_string()))??;

        let token_data = self.current_token_data()?;
        let valid_from = self.valid_from();
        let response = self
            .enclave
            .send(&RestoreOption, token_data, backup_id, access_key.clone(), valid_from, auth.clone())
            .await?;

        match response {
            RestoreStatus::TokenMismatch { token } => {
                // Same reasoning as the backup-side arm in
                // `finish_backup_response`: persist the fresh token so a
                // caller retrying per this error's guidance doesn't spend
                // the same dead token again.
                self.key_store.token_store().update_next(token, None, None)?;
                Err(KbsError::assertion("spent token"))
            }
            RestoreStatus::PinMismatch { token, tries } => {
                self.key_store.token_store().update_next(token, None, Some(tries))?;
                Err(KbsError::InvalidPin { tries_remaining: tries })
            }
            RestoreStatus::Missing => Err(KbsError::BackupMissing),
            RestoreStatus::NotYetValid => Err(KbsError::assertion("clock skew (notYetValid)")),
            RestoreStatus::Ok { token, tries, envelope } => {
                self.key_store.token_store().update_next(token, None, Some(tries))?;

                let enc_key_for_open = enc_key.clone();
                let master_key_bytes =
                    tokio::task::spawn_blocking(move || crypto::envelope_open(&envelope, enc_key_for_open.as_bytes()))
                        .await
                        .map_err(|e| KbsError::assertion(e.to_string()))??;
                let master_key = MasterKey::new(master_key_bytes);

                // Re-backup immediately to reset tries to the full
                // budget — the server decrements tries on every restore
                // attempt, including this successful one.
                let sealed = tokio::task::spawn_blocking(move || {
                    crypto::envelope_seal(&master_key_bytes, enc_key.as_bytes())
                })
                .await
                .map_err(|e| KbsError::assertion(e.to_string()))?;

                let rebackup_token = token;
                let rebackup_response = self
                    .enclave
                    .send(
                        &BackupOption { envelope: sealed, tries: self.maximum_key_attempts },
                        rebackup_token,
                        backup_id,
                        access_key,
                        valid_from,
                        auth,
                    )
                    .await?;
                self.finish_backup_response(rebackup_response)?;

                let pin_owned = pin.to_string();
                let verification_string = tokio::task::spawn_blocking(move || {
                    let salt = crypto::random_verification_salt();
                    crypto::derive_verification_string(&pin_owned, &salt)
                })
                .await
                .map_err(|e| KbsError::assertion(e.to_string()))??;

                let pin_type = PinType::of(&pin::normalize(pin));
                self.key_store.store(master_key, pin_type, verification_string)?;
                Ok(())
            }
        }
    }

    /// §4.7 `generateAndBackup(pin)`.
    #[instrument(skip(self, pin))]
    pub async fn generate_and_backup(&self, pin: &str) -> Result<(), KbsError> {
        let backup_id = self.fetch_backup_id(None).await?;
        let master_key = self.key_store.cache().master_key().unwrap_or_else(MasterKey::generate);
        let master_key_bytes = *master_key.as_bytes();

        let pin_owned = pin.to_string();
        let (enc_key, access_key) = tokio::task::spawn_blocking(move || {
            crypto::derive_encryption_and_access_key(&pin_owned, &backup_id)
        })
        .await
        .map_err(|e| KbsError::assertion(e.to_string()))??;

        let envelope =
            tokio::task::spawn_blocking(move || crypto::envelope_seal(&master_key_bytes, enc_key.as_bytes()))
                .await
                .map_err(|e| KbsError::assertion(e.to_string()))?;

        let token_data = self.current_token_data()?;
        let valid_from = self.valid_from();
        let send_result = self
            .enclave
            .send(
                &BackupOption { envelope, tries: self.maximum_key_attempts },
                token_data,
                backup_id,
                access_key,
                valid_from,
                None,
            )
            .await;

        let response = match send_result {
            Ok(response) => response,
            Err(e) => {
                self.key_store.set_backup_key_request_failed(true)?;
                return Err(e);
            }
        };

        let is_ok = matches!(response, BackupStatus::Ok { .. });
        self.finish_backup_response(response)?;

        if is_ok {
            let pin_owned = pin.to_string();
            let verification_string = tokio::task::spawn_blocking(move || {
                let salt = crypto::random_verification_salt();
                crypto::derive_verification_string(&pin_owned, &salt)
            })
            .await
            .map_err(|e| KbsError::assertion(e.to_string()))??;

            let pin_type = PinType::of(&pin::normalize(pin));
            self.key_store.store(master_key, pin_type, verification_string)?;
        }

        Ok(())
    }

    /// §4.7 `deleteKeys`: best-effort server delete, unconditional local
    /// clear. No PIN is supplied to this operation, so the access-key
    /// field on the wire is an all-zero placeholder — deletion is
    /// authorized by the anti-replay token, not PIN proof.
    #[instrument(skip(self))]
    pub async fn delete_keys(&self) -> Result<(), KbsError> {
        if let Some(token) = self.key_store.token_store().current()? {
            let valid_from = self.valid_from();
            let result = self
                .enclave
                .send(&DeleteOption, token.data, token.backup_id, SecretKey32::new([0u8; 32]), valid_from, None)
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "delete request failed; clearing local state anyway");
            }
        }

        self.key_store.clear_keys()?;
        self.key_store.token_store().clear_next()?;
        Ok(())
    }
}

#[cfg(all(test, feature = "test-support"))]
mod tests {
    use super::*;
    use crate::config::DeviceRole;
    use crate::events::EventSink;
    use crate::store::InMemoryKvStore;
    use crate::transport::mock::{MockAttestation, MockTransport};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    fn config() -> KbsConfig {
        KbsConfig::new("https://kbs.example", "deadbeef")
    }

    fn key_store() -> Arc<KeyStore> {
        Arc::new(KeyStore::new(Arc::new(InMemoryKvStore::new()), DeviceRole::Primary, EventSink::new()))
    }

    fn client(
        transport: MockTransport,
        store: Arc<KeyStore>,
    ) -> KeyBackupClient<MockAttestation, MockTransport> {
        let attestation = MockAttestation::new([1u8; 32], [2u8; 32]);
        KeyBackupClient::new(&config(), attestation, transport, store).unwrap()
    }

    fn inner_response_json(fields: &[(&str, serde_json::Value)]) -> Vec<u8> {
        let mut map = serde_json::Map::new();
        for (k, v) in fields {
            map.insert(k.to_string(), v.clone());
        }
        serde_json::to_vec(&serde_json::Value::Object(map)).unwrap()
    }

    fn bootstrap_json(backup_id: [u8; 32], token: [u8; 32], tries: u32) -> Vec<u8> {
        inner_response_json(&[
            ("backupId", serde_json::Value::String(BASE64.encode(backup_id))),
            ("token", serde_json::Value::String(BASE64.encode(token))),
            ("tries", serde_json::Value::from(tries)),
        ])
    }

    #[tokio::test]
    async fn generate_and_backup_stores_master_key_and_resets_token() {
        let transport = MockTransport::new([2u8; 32]);
        let backup_id = [9u8; 32];
        transport.push_response("bootstrap", bootstrap_json(backup_id, [1u8; 32], 10));
        transport.push_response(
            "backup",
            inner_response_json(&[
                ("status", serde_json::Value::String("ok".into())),
                ("token", serde_json::Value::String(BASE64.encode([5u8; 32]))),
            ]),
        );

        let store = key_store();
        store.warm_caches().unwrap();
        let client = client(transport, store.clone());

        client.generate_and_backup("1234").await.unwrap();

        assert!(store.cache().has_master_key());
        assert_eq!(store.cache().pin_type(), Some(crate::model::PinType::Numeric));
        let token = store.token_store().current().unwrap().unwrap();
        assert_eq!(token.data, [5u8; 32]);
        assert_eq!(token.tries, 10);
    }

    #[tokio::test]
    async fn restore_recovers_master_key_and_rebackups() {
        let transport = MockTransport::new([2u8; 32]);
        let backup_id = [9u8; 32];

        // First, generate a backup to know the sealed envelope for this
        // pin/backup id pair.
        let (enc_key, _access_key) =
            crypto::derive_encryption_and_access_key("1234", &backup_id).unwrap();
        let master_key = [42u8; 32];
        let sealed = crypto::envelope_seal(&master_key, enc_key.as_bytes());

        transport.push_response("bootstrap", bootstrap_json(backup_id, [1u8; 32], 10));
        transport.push_response(
            "restore",
            inner_response_json(&[
                ("status", serde_json::Value::String("ok".into())),
                ("token", serde_json::Value::String(BASE64.encode([6u8; 32]))),
                ("tries", serde_json::Value::from(10u32)),
                ("data", serde_json::Value::String(BASE64.encode(sealed))),
            ]),
        );
        transport.push_response(
            "backup",
            inner_response_json(&[
                ("status", serde_json::Value::String("ok".into())),
                ("token", serde_json::Value::String(BASE64.encode([7u8; 32]))),
            ]),
        );

        let store = key_store();
        store.warm_caches().unwrap();
        let client = client(transport, store.clone());

        client.restore("1234", None).await.unwrap();

        let recovered = store.cache().master_key().unwrap();
        assert_eq!(*recovered.as_bytes(), master_key);
        let token = store.token_store().current().unwrap().unwrap();
        assert_eq!(token.data, [7u8; 32]);
        assert_eq!(token.tries, 10);
    }

    #[tokio::test]
    async fn restore_pin_mismatch_surfaces_tries_remaining() {
        let transport = MockTransport::new([2u8; 32]);
        let backup_id = [9u8; 32];
        transport.push_response("bootstrap", bootstrap_json(backup_id, [1u8; 32], 10));
        transport.push_response(
            "restore",
            inner_response_json(&[
                ("status", serde_json::Value::String("pinMismatch".into())),
                ("token", serde_json::Value::String(BASE64.encode([6u8; 32]))),
                ("tries", serde_json::Value::from(7u32)),
            ]),
        );

        let store = key_store();
        store.warm_caches().unwrap();
        let client = client(transport, store.clone());

        let err = client.restore("0000", None).await.unwrap_err();
        assert!(matches!(err, KbsError::InvalidPin { tries_remaining: 7 }));
        assert!(!store.cache().has_master_key());
    }

    #[tokio::test]
    async fn restore_missing_surfaces_backup_missing() {
        let transport = MockTransport::new([2u8; 32]);
        let backup_id = [9u8; 32];
        transport.push_response("bootstrap", bootstrap_json(backup_id, [1u8; 32], 10));
        transport.push_response(
            "restore",
            inner_response_json(&[("status", serde_json::Value::String("missing".into()))]),
        );

        let store = key_store();
        store.warm_caches().unwrap();
        let client = client(transport, store.clone());

        let err = client.restore("1234", None).await.unwrap_err();
        assert!(matches!(err, KbsError::BackupMissing));
    }

    #[tokio::test]
    async fn delete_keys_clears_local_state_even_without_a_token() {
        let transport = MockTransport::new([2u8; 32]);
        let store = key_store();
        store.warm_caches().unwrap();
        let client = client(transport, store.clone());

        client.delete_keys().await.unwrap();
        assert!(!store.cache().has_master_key());
        assert_eq!(store.token_store().current().unwrap(), None);
    }
}
