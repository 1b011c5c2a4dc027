//! # kbs-client
//!
//! Client for a PIN-gated Key Backup Service (KBS) running in a remote
//! attested enclave.
//!
//! A user's PIN never leaves the device. Instead, a PIN-derived
//! encryption key seals the 32-byte master key into a small envelope,
//! and a PIN-derived access key authorizes the enclave to hand that
//! envelope back. The enclave tracks a one-shot anti-replay token per
//! backup record and a server-enforced ceiling on remaining PIN
//! attempts; this crate's job is the PIN canonicalization, key
//! derivation, envelope construction, attested request framing, and the
//! backup/restore/delete state machine around all of that.
//!
//! Remote attestation and the raw HTTP/protobuf wire format to the
//! enclave operator are behind the [`transport::RemoteAttestation`] and
//! [`transport::Transport`] traits — this crate ships a `reqwest`-backed
//! default transport (see [`transport::HttpTransport`]) and, under the
//! `test-support` feature, deterministic mocks for scenario tests.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kbs_client::{KbsConfig, DeviceRole, EventSink, KeyStore, FileKvStore, KeyBackupClient};
//!
//! # async fn run(attestation: impl kbs_client::RemoteAttestation, transport: impl kbs_client::Transport) -> Result<(), kbs_client::KbsError> {
//! let kv = Arc::new(FileKvStore::default_path()?);
//! let key_store = Arc::new(KeyStore::new(kv, DeviceRole::Primary, EventSink::new()));
//! key_store.warm_caches()?;
//!
//! let config = KbsConfig::new("https://kbs.example.org", "deadbeef");
//! let client = KeyBackupClient::new(&config, attestation, transport, key_store)?;
//!
//! client.generate_and_backup("1234").await?;
//! client.restore("1234", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod keys;
pub mod model;
pub mod pin;
pub mod protocol;
pub mod store;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use config::{DeviceRole, KbsConfig, MAXIMUM_KEY_ATTEMPTS};
pub use crypto::{SecretBytes, SecretKey32};
pub use error::KbsError;
pub use events::{EventListener, EventSink, KbsEvent};
pub use keys::{DerivedKey, DerivedKeyService};
pub use model::{MasterKey, PinType};
pub use protocol::backup::KeyBackupClient;
pub use protocol::{BackupOption, BackupStatus, DeleteOption, RestoreOption, RestoreStatus};
pub use store::{Cache, FileKvStore, InMemoryKvStore, KeyStore, KvStore, StoreError, Token, TokenStore};
pub use transport::{
    Attestation, AttestationError, AttestationKeys, HttpTransport, OuterRequest, OuterResponse,
    RemoteAttestation, RequestAuth, Transport, TransportError,
};
