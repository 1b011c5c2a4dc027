//! The three concrete [`super::RequestOption`] implementations:
//! backup, restore, delete.

use super::{InnerResponseWire, RequestOption};
use crate::error::KbsError;

/// `{status, token, data?}` outcome of a restore request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreStatus {
    Ok { token: [u8; 32], tries: u32, envelope: [u8; crate::crypto::envelope::ENVELOPE_LEN] },
    PinMismatch { token: [u8; 32], tries: u32 },
    Missing,
    NotYetValid,
    /// Carries the fresh token the server issued anyway, so the caller
    /// can persist it and retry instead of spending the same dead token
    /// again (spec.md §4.7: the token update happens unconditionally for
    /// every non-`missing` status, before the status switch).
    TokenMismatch { token: [u8; 32] },
}

/// `{status, token}` outcome of a backup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupStatus {
    Ok { token: [u8; 32] },
    AlreadyExists { token: [u8; 32] },
    NotYetValid,
    /// See [`RestoreStatus::TokenMismatch`].
    TokenMismatch { token: [u8; 32] },
}

pub struct RestoreOption;

impl RequestOption for RestoreOption {
    type Response = RestoreStatus;

    fn tag(&self) -> &'static str {
        "restore"
    }

    fn parse_response(&self, wire: InnerResponseWire) -> Result<RestoreStatus, KbsError> {
        match wire.status.as_str() {
            "ok" => Ok(RestoreStatus::Ok {
                token: wire.token_bytes()?,
                tries: wire.tries()?,
                envelope: wire.envelope_bytes()?,
            }),
            "pinMismatch" => Ok(RestoreStatus::PinMismatch { token: wire.token_bytes()?, tries: wire.tries()? }),
            "missing" => Ok(RestoreStatus::Missing),
            "notYetValid" => Ok(RestoreStatus::NotYetValid),
            "tokenMismatch" => Ok(RestoreStatus::TokenMismatch { token: wire.token_bytes()? }),
            other => Err(KbsError::assertion(format!("unexpected restore status {other}"))),
        }
    }
}

pub struct BackupOption {
    pub envelope: [u8; crate::crypto::envelope::ENVELOPE_LEN],
    pub tries: u32,
}

impl RequestOption for BackupOption {
    type Response = BackupStatus;

    fn tag(&self) -> &'static str {
        "backup"
    }

    fn data_field(&self) -> Option<[u8; crate::crypto::envelope::ENVELOPE_LEN]> {
        Some(self.envelope)
    }

    fn tries_field(&self) -> Option<u32> {
        Some(self.tries)
    }

    fn parse_response(&self, wire: InnerResponseWire) -> Result<BackupStatus, KbsError> {
        match wire.status.as_str() {
            "ok" => Ok(BackupStatus::Ok { token: wire.token_bytes()? }),
            "alreadyExists" => Ok(BackupStatus::AlreadyExists { token: wire.token_bytes()? }),
            "notYetValid" => Ok(BackupStatus::NotYetValid),
            "tokenMismatch" => Ok(BackupStatus::TokenMismatch { token: wire.token_bytes()? }),
            other => Err(KbsError::assertion(format!("unexpected backup status {other}"))),
        }
    }
}

pub struct DeleteOption;

impl RequestOption for DeleteOption {
    type Response = ();

    fn tag(&self) -> &'static str {
        "delete"
    }

    /// `deleteKeys` clears local state regardless of what the server
    /// reports, so the only failure this surfaces is a transport-level
    /// one (already mapped to `KbsError` before this is reached).
    fn parse_response(&self, _wire: InnerResponseWire) -> Result<(), KbsError> {
        Ok(())
    }
}
