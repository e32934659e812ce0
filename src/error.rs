// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Engine error taxonomy.
//!
//! Every expected outcome is a typed variant; callers receive a
//! `(kind, message)` pair through [`CwsError::kind`] and [`CwsError::message`].
//! Lower-level failures are wrapped in [`CwsError::Internal`], which keeps the
//! cause for diagnostics but only exposes a generic message.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::StoreError;

/// Stable classification of an engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    AuthenticationFailure,
    AuthorizationDenied,
    IdentificationWarning,
    IntegrityWarning,
    IntegrityError,
    IllegalAction,
    DecryptionFailure,
    SignatureExpired,
    NetworkError,
    SettingError,
    Error,
}

impl ErrorKind {
    /// Machine-readable code for the adapter layer.
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorKind::AuthenticationFailure => "AUTHENTICATION_FAILURE",
            ErrorKind::AuthorizationDenied => "AUTHORIZATION_DENIED",
            ErrorKind::IdentificationWarning => "IDENTIFICATION_WARNING",
            ErrorKind::IntegrityWarning => "INTEGRITY_WARNING",
            ErrorKind::IntegrityError => "INTEGRITY_ERROR",
            ErrorKind::IllegalAction => "ILLEGAL_ACTION",
            ErrorKind::DecryptionFailure => "DECRYPTION_FAILURE",
            ErrorKind::SignatureExpired => "SIGNATURE_EXPIRED",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::SettingError => "SETTING_ERROR",
            ErrorKind::Error => "ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.error_code())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CwsError {
    #[error("{0}")]
    AuthenticationFailure(String),

    #[error("{0}")]
    AuthorizationDenied(String),

    #[error("{0}")]
    IdentificationWarning(String),

    #[error("No Trustee information found for member '{member_id}' and circle '{circle_id}'.")]
    NotATrustee { member_id: String, circle_id: String },

    #[error("{0}")]
    IntegrityWarning(String),

    #[error("{0}")]
    IntegrityError(String),

    #[error("{0}")]
    IllegalAction(String),

    /// Wrong key and corrupted blob are deliberately indistinguishable.
    #[error("Cannot decrypt the requested key material.")]
    DecryptionFailure,

    #[error("The Signature has expired.")]
    SignatureExpired,

    #[error("{0}")]
    NetworkError(String),

    #[error("{0}")]
    SettingError(String),

    #[error("{context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type CwsResult<T> = Result<T, CwsError>;

impl CwsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CwsError::AuthenticationFailure(_) => ErrorKind::AuthenticationFailure,
            CwsError::AuthorizationDenied(_) => ErrorKind::AuthorizationDenied,
            CwsError::IdentificationWarning(_) | CwsError::NotATrustee { .. } => {
                ErrorKind::IdentificationWarning
            }
            CwsError::IntegrityWarning(_) => ErrorKind::IntegrityWarning,
            CwsError::IntegrityError(_) => ErrorKind::IntegrityError,
            CwsError::IllegalAction(_) => ErrorKind::IllegalAction,
            CwsError::DecryptionFailure => ErrorKind::DecryptionFailure,
            CwsError::SignatureExpired => ErrorKind::SignatureExpired,
            CwsError::NetworkError(_) => ErrorKind::NetworkError,
            CwsError::SettingError(_) => ErrorKind::SettingError,
            CwsError::Internal { .. } => ErrorKind::Error,
        }
    }

    /// Message that is safe to hand to an untrusted caller.
    pub fn message(&self) -> String {
        match self {
            CwsError::Internal { .. } => "An unexpected internal error occurred.".to_string(),
            other => other.to_string(),
        }
    }

    /// Wrap an unexpected lower-level failure, keeping its cause.
    pub fn internal(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        CwsError::Internal {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CwsError::IdentificationWarning(message.into())
    }

    pub fn denied(message: impl Into<String>) -> Self {
        CwsError::AuthorizationDenied(message.into())
    }

    pub fn illegal(message: impl Into<String>) -> Self {
        CwsError::IllegalAction(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        CwsError::IntegrityWarning(message.into())
    }

    pub fn setting(message: impl Into<String>) -> Self {
        CwsError::SettingError(message.into())
    }
}

impl From<StoreError> for CwsError {
    fn from(err: StoreError) -> Self {
        CwsError::internal("persistence failure", err)
    }
}
