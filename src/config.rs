// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Settings are read from the environment once at startup and passed to the
//! engine inside [`crate::state::EngineState`]. Nothing reads the environment
//! after that.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the redb database | `./data` |
//! | `CWS_SYMMETRIC_ALGORITHM` | `AES_GCM_256` or `CHACHA20_POLY1305` | `AES_GCM_256` |
//! | `CWS_ASYMMETRIC_ALGORITHM` | `SECP256K1_ECIES` | `SECP256K1_ECIES` |
//! | `CWS_DIGEST_ALGORITHM` | `SHA256` or `SHA512` | `SHA512` |
//! | `CWS_SIGNATURE_ALGORITHM` | `ECDSA_SECP256K1_SHA256` | `ECDSA_SECP256K1_SHA256` |
//! | `CWS_PBKDF_ITERATIONS` | PBKDF2 iteration count, at least 1000 | `100000` |
//! | `CWS_SYSTEM_SALT` | Salt for master key derivation | built-in |
//! | `CWS_MASTERKEY_URL` | `file://`, `http://` or `https://` locator of the master secret | unset |
//! | `CWS_MASTERKEY_TIMEOUT_SECS` | Timeout for fetching the master secret | `10` |
//! | `CWS_ADMIN_ACCOUNT` | System administrator account name | `admin` |
//! | `CWS_ADMIN_CREDENTIAL` | Administrator credential (read by the binary) | Required |
//! | `CWS_IS_READY` | Whether member-facing operations may run | `true` |
//! | `CWS_SANITY_STARTUP` | Run a sanity sweep at startup | `true` |
//! | `CWS_SANITY_INTERVAL_MINUTES` | Minutes between sweeps, `0` disables | `1440` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::crypto::digest::checksum;
use crate::crypto::{
    AsymmetricAlgorithm, CryptoSuite, DigestAlgorithm, SignatureAlgorithm, SymmetricAlgorithm,
};
use crate::error::{CwsError, CwsResult};

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const SYMMETRIC_ALGORITHM_ENV: &str = "CWS_SYMMETRIC_ALGORITHM";
pub const ASYMMETRIC_ALGORITHM_ENV: &str = "CWS_ASYMMETRIC_ALGORITHM";
pub const DIGEST_ALGORITHM_ENV: &str = "CWS_DIGEST_ALGORITHM";
pub const SIGNATURE_ALGORITHM_ENV: &str = "CWS_SIGNATURE_ALGORITHM";
pub const PBKDF_ITERATIONS_ENV: &str = "CWS_PBKDF_ITERATIONS";
pub const SYSTEM_SALT_ENV: &str = "CWS_SYSTEM_SALT";
pub const MASTERKEY_URL_ENV: &str = "CWS_MASTERKEY_URL";
pub const MASTERKEY_TIMEOUT_ENV: &str = "CWS_MASTERKEY_TIMEOUT_SECS";
pub const ADMIN_ACCOUNT_ENV: &str = "CWS_ADMIN_ACCOUNT";
pub const ADMIN_CREDENTIAL_ENV: &str = "CWS_ADMIN_CREDENTIAL";
pub const IS_READY_ENV: &str = "CWS_IS_READY";
pub const SANITY_STARTUP_ENV: &str = "CWS_SANITY_STARTUP";
pub const SANITY_INTERVAL_ENV: &str = "CWS_SANITY_INTERVAL_MINUTES";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Lowest accepted PBKDF2 iteration count.
pub const MIN_PBKDF_ITERATIONS: u32 = 1_000;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_PBKDF_ITERATIONS: u32 = 100_000;
const DEFAULT_SYSTEM_SALT: &str = "circle-vault/system-salt/v1";
const DEFAULT_MASTERKEY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ADMIN_ACCOUNT: &str = "admin";
const DEFAULT_SANITY_INTERVAL_MINUTES: u64 = 1_440;
const DATABASE_FILE: &str = "circle-vault.redb";

/// A setting that stored keys, verifiers or checksums were produced with.
///
/// Pinned settings are recorded in the store on first unlock and must not
/// change once member accounts exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedSetting {
    /// Environment variable that configures it.
    pub variable: &'static str,
    /// Key in the settings table.
    pub key: &'static str,
    pub value: String,
}

/// Immutable engine configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub crypto: CryptoSuite,
    pub system_salt: String,
    pub masterkey_url: Option<Url>,
    pub masterkey_timeout: Duration,
    pub admin_account: String,
    pub is_ready: bool,
    pub sanity_startup: bool,
    /// `None` disables the periodic sweep.
    pub sanity_interval: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            crypto: CryptoSuite {
                symmetric: SymmetricAlgorithm::Aes256Gcm,
                asymmetric: AsymmetricAlgorithm::Secp256k1Ecies,
                digest: DigestAlgorithm::Sha512,
                signature: SignatureAlgorithm::EcdsaSecp256k1Sha256,
                pbkdf_iterations: NonZeroU32::new(DEFAULT_PBKDF_ITERATIONS)
                    .unwrap_or(NonZeroU32::MIN),
            },
            system_salt: DEFAULT_SYSTEM_SALT.to_string(),
            masterkey_url: None,
            masterkey_timeout: Duration::from_secs(DEFAULT_MASTERKEY_TIMEOUT_SECS),
            admin_account: DEFAULT_ADMIN_ACCOUNT.to_string(),
            is_ready: true,
            sanity_startup: true,
            sanity_interval: Some(Duration::from_secs(DEFAULT_SANITY_INTERVAL_MINUTES * 60)),
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> CwsResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// Unset or blank variables take their default; anything that does not
    /// parse is a `SettingError`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CwsResult<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Settings::default();

        if let Some(dir) = get(DATA_DIR_ENV) {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = get(SYMMETRIC_ALGORITHM_ENV) {
            settings.crypto.symmetric = v.parse()?;
        }
        if let Some(v) = get(ASYMMETRIC_ALGORITHM_ENV) {
            settings.crypto.asymmetric = v.parse()?;
        }
        if let Some(v) = get(DIGEST_ALGORITHM_ENV) {
            settings.crypto.digest = v.parse()?;
        }
        if let Some(v) = get(SIGNATURE_ALGORITHM_ENV) {
            settings.crypto.signature = v.parse()?;
        }
        if let Some(v) = get(PBKDF_ITERATIONS_ENV) {
            let iterations: u32 = parse_value(PBKDF_ITERATIONS_ENV, &v)?;
            if iterations < MIN_PBKDF_ITERATIONS {
                return Err(CwsError::setting(format!(
                    "{PBKDF_ITERATIONS_ENV} must be at least {MIN_PBKDF_ITERATIONS}."
                )));
            }
            settings.crypto.pbkdf_iterations = NonZeroU32::new(iterations)
                .ok_or_else(|| CwsError::setting(format!("{PBKDF_ITERATIONS_ENV} is zero.")))?;
        }
        if let Some(v) = get(SYSTEM_SALT_ENV) {
            settings.system_salt = v;
        }
        if let Some(v) = get(MASTERKEY_URL_ENV) {
            settings.masterkey_url = Some(parse_locator(&v)?);
        }
        if let Some(v) = get(MASTERKEY_TIMEOUT_ENV) {
            let secs: u64 = parse_value(MASTERKEY_TIMEOUT_ENV, &v)?;
            if secs == 0 {
                return Err(CwsError::setting(format!(
                    "{MASTERKEY_TIMEOUT_ENV} must be greater than zero."
                )));
            }
            settings.masterkey_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get(ADMIN_ACCOUNT_ENV) {
            settings.admin_account = v.trim().to_string();
        }
        if let Some(v) = get(IS_READY_ENV) {
            settings.is_ready = parse_flag(IS_READY_ENV, &v)?;
        }
        if let Some(v) = get(SANITY_STARTUP_ENV) {
            settings.sanity_startup = parse_flag(SANITY_STARTUP_ENV, &v)?;
        }
        if let Some(v) = get(SANITY_INTERVAL_ENV) {
            let minutes: u64 = parse_value(SANITY_INTERVAL_ENV, &v)?;
            settings.sanity_interval = (minutes > 0).then(|| Duration::from_secs(minutes * 60));
        }

        Ok(settings)
    }

    /// Location of the redb database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// The values existing key material depends on. The system salt is
    /// recorded as a SHA-256 checksum only.
    pub fn pinned(&self) -> Vec<PinnedSetting> {
        let pin = |variable: &'static str, key: &'static str, value: String| PinnedSetting {
            variable,
            key,
            value,
        };
        vec![
            pin(
                SYMMETRIC_ALGORITHM_ENV,
                "crypto.symmetric",
                self.crypto.symmetric.name().to_string(),
            ),
            pin(
                ASYMMETRIC_ALGORITHM_ENV,
                "crypto.asymmetric",
                self.crypto.asymmetric.name().to_string(),
            ),
            pin(
                DIGEST_ALGORITHM_ENV,
                "crypto.digest",
                self.crypto.digest.name().to_string(),
            ),
            pin(
                SIGNATURE_ALGORITHM_ENV,
                "crypto.signature",
                self.crypto.signature.name().to_string(),
            ),
            pin(
                PBKDF_ITERATIONS_ENV,
                "crypto.pbkdf_iterations",
                self.crypto.pbkdf_iterations.get().to_string(),
            ),
            pin(
                SYSTEM_SALT_ENV,
                "crypto.system_salt",
                checksum(DigestAlgorithm::Sha256, self.system_salt.as_bytes()),
            ),
        ]
    }

    pub fn with_data_dir(mut self, dir: &Path) -> Self {
        self.data_dir = dir.to_path_buf();
        self
    }
}

/// Parse a master key locator; only `file`, `http` and `https` are accepted.
pub fn parse_locator(value: &str) -> CwsResult<Url> {
    let url = Url::parse(value.trim()).map_err(|e| {
        CwsError::setting(format!("{MASTERKEY_URL_ENV} is not a valid URL: {e}"))
    })?;
    match url.scheme() {
        "file" | "http" | "https" => Ok(url),
        other => Err(CwsError::setting(format!(
            "{MASTERKEY_URL_ENV} uses unsupported scheme '{other}'."
        ))),
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> CwsResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CwsError::setting(format!("{name} has an invalid value '{value}'.")))
}

fn parse_flag(name: &str, value: &str) -> CwsResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(CwsError::setting(format!(
            "{name} must be true or false, got '{value}'."
        ))),
    }
}
