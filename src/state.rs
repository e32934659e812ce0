// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Engine context, constructed once at startup and passed by reference into
//! every operation.

use std::ops::Deref;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::Settings;
use crate::crypto::CryptoSuite;
use crate::error::{CwsError, CwsResult};
use crate::keys::{KeyHierarchy, MasterKey};
use crate::storage::CwsDatabase;

/// Shared engine state: database, settings and the master key handle.
#[derive(Clone)]
pub struct EngineState {
    pub db: Arc<CwsDatabase>,
    pub settings: Arc<Settings>,
    master: Arc<RwLock<Option<MasterKey>>>,
}

/// Read access to the unlocked master key.
///
/// Rotation waits for every outstanding guard, so keys wrapped or unwrapped
/// while a guard is held always belong to one master key.
pub struct MasterGuard<'a> {
    guard: RwLockReadGuard<'a, Option<MasterKey>>,
}

impl Deref for MasterGuard<'_> {
    type Target = MasterKey;

    fn deref(&self) -> &MasterKey {
        // Constructed only when the option is populated.
        match self.guard.as_ref() {
            Some(key) => key,
            None => unreachable!("MasterGuard created for a locked master key"),
        }
    }
}

impl EngineState {
    pub fn new(db: CwsDatabase, settings: Settings) -> Self {
        Self {
            db: Arc::new(db),
            settings: Arc::new(settings),
            master: Arc::new(RwLock::new(None)),
        }
    }

    /// Open the database named by the settings.
    pub fn open(settings: Settings) -> CwsResult<Self> {
        let db = CwsDatabase::open(&settings.database_path())?;
        Ok(Self::new(db, settings))
    }

    pub fn crypto(&self) -> CryptoSuite {
        self.settings.crypto
    }

    pub fn keys(&self) -> KeyHierarchy {
        KeyHierarchy::new(self.settings.crypto)
    }

    pub fn is_unlocked(&self) -> bool {
        self.master.read().map(|m| m.is_some()).unwrap_or(false)
    }

    /// Read guard on the unlocked master key.
    pub fn master(&self) -> CwsResult<MasterGuard<'_>> {
        let guard = self
            .master
            .read()
            .map_err(|_| CwsError::internal("reading master key", "lock poisoned"))?;
        if guard.is_none() {
            return Err(CwsError::illegal("The MasterKey has not been unlocked."));
        }
        Ok(MasterGuard { guard })
    }

    pub(crate) fn master_write(&self) -> CwsResult<RwLockWriteGuard<'_, Option<MasterKey>>> {
        self.master
            .write()
            .map_err(|_| CwsError::internal("locking master key", "lock poisoned"))
    }

    /// Gate for member-facing operations.
    pub fn ensure_ready(&self) -> CwsResult<MasterGuard<'_>> {
        if !self.settings.is_ready {
            return Err(CwsError::illegal("The system is not ready."));
        }
        self.master()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn state(settings: Settings) -> (EngineState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = EngineState::open(settings.with_data_dir(dir.path())).unwrap();
        (state, dir)
    }

    #[test]
    fn locked_state_refuses_master_access() {
        let (state, _dir) = state(Settings::default());
        assert!(!state.is_unlocked());
        let err = state.master().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::IllegalAction);
    }

    #[test]
    fn not_ready_state_refuses_member_operations() {
        let settings = Settings {
            is_ready: false,
            ..Settings::default()
        };
        let (state, _dir) = state(settings);
        let err = state.ensure_ready().err().unwrap();
        assert_eq!(err.message(), "The system is not ready.");
    }

    #[test]
    fn clones_share_the_master_key_handle() {
        let (state, _dir) = state(Settings::default());
        let clone = state.clone();
        *state.master_write().unwrap() = Some(MasterKey::derive(&state.crypto(), b"s", "salt"));
        assert!(clone.is_unlocked());
        assert!(clone.ensure_ready().is_ok());
    }
}
