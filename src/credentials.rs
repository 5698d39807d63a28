// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read-only access to stored accounts.
//!
//! Storage and at-rest encryption belong to the account manager; the
//! switcher only asks for one decrypted credential right before a run.

use std::collections::HashMap;

use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};

use crate::error::CredentialError;
use crate::model::{Credential, ProgramId};

pub trait CredentialSource: Send + Sync {
    /// Decrypted credential for `account` of `game` ("valorant", "league", ...).
    fn credential(&self, game: &str, account: u32) -> Result<Credential, CredentialError>;
}

struct StoredAccount {
    username: String,
    password: SecretString,
    stay_logged_in: bool,
    launch: Option<ProgramId>,
}

/// In-memory account table, keyed by game and account number.
#[derive(Default)]
pub struct MemoryCredentials {
    accounts: RwLock<HashMap<(String, u32), StoredAccount>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, game: &str, account: u32, credential: Credential) {
        let stored = StoredAccount {
            username: credential.username.clone(),
            password: SecretString::from(credential.password().to_string()),
            stay_logged_in: credential.stay_logged_in,
            launch: credential.launch_target.clone(),
        };
        self.accounts
            .write()
            .insert((game.to_lowercase(), account), stored);
    }
}

impl CredentialSource for MemoryCredentials {
    fn credential(&self, game: &str, account: u32) -> Result<Credential, CredentialError> {
        let accounts = self.accounts.read();
        let a = accounts
            .get(&(game.to_lowercase(), account))
            .ok_or_else(|| CredentialError::NotFound {
                game: game.to_string(),
                account,
            })?;
        Ok(Credential::new(a.username.clone(), a.password.expose_secret())
            .stay_logged_in(a.stay_logged_in)
            .launch(a.launch.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_on_game() {
        let store = MemoryCredentials::new();
        store.insert(
            "Valorant",
            2,
            Credential::new("alice", "pw").stay_logged_in(true),
        );
        let c = store.credential("valorant", 2).unwrap();
        assert_eq!(c.username, "alice");
        assert_eq!(c.password(), "pw");
        assert!(c.stay_logged_in);
    }

    #[test]
    fn unknown_account_is_not_found() {
        let store = MemoryCredentials::new();
        assert!(matches!(
            store.credential("league", 1),
            Err(CredentialError::NotFound { account: 1, .. })
        ));
    }
}
