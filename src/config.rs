// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Timing budgets, retry counts and target names for a switch run, plus
//! discovery of the login client executable.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "switchmaster.json";
pub const CLIENT_PATHS_FILE: &str = "client_paths.json";

/// Usual install locations of the login client.
pub const DEFAULT_CLIENT_PATHS: [&str; 3] = [
    "C:/Riot Games/Riot Client/RiotClientServices.exe",
    "C:/Program Files/Riot Games/Riot Client/RiotClientServices.exe",
    "C:/Program Files (x86)/Riot Games/Riot Client/RiotClientServices.exe",
];

/// Delays in milliseconds. The login client gives no completion signals,
/// so these are what stands in for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub kill_settle_ms: u64,
    pub window_poll_ms: u64,
    pub focus_retry_ms: u64,
    pub focus_settle_ms: u64,
    pub ui_ready_ms: u64,
    pub clipboard_clear_ms: u64,
    pub select_all_ms: u64,
    pub paste_ms: u64,
    pub field_advance_ms: u64,
    pub sequence_tab_ms: u64,
    pub sequence_confirm_ms: u64,
    pub post_login_scan_ms: u64,
    pub follow_on_delay_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            kill_settle_ms: 2000,
            window_poll_ms: 500,
            focus_retry_ms: 100,
            focus_settle_ms: 200,
            ui_ready_ms: 1500,
            clipboard_clear_ms: 100,
            select_all_ms: 200,
            paste_ms: 300,
            field_advance_ms: 300,
            sequence_tab_ms: 150,
            sequence_confirm_ms: 200,
            post_login_scan_ms: 3000,
            follow_on_delay_ms: 1000,
        }
    }
}

impl Timings {
    /// Every delay zero. For dry runs and tests.
    pub fn immediate() -> Self {
        Self {
            kill_settle_ms: 0,
            window_poll_ms: 0,
            focus_retry_ms: 0,
            focus_settle_ms: 0,
            ui_ready_ms: 0,
            clipboard_clear_ms: 0,
            select_all_ms: 0,
            paste_ms: 0,
            field_advance_ms: 0,
            sequence_tab_ms: 0,
            sequence_confirm_ms: 0,
            post_login_scan_ms: 0,
            follow_on_delay_ms: 0,
        }
    }
}

/// Sleep for `ms` milliseconds; zero returns immediately.
pub fn pause(ms: u64) {
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Attempt counts per phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budgets {
    pub window_polls: u32,
    pub focus_attempts: u32,
    /// Foreground read-backs per focus attempt, `focus_settle_ms` apart.
    pub focus_checks: u32,
    pub field_attempts: u32,
    pub clipboard_writes: u32,
    /// Tab stops between the password field and "stay signed in".
    pub stay_signed_in_tabs: u32,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            window_polls: 40,
            focus_attempts: 5,
            focus_checks: 10,
            field_attempts: 3,
            clipboard_writes: 3,
            stay_signed_in_tabs: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Process names closed before relaunch (substring, any case).
    pub processes_to_close: Vec<String>,
    /// The login window's title contains one of these.
    pub window_titles: Vec<String>,
    /// The login window's owner image name contains this.
    pub window_owner: String,
    /// Process that must keep running while credentials are typed.
    pub client_process: String,
    /// Title markers of the post-login error banner...
    pub error_markers: Vec<String>,
    /// ...combined with one of these (case-insensitive).
    pub refusal_keywords: Vec<String>,
    pub timings: Timings,
    pub budgets: Budgets,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            processes_to_close: vec![
                "RiotClientServices.exe".into(),
                "RiotClientUx.exe".into(),
                "LeagueClient.exe".into(),
                "VALORANT.exe".into(),
            ],
            window_titles: vec!["Riot Client".into(), "Riot Games".into()],
            window_owner: "Riot".into(),
            client_process: "RiotClientServices".into(),
            error_markers: vec!["Erreur".into(), "Error".into()],
            refusal_keywords: vec!["refusé".into(), "refused".into(), "denied".into()],
            timings: Timings::default(),
            budgets: Budgets::default(),
        }
    }
}

impl SwitchConfig {
    /// Load from `path`. A missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }
}

// ── Client path discovery ───────────────────────────

/// `client_paths.json` layout. Other games' entries are kept untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SavedPaths {
    riot: Option<PathBuf>,
    #[serde(flatten)]
    other: BTreeMap<String, Option<PathBuf>>,
}

/// Finds the login client: explicit path, then the saved one, then the
/// usual install locations. Whatever is found gets remembered.
#[derive(Debug, Clone)]
pub struct ClientLocator {
    saved_file: PathBuf,
    candidates: Vec<PathBuf>,
}

impl ClientLocator {
    pub fn new(saved_file: impl Into<PathBuf>) -> Self {
        Self {
            saved_file: saved_file.into(),
            candidates: DEFAULT_CLIENT_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn resolve(&self, explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        // Explicit paths are passed through; a missing one fails later as
        // ExecutableNotFound with the path in the message.
        if let Some(p) = explicit {
            return Ok(p.to_path_buf());
        }

        let mut saved = self.read_saved();
        if let Some(p) = saved.riot.clone() {
            if p.is_file() {
                return Ok(p);
            }
            warn!(path = %p.display(), "saved client path no longer exists");
            saved.riot = None;
            self.write_saved(&saved)?;
        }

        let found = self
            .candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .ok_or(ConfigError::ClientNotFound)?;
        info!(path = %found.display(), "login client found");
        saved.riot = Some(found.clone());
        self.write_saved(&saved)?;
        Ok(found)
    }

    /// Remember a user-chosen client path. Must be an existing `.exe`.
    pub fn set_client_path(&self, path: &Path) -> Result<(), ConfigError> {
        let is_exe = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("exe"));
        if !is_exe || !path.is_file() {
            return Err(ConfigError::InvalidClientPath(path.to_path_buf()));
        }
        let mut saved = self.read_saved();
        saved.riot = Some(path.to_path_buf());
        self.write_saved(&saved)?;
        info!(path = %path.display(), "client path set manually");
        Ok(())
    }

    pub fn saved_client_path(&self) -> Option<PathBuf> {
        self.read_saved().riot
    }

    fn read_saved(&self) -> SavedPaths {
        match fs::read_to_string(&self.saved_file) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(file = %self.saved_file.display(), error = %e, "ignoring malformed saved paths");
                SavedPaths::default()
            }),
            Err(_) => SavedPaths::default(),
        }
    }

    fn write_saved(&self, saved: &SavedPaths) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.saved_file.clone(),
            source,
        };
        if let Some(dir) = self.saved_file.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(saved).map_err(|source| ConfigError::Parse {
            path: self.saved_file.clone(),
            source,
        })?;
        fs::write(&self.saved_file, json).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_budgets() {
        let c = SwitchConfig::default();
        assert_eq!(c.budgets.window_polls, 40);
        assert_eq!(c.budgets.focus_attempts, 5);
        assert_eq!(c.budgets.field_attempts, 3);
        assert_eq!(c.timings.window_poll_ms, 500);
        assert_eq!(c.timings.kill_settle_ms, 2000);
        assert_eq!(c.timings.post_login_scan_ms, 3000);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let c = SwitchConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(c, SwitchConfig::default());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"budgets":{"window_polls":10},"window_owner":"Foo"}"#).unwrap();
        let c = SwitchConfig::load(&path).unwrap();
        assert_eq!(c.budgets.window_polls, 10);
        assert_eq!(c.budgets.field_attempts, 3);
        assert_eq!(c.window_owner, "Foo");
        assert_eq!(c.timings, Timings::default());
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            SwitchConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn locator_prefers_explicit_then_saved_then_defaults() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("RiotClientServices.exe");
        fs::write(&exe, b"").unwrap();
        let saved_file = dir.path().join(CLIENT_PATHS_FILE);
        let locator = ClientLocator::new(&saved_file).with_candidates(vec![
            dir.path().join("missing.exe"),
            exe.clone(),
        ]);

        let explicit = dir.path().join("elsewhere.exe");
        assert_eq!(locator.resolve(Some(&explicit)).unwrap(), explicit);

        assert_eq!(locator.resolve(None).unwrap(), exe);
        assert_eq!(locator.saved_client_path(), Some(exe.clone()));
    }

    #[test]
    fn stale_saved_path_is_dropped() {
        let dir = tempdir().unwrap();
        let saved_file = dir.path().join(CLIENT_PATHS_FILE);
        fs::write(
            &saved_file,
            r#"{"riot":"/gone/RiotClientServices.exe","valorant":null}"#,
        )
        .unwrap();
        let locator = ClientLocator::new(&saved_file).with_candidates(vec![]);
        assert!(matches!(locator.resolve(None), Err(ConfigError::ClientNotFound)));
        assert_eq!(locator.saved_client_path(), None);
        let raw = fs::read_to_string(&saved_file).unwrap();
        assert!(raw.contains("valorant"));
    }

    #[test]
    fn manual_path_must_be_existing_exe() {
        let dir = tempdir().unwrap();
        let txt = dir.path().join("client.txt");
        fs::write(&txt, b"").unwrap();
        let locator = ClientLocator::new(dir.path().join(CLIENT_PATHS_FILE));
        assert!(locator.set_client_path(&txt).is_err());
        assert!(locator.set_client_path(&dir.path().join("x.exe")).is_err());

        let exe = dir.path().join("Client.EXE");
        fs::write(&exe, b"").unwrap();
        locator.set_client_path(&exe).unwrap();
        assert_eq!(locator.saved_client_path(), Some(exe));
    }
}
