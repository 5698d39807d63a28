// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite history of switch runs. Never sees a password.

use std::fs;
use std::path::Path;

use chrono::Local;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::JournalError;
use crate::model::SwitchResult;
use crate::progress::ProgressEvent;

pub const JOURNAL_FILE: &str = "switchmaster_profiles/journal.db";
/// Oldest events beyond this are pruned.
const EVENTS_MAX: i64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub username: String,
    pub client_path: String,
    pub outcome: Option<String>,
    pub reason: Option<String>,
    pub warning: Option<String>,
}

pub struct SwitchJournal {
    conn: Connection,
}

impl SwitchJournal {
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        // journal_mode answers with a row; not every build accepts that here.
        let _ = conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=500;",
        );
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at   TEXT NOT NULL,
                finished_at  TEXT,
                username     TEXT NOT NULL,
                client_path  TEXT NOT NULL,
                outcome      TEXT,
                reason       TEXT,
                warning      TEXT
            );
            CREATE TABLE IF NOT EXISTS events (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id   INTEGER NOT NULL REFERENCES runs(id),
                at       TEXT NOT NULL,
                phase    TEXT NOT NULL,
                message  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id);
            ",
        )?;
        debug!(path = %path.display(), "journal opened");
        Ok(Self { conn })
    }

    pub fn begin_run(&self, username: &str, client_path: &str) -> Result<i64, JournalError> {
        self.conn.execute(
            "INSERT INTO runs(started_at, username, client_path) VALUES(?1, ?2, ?3)",
            params![Local::now().to_rfc3339(), username, client_path],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn record_event(&self, run_id: i64, event: &ProgressEvent) -> Result<(), JournalError> {
        self.conn.execute(
            "INSERT INTO events(run_id, at, phase, message) VALUES(?1, ?2, ?3, ?4)",
            params![run_id, event.at.to_rfc3339(), event.phase.name(), event.message],
        )?;
        Ok(())
    }

    pub fn finish_run(&self, run_id: i64, result: &SwitchResult) -> Result<(), JournalError> {
        self.conn.execute(
            "UPDATE runs SET finished_at=?1, outcome=?2, reason=?3, warning=?4 WHERE id=?5",
            params![
                Local::now().to_rfc3339(),
                result.label(),
                result.reason().map(|r| r.to_string()),
                result.warning().map(|w| w.to_string()),
                run_id
            ],
        )?;
        self.conn.execute(
            "DELETE FROM events WHERE id NOT IN (SELECT id FROM events ORDER BY id DESC LIMIT ?1)",
            params![EVENTS_MAX],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, JournalError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, username, client_path, outcome, reason, warning \
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |r| {
            Ok(RunRecord {
                id: r.get(0)?,
                started_at: r.get(1)?,
                finished_at: r.get(2)?,
                username: r.get(3)?,
                client_path: r.get(4)?,
                outcome: r.get(5)?,
                reason: r.get(6)?,
                warning: r.get(7)?,
            })
        })?;
        let runs = rows.collect::<Result<Vec<_>, rusqlite::Error>>()?;
        Ok(runs)
    }

    /// `(phase, message)` pairs of one run, in order.
    pub fn events(&self, run_id: i64) -> Result<Vec<(String, String)>, JournalError> {
        let mut stmt = self
            .conn
            .prepare("SELECT phase, message FROM events WHERE run_id=?1 ORDER BY id")?;
        let rows = stmt.query_map(params![run_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
        let events = rows.collect::<Result<Vec<_>, rusqlite::Error>>()?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::SwitchPhase;
    use tempfile::tempdir;

    fn event(phase: SwitchPhase, msg: &str) -> ProgressEvent {
        ProgressEvent {
            phase,
            at: Local::now(),
            message: msg.into(),
        }
    }

    #[test]
    fn run_lifecycle_is_recorded() {
        let dir = tempdir().unwrap();
        let j = SwitchJournal::open(&dir.path().join("nested/journal.db")).unwrap();
        let id = j.begin_run("alice", "C:/Riot/RiotClientServices.exe").unwrap();
        j.record_event(id, &event(SwitchPhase::ClosingProcesses, "closing 4 processes"))
            .unwrap();
        j.record_event(id, &event(SwitchPhase::Failed, "window not found")).unwrap();
        j.finish_run(
            id,
            &SwitchResult::Failed {
                reason: ErrorKind::WindowNotFound { attempts: 40 },
            },
        )
        .unwrap();

        let runs = j.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].username, "alice");
        assert_eq!(runs[0].outcome.as_deref(), Some("failed"));
        assert_eq!(
            runs[0].reason.as_deref(),
            Some("login window not found after 40 polls")
        );
        assert!(runs[0].finished_at.is_some());

        let events = j.events(id).unwrap();
        assert_eq!(events[0].0, "closing-processes");
        assert_eq!(events[1].1, "window not found");
    }

    #[test]
    fn recent_runs_newest_first() {
        let dir = tempdir().unwrap();
        let j = SwitchJournal::open(&dir.path().join("journal.db")).unwrap();
        let a = j.begin_run("a", "x").unwrap();
        let b = j.begin_run("b", "x").unwrap();
        j.finish_run(b, &SwitchResult::NeedsVerification).unwrap();
        let runs = j.recent_runs(1).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, b);
        assert_ne!(a, b);
        assert_eq!(runs[0].outcome.as_deref(), Some("needs-verification"));
    }

    #[test]
    fn reopening_keeps_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.db");
        {
            let j = SwitchJournal::open(&path).unwrap();
            let id = j.begin_run("carol", "x").unwrap();
            j.finish_run(id, &SwitchResult::Success { warning: None }).unwrap();
        }
        let j = SwitchJournal::open(&path).unwrap();
        assert_eq!(j.recent_runs(5).unwrap()[0].outcome.as_deref(), Some("success"));
    }
}
