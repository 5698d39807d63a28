// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Human-readable progress of a switch run.
//!
//! Display only; nothing here decides control flow. Each event goes to
//! the tracing log, the caller's channel, the in-memory ring of the last
//! [`LOG_MAX`] events and, if enabled, the journal.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::journal::SwitchJournal;
use crate::model::{SwitchPhase, SwitchResult};

pub const LOG_MAX: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: SwitchPhase,
    pub at: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:<20} {}",
            self.at.format("%H:%M:%S%.3f"),
            self.phase.name(),
            self.message
        )
    }
}

// ── Ring buffer ─────────────────────────────────────

/// Last [`LOG_MAX`] events across runs. Cheap to clone; clones share.
#[derive(Debug, Clone, Default)]
pub struct ProgressLog {
    buf: Arc<Mutex<VecDeque<ProgressEvent>>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: ProgressEvent) {
        let mut buf = self.buf.lock();
        buf.push_back(event);
        while buf.len() > LOG_MAX {
            buf.pop_front();
        }
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.buf.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buf.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().is_empty()
    }
}

// ── Sink ────────────────────────────────────────────

/// Fan-out for one run's progress.
#[derive(Default)]
pub struct ProgressSink {
    tx: Option<Sender<ProgressEvent>>,
    log: ProgressLog,
    journal: Option<(SwitchJournal, i64)>,
}

impl ProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, tx: Sender<ProgressEvent>) -> Self {
        self.tx = Some(tx);
        self
    }

    pub fn with_log(mut self, log: ProgressLog) -> Self {
        self.log = log;
        self
    }

    /// Record into `journal` under a freshly started run row.
    pub fn with_journal(mut self, journal: SwitchJournal, username: &str, client: &str) -> Self {
        match journal.begin_run(username, client) {
            Ok(run_id) => self.journal = Some((journal, run_id)),
            Err(e) => warn!(error = %e, "journal unavailable for this run"),
        }
        self
    }

    pub fn log(&self) -> &ProgressLog {
        &self.log
    }

    pub fn emit(&self, phase: SwitchPhase, message: impl Into<String>) {
        let event = ProgressEvent {
            phase,
            at: Local::now(),
            message: message.into(),
        };
        info!(phase = phase.name(), "{}", event.message);

        if let Some((journal, run_id)) = &self.journal {
            if let Err(e) = journal.record_event(*run_id, &event) {
                warn!(error = %e, "journal write failed");
            }
        }
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is watching; the run goes on.
            let _ = tx.send(event.clone());
        }
        self.log.push(event);
    }

    /// Close the journal row with the final outcome.
    pub fn finish(&self, result: &SwitchResult) {
        if let Some((journal, run_id)) = &self.journal {
            if let Err(e) = journal.finish_run(*run_id, result) {
                warn!(error = %e, "journal finish failed");
            }
        }
    }
}
