// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Runs switches on a worker thread, one at a time.
//!
//! `submit` never blocks and never queues: while a run is active every
//! further submit is rejected with [`SubmitError::Busy`]. The result comes
//! back through [`SwitchHandle`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::SwitchConfig;
use crate::credentials::CredentialSource;
use crate::error::{ErrorKind, SubmitError};
use crate::journal::SwitchJournal;
use crate::model::{SwitchAbortContext, SwitchPhase, SwitchRequest, SwitchResult};
use crate::orchestrator::{CancelToken, SwitchOrchestrator};
use crate::platform::Desktop;
use crate::progress::{ProgressEvent, ProgressLog, ProgressSink};

pub struct SwitchExecutor {
    desktop: Arc<dyn Desktop>,
    config: Arc<SwitchConfig>,
    busy: Arc<AtomicBool>,
    journal_path: Option<PathBuf>,
    log: ProgressLog,
}

impl SwitchExecutor {
    pub fn new(desktop: Arc<dyn Desktop>, config: SwitchConfig) -> Self {
        Self {
            desktop,
            config: Arc::new(config),
            busy: Arc::new(AtomicBool::new(false)),
            journal_path: None,
            log: ProgressLog::new(),
        }
    }

    /// Record every run in the SQLite journal at `path`.
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(SeqCst)
    }

    /// Progress of recent runs, oldest first.
    pub fn recent_progress(&self) -> Vec<ProgressEvent> {
        self.log.snapshot()
    }

    pub fn submit(&self, request: SwitchRequest) -> Result<SwitchHandle, SubmitError> {
        // Re-entry guard: exactly one run at a time, rejected not queued.
        if self
            .busy
            .compare_exchange(false, true, SeqCst, SeqCst)
            .is_err()
        {
            warn!(username = %request.credential.username, "switch rejected, another one is running");
            return Err(SubmitError::Busy);
        }

        let (result_tx, result_rx) = bounded(1);
        let (progress_tx, progress_rx) = unbounded();
        let cancel = CancelToken::new();
        let phase = Arc::new(Mutex::new(SwitchPhase::Idle));

        let worker = Worker {
            desktop: Arc::clone(&self.desktop),
            config: Arc::clone(&self.config),
            busy: Arc::clone(&self.busy),
            journal_path: self.journal_path.clone(),
            log: self.log.clone(),
            cancel: cancel.clone(),
            phase: Arc::clone(&phase),
        };

        let spawned = thread::Builder::new()
            .name("switch-worker".into())
            .spawn(move || worker.run(request, result_tx, progress_tx));
        if let Err(e) = spawned {
            self.busy.store(false, SeqCst);
            error!(error = %e, "could not start switch worker");
            return Err(SubmitError::Spawn(e));
        }

        Ok(SwitchHandle {
            result_rx,
            progress_rx,
            cancel,
            phase,
            done: Mutex::new(None),
        })
    }

    /// Look the account up in `store`, then submit it.
    pub fn submit_account(
        &self,
        store: &dyn CredentialSource,
        game: &str,
        account: u32,
        client_path: impl Into<PathBuf>,
    ) -> Result<SwitchHandle, SubmitError> {
        if self.is_busy() {
            return Err(SubmitError::Busy);
        }
        let credential = store.credential(game, account)?;
        info!(game, account, username = %credential.username, "account resolved");
        self.submit(SwitchRequest::new(client_path, credential))
    }
}

struct Worker {
    desktop: Arc<dyn Desktop>,
    config: Arc<SwitchConfig>,
    busy: Arc<AtomicBool>,
    journal_path: Option<PathBuf>,
    log: ProgressLog,
    cancel: CancelToken,
    phase: Arc<Mutex<SwitchPhase>>,
}

impl Worker {
    fn run(
        self,
        request: SwitchRequest,
        result_tx: Sender<SwitchResult>,
        progress_tx: Sender<ProgressEvent>,
    ) {
        let client = request.login_client_path.display().to_string();
        let mut sink = ProgressSink::new()
            .with_channel(progress_tx)
            .with_log(self.log.clone());
        if let Some(path) = &self.journal_path {
            match SwitchJournal::open(path) {
                Ok(journal) => sink = sink.with_journal(journal, &request.credential.username, &client),
                Err(e) => warn!(path = %path.display(), error = %e, "journal disabled for this run"),
            }
        }

        let ctx = SwitchAbortContext {
            client_path: request.login_client_path.clone(),
            window_polls: self.config.budgets.window_polls,
            follow_on: request
                .credential
                .launch_target
                .as_ref()
                .map(|p| p.to_string()),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            SwitchOrchestrator::new(&*self.desktop, &self.config, &sink)
                .with_cancel(self.cancel.clone())
                .with_phase_cell(Arc::clone(&self.phase))
                .run(&request)
        }));

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let phase = *self.phase.lock();
                error!(
                    phase = phase.name(),
                    panic = %panic_message(payload.as_ref()),
                    "switch worker panicked"
                );
                let result = phase.abort_result(&ctx);
                let terminal = if result.logged_in() {
                    SwitchPhase::Completed
                } else {
                    SwitchPhase::Failed
                };
                *self.phase.lock() = terminal;
                sink.emit(terminal, format!("aborted in {phase}: {result}"));
                result
            }
        };

        sink.finish(&result);
        // Closes the progress channel before the result goes out.
        drop(sink);
        drop(request);

        self.busy.store(false, SeqCst);
        if result_tx.send(result).is_err() {
            info!("switch finished, nobody waiting for the result");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn worker_lost() -> SwitchResult {
    SwitchResult::Failed {
        reason: ErrorKind::WorkerLost,
    }
}

/// Caller's side of one submitted run.
pub struct SwitchHandle {
    result_rx: Receiver<SwitchResult>,
    progress_rx: Receiver<ProgressEvent>,
    cancel: CancelToken,
    phase: Arc<Mutex<SwitchPhase>>,
    done: Mutex<Option<SwitchResult>>,
}

impl SwitchHandle {
    /// Ask the run to stop. Only honoured before processes get closed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn phase(&self) -> SwitchPhase {
        *self.phase.lock()
    }

    /// Progress events as they happen. Disconnects when the run is over.
    pub fn progress(&self) -> &Receiver<ProgressEvent> {
        &self.progress_rx
    }

    fn settle(&self, result: SwitchResult) -> SwitchResult {
        *self.done.lock() = Some(result.clone());
        result
    }

    /// Result if the run is over, without blocking.
    pub fn try_result(&self) -> Option<SwitchResult> {
        if let Some(r) = self.done.lock().clone() {
            return Some(r);
        }
        match self.result_rx.try_recv() {
            Ok(r) => Some(self.settle(r)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.settle(worker_lost())),
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<SwitchResult> {
        if let Some(r) = self.done.lock().clone() {
            return Some(r);
        }
        match self.result_rx.recv_timeout(timeout) {
            Ok(r) => Some(self.settle(r)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.settle(worker_lost())),
        }
    }

    /// Block until the run is over.
    pub fn wait(self) -> SwitchResult {
        if let Some(r) = self.done.lock().take() {
            return r;
        }
        self.result_rx.recv().unwrap_or_else(|_| worker_lost())
    }
}
