// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The switch state machine.
//!
//! Idle → ClosingProcesses → Launching → LocatingWindow → AcquiringFocus →
//! EnteringUsername → EnteringPassword → (StaySignedInSequence) →
//! ScanningForErrors → (LaunchingFollowOn) → Completed | Failed
//!
//! Runs synchronously on the calling thread. Each phase returns a
//! `Result`; retry counters are plain loop state. Budgets and delays come
//! from [`SwitchConfig`].

use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clipboard::ClipboardInjector;
use crate::config::{pause, SwitchConfig};
use crate::error::{ClipboardError, ErrorKind};
use crate::model::{SwitchPhase, SwitchRequest, SwitchResult, WindowHandle};
use crate::platform::{Desktop, KeyStroke};
use crate::process_control::{KillStatus, ProcessController};
use crate::progress::ProgressSink;
use crate::window::{FocusEnforcer, FocusOutcome, WindowLocator};

/// Best-effort cancel flag. Only looked at before processes are closed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Username,
    Password,
}

impl Field {
    fn label(self) -> &'static str {
        match self {
            Field::Username => "username",
            Field::Password => "password",
        }
    }
}

pub struct SwitchOrchestrator<'a, D: Desktop + ?Sized> {
    desktop: &'a D,
    config: &'a SwitchConfig,
    progress: &'a ProgressSink,
    phase: Arc<Mutex<SwitchPhase>>,
    cancel: CancelToken,
}

impl<'a, D: Desktop + ?Sized> SwitchOrchestrator<'a, D> {
    pub fn new(desktop: &'a D, config: &'a SwitchConfig, progress: &'a ProgressSink) -> Self {
        Self {
            desktop,
            config,
            progress,
            phase: Arc::new(Mutex::new(SwitchPhase::Idle)),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Share the phase cell, e.g. with a supervisor that must know where a
    /// run died.
    pub fn with_phase_cell(mut self, phase: Arc<Mutex<SwitchPhase>>) -> Self {
        self.phase = phase;
        self
    }

    pub fn phase(&self) -> SwitchPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: SwitchPhase) {
        *self.phase.lock() = phase;
    }

    fn enter(&self, phase: SwitchPhase, message: impl Into<String>) {
        self.set_phase(phase);
        self.progress.emit(phase, message);
    }

    /// Run one switch to a terminal state.
    pub fn run(&self, request: &SwitchRequest) -> SwitchResult {
        let cred = &request.credential;
        info!(
            username = %cred.username,
            client = %request.login_client_path.display(),
            stay_logged_in = cred.stay_logged_in,
            launch = ?cred.launch_target,
            "switch started"
        );

        // The clipboard injector lives inside run_phases; it has restored
        // the clipboard by the time we get here.
        let result = match self.run_phases(request) {
            Ok(r) => r,
            Err(reason) => SwitchResult::Failed { reason },
        };

        let terminal = match result {
            SwitchResult::Failed { .. } => SwitchPhase::Failed,
            _ => SwitchPhase::Completed,
        };
        self.enter(terminal, result.to_string());
        result
    }

    fn run_phases(&self, request: &SwitchRequest) -> Result<SwitchResult, ErrorKind> {
        let cfg = self.config;
        let t = &cfg.timings;
        let b = &cfg.budgets;
        let cred = &request.credential;

        if !cred.has_password() {
            warn!(username = %cred.username, "empty password, nothing touched");
            return Err(ErrorKind::EmptyCredential);
        }
        if self.cancel.is_cancelled() {
            info!("switch cancelled before closing processes");
            return Err(ErrorKind::Cancelled);
        }

        // ── Close ───────────────────────────────────
        self.enter(
            SwitchPhase::ClosingProcesses,
            format!("closing {} client processes", cfg.processes_to_close.len()),
        );
        let procs = ProcessController::new(self.desktop);
        let report = procs.kill_by_name(&cfg.processes_to_close);
        let killed = report
            .values()
            .filter(|s| matches!(s, KillStatus::Killed(_)))
            .count();
        for (name, status) in &report {
            if let KillStatus::Error(e) = status {
                warn!(process = %name, error = %e, "could not close process, continuing");
            }
        }
        self.progress.emit(
            SwitchPhase::ClosingProcesses,
            format!("{killed} of {} were running", report.len()),
        );
        pause(t.kill_settle_ms);

        // ── Launch ──────────────────────────────────
        self.enter(
            SwitchPhase::Launching,
            format!("starting {}", request.login_client_path.display()),
        );
        procs.launch(&request.login_client_path, &[])?;

        // ── Locate + focus ──────────────────────────
        self.enter(SwitchPhase::LocatingWindow, "waiting for the login window");
        let locator = WindowLocator::new(self.desktop, &cfg.window_titles, &cfg.window_owner);
        let focus = FocusEnforcer::new(locator, &cfg.client_process).with_budget(
            b.focus_attempts,
            t.focus_retry_ms,
            t.focus_settle_ms,
        )
        .with_foreground_wait(b.focus_checks);
        let mut handle = self.locate(&locator, &focus)?;

        self.enter(
            SwitchPhase::AcquiringFocus,
            format!("login window {} focused, waiting for the form", handle.id),
        );
        pause(t.ui_ready_ms);
        if !procs.is_running(&cfg.client_process) {
            return Err(ErrorKind::ClientExited);
        }

        // ── Credentials ─────────────────────────────
        let mut clip = ClipboardInjector::begin(self.desktop, t, b.clipboard_writes)?;

        self.enter(SwitchPhase::EnteringUsername, format!("entering {}", cred.username));
        self.enter_field(&locator, &focus, &clip, &mut handle, Field::Username, &cred.username)?;
        self.key(KeyStroke::NextField)?;
        pause(t.field_advance_ms);

        self.enter(SwitchPhase::EnteringPassword, "entering password");
        if !cred.has_password() {
            return Err(ErrorKind::EmptyCredential);
        }
        clip.clear()?;
        self.enter_field(&locator, &focus, &clip, &mut handle, Field::Password, cred.password())?;

        if cred.stay_logged_in {
            self.enter(SwitchPhase::StaySignedInSequence, "submitting with stay signed in");
            self.stay_signed_in()?;
        } else {
            self.key(KeyStroke::Confirm)?;
        }

        // Submitted. From here on a clipboard problem is not the run's problem.
        if let Err(e) = clip.restore() {
            warn!(error = %e, "clipboard restore failed after submit");
        }
        drop(clip);

        // ── Post-login ──────────────────────────────
        self.enter(SwitchPhase::ScanningForErrors, "checking for an error banner");
        pause(t.post_login_scan_ms);
        if let Some(title) = self.refusal_banner() {
            self.progress.emit(
                SwitchPhase::ScanningForErrors,
                format!("login refused: \"{title}\", e-mail verification needed"),
            );
            return Ok(SwitchResult::NeedsVerification);
        }

        let mut warning = None;
        if let Some(program) = &cred.launch_target {
            self.enter(SwitchPhase::LaunchingFollowOn, format!("launching {program}"));
            pause(t.follow_on_delay_ms);
            if let Err(e) = procs.launch(&request.login_client_path, &program.launch_args()) {
                warn!(program = %program, error = %e, "follow-on launch failed");
                warning = Some(ErrorKind::FollowOnLaunchFailed {
                    program: program.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(SwitchResult::Success { warning })
    }

    /// Poll for the login window; a found window only counts once it takes
    /// focus.
    fn locate(
        &self,
        locator: &WindowLocator<'_, D>,
        focus: &FocusEnforcer<'_, D>,
    ) -> Result<WindowHandle, ErrorKind> {
        let t = &self.config.timings;
        let polls = self.config.budgets.window_polls;

        for poll in 1..=polls {
            match locator.find_window() {
                Ok(Some(handle)) => {
                    self.set_phase(SwitchPhase::AcquiringFocus);
                    match focus.try_focus(&handle) {
                        Ok(true) => {
                            debug!(poll, hwnd = %handle.id, "window located and focused");
                            return Ok(handle);
                        }
                        Ok(false) => debug!(poll, hwnd = %handle.id, "window found but focus refused"),
                        Err(e) => warn!(poll, hwnd = %handle.id, error = %e, "focus call failed"),
                    }
                    self.set_phase(SwitchPhase::LocatingWindow);
                }
                Ok(None) => debug!(poll, "no login window yet"),
                Err(e) => warn!(poll, error = %e, "window enumeration failed"),
            }
            if poll < polls {
                pause(t.window_poll_ms);
            }
        }
        Err(ErrorKind::WindowNotFound { attempts: polls })
    }

    fn enter_field(
        &self,
        locator: &WindowLocator<'_, D>,
        focus: &FocusEnforcer<'_, D>,
        clip: &ClipboardInjector<'_, D>,
        handle: &mut WindowHandle,
        field: Field,
        text: &str,
    ) -> Result<(), ErrorKind> {
        let attempts = self.config.budgets.field_attempts.max(1);
        let mut last = ErrorKind::FocusLost;

        for attempt in 1..=attempts {
            if attempt > 1 {
                pause(self.config.timings.focus_retry_ms);
            }
            match focus.ensure_focus(handle) {
                FocusOutcome::Acquired => {}
                FocusOutcome::WindowGone | FocusOutcome::Failed => return Err(ErrorKind::FocusLost),
                FocusOutcome::NotAcquired => {
                    warn!(field = field.label(), attempt, "focus not reacquired");
                    last = ErrorKind::FocusLost;
                    continue;
                }
            }
            if !locator.revalidate(handle) {
                warn!(field = field.label(), attempt, "login window no longer valid");
                last = ErrorKind::FocusLost;
                continue;
            }
            match clip.inject_text(text, handle.id) {
                Ok(()) => {
                    debug!(field = field.label(), attempt, len = text.chars().count(), "field entered");
                    self.progress.emit(
                        self.phase(),
                        format!("{} entered on attempt {attempt}", field.label()),
                    );
                    return Ok(());
                }
                // OS-level failures end the field at once.
                Err(e @ (ClipboardError::Keystroke(_) | ClipboardError::Unavailable(_))) => {
                    warn!(field = field.label(), attempt, error = %e, "injection aborted");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(field = field.label(), attempt, error = %e, "injection failed");
                    last = e.into();
                }
            }
        }
        Err(last)
    }

    fn key(&self, key: KeyStroke) -> Result<(), ErrorKind> {
        self.desktop.send(key).map_err(|e| {
            ErrorKind::Clipboard(ClipboardError::Keystroke(format!("{}: {e}", key.combo())))
        })
    }

    /// Tab over to the "stay signed in" control and submit with it set.
    /// Positional: breaks as soon as the form layout changes.
    fn stay_signed_in(&self) -> Result<(), ErrorKind> {
        let t = &self.config.timings;
        for _ in 0..self.config.budgets.stay_signed_in_tabs {
            self.key(KeyStroke::NextField)?;
            pause(t.sequence_tab_ms);
        }
        self.key(KeyStroke::Confirm)?;
        pause(t.sequence_confirm_ms);
        self.key(KeyStroke::NextField)?;
        pause(t.sequence_tab_ms);
        self.key(KeyStroke::Confirm)
    }

    /// Title of any top-level window, shown or not, that reports a refused
    /// login.
    fn refusal_banner(&self) -> Option<String> {
        let cfg = self.config;
        let windows = match self.desktop.top_level_windows() {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "error scan skipped");
                return None;
            }
        };
        let keywords: Vec<String> = cfg.refusal_keywords.iter().map(|k| k.to_lowercase()).collect();
        windows
            .into_iter()
            .find(|w| {
                let lower = w.title.to_lowercase();
                cfg.error_markers.iter().any(|m| w.title.contains(m.as_str()))
                    && keywords.iter().any(|k| lower.contains(k.as_str()))
            })
            .map(|w| w.title)
    }
}
