// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Finding the login window and keeping it in the foreground.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::pause;
use crate::error::PlatformError;
use crate::model::WindowHandle;
use crate::platform::{ProcessApi, WindowApi, WindowInfo};
use crate::process_control::ProcessController;

// ── Locator ─────────────────────────────────────────

/// Filters top-level windows down to the login window: visible, enabled,
/// not minimized, title match, and owned by the expected program.
pub struct WindowLocator<'a, D: WindowApi + ProcessApi + ?Sized> {
    desktop: &'a D,
    titles: &'a [String],
    owner: &'a str,
}

impl<'a, D: WindowApi + ProcessApi + ?Sized> Clone for WindowLocator<'a, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, D: WindowApi + ProcessApi + ?Sized> Copy for WindowLocator<'a, D> {}

impl<'a, D: WindowApi + ProcessApi + ?Sized> WindowLocator<'a, D> {
    pub fn new(desktop: &'a D, titles: &'a [String], owner: &'a str) -> Self {
        Self {
            desktop,
            titles,
            owner,
        }
    }

    fn title_matches(&self, title: &str) -> bool {
        self.titles.iter().any(|t| title.contains(t.as_str()))
    }

    fn owner_matches(&self, pid: u32) -> bool {
        ProcessController::new(self.desktop).pid_matches(pid, self.owner)
    }

    fn qualifies(&self, w: &WindowInfo) -> bool {
        w.visible && w.enabled && !w.minimized && self.title_matches(&w.title) && self.owner_matches(w.pid)
    }

    /// Every qualifying window, in enumeration order.
    pub fn candidates(&self) -> Result<Vec<WindowHandle>, PlatformError> {
        let now = Instant::now();
        Ok(self
            .desktop
            .top_level_windows()?
            .into_iter()
            .filter(|w| self.qualifies(w))
            .map(|w| WindowHandle {
                id: w.id,
                title: w.title,
                pid: w.pid,
                verified_at: now,
            })
            .collect())
    }

    /// First qualifying window. `None` is normal while the client starts;
    /// the caller polls.
    pub fn find_window(&self) -> Result<Option<WindowHandle>, PlatformError> {
        let found = self.candidates()?.into_iter().next();
        if let Some(h) = &found {
            info!(hwnd = %h.id, title = %h.title, pid = h.pid, "login window found");
        }
        Ok(found)
    }

    /// Window still exists and still belongs to the same live process.
    pub fn is_alive(&self, handle: &WindowHandle) -> bool {
        match self.desktop.window_info(handle.id) {
            Some(w) => w.pid == handle.pid && self.owner_matches(w.pid),
            None => false,
        }
    }

    /// Full re-check before trusting a handle again: alive, visible, not
    /// minimized, same owner. Refreshes title and `verified_at`.
    pub fn revalidate(&self, handle: &mut WindowHandle) -> bool {
        let Some(w) = self.desktop.window_info(handle.id) else {
            debug!(hwnd = %handle.id, "window gone");
            return false;
        };
        if w.pid != handle.pid || !w.visible || w.minimized || !self.owner_matches(w.pid) {
            debug!(hwnd = %handle.id, visible = w.visible, minimized = w.minimized, "window no longer qualifies");
            return false;
        }
        handle.title = w.title;
        handle.verified_at = Instant::now();
        true
    }
}

// ── Focus ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusOutcome {
    Acquired,
    NotAcquired,
    /// Window or its process vanished; retrying is pointless.
    WindowGone,
    /// A focus call itself errored. State unknown, do not retry.
    Failed,
}

/// Forces the login window to the foreground against an app that does not
/// cooperate.
pub struct FocusEnforcer<'a, D: WindowApi + ProcessApi + ?Sized> {
    locator: WindowLocator<'a, D>,
    client_process: &'a str,
    attempts: u32,
    retry_ms: u64,
    settle_ms: u64,
    checks: u32,
}

impl<'a, D: WindowApi + ProcessApi + ?Sized> FocusEnforcer<'a, D> {
    pub fn new(locator: WindowLocator<'a, D>, client_process: &'a str) -> Self {
        Self {
            locator,
            client_process,
            attempts: 5,
            retry_ms: 100,
            settle_ms: 200,
            checks: 10,
        }
    }

    pub fn with_budget(mut self, attempts: u32, retry_ms: u64, settle_ms: u64) -> Self {
        self.attempts = attempts;
        self.retry_ms = retry_ms;
        self.settle_ms = settle_ms;
        self
    }

    /// How many times one attempt reads the foreground back, `settle_ms`
    /// apart, before calling it refused.
    pub fn with_foreground_wait(mut self, checks: u32) -> Self {
        self.checks = checks.max(1);
        self
    }

    pub fn has_focus(&self, handle: &WindowHandle) -> bool {
        self.locator.desktop.foreground() == Some(handle.id)
    }

    /// One attempt: restore, set-foreground, bring-to-top, set-active,
    /// then wait for the OS foreground window to follow.
    pub fn try_focus(&self, handle: &WindowHandle) -> Result<bool, PlatformError> {
        let d = self.locator.desktop;
        d.restore(handle.id)?;
        d.set_foreground(handle.id)?;
        d.bring_to_top(handle.id)?;
        d.set_active(handle.id)?;
        for check in 1..=self.checks {
            pause(self.settle_ms);
            if self.has_focus(handle) {
                debug!(hwnd = %handle.id, check, "foreground followed");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Bounded retry of `try_focus`, re-checking liveness before each try.
    pub fn ensure_focus(&self, handle: &WindowHandle) -> FocusOutcome {
        let procs = ProcessController::new(self.locator.desktop);
        for attempt in 1..=self.attempts {
            if !self.locator.is_alive(handle) || !procs.is_running(self.client_process) {
                warn!(hwnd = %handle.id, attempt, "login window or client process gone");
                return FocusOutcome::WindowGone;
            }
            if self.has_focus(handle) {
                return FocusOutcome::Acquired;
            }
            match self.try_focus(handle) {
                Ok(true) => {
                    debug!(hwnd = %handle.id, attempt, "focus acquired");
                    return FocusOutcome::Acquired;
                }
                Ok(false) => debug!(hwnd = %handle.id, attempt, "focus refused"),
                Err(e) => {
                    warn!(hwnd = %handle.id, attempt, error = %e, "focus call failed");
                    return FocusOutcome::Failed;
                }
            }
            pause(self.retry_ms);
        }
        warn!(hwnd = %handle.id, attempts = self.attempts, "focus not acquired");
        FocusOutcome::NotAcquired
    }
}
