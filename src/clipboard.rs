// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Paste-based text entry into the focused login form.
//!
//! The login client ignores synthetic per-character typing, so every field
//! goes through the clipboard: write, read back, select-all, paste. One
//! injector lives for a whole switch run. It snapshots the user's clipboard
//! once in [`ClipboardInjector::begin`] and puts it back exactly once, either
//! through [`ClipboardInjector::restore`] or, on any early exit or panic,
//! from `Drop`.
//!
//! Only text survives the round trip. A clipboard holding an image or file
//! list snapshots as `None` and comes back empty.

use tracing::{debug, error, info, warn};

use crate::config::{pause, Timings};
use crate::error::ClipboardError;
use crate::model::WindowId;
use crate::platform::{ClipboardApi, KeyStroke, KeyboardApi, WindowApi};

/// Spaces written over the clipboard before the snapshot goes back, so the
/// last credential does not survive in clipboard history tools.
pub const SCRUB_LEN: usize = 100;

pub struct ClipboardInjector<'a, D: ClipboardApi + KeyboardApi + WindowApi + ?Sized> {
    desktop: &'a D,
    timings: &'a Timings,
    write_attempts: u32,
    snapshot: Option<String>,
    restored: bool,
}

impl<'a, D: ClipboardApi + KeyboardApi + WindowApi + ?Sized> ClipboardInjector<'a, D> {
    /// Take the snapshot. Nothing is written yet.
    pub fn begin(
        desktop: &'a D,
        timings: &'a Timings,
        write_attempts: u32,
    ) -> Result<Self, ClipboardError> {
        let snapshot = desktop.get_text()?;
        debug!(
            has_text = snapshot.is_some(),
            len = snapshot.as_ref().map_or(0, |s| s.chars().count()),
            "clipboard snapshot taken"
        );
        Ok(Self {
            desktop,
            timings,
            write_attempts: write_attempts.max(1),
            snapshot,
            restored: false,
        })
    }

    /// Empty the clipboard so a stale value can never be pasted.
    pub fn clear(&self) -> Result<(), ClipboardError> {
        self.desktop.clear()?;
        pause(self.timings.clipboard_clear_ms);
        Ok(())
    }

    /// Write `text` and read it back until both agree.
    fn write_verified(&self, text: &str) -> Result<(), ClipboardError> {
        for attempt in 1..=self.write_attempts {
            self.desktop.set_text(text)?;
            match self.desktop.get_text()? {
                Some(back) if back == text => {
                    debug!(attempt, len = text.chars().count(), "clipboard verified");
                    return Ok(());
                }
                _ => warn!(attempt, "clipboard read-back mismatch"),
            }
        }
        Err(ClipboardError::Mismatch {
            attempts: self.write_attempts,
        })
    }

    fn key(&self, key: KeyStroke) -> Result<(), ClipboardError> {
        self.desktop
            .send(key)
            .map_err(|e| ClipboardError::Keystroke(format!("{}: {e}", key.combo())))
    }

    fn check_focus(&self, target: WindowId, after: KeyStroke) -> Result<(), ClipboardError> {
        if self.desktop.foreground() == Some(target) {
            return Ok(());
        }
        warn!(hwnd = %target, after = after.combo(), "focus lost during injection");
        Err(ClipboardError::FocusLost)
    }

    /// Put `text` into the field that currently has focus in `target`.
    pub fn inject_text(&self, text: &str, target: WindowId) -> Result<(), ClipboardError> {
        self.write_verified(text)?;

        self.key(KeyStroke::SelectAll)?;
        pause(self.timings.select_all_ms);
        self.check_focus(target, KeyStroke::SelectAll)?;

        self.key(KeyStroke::Paste)?;
        pause(self.timings.paste_ms);
        self.check_focus(target, KeyStroke::Paste)?;
        Ok(())
    }

    /// Scrub, then put the snapshot back. Runs once; later calls are no-ops.
    pub fn restore(&mut self) -> Result<(), ClipboardError> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;

        if let Err(e) = self.desktop.set_text(&" ".repeat(SCRUB_LEN)) {
            warn!(error = %e, "clipboard scrub failed");
        }
        let result = match &self.snapshot {
            Some(text) => self.desktop.set_text(text),
            None => self.desktop.clear(),
        };
        match result {
            Ok(()) => {
                info!("clipboard restored");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "clipboard restore failed");
                Err(e.into())
            }
        }
    }
}

impl<D: ClipboardApi + KeyboardApi + WindowApi + ?Sized> Drop for ClipboardInjector<'_, D> {
    fn drop(&mut self) {
        // Error already logged inside restore.
        let _ = self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ScriptedDesktop;

    fn focused_window(d: &ScriptedDesktop) -> WindowId {
        let pid = d.add_process("RiotClientUx.exe");
        let w = d.add_window("Riot Client", pid);
        d.set_foreground(w).unwrap();
        w
    }

    #[test]
    fn inject_pastes_and_restore_puts_snapshot_back() {
        let d = ScriptedDesktop::new();
        d.set_clipboard(Some("user's own text"));
        let w = focused_window(&d);
        let t = Timings::immediate();

        let mut inj = ClipboardInjector::begin(&d, &t, 3).unwrap();
        inj.inject_text("alice", w).unwrap();
        assert_eq!(d.pasted(), vec!["alice".to_string()]);
        assert_eq!(d.keystrokes(), vec![KeyStroke::SelectAll, KeyStroke::Paste]);

        inj.restore().unwrap();
        inj.restore().unwrap();
        assert_eq!(d.clipboard_contents().as_deref(), Some("user's own text"));
        // alice, scrub, snapshot; the second restore wrote nothing
        let writes = d.clipboard_writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[1], " ".repeat(SCRUB_LEN));
    }

    #[test]
    fn drop_restores_when_not_restored_explicitly() {
        let d = ScriptedDesktop::new();
        d.set_clipboard(Some("keep me"));
        let w = focused_window(&d);
        let t = Timings::immediate();
        {
            let inj = ClipboardInjector::begin(&d, &t, 3).unwrap();
            inj.inject_text("secret", w).unwrap();
            assert_eq!(d.clipboard_contents().as_deref(), Some("secret"));
        }
        assert_eq!(d.clipboard_contents().as_deref(), Some("keep me"));
    }

    #[test]
    fn empty_snapshot_is_restored_as_empty() {
        let d = ScriptedDesktop::new();
        let w = focused_window(&d);
        let t = Timings::immediate();
        let mut inj = ClipboardInjector::begin(&d, &t, 3).unwrap();
        inj.inject_text("bob", w).unwrap();
        inj.restore().unwrap();
        assert_eq!(d.clipboard_contents(), None);
    }

    #[test]
    fn mismatch_retries_the_write_then_fails() {
        let d = ScriptedDesktop::new();
        d.garble_clipboard_readback();
        let w = focused_window(&d);
        let t = Timings::immediate();
        let inj = ClipboardInjector::begin(&d, &t, 3).unwrap();
        let err = inj.inject_text("carol", w).unwrap_err();
        assert_eq!(err, ClipboardError::Mismatch { attempts: 3 });
        assert_eq!(d.clipboard_writes(), vec!["carol"; 3]);
        assert!(d.keystrokes().is_empty());
    }

    #[test]
    fn focus_stolen_by_paste_is_reported() {
        let d = ScriptedDesktop::new();
        let w = focused_window(&d);
        d.steal_focus_on_paste(1);
        let t = Timings::immediate();
        let inj = ClipboardInjector::begin(&d, &t, 3).unwrap();
        assert_eq!(inj.inject_text("dave", w), Err(ClipboardError::FocusLost));
    }

    #[test]
    fn locked_clipboard_fails_before_anything_is_written() {
        let d = ScriptedDesktop::new();
        d.lock_clipboard();
        let t = Timings::immediate();
        assert!(matches!(
            ClipboardInjector::begin(&d, &t, 3),
            Err(ClipboardError::Unavailable(_))
        ));
        assert!(d.clipboard_writes().is_empty());
    }
}
