// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory desktop that plays a login client.
//!
//! Used by the test suite and by `--dry-run`. Behaviour is scripted up
//! front (when the login window shows up, how often focus is refused,
//! whether the clipboard garbles read-backs, which banner appears after
//! submit) and every call is recorded for inspection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{
    ClipboardApi, KeyStroke, KeyboardApi, ProcessApi, ProcessEntry, WindowApi, WindowInfo,
};
use crate::error::PlatformError;
use crate::model::WindowId;

const FIRST_PID: u32 = 4000;
const FIRST_HWND: isize = 0x1000;

#[derive(Debug, Clone)]
struct LoginWindowScript {
    title: String,
    /// Window enumerations after launch before the window exists.
    appears_on_poll: u32,
}

#[derive(Debug, Default)]
struct State {
    processes: Vec<ProcessEntry>,
    windows: Vec<WindowInfo>,
    foreground: Option<WindowId>,
    clipboard: Option<String>,
    executables: HashSet<PathBuf>,
    next_pid: u32,
    next_hwnd: isize,

    login_window: Option<LoginWindowScript>,
    login_pid: Option<u32>,
    polls_since_launch: u32,
    focus_refusals: u32,
    garble_readback: bool,
    clipboard_locked: bool,
    steal_focus_on_paste: u32,
    banner_on_submit: Option<String>,
    fail_follow_on: bool,
    exit_after_focus: bool,
    exit_armed: bool,
    panic_on_key: Option<KeyStroke>,
    focus_lag: u32,
    pending_foreground: Option<(WindowId, u32)>,
    break_focus_after: Option<u32>,
    crash_on_paste: bool,
    fail_write_of: Option<String>,

    terminated: Vec<u32>,
    spawned: Vec<(PathBuf, Vec<String>)>,
    clipboard_writes: Vec<String>,
    keystrokes: Vec<KeyStroke>,
    pasted: Vec<String>,
    enumerations: u32,
    foreground_requests: u32,
    failed_writes: u32,
}

/// Scripted stand-in for the machine. All methods take `&self`.
#[derive(Debug)]
pub struct ScriptedDesktop {
    state: Mutex<State>,
}

impl Default for ScriptedDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDesktop {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_pid: FIRST_PID,
                next_hwnd: FIRST_HWND,
                ..State::default()
            }),
        }
    }

    /// A login client that is installed at `path` and opens a window titled
    /// `title` on the `appears_on_poll`-th window enumeration after launch.
    pub fn with_login_client(path: impl Into<PathBuf>, title: &str, appears_on_poll: u32) -> Self {
        let d = Self::new();
        d.install(path);
        d.state.lock().login_window = Some(LoginWindowScript {
            title: title.to_string(),
            appears_on_poll,
        });
        d
    }

    // ── Scripting ───────────────────────────────────

    pub fn install(&self, path: impl Into<PathBuf>) {
        self.state.lock().executables.insert(path.into());
    }

    pub fn add_process(&self, name: &str) -> u32 {
        let mut s = self.state.lock();
        let pid = s.next_pid;
        s.next_pid += 1;
        s.processes.push(ProcessEntry {
            pid,
            name: name.to_string(),
        });
        pid
    }

    pub fn add_window(&self, title: &str, pid: u32) -> WindowId {
        let mut s = self.state.lock();
        add_window_locked(&mut s, title, pid)
    }

    pub fn minimize(&self, id: WindowId) {
        if let Some(w) = self.state.lock().windows.iter_mut().find(|w| w.id == id) {
            w.minimized = true;
        }
    }

    pub fn hide(&self, id: WindowId) {
        if let Some(w) = self.state.lock().windows.iter_mut().find(|w| w.id == id) {
            w.visible = false;
        }
    }

    pub fn set_clipboard(&self, text: Option<&str>) {
        self.state.lock().clipboard = text.map(str::to_string);
    }

    /// The next `n` foreground requests are silently ignored.
    pub fn refuse_focus(&self, n: u32) {
        self.state.lock().focus_refusals = n;
    }

    /// Read-back after a write never matches what was written.
    pub fn garble_clipboard_readback(&self) {
        self.state.lock().garble_readback = true;
    }

    /// Every clipboard access fails.
    pub fn lock_clipboard(&self) {
        self.state.lock().clipboard_locked = true;
    }

    /// The next `n` pastes drop the foreground window.
    pub fn steal_focus_on_paste(&self, n: u32) {
        self.state.lock().steal_focus_on_paste = n;
    }

    /// A window with this title pops up after the first confirm keystroke.
    pub fn banner_on_submit(&self, title: &str) {
        self.state.lock().banner_on_submit = Some(title.to_string());
    }

    /// Spawns with arguments (follow-on launches) fail.
    pub fn fail_follow_on(&self) {
        self.state.lock().fail_follow_on = true;
    }

    /// The login client quits right after its window first takes focus;
    /// the next process listing no longer shows it.
    pub fn exit_after_focus(&self) {
        self.state.lock().exit_after_focus = true;
    }

    /// Sending `key` panics, as a broken OS binding would.
    pub fn panic_on_key(&self, key: KeyStroke) {
        self.state.lock().panic_on_key = Some(key);
    }

    /// A granted foreground request shows up only after `n` more
    /// foreground reads.
    pub fn lag_focus(&self, n: u32) {
        self.state.lock().focus_lag = n;
    }

    /// Foreground requests after the first `n` fail with an OS error.
    pub fn break_focus_after(&self, n: u32) {
        self.state.lock().break_focus_after = Some(n);
    }

    /// The login client dies right after the first paste lands.
    pub fn crash_on_paste(&self) {
        self.state.lock().crash_on_paste = true;
    }

    /// Writing exactly `text` to the clipboard fails with an OS error.
    pub fn fail_clipboard_write_of(&self, text: &str) {
        self.state.lock().fail_write_of = Some(text.to_string());
    }

    // ── Inspection ──────────────────────────────────

    pub fn clipboard_contents(&self) -> Option<String> {
        self.state.lock().clipboard.clone()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.state.lock().terminated.clone()
    }

    pub fn spawned(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.state.lock().spawned.clone()
    }

    pub fn clipboard_writes(&self) -> Vec<String> {
        self.state.lock().clipboard_writes.clone()
    }

    pub fn keystrokes(&self) -> Vec<KeyStroke> {
        self.state.lock().keystrokes.clone()
    }

    pub fn pasted(&self) -> Vec<String> {
        self.state.lock().pasted.clone()
    }

    pub fn enumerations(&self) -> u32 {
        self.state.lock().enumerations
    }

    pub fn foreground_requests(&self) -> u32 {
        self.state.lock().foreground_requests
    }

    pub fn failed_clipboard_writes(&self) -> u32 {
        self.state.lock().failed_writes
    }

    pub fn running(&self) -> Vec<ProcessEntry> {
        self.state.lock().processes.clone()
    }

    pub fn login_window(&self) -> Option<WindowId> {
        let s = self.state.lock();
        let pid = s.login_pid?;
        s.windows.iter().find(|w| w.pid == pid).map(|w| w.id)
    }
}

fn add_window_locked(s: &mut State, title: &str, pid: u32) -> WindowId {
    let id = WindowId(s.next_hwnd);
    s.next_hwnd += 0x10;
    s.windows.push(WindowInfo {
        id,
        title: title.to_string(),
        visible: true,
        minimized: false,
        enabled: true,
        pid,
    });
    id
}

fn remove_process_locked(s: &mut State, pid: u32) {
    s.processes.retain(|p| p.pid != pid);
    let gone: Vec<WindowId> = s
        .windows
        .iter()
        .filter(|w| w.pid == pid)
        .map(|w| w.id)
        .collect();
    s.windows.retain(|w| w.pid != pid);
    if s.foreground.is_some_and(|fg| gone.contains(&fg)) {
        s.foreground = None;
    }
    if s.login_pid == Some(pid) {
        s.login_pid = None;
    }
}

impl ProcessApi for ScriptedDesktop {
    fn processes(&self) -> Result<Vec<ProcessEntry>, PlatformError> {
        let mut s = self.state.lock();
        if s.exit_armed {
            s.exit_armed = false;
            s.exit_after_focus = false;
            if let Some(pid) = s.login_pid {
                remove_process_locked(&mut s, pid);
            }
        }
        Ok(s.processes.clone())
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        let s = self.state.lock();
        s.processes.iter().find(|p| p.pid == pid).map(|p| p.name.clone())
    }

    fn terminate(&self, pid: u32) -> Result<(), PlatformError> {
        let mut s = self.state.lock();
        if !s.processes.iter().any(|p| p.pid == pid) {
            return Err(PlatformError::os("terminate", format!("pid {pid} is gone")));
        }
        remove_process_locked(&mut s, pid);
        s.terminated.push(pid);
        Ok(())
    }

    fn spawn(&self, path: &Path, args: &[String]) -> Result<u32, PlatformError> {
        let mut s = self.state.lock();
        s.spawned.push((path.to_path_buf(), args.to_vec()));
        if !s.executables.contains(path) {
            return Err(PlatformError::os("spawn", "file not found"));
        }
        if !args.is_empty() && s.fail_follow_on {
            return Err(PlatformError::os("spawn", "access denied"));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pid = s.next_pid;
        s.next_pid += 1;
        s.processes.push(ProcessEntry { pid, name });
        if args.is_empty() && s.login_window.is_some() {
            s.login_pid = Some(pid);
            s.polls_since_launch = 0;
        }
        Ok(pid)
    }

    fn executable_exists(&self, path: &Path) -> bool {
        self.state.lock().executables.contains(path)
    }
}

impl WindowApi for ScriptedDesktop {
    fn top_level_windows(&self) -> Result<Vec<WindowInfo>, PlatformError> {
        let mut s = self.state.lock();
        s.enumerations += 1;
        if let (Some(pid), Some(script)) = (s.login_pid, s.login_window.clone()) {
            s.polls_since_launch += 1;
            let exists = s.windows.iter().any(|w| w.pid == pid);
            if !exists && s.polls_since_launch >= script.appears_on_poll {
                add_window_locked(&mut s, &script.title, pid);
            }
        }
        Ok(s.windows.clone())
    }

    fn window_info(&self, id: WindowId) -> Option<WindowInfo> {
        self.state.lock().windows.iter().find(|w| w.id == id).cloned()
    }

    fn restore(&self, id: WindowId) -> Result<(), PlatformError> {
        if let Some(w) = self.state.lock().windows.iter_mut().find(|w| w.id == id) {
            w.minimized = false;
        }
        Ok(())
    }

    fn set_foreground(&self, id: WindowId) -> Result<(), PlatformError> {
        let mut s = self.state.lock();
        s.foreground_requests += 1;
        let requests = s.foreground_requests;
        if s.break_focus_after.is_some_and(|n| requests > n) {
            return Err(PlatformError::os("SetForegroundWindow", "access denied"));
        }
        if s.focus_refusals > 0 {
            s.focus_refusals -= 1;
            return Ok(());
        }
        if let Some(w) = s.windows.iter().find(|w| w.id == id) {
            let pid = w.pid;
            if s.focus_lag > 0 {
                s.pending_foreground = Some((id, s.focus_lag));
                s.focus_lag = 0;
            } else {
                s.foreground = Some(id);
            }
            if s.exit_after_focus && s.login_pid == Some(pid) {
                s.exit_armed = true;
            }
        }
        Ok(())
    }

    fn bring_to_top(&self, _id: WindowId) -> Result<(), PlatformError> {
        Ok(())
    }

    fn set_active(&self, _id: WindowId) -> Result<(), PlatformError> {
        Ok(())
    }

    fn foreground(&self) -> Option<WindowId> {
        let mut s = self.state.lock();
        let pending = s.pending_foreground;
        match pending {
            Some((id, 0)) => {
                s.pending_foreground = None;
                s.foreground = Some(id);
            }
            Some((id, reads)) => s.pending_foreground = Some((id, reads - 1)),
            None => {}
        }
        s.foreground
    }
}

impl ClipboardApi for ScriptedDesktop {
    fn get_text(&self) -> Result<Option<String>, PlatformError> {
        let s = self.state.lock();
        if s.clipboard_locked {
            return Err(PlatformError::os("OpenClipboard", "locked by another process"));
        }
        if s.garble_readback && !s.clipboard_writes.is_empty() {
            return Ok(s.clipboard.as_ref().map(|c| format!("{c}\u{fffd}")));
        }
        Ok(s.clipboard.clone())
    }

    fn set_text(&self, text: &str) -> Result<(), PlatformError> {
        let mut s = self.state.lock();
        if s.clipboard_locked {
            return Err(PlatformError::os("OpenClipboard", "locked by another process"));
        }
        if s.fail_write_of.as_deref() == Some(text) {
            s.failed_writes += 1;
            return Err(PlatformError::os("SetClipboardData", "not enough memory"));
        }
        s.clipboard_writes.push(text.to_string());
        s.clipboard = Some(text.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), PlatformError> {
        let mut s = self.state.lock();
        if s.clipboard_locked {
            return Err(PlatformError::os("OpenClipboard", "locked by another process"));
        }
        s.clipboard = None;
        Ok(())
    }
}

impl KeyboardApi for ScriptedDesktop {
    fn send(&self, key: KeyStroke) -> Result<(), PlatformError> {
        let mut s = self.state.lock();
        if s.panic_on_key == Some(key) {
            drop(s);
            panic!("scripted panic on {}", key.combo());
        }
        s.keystrokes.push(key);
        match key {
            KeyStroke::Paste => {
                if let Some(text) = s.clipboard.clone() {
                    s.pasted.push(text);
                }
                if s.steal_focus_on_paste > 0 {
                    s.steal_focus_on_paste -= 1;
                    s.foreground = None;
                }
                if s.crash_on_paste {
                    s.crash_on_paste = false;
                    if let Some(pid) = s.login_pid {
                        remove_process_locked(&mut s, pid);
                    }
                }
            }
            KeyStroke::Confirm => {
                if let Some(title) = s.banner_on_submit.take() {
                    let pid = s.login_pid.unwrap_or(0);
                    add_window_locked(&mut s, &title, pid);
                }
            }
            KeyStroke::SelectAll | KeyStroke::NextField => {}
        }
        Ok(())
    }
}
