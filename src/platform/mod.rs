// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OS collaborators the switch controller drives.
//!
//! Everything the controller knows about the machine goes through these
//! traits: the login client is only ever a set of processes, windows and a
//! keyboard target. `SystemProcesses` covers processes on every OS,
//! `win32::Win32Desktop` adds windows/clipboard/keyboard on Windows, and
//! `scripted::ScriptedDesktop` plays a deterministic login client in memory.

use std::path::Path;

use crate::error::PlatformError;
use crate::model::WindowId;

pub mod process;
pub mod scripted;
#[cfg(windows)]
pub mod win32;

pub use process::SystemProcesses;
pub use scripted::ScriptedDesktop;

/// One running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    /// Image name, e.g. `RiotClientServices.exe`.
    pub name: String,
}

/// Snapshot of one top-level window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    pub visible: bool,
    pub minimized: bool,
    pub enabled: bool,
    pub pid: u32,
}

/// Keystrokes the controller sends to whatever window holds focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStroke {
    SelectAll,
    Paste,
    NextField,
    Confirm,
}

impl KeyStroke {
    /// Key combo in `ctrl+a` notation.
    pub fn combo(self) -> &'static str {
        match self {
            KeyStroke::SelectAll => "ctrl+a",
            KeyStroke::Paste => "ctrl+v",
            KeyStroke::NextField => "tab",
            KeyStroke::Confirm => "enter",
        }
    }
}

pub trait ProcessApi {
    fn processes(&self) -> Result<Vec<ProcessEntry>, PlatformError>;
    fn process_name(&self, pid: u32) -> Option<String>;
    fn terminate(&self, pid: u32) -> Result<(), PlatformError>;
    /// Start `path` detached; returns its pid.
    fn spawn(&self, path: &Path, args: &[String]) -> Result<u32, PlatformError>;
    fn executable_exists(&self, path: &Path) -> bool;
}

pub trait WindowApi {
    /// All top-level windows, in OS enumeration order.
    fn top_level_windows(&self) -> Result<Vec<WindowInfo>, PlatformError>;
    /// Fresh info for one window; `None` once it is gone.
    fn window_info(&self, id: WindowId) -> Option<WindowInfo>;
    fn restore(&self, id: WindowId) -> Result<(), PlatformError>;
    fn set_foreground(&self, id: WindowId) -> Result<(), PlatformError>;
    fn bring_to_top(&self, id: WindowId) -> Result<(), PlatformError>;
    fn set_active(&self, id: WindowId) -> Result<(), PlatformError>;
    fn foreground(&self) -> Option<WindowId>;
}

pub trait ClipboardApi {
    /// Current text content; `None` when the clipboard holds no text.
    fn get_text(&self) -> Result<Option<String>, PlatformError>;
    fn set_text(&self, text: &str) -> Result<(), PlatformError>;
    fn clear(&self) -> Result<(), PlatformError>;
}

pub trait KeyboardApi {
    fn send(&self, key: KeyStroke) -> Result<(), PlatformError>;
}

/// Everything a switch run needs from the machine.
pub trait Desktop: ProcessApi + WindowApi + ClipboardApi + KeyboardApi + Send + Sync {}

impl<T> Desktop for T where T: ProcessApi + WindowApi + ClipboardApi + KeyboardApi + Send + Sync {}

/// Case-insensitive substring match used for process image names.
pub fn name_contains(name: &str, needle: &str) -> bool {
    name.to_lowercase().contains(&needle.to_lowercase())
}
