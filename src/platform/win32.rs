// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::mem;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::debug;
use windows::core::PWSTR;
use windows::Win32::Foundation::{
    CloseHandle, GlobalFree, BOOL, FALSE, HANDLE, HGLOBAL, HWND, LPARAM, TRUE,
};
use windows::Win32::System::DataExchange::{
    CloseClipboard, EmptyClipboard, GetClipboardData, IsClipboardFormatAvailable,
    OpenClipboard, SetClipboardData,
};
use windows::Win32::System::Memory::{GlobalAlloc, GlobalLock, GlobalUnlock, GMEM_MOVEABLE};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_FORMAT,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::Input::KeyboardAndMouse::*;
use windows::Win32::UI::WindowsAndMessaging::*;

use super::{
    ClipboardApi, KeyStroke, KeyboardApi, ProcessApi, ProcessEntry, SystemProcesses,
    WindowApi, WindowInfo,
};
use crate::error::PlatformError;
use crate::model::WindowId;

const CF_UNICODETEXT: u32 = 13;
const CLIPBOARD_OPEN_TRIES: u32 = 5;   // another app may hold it for a few ms
const CLIPBOARD_MAX_CHARS: usize = 1_000_000;

/// The real desktop: Win32 windows, clipboard and SendInput on top of the
/// `sysinfo` process table.
pub struct Win32Desktop {
    processes: SystemProcesses,
}

impl Win32Desktop {
    pub fn new() -> Self {
        Self {
            processes: SystemProcesses::new(),
        }
    }
}

impl Default for Win32Desktop {
    fn default() -> Self {
        Self::new()
    }
}

fn hwnd(id: WindowId) -> HWND {
    HWND(id.0 as *mut _)
}

// ── Window Enumeration ──────────────────────────────
unsafe extern "system" fn enum_windows_cb(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let vec = &mut *(lparam.0 as *mut Vec<isize>);
    vec.push(hwnd.0 as isize);
    TRUE
}

unsafe fn collect_windows() -> Result<Vec<isize>, PlatformError> {
    let mut hwnds: Vec<isize> = Vec::new();
    EnumWindows(Some(enum_windows_cb), LPARAM(&mut hwnds as *mut Vec<isize> as isize))
        .map_err(|e| PlatformError::os("EnumWindows", e))?;
    Ok(hwnds)
}

unsafe fn window_title(hwnd: HWND) -> String {
    let mut buf = [0u16; 512];
    let len = GetWindowTextW(hwnd, &mut buf);
    if len <= 0 {
        return String::new();
    }
    String::from_utf16_lossy(&buf[..len as usize])
}

unsafe fn describe(raw: isize) -> WindowInfo {
    let h = HWND(raw as *mut _);
    let mut pid: u32 = 0;
    GetWindowThreadProcessId(h, Some(&mut pid));
    WindowInfo {
        id: WindowId(raw),
        title: window_title(h),
        visible: IsWindowVisible(h).as_bool(),
        minimized: IsIconic(h).as_bool(),
        enabled: IsWindowEnabled(h).as_bool(),
        pid,
    }
}

/// Image name (`foo.exe`) of a pid, straight from the kernel.
unsafe fn get_exe_name(pid: u32) -> Option<String> {
    if pid == 0 {
        return None;
    }
    let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, pid).ok()?;
    let mut buf = [0u16; 260];
    let mut len = buf.len() as u32;
    let ok = QueryFullProcessImageNameW(
        handle, PROCESS_NAME_FORMAT(0), PWSTR(buf.as_mut_ptr()), &mut len,
    );
    let _ = CloseHandle(handle);
    if ok.is_err() {
        return None;
    }
    let path = String::from_utf16_lossy(&buf[..len as usize]);
    path.rsplit('\\').next().map(str::to_string)
}

// ── Keyboard (SendInput) ────────────────────────────

fn key_to_vk(name: &str) -> Option<VIRTUAL_KEY> {
    match name.to_lowercase().as_str() {
        "a" => Some(VIRTUAL_KEY(0x41)),
        "c" => Some(VIRTUAL_KEY(0x43)),
        "v" => Some(VIRTUAL_KEY(0x56)),
        "x" => Some(VIRTUAL_KEY(0x58)),
        "ctrl" | "control" => Some(VK_CONTROL),
        "alt" | "menu"     => Some(VK_MENU),
        "shift"            => Some(VK_SHIFT),
        "enter" | "return" => Some(VK_RETURN),
        "tab"              => Some(VK_TAB),
        "escape" | "esc"   => Some(VK_ESCAPE),
        "space"            => Some(VK_SPACE),
        "backspace" | "bs" => Some(VK_BACK),
        "delete" | "del"   => Some(VK_DELETE),
        _ => None,
    }
}

fn key_input(vk: VIRTUAL_KEY, up: bool) -> INPUT {
    let ext = if vk == VK_DELETE { KEYEVENTF_EXTENDEDKEY } else { KEYBD_EVENT_FLAGS(0) };
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk, wScan: 0,
                dwFlags: if up { ext | KEYEVENTF_KEYUP } else { ext },
                time: 0, dwExtraInfo: 0,
            },
        },
    }
}

/// Parse and send a combo like "ctrl+v" as one SendInput batch:
/// modifiers down, main key down+up, modifiers up in reverse.
unsafe fn send_key_combo(combo: &str) -> Result<(), PlatformError> {
    let mut modifiers: Vec<VIRTUAL_KEY> = Vec::new();
    let mut main_key: Option<VIRTUAL_KEY> = None;

    for part in combo.split('+').map(str::trim) {
        let vk = key_to_vk(part)
            .ok_or_else(|| PlatformError::os("SendInput", format!("unknown key '{part}'")))?;
        if matches!(vk, VK_CONTROL | VK_MENU | VK_SHIFT) {
            modifiers.push(vk);
        } else {
            main_key = Some(vk);
        }
    }

    let mut inputs: Vec<INPUT> = modifiers.iter().map(|&m| key_input(m, false)).collect();
    if let Some(mk) = main_key {
        inputs.push(key_input(mk, false));
        inputs.push(key_input(mk, true));
    }
    inputs.extend(modifiers.iter().rev().map(|&m| key_input(m, true)));

    let sent = SendInput(&inputs, mem::size_of::<INPUT>() as i32);
    if sent as usize != inputs.len() {
        // UIPI blocks input into elevated windows; SendInput reports it this way.
        return Err(PlatformError::os(
            "SendInput",
            format!("{sent}/{} events accepted for '{combo}'", inputs.len()),
        ));
    }
    debug!(combo, "key sent");
    Ok(())
}

// ── Clipboard ───────────────────────────────────────

/// Holds the clipboard open; closes it on every exit path.
struct OpenClipboardGuard;

impl OpenClipboardGuard {
    unsafe fn open() -> Result<Self, PlatformError> {
        let mut last = None;
        for _ in 0..CLIPBOARD_OPEN_TRIES {
            match OpenClipboard(HWND::default()) {
                Ok(()) => return Ok(Self),
                Err(e) => last = Some(e),
            }
            thread::sleep(Duration::from_millis(10));
        }
        Err(PlatformError::os(
            "OpenClipboard",
            last.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}

impl Drop for OpenClipboardGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseClipboard();
        }
    }
}

unsafe fn read_unicode_text() -> Result<Option<String>, PlatformError> {
    let _open = OpenClipboardGuard::open()?;
    if IsClipboardFormatAvailable(CF_UNICODETEXT).is_err() {
        return Ok(None);
    }
    let handle: HANDLE = GetClipboardData(CF_UNICODETEXT)
        .map_err(|e| PlatformError::os("GetClipboardData", e))?;
    let hglobal = HGLOBAL(handle.0);
    let ptr = GlobalLock(hglobal) as *const u16;
    if ptr.is_null() {
        return Err(PlatformError::os("GlobalLock", "null clipboard buffer"));
    }
    let mut len = 0;
    while len < CLIPBOARD_MAX_CHARS && *ptr.add(len) != 0 {
        len += 1;
    }
    let text = String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len));
    let _ = GlobalUnlock(hglobal);
    Ok(Some(text))
}

unsafe fn write_unicode_text(text: &str) -> Result<(), PlatformError> {
    let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
    let bytes = wide.len() * mem::size_of::<u16>();

    let _open = OpenClipboardGuard::open()?;
    EmptyClipboard().map_err(|e| PlatformError::os("EmptyClipboard", e))?;

    let hglobal = GlobalAlloc(GMEM_MOVEABLE, bytes)
        .map_err(|e| PlatformError::os("GlobalAlloc", e))?;
    let dst = GlobalLock(hglobal) as *mut u16;
    if dst.is_null() {
        let _ = GlobalFree(hglobal);
        return Err(PlatformError::os("GlobalLock", "allocation not lockable"));
    }
    std::ptr::copy_nonoverlapping(wide.as_ptr(), dst, wide.len());
    let _ = GlobalUnlock(hglobal);

    // On success the system owns the memory.
    if let Err(e) = SetClipboardData(CF_UNICODETEXT, HANDLE(hglobal.0)) {
        let _ = GlobalFree(hglobal);
        return Err(PlatformError::os("SetClipboardData", e));
    }
    Ok(())
}

// ── Trait impls ─────────────────────────────────────

impl ProcessApi for Win32Desktop {
    fn processes(&self) -> Result<Vec<ProcessEntry>, PlatformError> {
        self.processes.processes()
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        unsafe { get_exe_name(pid) }.or_else(|| self.processes.process_name(pid))
    }

    fn terminate(&self, pid: u32) -> Result<(), PlatformError> {
        self.processes.terminate(pid)
    }

    fn spawn(&self, path: &Path, args: &[String]) -> Result<u32, PlatformError> {
        self.processes.spawn(path, args)
    }

    fn executable_exists(&self, path: &Path) -> bool {
        self.processes.executable_exists(path)
    }
}

impl WindowApi for Win32Desktop {
    fn top_level_windows(&self) -> Result<Vec<WindowInfo>, PlatformError> {
        unsafe {
            let raw = collect_windows()?;
            Ok(raw.into_iter().map(|r| describe(r)).collect())
        }
    }

    fn window_info(&self, id: WindowId) -> Option<WindowInfo> {
        unsafe {
            if !IsWindow(hwnd(id)).as_bool() {
                return None;
            }
            Some(describe(id.0))
        }
    }

    fn restore(&self, id: WindowId) -> Result<(), PlatformError> {
        unsafe {
            if IsIconic(hwnd(id)).as_bool() {
                let _ = ShowWindow(hwnd(id), SW_RESTORE);
            }
        }
        Ok(())
    }

    fn set_foreground(&self, id: WindowId) -> Result<(), PlatformError> {
        // A refusal is not an error: the caller verifies via foreground().
        let ok = unsafe { SetForegroundWindow(hwnd(id)) };
        if !ok.as_bool() {
            debug!(hwnd = %id, "SetForegroundWindow refused");
        }
        Ok(())
    }

    fn bring_to_top(&self, id: WindowId) -> Result<(), PlatformError> {
        unsafe { BringWindowToTop(hwnd(id)) }.map_err(|e| PlatformError::os("BringWindowToTop", e))
    }

    fn set_active(&self, id: WindowId) -> Result<(), PlatformError> {
        // Only works for windows of the calling thread's queue; best effort.
        let _ = unsafe { SetActiveWindow(hwnd(id)) };
        Ok(())
    }

    fn foreground(&self) -> Option<WindowId> {
        let fg = unsafe { GetForegroundWindow() };
        if fg.0.is_null() {
            None
        } else {
            Some(WindowId(fg.0 as isize))
        }
    }
}

impl ClipboardApi for Win32Desktop {
    fn get_text(&self) -> Result<Option<String>, PlatformError> {
        unsafe { read_unicode_text() }
    }

    fn set_text(&self, text: &str) -> Result<(), PlatformError> {
        unsafe { write_unicode_text(text) }
    }

    fn clear(&self) -> Result<(), PlatformError> {
        unsafe {
            let _open = OpenClipboardGuard::open()?;
            EmptyClipboard().map_err(|e| PlatformError::os("EmptyClipboard", e))
        }
    }
}

impl KeyboardApi for Win32Desktop {
    fn send(&self, key: KeyStroke) -> Result<(), PlatformError> {
        unsafe { send_key_combo(key.combo()) }
    }
}
