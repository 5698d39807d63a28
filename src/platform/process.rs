// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::Path;
use std::process::{Command, Stdio};

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

use super::{ProcessApi, ProcessEntry};
use crate::error::PlatformError;

/// Process table backed by `sysinfo`; works on every OS.
pub struct SystemProcesses {
    system: Mutex<System>,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessApi for SystemProcesses {
    fn processes(&self) -> Result<Vec<ProcessEntry>, PlatformError> {
        let mut sys = self.system.lock();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        Ok(sys
            .processes()
            .iter()
            .map(|(pid, p)| ProcessEntry {
                pid: pid.as_u32(),
                name: p.name().to_string_lossy().into_owned(),
            })
            .collect())
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        if pid == 0 {
            return None;
        }
        let pid = Pid::from_u32(pid);
        let mut sys = self.system.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid)
            .map(|p| p.name().to_string_lossy().into_owned())
    }

    fn terminate(&self, pid: u32) -> Result<(), PlatformError> {
        let pid = Pid::from_u32(pid);
        let mut sys = self.system.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match sys.process(pid) {
            None => Err(PlatformError::os("terminate", format!("pid {pid} is gone"))),
            Some(p) if p.kill() => Ok(()),
            Some(_) => Err(PlatformError::os("terminate", format!("pid {pid} refused"))),
        }
    }

    fn spawn(&self, path: &Path, args: &[String]) -> Result<u32, PlatformError> {
        Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|child| child.id())
            .map_err(|e| PlatformError::os("spawn", e))
    }

    fn executable_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}
