// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{error, info, warn};

use crate::error::ErrorKind;
use crate::platform::{name_contains, ProcessApi};

/// What happened to one requested process name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillStatus {
    Killed(Vec<u32>),
    NotFound,
    Error(String),
}

pub type KillReport = BTreeMap<String, KillStatus>;

/// Kills and launches processes by name. Absence is never an error.
pub struct ProcessController<'a, P: ProcessApi + ?Sized> {
    procs: &'a P,
}

impl<'a, P: ProcessApi + ?Sized> ProcessController<'a, P> {
    pub fn new(procs: &'a P) -> Self {
        Self { procs }
    }

    /// Terminate every process whose name contains one of `names`
    /// (case-insensitive). Reports per name; never fails as a whole.
    pub fn kill_by_name(&self, names: &[String]) -> KillReport {
        let mut report = KillReport::new();

        for name in names {
            // Fresh listing per name: an earlier kill may have taken
            // children along.
            let procs = match self.procs.processes() {
                Ok(p) => p,
                Err(e) => {
                    error!(process = %name, error = %e, "process enumeration failed");
                    report.insert(name.clone(), KillStatus::Error(e.to_string()));
                    continue;
                }
            };

            let mut killed = Vec::new();
            let mut failures = Vec::new();
            for p in procs.iter().filter(|p| name_contains(&p.name, name)) {
                match self.procs.terminate(p.pid) {
                    Ok(()) => {
                        info!(process = %name, pid = p.pid, "process terminated");
                        killed.push(p.pid);
                    }
                    Err(e) => {
                        error!(process = %name, pid = p.pid, error = %e, "terminate failed");
                        failures.push(format!("pid {}: {e}", p.pid));
                    }
                }
            }

            let status = if !failures.is_empty() {
                KillStatus::Error(failures.join("; "))
            } else if killed.is_empty() {
                warn!(process = %name, "process not running");
                KillStatus::NotFound
            } else {
                KillStatus::Killed(killed)
            };
            report.insert(name.clone(), status);
        }
        report
    }

    /// Start `path` with `args`. Fails fast if the file is missing.
    pub fn launch(&self, path: &Path, args: &[String]) -> Result<u32, ErrorKind> {
        if !self.procs.executable_exists(path) {
            error!(path = %path.display(), "executable not found");
            return Err(ErrorKind::ExecutableNotFound(path.to_path_buf()));
        }
        let pid = self
            .procs
            .spawn(path, args)
            .map_err(|e| ErrorKind::LaunchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        info!(path = %path.display(), ?args, pid, "process launched");
        Ok(pid)
    }

    /// Whether any process with `name` in its image name is alive.
    pub fn is_running(&self, name: &str) -> bool {
        match self.procs.processes() {
            Ok(procs) => procs.iter().any(|p| name_contains(&p.name, name)),
            Err(e) => {
                error!(process = %name, error = %e, "process enumeration failed");
                false
            }
        }
    }

    /// Whether `pid` is alive and its image name contains `name`.
    pub fn pid_matches(&self, pid: u32, name: &str) -> bool {
        self.procs
            .process_name(pid)
            .is_some_and(|n| name_contains(&n, name))
    }
}
