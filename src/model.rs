// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ErrorKind;

// ── Programs ────────────────────────────────────────

/// Product started after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProgramId {
    League,
    Valorant,
    Other(String),
}

impl ProgramId {
    /// Value passed to `--launch-product=`.
    pub fn product(&self) -> &str {
        match self {
            ProgramId::League => "league_of_legends",
            ProgramId::Valorant => "valorant",
            ProgramId::Other(id) => id,
        }
    }

    /// Command line for launching this product through the login client.
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            format!("--launch-product={}", self.product()),
            "--launch-patchline=live".to_string(),
        ]
    }
}

impl From<&str> for ProgramId {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "league" | "league_of_legends" | "lol" => ProgramId::League,
            "valorant" | "val" => ProgramId::Valorant,
            _ => ProgramId::Other(s.trim().to_string()),
        }
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.product())
    }
}

// ── Credential / Request ────────────────────────────

/// Decrypted login for one switch. The password lives only as long as the
/// run that owns it; `Debug` never prints it.
#[derive(Debug)]
pub struct Credential {
    pub username: String,
    password: SecretString,
    pub stay_logged_in: bool,
    pub launch_target: Option<ProgramId>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            stay_logged_in: false,
            launch_target: None,
        }
    }

    pub fn stay_logged_in(mut self, yes: bool) -> Self {
        self.stay_logged_in = yes;
        self
    }

    pub fn launch(mut self, target: Option<ProgramId>) -> Self {
        self.launch_target = target;
        self
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    pub fn has_password(&self) -> bool {
        !self.password.expose_secret().is_empty()
    }
}

#[derive(Debug)]
pub struct SwitchRequest {
    pub login_client_path: PathBuf,
    pub credential: Credential,
}

impl SwitchRequest {
    pub fn new(login_client_path: impl Into<PathBuf>, credential: Credential) -> Self {
        Self {
            login_client_path: login_client_path.into(),
            credential,
        }
    }
}

// ── Windows ─────────────────────────────────────────

/// Raw OS window reference (HWND value on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub isize);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0 as usize)
    }
}

/// A located login window. Only as good as `verified_at`: the client may
/// recreate its window at any time, so re-validate before each use.
#[derive(Debug, Clone)]
pub struct WindowHandle {
    pub id: WindowId,
    pub title: String,
    pub pid: u32,
    pub verified_at: Instant,
}

// ── Phases / Results ────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchPhase {
    Idle,
    ClosingProcesses,
    Launching,
    LocatingWindow,
    AcquiringFocus,
    EnteringUsername,
    EnteringPassword,
    StaySignedInSequence,
    ScanningForErrors,
    LaunchingFollowOn,
    Completed,
    Failed,
}

impl SwitchPhase {
    pub fn name(self) -> &'static str {
        match self {
            SwitchPhase::Idle => "idle",
            SwitchPhase::ClosingProcesses => "closing-processes",
            SwitchPhase::Launching => "launching",
            SwitchPhase::LocatingWindow => "locating-window",
            SwitchPhase::AcquiringFocus => "acquiring-focus",
            SwitchPhase::EnteringUsername => "entering-username",
            SwitchPhase::EnteringPassword => "entering-password",
            SwitchPhase::StaySignedInSequence => "stay-signed-in",
            SwitchPhase::ScanningForErrors => "scanning-for-errors",
            SwitchPhase::LaunchingFollowOn => "launching-follow-on",
            SwitchPhase::Completed => "completed",
            SwitchPhase::Failed => "failed",
        }
    }

    /// Result reported when a run dies unexpectedly inside this phase: the
    /// phase's budget counts as exhausted on the spot.
    pub fn abort_result(self, ctx: &SwitchAbortContext) -> SwitchResult {
        let reason = match self {
            SwitchPhase::Idle | SwitchPhase::ClosingProcesses | SwitchPhase::Launching => {
                ErrorKind::LaunchFailed {
                    path: ctx.client_path.clone(),
                    reason: format!("aborted during {}", self.name()),
                }
            }
            SwitchPhase::LocatingWindow => ErrorKind::WindowNotFound {
                attempts: ctx.window_polls,
            },
            SwitchPhase::AcquiringFocus => ErrorKind::FocusLost,
            SwitchPhase::EnteringUsername
            | SwitchPhase::EnteringPassword
            | SwitchPhase::StaySignedInSequence => ErrorKind::Clipboard(
                crate::error::ClipboardError::Unavailable(format!(
                    "aborted during {}",
                    self.name()
                )),
            ),
            // Credentials were already submitted.
            SwitchPhase::ScanningForErrors | SwitchPhase::Completed => {
                return SwitchResult::Success { warning: None }
            }
            SwitchPhase::LaunchingFollowOn => {
                return SwitchResult::Success {
                    warning: Some(ErrorKind::FollowOnLaunchFailed {
                        program: ctx.follow_on.clone().unwrap_or_default(),
                        reason: "aborted during launch".into(),
                    }),
                }
            }
            SwitchPhase::Failed => ErrorKind::WorkerLost,
        };
        SwitchResult::Failed { reason }
    }
}

impl fmt::Display for SwitchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the worker remembers about a request in case the run aborts.
#[derive(Debug, Clone)]
pub struct SwitchAbortContext {
    pub client_path: PathBuf,
    pub window_polls: u32,
    pub follow_on: Option<String>,
}

/// Outcome of one switch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchResult {
    /// Logged in. `warning` carries a non-fatal follow-on launch failure.
    Success { warning: Option<ErrorKind> },
    Failed { reason: ErrorKind },
    /// Credentials were accepted but the client wants e-mail confirmation.
    NeedsVerification,
}

impl SwitchResult {
    /// Logged in with nothing left to report.
    pub fn is_success(&self) -> bool {
        matches!(self, SwitchResult::Success { warning: None })
    }

    /// The credentials went through, whatever happened afterwards.
    pub fn logged_in(&self) -> bool {
        matches!(
            self,
            SwitchResult::Success { .. } | SwitchResult::NeedsVerification
        )
    }

    pub fn reason(&self) -> Option<&ErrorKind> {
        match self {
            SwitchResult::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn warning(&self) -> Option<&ErrorKind> {
        match self {
            SwitchResult::Success { warning } => warning.as_ref(),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SwitchResult::Success { warning: None } => "success",
            SwitchResult::Success { warning: Some(_) } => "success-with-warning",
            SwitchResult::Failed { .. } => "failed",
            SwitchResult::NeedsVerification => "needs-verification",
        }
    }
}

impl fmt::Display for SwitchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchResult::Success { warning: None } => f.write_str("logged in"),
            SwitchResult::Success { warning: Some(w) } => write!(f, "logged in ({w})"),
            SwitchResult::Failed { reason } => write!(f, "failed: {reason}"),
            SwitchResult::NeedsVerification => {
                f.write_str("logged in, e-mail verification required")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_ids_map_to_launch_products() {
        assert_eq!(ProgramId::from("league").product(), "league_of_legends");
        assert_eq!(ProgramId::from("VALORANT"), ProgramId::Valorant);
        assert_eq!(
            ProgramId::from("bacon").launch_args(),
            vec!["--launch-product=bacon", "--launch-patchline=live"]
        );
    }

    #[test]
    fn credential_debug_hides_password() {
        let c = Credential::new("alice", "hunter2");
        let dbg = format!("{c:?}");
        assert!(dbg.contains("alice"));
        assert!(!dbg.contains("hunter2"));
        assert!(c.has_password());
        assert!(!Credential::new("bob", "").has_password());
    }

    #[test]
    fn follow_on_warning_downgrades_success() {
        let warned = SwitchResult::Success {
            warning: Some(ErrorKind::FollowOnLaunchFailed {
                program: "valorant".into(),
                reason: "spawn failed".into(),
            }),
        };
        assert!(!warned.is_success());
        assert!(warned.logged_in());
        assert!(SwitchResult::NeedsVerification.logged_in());
        assert!(!SwitchResult::Failed {
            reason: ErrorKind::FocusLost
        }
        .logged_in());
    }

    #[test]
    fn aborts_map_to_phase_budget_failures() {
        let ctx = SwitchAbortContext {
            client_path: PathBuf::from("client.exe"),
            window_polls: 40,
            follow_on: Some("valorant".into()),
        };
        assert_eq!(
            SwitchPhase::LocatingWindow.abort_result(&ctx),
            SwitchResult::Failed {
                reason: ErrorKind::WindowNotFound { attempts: 40 }
            }
        );
        assert!(matches!(
            SwitchPhase::EnteringPassword.abort_result(&ctx),
            SwitchResult::Failed {
                reason: ErrorKind::Clipboard(_)
            }
        ));
        assert!(SwitchPhase::LaunchingFollowOn
            .abort_result(&ctx)
            .logged_in());
    }
}
