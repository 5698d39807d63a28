// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the switch controller.
//!
//! Messages MUST NOT contain passwords. Usernames and paths are fine.

use std::path::PathBuf;

/// Why a switch run ended without logging in (or, for
/// `FollowOnLaunchFailed`, why a successful run carries a warning).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("login client not found at {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("failed to launch {}: {reason}", path.display())]
    LaunchFailed { path: PathBuf, reason: String },

    #[error("login window not found after {attempts} polls")]
    WindowNotFound { attempts: u32 },

    #[error("login client exited before credentials were entered")]
    ClientExited,

    #[error("could not hold focus on the login window")]
    FocusLost,

    #[error("clipboard injection failed: {0}")]
    Clipboard(#[from] ClipboardError),

    #[error("credential has an empty password")]
    EmptyCredential,

    #[error("follow-on launch of '{program}' failed: {reason}")]
    FollowOnLaunchFailed { program: String, reason: String },

    #[error("switch cancelled before any process was closed")]
    Cancelled,

    #[error("switch worker stopped without reporting a result")]
    WorkerLost,
}

/// Failures of a single clipboard injection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClipboardError {
    #[error("clipboard read-back mismatch after {attempts} writes")]
    Mismatch { attempts: u32 },

    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    #[error("keystroke injection failed: {0}")]
    Keystroke(String),

    #[error("login window lost focus during paste")]
    FocusLost,
}

/// Failure of one OS collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("{operation} failed: {message}")]
    Os {
        operation: &'static str,
        message: String,
    },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl PlatformError {
    pub fn os(operation: &'static str, message: impl ToString) -> Self {
        Self::Os {
            operation,
            message: message.to_string(),
        }
    }
}

impl From<PlatformError> for ClipboardError {
    fn from(e: PlatformError) -> Self {
        ClipboardError::Unavailable(e.to_string())
    }
}

/// Rejections from [`crate::executor::SwitchExecutor::submit`].
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("a switch is already running")]
    Busy,

    #[error("could not start switch worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Errors from the read-only credential store collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no credential stored for {game} account {account}")]
    NotFound { game: String, account: u32 },

    #[error("credential store unavailable: {0}")]
    Store(String),
}

/// Errors loading configuration or resolving the client path.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("not a usable client executable: {}", .0.display())]
    InvalidClientPath(PathBuf),

    #[error("login client not found in any known location")]
    ClientNotFound,
}

/// Errors from the switch history journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot create journal directory: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipboard_errors_wrap_into_error_kind() {
        let kind: ErrorKind = ClipboardError::Mismatch { attempts: 3 }.into();
        assert_eq!(
            kind.to_string(),
            "clipboard injection failed: clipboard read-back mismatch after 3 writes"
        );
    }

    #[test]
    fn platform_error_becomes_unavailable_clipboard() {
        let e: ClipboardError = PlatformError::os("OpenClipboard", "access denied").into();
        assert_eq!(
            e,
            ClipboardError::Unavailable("OpenClipboard failed: access denied".into())
        );
    }
}
