// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SwitchMaster: logs a login client into a different account by driving
//! its window like a user would.
//!
//! Close the client, relaunch it, find and focus its login window, paste
//! username and password through the clipboard, submit, look for an error
//! banner, optionally start a game. The client is never spoken to directly;
//! it is just processes, windows and keystrokes (see [`platform`]).

pub mod clipboard;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod journal;
pub mod model;
pub mod orchestrator;
pub mod platform;
pub mod process_control;
pub mod progress;
pub mod window;

pub use config::{ClientLocator, SwitchConfig, Timings};
pub use credentials::{CredentialSource, MemoryCredentials};
pub use error::{ClipboardError, ErrorKind, SubmitError};
pub use executor::{SwitchExecutor, SwitchHandle};
pub use model::{Credential, ProgramId, SwitchPhase, SwitchRequest, SwitchResult};
pub use orchestrator::{CancelToken, SwitchOrchestrator};
pub use progress::ProgressEvent;
