// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;
use std::time::Duration;

use switchmaster::config::{Budgets, SwitchConfig, Timings};
use switchmaster::error::{ClipboardError, ErrorKind, SubmitError};
use switchmaster::model::{Credential, SwitchPhase, SwitchRequest, SwitchResult};
use switchmaster::platform::{KeyStroke, ScriptedDesktop};
use switchmaster::SwitchExecutor;

const CLIENT: &str = "C:/Riot Games/Riot Client/RiotClientServices.exe";

fn instant() -> SwitchConfig {
    SwitchConfig::default().with_timings(Timings::immediate())
}

#[test]
fn second_submit_while_running_is_busy() {
    // Never shows a window: 20 polls x 25 ms keeps the first run busy.
    let d = Arc::new(ScriptedDesktop::with_login_client(CLIENT, "Riot Client", u32::MAX));
    let cfg = SwitchConfig {
        timings: Timings {
            window_poll_ms: 25,
            ..Timings::immediate()
        },
        budgets: Budgets {
            window_polls: 20,
            ..Budgets::default()
        },
        ..SwitchConfig::default()
    };
    let ex = SwitchExecutor::new(d.clone(), cfg);

    let first = ex
        .submit(SwitchRequest::new(CLIENT, Credential::new("alice", "pw")))
        .unwrap();
    assert!(ex.is_busy());
    let second = ex.submit(SwitchRequest::new(CLIENT, Credential::new("bob", "pw")));
    assert!(matches!(second, Err(SubmitError::Busy)));

    let result = first.wait();
    assert_eq!(result.reason(), Some(&ErrorKind::WindowNotFound { attempts: 20 }));
    // The rejected request never reached the desktop.
    assert_eq!(d.spawned().len(), 1);
    assert!(!ex.is_busy());

    // Free again once the result is in.
    let third = ex
        .submit(SwitchRequest::new(CLIENT, Credential::new("carol", "")))
        .unwrap();
    assert_eq!(third.wait().reason(), Some(&ErrorKind::EmptyCredential));
}

#[test]
fn panic_inside_a_run_is_reported_and_clipboard_restored() {
    let d = Arc::new(ScriptedDesktop::with_login_client(CLIENT, "Riot Client", 1));
    d.set_clipboard(Some("mine"));
    d.panic_on_key(KeyStroke::Paste);
    let ex = SwitchExecutor::new(d.clone(), instant());

    let handle = ex
        .submit(SwitchRequest::new(CLIENT, Credential::new("alice", "pw")))
        .unwrap();
    let last = handle.progress().iter().last().map(|e| e.phase);
    let result = handle.wait();

    assert!(matches!(
        result,
        SwitchResult::Failed {
            reason: ErrorKind::Clipboard(ClipboardError::Unavailable(_))
        }
    ));
    assert_eq!(last, Some(SwitchPhase::Failed));
    assert_eq!(d.clipboard_contents().as_deref(), Some("mine"));
    assert!(!ex.is_busy());
}

#[test]
fn results_can_be_polled_without_blocking() {
    let d = Arc::new(ScriptedDesktop::with_login_client(CLIENT, "Riot Client", 1));
    let ex = SwitchExecutor::new(d, instant());
    let handle = ex
        .submit(SwitchRequest::new(CLIENT, Credential::new("alice", "pw")))
        .unwrap();

    let mut result = None;
    for _ in 0..500 {
        result = handle.try_result();
        if result.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(result, Some(SwitchResult::Success { warning: None }));
    assert_eq!(handle.phase(), SwitchPhase::Completed);
}

#[test]
fn cancel_after_the_run_started_has_no_effect_on_the_outcome() {
    let d = Arc::new(ScriptedDesktop::with_login_client(CLIENT, "Riot Client", 1));
    let ex = SwitchExecutor::new(d.clone(), instant());
    let handle = ex
        .submit(SwitchRequest::new(CLIENT, Credential::new("alice", "pw")))
        .unwrap();
    // Wait until processes are being closed; from then on the run finishes.
    let closing = handle
        .progress()
        .iter()
        .find(|e| e.phase == SwitchPhase::ClosingProcesses);
    assert!(closing.is_some());
    handle.cancel();
    assert!(handle.wait().is_success());
    assert_eq!(d.spawned().len(), 1);
}

#[test]
fn recent_progress_spans_runs() {
    let d = Arc::new(ScriptedDesktop::with_login_client(CLIENT, "Riot Client", 1));
    let ex = SwitchExecutor::new(d, instant());
    for user in ["a", "b"] {
        let r = ex
            .submit(SwitchRequest::new(CLIENT, Credential::new(user, "pw")))
            .unwrap()
            .wait();
        assert!(r.is_success());
    }
    let completed = ex
        .recent_progress()
        .iter()
        .filter(|e| e.phase == SwitchPhase::Completed)
        .count();
    assert_eq!(completed, 2);
}
