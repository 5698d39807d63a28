// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end switch runs against the scripted desktop.

use switchmaster::clipboard::SCRUB_LEN;
use switchmaster::config::{SwitchConfig, Timings};
use switchmaster::error::{ClipboardError, ErrorKind};
use switchmaster::model::{Credential, ProgramId, SwitchPhase, SwitchRequest, SwitchResult};
use switchmaster::orchestrator::SwitchOrchestrator;
use switchmaster::platform::{KeyStroke, ScriptedDesktop};
use switchmaster::progress::ProgressSink;

const CLIENT: &str = "C:/Riot Games/Riot Client/RiotClientServices.exe";
const BEFORE: &str = "text the user copied earlier";

fn desktop(window_on_poll: u32) -> ScriptedDesktop {
    let d = ScriptedDesktop::with_login_client(CLIENT, "Riot Client", window_on_poll);
    d.set_clipboard(Some(BEFORE));
    d
}

fn run_with(d: &ScriptedDesktop, cred: Credential) -> (SwitchResult, Vec<SwitchPhase>) {
    let cfg = SwitchConfig::default().with_timings(Timings::immediate());
    let sink = ProgressSink::new();
    let result = SwitchOrchestrator::new(d, &cfg, &sink).run(&SwitchRequest::new(CLIENT, cred));
    let mut phases: Vec<SwitchPhase> = sink.log().snapshot().into_iter().map(|e| e.phase).collect();
    phases.dedup();
    (result, phases)
}

#[test]
fn window_on_third_poll_logs_in_and_restores_clipboard() {
    let d = desktop(3);
    let (result, phases) = run_with(&d, Credential::new("alice", "s3cret"));

    assert_eq!(result, SwitchResult::Success { warning: None });
    assert_eq!(d.clipboard_contents().as_deref(), Some(BEFORE));
    // three polls to find it, one post-login scan
    assert_eq!(d.enumerations(), 4);
    assert_eq!(d.foreground_requests(), 1);
    assert_eq!(d.pasted(), vec!["alice", "s3cret"]);
    assert_eq!(
        phases,
        vec![
            SwitchPhase::ClosingProcesses,
            SwitchPhase::Launching,
            SwitchPhase::LocatingWindow,
            SwitchPhase::AcquiringFocus,
            SwitchPhase::EnteringUsername,
            SwitchPhase::EnteringPassword,
            SwitchPhase::ScanningForErrors,
            SwitchPhase::Completed,
        ]
    );
}

#[test]
fn clipboard_is_scrubbed_before_it_is_restored() {
    let d = desktop(1);
    run_with(&d, Credential::new("alice", "s3cret"));
    let writes = d.clipboard_writes();
    let n = writes.len();
    assert_eq!(writes[n - 2], " ".repeat(SCRUB_LEN));
    assert_eq!(writes[n - 1], BEFORE);
}

#[test]
fn window_that_never_appears_fails_after_forty_polls() {
    let d = desktop(u32::MAX);
    let svc = d.add_process("RiotClientServices.exe");
    let ux = d.add_process("RiotClientUx.exe");
    let lol = d.add_process("LeagueClient.exe");

    let (result, _) = run_with(&d, Credential::new("alice", "s3cret"));

    assert_eq!(
        result,
        SwitchResult::Failed {
            reason: ErrorKind::WindowNotFound { attempts: 40 }
        }
    );
    assert_eq!(d.enumerations(), 40);
    let mut killed = d.terminated();
    killed.sort_unstable();
    assert_eq!(killed, vec![svc, ux, lol]);
    assert_eq!(d.spawned().len(), 1);
    assert!(d.clipboard_writes().is_empty());
    assert_eq!(d.clipboard_contents().as_deref(), Some(BEFORE));
}

#[test]
fn readback_mismatch_exhausts_three_field_attempts() {
    let d = desktop(1);
    d.garble_clipboard_readback();

    let (result, _) = run_with(&d, Credential::new("alice", "s3cret"));

    assert_eq!(
        result,
        SwitchResult::Failed {
            reason: ErrorKind::Clipboard(ClipboardError::Mismatch { attempts: 3 })
        }
    );
    // 3 field attempts x 3 verified writes each; the password is never tried
    let writes = d.clipboard_writes();
    assert_eq!(writes.iter().filter(|w| *w == "alice").count(), 9);
    assert!(!writes.iter().any(|w| w == "s3cret"));
    assert!(d.pasted().is_empty());
    assert_eq!(d.clipboard_contents().as_deref(), Some(BEFORE));
}

#[test]
fn stay_signed_in_sends_the_tab_sequence() {
    let d = desktop(1);
    let (result, phases) = run_with(&d, Credential::new("alice", "s3cret").stay_logged_in(true));

    assert!(result.is_success());
    assert!(phases.contains(&SwitchPhase::StaySignedInSequence));
    // Positional: the tab count tracks the client's current form layout and
    // is the first thing to break when that layout changes.
    let keys = d.keystrokes();
    let after_password = &keys[5..];
    let mut expected = vec![KeyStroke::NextField; 6];
    expected.extend([KeyStroke::Confirm, KeyStroke::NextField, KeyStroke::Confirm]);
    assert_eq!(after_password, expected.as_slice());
    assert_eq!(
        &keys[..5],
        &[
            KeyStroke::SelectAll,
            KeyStroke::Paste,
            KeyStroke::NextField,
            KeyStroke::SelectAll,
            KeyStroke::Paste,
        ]
    );
}

#[test]
fn refusal_banner_means_verification_with_or_without_stay_signed_in() {
    for stay in [false, true] {
        let d = desktop(1);
        d.banner_on_submit("Erreur : connexion refusée");
        let (result, _) = run_with(&d, Credential::new("alice", "s3cret").stay_logged_in(stay));
        assert_eq!(result, SwitchResult::NeedsVerification, "stay_logged_in={stay}");
        assert_eq!(d.clipboard_contents().as_deref(), Some(BEFORE));
    }
}

#[test]
fn hidden_refusal_banner_still_counts() {
    let d = desktop(1);
    let explorer = d.add_process("explorer.exe");
    let banner = d.add_window("Erreur - connexion refusée", explorer);
    d.hide(banner);

    let (result, _) = run_with(&d, Credential::new("alice", "s3cret"));

    assert_eq!(result, SwitchResult::NeedsVerification);
    assert_eq!(d.clipboard_contents().as_deref(), Some(BEFORE));
}

#[test]
fn client_dying_mid_field_aborts_the_field() {
    let d = desktop(1);
    d.crash_on_paste();

    let (result, phases) = run_with(&d, Credential::new("alice", "s3cret"));

    assert_eq!(
        result,
        SwitchResult::Failed {
            reason: ErrorKind::FocusLost
        }
    );
    // One paste landed before the crash; no attempt after it.
    assert_eq!(d.pasted(), vec!["alice"]);
    assert!(!phases.contains(&SwitchPhase::EnteringPassword));
    assert_eq!(d.clipboard_contents().as_deref(), Some(BEFORE));
}

#[test]
fn clipboard_write_error_is_not_retried() {
    let d = desktop(1);
    d.fail_clipboard_write_of("alice");

    let (result, _) = run_with(&d, Credential::new("alice", "s3cret"));

    assert!(matches!(
        result,
        SwitchResult::Failed {
            reason: ErrorKind::Clipboard(ClipboardError::Unavailable(_))
        }
    ));
    assert_eq!(d.failed_clipboard_writes(), 1);
    assert!(d.pasted().is_empty());
    assert_eq!(d.clipboard_contents().as_deref(), Some(BEFORE));
}

#[test]
fn focus_call_error_ends_the_field_at_once() {
    let d = desktop(1);
    // Locating takes the one good foreground request; the paste then drops
    // focus and the next request errors.
    d.break_focus_after(1);
    d.steal_focus_on_paste(1);

    let (result, _) = run_with(&d, Credential::new("alice", "s3cret"));

    assert_eq!(
        result,
        SwitchResult::Failed {
            reason: ErrorKind::FocusLost
        }
    );
    assert_eq!(d.foreground_requests(), 2);
    assert_eq!(d.pasted(), vec!["alice"]);
    assert_eq!(d.clipboard_contents().as_deref(), Some(BEFORE));
}

#[test]
fn empty_password_touches_nothing() {
    let d = desktop(1);
    d.add_process("RiotClientServices.exe");
    let (result, phases) = run_with(&d, Credential::new("alice", ""));

    assert_eq!(result.reason(), Some(&ErrorKind::EmptyCredential));
    assert!(d.clipboard_writes().is_empty());
    assert!(d.terminated().is_empty());
    assert!(d.spawned().is_empty());
    assert_eq!(phases, vec![SwitchPhase::Failed]);
}

#[test]
fn failed_follow_on_is_a_warning_not_a_failure() {
    let d = desktop(1);
    d.fail_follow_on();
    let (result, phases) = run_with(&d, Credential::new("alice", "s3cret").launch(Some(ProgramId::Valorant)));

    assert!(result.logged_in());
    assert!(!result.is_success());
    assert!(matches!(
        result.warning(),
        Some(ErrorKind::FollowOnLaunchFailed { program, .. }) if program == "valorant"
    ));
    assert!(phases.contains(&SwitchPhase::LaunchingFollowOn));
    assert_eq!(phases.last(), Some(&SwitchPhase::Completed));
}

#[test]
fn focus_refusals_within_budget_are_absorbed() {
    let d = desktop(1);
    // First poll's focus attempt fails; second poll succeeds.
    d.refuse_focus(1);
    let (result, _) = run_with(&d, Credential::new("alice", "s3cret"));
    assert!(result.is_success());
    assert_eq!(d.foreground_requests(), 2);
}

#[test]
fn owner_mismatch_window_is_never_used() {
    let d = desktop(u32::MAX);
    let notepad = d.add_process("notepad.exe");
    d.add_window("Riot Client - notes.txt", notepad);

    let cfg = SwitchConfig {
        budgets: switchmaster::config::Budgets {
            window_polls: 5,
            ..Default::default()
        },
        ..SwitchConfig::default().with_timings(Timings::immediate())
    };
    let sink = ProgressSink::new();
    let result = SwitchOrchestrator::new(&d, &cfg, &sink)
        .run(&SwitchRequest::new(CLIENT, Credential::new("alice", "s3cret")));

    assert_eq!(result.reason(), Some(&ErrorKind::WindowNotFound { attempts: 5 }));
    assert_eq!(d.foreground_requests(), 0);
    assert!(d.pasted().is_empty());
}
