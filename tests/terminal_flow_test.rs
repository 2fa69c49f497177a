//! End-to-end flows through the terminal state machine.
//!
//! The driver is replaced by hand: each test feeds the events a real
//! backend would produce and checks the effects and pane state.

use std::collections::HashSet;
use std::time::Duration;

use glask::terminal::{
    Effect, LineStatus, PaneConnection, PaneId, RetryPolicy, Terminal, TerminalEvent,
    TerminalSettings,
};

fn settings() -> TerminalSettings {
    TerminalSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            jitter: Duration::ZERO,
        },
        ..TerminalSettings::default()
    }
}

/// Generation of the single `CreateSession` in `effects`.
fn created(effects: &[Effect]) -> u64 {
    match effects {
        [Effect::CreateSession { generation, .. }] => *generation,
        other => panic!("expected one CreateSession, got {other:?}"),
    }
}

/// Drive `pane` from a `CreateSession` effect to an open socket.
fn establish(t: &mut Terminal, pane: PaneId, effects: &[Effect], session: &str) -> u64 {
    let generation = created(effects);
    let effects = t.handle(TerminalEvent::SessionCreated {
        pane,
        generation,
        session_id: session.to_string(),
    });
    assert!(
        matches!(&effects[..], [Effect::OpenSocket { session_id, .. }] if session_id == session),
        "{effects:?}"
    );
    t.handle(TerminalEvent::SocketOpened { pane, generation });
    generation
}

fn contents(t: &Terminal, pane: PaneId) -> Vec<String> {
    t.pane(pane)
        .unwrap()
        .lines()
        .lines()
        .iter()
        .map(|line| line.content().to_string())
        .collect()
}

#[test]
fn fresh_pane_connects_and_reports_success() {
    let mut t = Terminal::new(settings());
    let effects = t.open();
    establish(&mut t, PaneId::Left, &effects, "abc");

    let left = t.pane(PaneId::Left).unwrap();
    assert_eq!(left.session_id(), Some("abc"));
    assert_eq!(left.lines().len(), 1);
    let line = &left.lines().lines()[0];
    assert_eq!(line.content(), "Terminal connected");
    assert_eq!(line.status(), LineStatus::Success);
    assert!(!line.is_command());
}

#[test]
fn command_round_trip_resolves_pending_line() {
    let mut t = Terminal::new(settings());
    let effects = t.open();
    let generation = establish(&mut t, PaneId::Left, &effects, "abc");

    let effects = t.submit(PaneId::Left, "ls");
    let command_id = match &effects[..] {
        [Effect::Send {
            payload,
            line: Some(line),
            generation: g,
            ..
        }, Effect::Schedule {
            event: TerminalEvent::CommandTimeout { .. },
            ..
        }] => {
            assert_eq!(payload, "ls\n");
            assert_eq!(*g, generation);
            line.clone()
        }
        other => panic!("unexpected effects {other:?}"),
    };
    let command = t.pane(PaneId::Left).unwrap().lines().get(&command_id).unwrap();
    assert!(command.is_command());
    assert_eq!(command.content(), "ls");
    assert_eq!(command.status(), LineStatus::Pending);

    t.handle(TerminalEvent::SocketMessage {
        pane: PaneId::Left,
        generation,
        data: "file1\nfile2\n".into(),
    });

    let left = t.pane(PaneId::Left).unwrap();
    assert_eq!(left.lines().get(&command_id).unwrap().status(), LineStatus::Success);
    let last = left.lines().last().unwrap();
    assert!(!last.is_command());
    assert_eq!(last.content(), "file1\nfile2\n");
    assert_eq!(left.command_status(), LineStatus::Success);
}

#[test]
fn unexpected_close_reconnects_after_fixed_delay() {
    let mut t = Terminal::new(settings());
    let effects = t.open();
    let generation = establish(&mut t, PaneId::Left, &effects, "abc");

    let effects = t.handle(TerminalEvent::SocketClosed {
        pane: PaneId::Left,
        generation,
        code: Some(1006),
    });
    let due = match &effects[..] {
        [Effect::CloseSocket { .. }, Effect::Schedule { delay, event }] => {
            assert_eq!(*delay, t.settings().reconnect_delay);
            event.clone()
        }
        other => panic!("unexpected effects {other:?}"),
    };
    let last = t.pane(PaneId::Left).unwrap().lines().last().unwrap().clone();
    assert!(last.content().starts_with("Terminal disconnected"));
    assert_eq!(last.status(), LineStatus::Error);

    let effects = t.handle(due);
    let next = created(&effects);
    assert!(next > generation);
    establish(&mut t, PaneId::Left, &effects, "def");
    assert_eq!(t.pane(PaneId::Left).unwrap().session_id(), Some("def"));
}

#[test]
fn split_creates_and_connects_right_pane() {
    let mut t = Terminal::new(settings());
    let effects = t.open();
    establish(&mut t, PaneId::Left, &effects, "abc");

    let effects = t.split_terminal();
    let ids: Vec<PaneId> = t.panes().map(|p| p.id()).collect();
    assert_eq!(ids, vec![PaneId::Left, PaneId::Right]);
    assert!(matches!(
        &effects[..],
        [Effect::CreateSession {
            pane: PaneId::Right,
            ..
        }]
    ));
    assert_eq!(t.active_pane(), PaneId::Left);
    assert!(t.set_active_pane(PaneId::Right));
    assert_eq!(t.active_pane(), PaneId::Right);
}

#[test]
fn line_ids_stay_unique_across_clears() {
    let mut t = Terminal::new(settings());
    let effects = t.open();
    let generation = establish(&mut t, PaneId::Left, &effects, "abc");

    let mut seen = HashSet::new();
    for round in 0..3 {
        for i in 0..4 {
            t.submit(PaneId::Left, &format!("echo {round}-{i}"));
            t.handle(TerminalEvent::SocketMessage {
                pane: PaneId::Left,
                generation,
                data: format!("{round}-{i}\n"),
            });
        }
        for line in t.pane(PaneId::Left).unwrap().lines().lines() {
            seen.insert(line.id().clone());
        }
        t.submit(PaneId::Left, "clear");
    }
    let total_lines = 1 + 3 * 8;
    assert_eq!(seen.len(), total_lines);
}

#[test]
fn messages_are_appended_in_arrival_order() {
    let mut t = Terminal::new(settings());
    let effects = t.open();
    let generation = establish(&mut t, PaneId::Left, &effects, "abc");

    for data in ["first\n", "\u{1b}[32msecond\u{1b}[0m\n", "third\n"] {
        t.handle(TerminalEvent::SocketMessage {
            pane: PaneId::Left,
            generation,
            data: data.into(),
        });
    }
    let lines = contents(&t, PaneId::Left);
    assert_eq!(lines[1], "first\n");
    assert!(lines[2].contains("second"));
    assert!(!lines[2].contains('\u{1b}'));
    assert_eq!(lines[3], "third\n");
}

#[test]
fn clear_always_empties_buffer() {
    let mut t = Terminal::new(settings());
    assert!(t.submit(PaneId::Left, "clear").is_empty());
    assert!(t.pane(PaneId::Left).unwrap().lines().is_empty());

    let effects = t.open();
    let generation = establish(&mut t, PaneId::Left, &effects, "abc");
    for i in 0..10 {
        t.handle(TerminalEvent::SocketMessage {
            pane: PaneId::Left,
            generation,
            data: format!("{i}"),
        });
    }
    t.submit(PaneId::Left, "  clear  ");
    let left = t.pane(PaneId::Left).unwrap();
    assert!(left.lines().is_empty());
    assert_eq!(left.lines().counter(), 0);
}

#[test]
fn retries_stop_after_configured_failures() {
    let mut t = Terminal::new(settings());
    let mut effects = t.open();
    let mut delays = Vec::new();

    for attempt in 1..=3 {
        let generation = created(&effects);
        let after = t.handle(TerminalEvent::SessionFailed {
            pane: PaneId::Left,
            generation,
            reason: "connection refused".into(),
        });
        if attempt < 3 {
            let (delay, event) = match &after[..] {
                [Effect::Schedule { delay, event }] => (*delay, event.clone()),
                other => panic!("unexpected effects {other:?}"),
            };
            delays.push(delay);
            assert!(matches!(
                t.pane(PaneId::Left).unwrap().connection(),
                PaneConnection::Reconnecting { .. }
            ));
            effects = t.handle(event);
        } else {
            assert!(after.is_empty(), "no retry after the last failure: {after:?}");
        }
    }

    assert_eq!(delays, vec![Duration::from_millis(100), Duration::from_millis(200)]);
    let left = t.pane(PaneId::Left).unwrap();
    assert!(matches!(left.connection(), PaneConnection::Failed { .. }));
    assert_eq!(left.command_status(), LineStatus::Error);
    let last = left.lines().last().unwrap();
    assert_eq!(
        last.content(),
        "Connection failed after 3 attempts: connection refused"
    );

    // A manual connect starts over.
    let effects = t.connect(PaneId::Left);
    created(&effects);
    assert_eq!(t.pane(PaneId::Left).unwrap().retry_count(), 0);
}

#[test]
fn split_then_unsplit_leaves_left_untouched() {
    let mut t = Terminal::new(settings());
    let effects = t.open();
    let generation = establish(&mut t, PaneId::Left, &effects, "abc");
    let before = t.pane(PaneId::Left).unwrap().lines().lines().to_vec();

    let effects = t.split_terminal();
    let right_generation = establish(&mut t, PaneId::Right, &effects, "xyz");
    t.set_active_pane(PaneId::Right);

    let effects = t.split_terminal();
    assert_eq!(
        effects,
        vec![Effect::CloseSocket {
            pane: PaneId::Right,
            generation: right_generation,
        }]
    );
    let ids: Vec<PaneId> = t.panes().map(|p| p.id()).collect();
    assert_eq!(ids, vec![PaneId::Left]);
    assert_eq!(t.active_pane(), PaneId::Left);

    let left = t.pane(PaneId::Left).unwrap();
    assert_eq!(left.session_id(), Some("abc"));
    assert_eq!(left.generation(), generation);
    assert_eq!(left.lines().lines(), &before[..]);

    // Late output from the closed right socket goes nowhere.
    assert!(t
        .handle(TerminalEvent::SocketMessage {
            pane: PaneId::Right,
            generation: right_generation,
            data: "late".into(),
        })
        .is_empty());
    assert!(t.pane(PaneId::Right).is_none());
}

#[test]
fn late_send_failure_from_closed_right_pane_is_ignored() {
    let mut t = Terminal::new(settings());
    let effects = t.open();
    establish(&mut t, PaneId::Left, &effects, "abc");

    let effects = t.split_terminal();
    let old_generation = establish(&mut t, PaneId::Right, &effects, "first");
    let effects = t.submit(PaneId::Right, "ls");
    let Some(Effect::Send { line: old_line, .. }) = effects.first().cloned() else {
        panic!("expected send, got {effects:?}");
    };

    t.split_terminal();
    let effects = t.split_terminal();
    let new_generation = establish(&mut t, PaneId::Right, &effects, "second");
    assert_ne!(new_generation, old_generation);
    t.submit(PaneId::Right, "pwd");
    let pwd = t
        .pane(PaneId::Right)
        .unwrap()
        .lines()
        .lines()
        .iter()
        .find(|line| line.is_command())
        .unwrap()
        .clone();
    // The recreated pane reuses the old pane's id space.
    assert_eq!(Some(pwd.id()), old_line.as_ref());

    let effects = t.handle(TerminalEvent::SendFailed {
        pane: PaneId::Right,
        generation: old_generation,
        line: old_line,
        reason: "connection reset".into(),
    });
    assert!(effects.is_empty());

    let right = t.pane(PaneId::Right).unwrap();
    assert_eq!(right.lines().get(pwd.id()).unwrap().status(), LineStatus::Pending);
    assert_eq!(right.command_status(), LineStatus::Pending);
    assert!(!contents(&t, PaneId::Right)
        .iter()
        .any(|c| c == "Failed to send command to terminal"));
}

#[test]
fn silent_command_is_flagged_then_resolved() {
    let mut t = Terminal::new(settings());
    let effects = t.open();
    let generation = establish(&mut t, PaneId::Left, &effects, "abc");

    let effects = t.submit(PaneId::Left, "sleep 5");
    let (line, timeout) = match &effects[..] {
        [Effect::Send { line: Some(line), .. }, Effect::Schedule { event, .. }] => {
            (line.clone(), event.clone())
        }
        other => panic!("unexpected effects {other:?}"),
    };
    t.handle(timeout);
    let left = t.pane(PaneId::Left).unwrap();
    assert_eq!(left.lines().get(&line).unwrap().status(), LineStatus::TimedOut);
    assert_eq!(left.command_status(), LineStatus::TimedOut);

    t.handle(TerminalEvent::SocketMessage {
        pane: PaneId::Left,
        generation,
        data: "done\n".into(),
    });
    assert_eq!(
        t.pane(PaneId::Left).unwrap().lines().get(&line).unwrap().status(),
        LineStatus::Success
    );
}

#[test]
fn resize_recorded_offline_is_sent_on_connect() {
    let mut t = Terminal::new(settings());
    assert!(t.resize(PaneId::Left, 30, 100).is_empty());

    let effects = t.open();
    let generation = created(&effects);
    t.handle(TerminalEvent::SessionCreated {
        pane: PaneId::Left,
        generation,
        session_id: "abc".into(),
    });
    let effects = t.handle(TerminalEvent::SocketOpened {
        pane: PaneId::Left,
        generation,
    });
    match &effects[..] {
        [Effect::Send { payload, line: None, .. }] => {
            let value: serde_json::Value = serde_json::from_str(payload).unwrap();
            assert_eq!(value["type"], "resize");
            assert_eq!(value["rows"], 30);
            assert_eq!(value["cols"], 100);
        }
        other => panic!("unexpected effects {other:?}"),
    }
}
