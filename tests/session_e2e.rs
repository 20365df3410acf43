//! End-to-end tests driving real children on real ptys.
//!
//! The process-exiting signal bridge is never installed here; the tests reap
//! by hand and check the decisions instead of exiting. Every test that forks
//! is serial because reaping collects any child of the test process.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::thread;
use std::time::{Duration, Instant};

use ptykeeper::child::{Action, ChildState, HoldPolicy, KillOutcome, PtySize, SessionError};
use ptykeeper::config::Config;
use ptykeeper::platform::Capabilities;
use ptykeeper::terminal::StreamConsumer;
use ptykeeper::Session;
use serial_test::serial;

fn pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

fn notify(fd: &OwnedFd) {
    assert_eq!(unsafe { libc::write(fd.as_raw_fd(), b"x".as_ptr().cast(), 1) }, 1);
}

fn consume(fd: &OwnedFd) {
    let mut byte = [0u8; 1];
    unsafe { libc::read(fd.as_raw_fd(), byte.as_mut_ptr().cast(), 1) };
}

fn session_with(policy: HoldPolicy, host: &OwnedFd) -> Session {
    let mut config = Config::default();
    config.session.hold = policy;
    Session::new(host.as_raw_fd(), &config, Capabilities::detect())
}

/// Pump until the child's end of the pty is gone.
fn run_until_closed(
    session: &mut Session,
    term: &mut StreamConsumer<Vec<u8>>,
    host_r: &OwnedFd,
    host_w: &OwnedFd,
) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while session.supervisor().pty_fd().is_some() {
        assert!(Instant::now() < deadline, "pty never closed");
        notify(host_w);
        session.run(term).unwrap();
        consume(host_r);
    }
}

fn reap_action(session: &Session) -> Action {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match session.supervisor().record().reap_and_decide() {
            Action::None if session.supervisor().pid().is_some() => {
                assert!(Instant::now() < deadline, "child not reaped");
                thread::sleep(Duration::from_millis(20));
            }
            action => return action,
        }
    }
}

// ====================
// Kill semantics
// ====================

#[test]
#[serial]
fn test_point_blank_kill_always_exits() {
    let (host_r, _host_w) = pipe();
    let mut session = session_with(HoldPolicy::Error, &host_r);
    let mut term = StreamConsumer::new(Vec::new());

    assert_eq!(session.kill_request(true), KillOutcome::ExitNow);

    session
        .spawn(&["sleep", "30"], PtySize::default(), &mut term)
        .unwrap();
    assert_eq!(session.kill_request(true), KillOutcome::ExitNow);
    reap_action(&session);
}

#[test]
#[serial]
fn test_graceful_kill_defers_to_reap() {
    let (host_r, _host_w) = pipe();
    let mut session = session_with(HoldPolicy::Error, &host_r);
    let mut term = StreamConsumer::new(Vec::new());

    assert_eq!(session.kill_request(false), KillOutcome::ExitNow);

    session
        .spawn(&["sleep", "30"], PtySize::default(), &mut term)
        .unwrap();
    assert_eq!(session.kill_request(false), KillOutcome::Deferred);
    let record = session.supervisor().record();
    assert!(record.kill_requested());
    assert_eq!(record.state(), ChildState::Killing);

    // Hung up by a signal, which Error would hold on, but the kill wins.
    assert_eq!(reap_action(&session), Action::ExitProcess);
    assert_eq!(session.supervisor().record().state(), ChildState::Exiting);
}

// ====================
// Reaping
// ====================

#[test]
#[serial]
fn test_reaping_is_idempotent() {
    let (host_r, host_w) = pipe();
    let mut session = session_with(HoldPolicy::Error, &host_r);
    let mut term = StreamConsumer::new(Vec::new());

    session
        .spawn(&["sh", "-c", "exit 4"], PtySize::default(), &mut term)
        .unwrap();
    run_until_closed(&mut session, &mut term, &host_r, &host_w);
    assert_eq!(reap_action(&session), Action::HoldOpen);

    for _ in 0..3 {
        assert_eq!(session.supervisor().record().reap_and_decide(), Action::None);
    }
    assert_eq!(session.supervisor().record().state(), ChildState::Held);

    // One status line, however often the loop comes round.
    for _ in 0..3 {
        notify(&host_w);
        session.run(&mut term).unwrap();
        consume(&host_r);
    }
    let shown = String::from_utf8_lossy(term.get_ref()).into_owned();
    assert_eq!(shown.matches("sh: Exit 4").count(), 1, "got {:?}", shown);
    assert_eq!(session.supervisor().record().state(), ChildState::Idle);
}

#[test]
#[serial]
fn test_exec_failure_holds_without_status_line() {
    let (host_r, host_w) = pipe();
    let mut session = session_with(HoldPolicy::Default, &host_r);
    let mut term = StreamConsumer::new(Vec::new());

    session
        .spawn(
            &["/nonexistent/ptykeeper-test-program"],
            PtySize::default(),
            &mut term,
        )
        .unwrap();
    run_until_closed(&mut session, &mut term, &host_r, &host_w);
    assert_eq!(reap_action(&session), Action::HoldOpen);

    notify(&host_w);
    session.run(&mut term).unwrap();

    let shown = String::from_utf8_lossy(term.get_ref()).into_owned();
    assert!(
        shown.contains("/nonexistent/ptykeeper-test-program: "),
        "got {:?}",
        shown
    );
    assert!(!shown.contains("Exit 255"));
}

// ====================
// Output passthrough
// ====================

#[test]
#[serial]
fn test_output_reaches_display_and_transcript_intact() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("session.log");
    let (host_r, host_w) = pipe();

    let mut config = Config::default();
    config.session.hold = HoldPolicy::Error;
    config.session.log_file = Some(log_path.clone());
    let mut session = Session::new(host_r.as_raw_fd(), &config, Capabilities::detect());
    let mut term = StreamConsumer::new(Vec::new());

    session
        .spawn(
            &["sh", "-c", "i=0; while [ $i -lt 2000 ]; do echo line$i; i=$((i+1)); done"],
            PtySize::new(24, 80),
            &mut term,
        )
        .unwrap();
    run_until_closed(&mut session, &mut term, &host_r, &host_w);
    assert_eq!(reap_action(&session), Action::ExitProcess);

    let shown = term.into_inner();
    let logged = std::fs::read(&log_path).unwrap();
    assert_eq!(shown, logged);

    let text = String::from_utf8_lossy(&shown);
    let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 2000);
    assert_eq!(lines[0], "line0");
    assert_eq!(lines[1999], "line1999");
}

#[test]
#[serial]
fn test_send_reaches_child_and_echoes_when_asked() {
    let (host_r, host_w) = pipe();
    let mut session = session_with(HoldPolicy::Error, &host_r);
    let mut term = StreamConsumer::new(Vec::new());
    term.set_echo(true);

    session
        .spawn(&["head", "-n", "1"], PtySize::default(), &mut term)
        .unwrap();
    session.send_str(&mut term, "ping\r").unwrap();
    assert!(term.get_ref().starts_with(b"ping\r"));

    run_until_closed(&mut session, &mut term, &host_r, &host_w);
    reap_action(&session);
    let shown = String::from_utf8_lossy(term.get_ref()).into_owned();
    // Our echo, the pty's echo, then head's copy of the line.
    assert!(shown.matches("ping").count() >= 2, "got {:?}", shown);
}

#[test]
#[serial]
fn test_staged_paste_is_flushed_by_the_loop() {
    let (host_r, host_w) = pipe();
    let mut session = session_with(HoldPolicy::Error, &host_r);
    let mut term = StreamConsumer::new(Vec::new());

    session
        .spawn(&["head", "-n", "1"], PtySize::default(), &mut term)
        .unwrap();
    term.stage_paste(b"pasted\r".to_vec());
    run_until_closed(&mut session, &mut term, &host_r, &host_w);
    reap_action(&session);

    let shown = String::from_utf8_lossy(term.get_ref()).into_owned();
    assert!(shown.contains("pasted"), "got {:?}", shown);
}

#[test]
#[serial]
fn test_large_paste_into_echoing_child_keeps_the_loop_responsive() {
    let (host_r, host_w) = pipe();
    let mut session = session_with(HoldPolicy::Error, &host_r);
    let mut term = StreamConsumer::new(Vec::new());

    session.spawn(&["cat"], PtySize::default(), &mut term).unwrap();
    let paste: Vec<u8> = (0..20_000)
        .flat_map(|i| format!("line{}\n", i).into_bytes())
        .collect();
    term.stage_paste(paste);

    // A host event arrives while most of the paste is still queued.
    let waker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        notify(&host_w);
        host_w
    });
    let started = Instant::now();
    session.run(&mut term).unwrap();
    assert!(started.elapsed() < Duration::from_secs(5), "run stalled on the paste");
    let host_w = waker.join().unwrap();
    consume(&host_r);

    let deadline = Instant::now() + Duration::from_secs(30);
    while session.bridge().pending() > 0 {
        assert!(Instant::now() < deadline, "paste never drained");
        notify(&host_w);
        session.run(&mut term).unwrap();
        consume(&host_r);
    }

    // End of input for cat once every line is in.
    session.write(b"\x04").unwrap();
    run_until_closed(&mut session, &mut term, &host_r, &host_w);
    assert_eq!(reap_action(&session), Action::ExitProcess);

    let shown = String::from_utf8_lossy(term.get_ref()).into_owned();
    assert!(shown.contains("line19999\r\n"), "tail missing");
    assert_eq!(shown.matches("line12345\r\n").count(), 2);
}

// ====================
// Inspection
// ====================

#[test]
#[serial]
fn test_is_parent_sees_grandchildren() {
    let (host_r, _host_w) = pipe();
    let mut session = session_with(HoldPolicy::Error, &host_r);
    let mut term = StreamConsumer::new(Vec::new());
    assert!(!session.is_parent());

    session
        .spawn(&["sh", "-c", "sleep 30; true"], PtySize::default(), &mut term)
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !session.is_parent() {
        assert!(Instant::now() < deadline, "sleep never showed up");
        thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(session.kill_request(true), KillOutcome::ExitNow);
    reap_action(&session);
    assert!(!session.is_parent());
}

#[test]
#[serial]
fn test_resize_reaches_the_pty() {
    let (host_r, _host_w) = pipe();
    let mut session = session_with(HoldPolicy::Error, &host_r);
    let mut term = StreamConsumer::new(Vec::new());

    session
        .spawn(&["sleep", "30"], PtySize::default(), &mut term)
        .unwrap();
    session.resize(PtySize::new(50, 132)).unwrap();
    let fd = session.supervisor().pty_fd().unwrap();
    assert_eq!(PtySize::of_fd(fd), Some(PtySize::new(50, 132)));

    assert_eq!(session.kill_request(true), KillOutcome::ExitNow);
    reap_action(&session);
}

#[test]
#[serial]
fn test_second_spawn_is_refused_and_shown() {
    let (host_r, _host_w) = pipe();
    let mut session = session_with(HoldPolicy::Error, &host_r);
    let mut term = StreamConsumer::new(Vec::new());

    let pid = session
        .spawn(&["sleep", "30"], PtySize::default(), &mut term)
        .unwrap();
    assert!(matches!(
        session.spawn(&["sleep", "30"], PtySize::default(), &mut term),
        Err(SessionError::AlreadyRunning)
    ));
    assert_eq!(session.supervisor().pid(), Some(pid));
    let shown = String::from_utf8_lossy(term.get_ref()).into_owned();
    assert_eq!(shown, "Child process already running\r\n");

    assert_eq!(session.kill_request(true), KillOutcome::ExitNow);
    reap_action(&session);
}

#[test]
fn test_write_without_child_is_not_running() {
    let (host_r, _host_w) = pipe();
    let session = session_with(HoldPolicy::Default, &host_r);
    assert!(matches!(
        session.supervisor().try_write(b"x"),
        Err(SessionError::NotRunning)
    ));
}
