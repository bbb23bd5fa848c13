//! Lifecycle tests for the worker supervisor.
//!
//! These spawn real `sh`/`sleep` processes and only run on unix.

#![cfg(unix)]

use roomgate_worker::{TerminationOutcome, WorkerConfig, WorkerError, WorkerSupervisor};
use std::sync::Arc;
use std::time::Duration;

/// A worker that sleeps until signalled. `$1` is the room name.
fn sleeper() -> WorkerConfig {
    let mut config = WorkerConfig::new(
        "sh",
        ["-c", "sleep 30", "roomgate-test-worker", "{room}"],
    );
    config.grace_period_ms = 2000;
    config
}

/// True if a process with this pid is still running.
///
/// Orphans reparented to an init that never reaps them linger as zombies,
/// so a `Z` state in `/proc` counts as gone.
fn process_exists(pid: u32) -> bool {
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        let state = stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next());
        return state != Some('Z');
    }
    // SAFETY: signal 0 only checks for existence and permission.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

async fn wait_until_gone(pid: u32) -> bool {
    for _ in 0..250 {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// A worker that backgrounds a `sleep` and writes its pid to `pidfile`.
/// `tail` runs after the fork, e.g. `wait` or `exit 0`.
fn forking_worker(pidfile: &std::path::Path, tail: &str) -> WorkerConfig {
    let script = format!("sleep 30 & echo $! > \"$0\"; {tail}");
    let mut config = WorkerConfig::new(
        "sh",
        [
            "-c".to_string(),
            script,
            pidfile.to_string_lossy().into_owned(),
            "{room}".to_string(),
        ],
    );
    config.grace_period_ms = 500;
    config
}

async fn read_pidfile(path: &std::path::Path) -> u32 {
    for _ in 0..250 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("worker never wrote {}", path.display());
}

/// A worker that ignores SIGTERM, so stopping it takes the whole grace period.
fn stubborn(grace_period_ms: u64) -> WorkerConfig {
    let mut config = WorkerConfig::new(
        "sh",
        ["-c", "trap '' TERM; sleep 30", "roomgate-test-worker", "{room}"],
    );
    config.grace_period_ms = grace_period_ms;
    config
}

async fn wait_until_dead(supervisor: &WorkerSupervisor) {
    for _ in 0..250 {
        match supervisor.current().await {
            Some(status) if status.alive => tokio::time::sleep(Duration::from_millis(20)).await,
            _ => return,
        }
    }
    panic!("worker did not exit in time");
}

#[tokio::test]
async fn test_bind_launches_worker_with_room_argument() {
    let supervisor = WorkerSupervisor::new(sleeper());

    let report = supervisor.bind("r1").await.expect("bind should succeed");
    assert!(!report.reused);
    assert!(report.superseded.is_none());
    assert_eq!(report.worker.room, "r1");
    assert_eq!(report.worker.program, "sh");
    assert_eq!(report.worker.args.last().map(String::as_str), Some("r1"));
    assert!(report.worker.alive);
    assert!(process_exists(report.worker.pid));

    let current = supervisor.current().await.expect("a worker should be tracked");
    assert_eq!(current.pid, report.worker.pid);

    assert_eq!(supervisor.shutdown().await, Some(TerminationOutcome::Terminated));
    assert!(supervisor.current().await.is_none());
}

#[tokio::test]
async fn test_bind_supersedes_previous_worker() {
    let supervisor = WorkerSupervisor::new(sleeper());

    let first = supervisor.bind("room-a").await.unwrap();
    let second = supervisor.bind("room-b").await.unwrap();

    let superseded = second.superseded.expect("room-a worker should be superseded");
    assert_eq!(superseded.pid, first.worker.pid);
    assert_eq!(superseded.room, "room-a");
    assert_eq!(superseded.outcome, TerminationOutcome::Terminated);

    assert!(
        !process_exists(first.worker.pid),
        "room-a worker should be gone"
    );
    assert!(process_exists(second.worker.pid));

    let current = supervisor.current().await.unwrap();
    assert_eq!(current.room, "room-b");
    assert_eq!(current.pid, second.worker.pid);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_same_room_is_superseded_by_default() {
    let supervisor = WorkerSupervisor::new(sleeper());

    let first = supervisor.bind("lobby").await.unwrap();
    let second = supervisor.bind("lobby").await.unwrap();

    assert!(!second.reused);
    assert_ne!(first.worker.pid, second.worker.pid);
    assert_eq!(
        second.superseded.map(|s| s.outcome),
        Some(TerminationOutcome::Terminated)
    );

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_reuse_live_worker_for_same_room() {
    let mut config = sleeper();
    config.reuse_live_worker = true;
    let supervisor = WorkerSupervisor::new(config);

    let first = supervisor.bind("lobby").await.unwrap();
    let again = supervisor.bind("lobby").await.unwrap();
    assert!(again.reused);
    assert!(again.superseded.is_none());
    assert_eq!(again.worker.pid, first.worker.pid);

    let other = supervisor.bind("stage").await.unwrap();
    assert!(!other.reused);
    assert_eq!(other.superseded.map(|s| s.pid), Some(first.worker.pid));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_launch_failure_reports_program() {
    let supervisor = WorkerSupervisor::new(WorkerConfig::new(
        "/nonexistent/roomgate-worker",
        ["{room}"],
    ));
    match supervisor.bind("room-b").await {
        Err(WorkerError::Launch { program, .. }) => {
            assert_eq!(program, "/nonexistent/roomgate-worker")
        }
        other => panic!("expected launch error, got {:?}", other),
    }
    assert!(supervisor.current().await.is_none());
}

#[tokio::test]
async fn test_launch_failure_after_supersede_leaves_no_worker() {
    use std::os::unix::fs::PermissionsExt;

    let dir = std::env::temp_dir().join(format!("roomgate-worker-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let script = dir.join("agent.sh");
    std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = WorkerConfig::new(script.to_string_lossy(), ["{room}"]);
    config.grace_period_ms = 2000;
    let supervisor = WorkerSupervisor::new(config);

    let first = supervisor.bind("room-a").await.unwrap();

    // The worker program disappears between sessions.
    std::fs::remove_file(&script).unwrap();
    let result = supervisor.bind("room-b").await;
    assert!(matches!(result, Err(WorkerError::Launch { .. })));

    assert!(!process_exists(first.worker.pid), "old worker should still be stopped");
    assert!(supervisor.current().await.is_none(), "slot must not keep a stale handle");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_worker_exit_is_observed() {
    let supervisor = WorkerSupervisor::new(WorkerConfig::new(
        "sh",
        ["-c", "exit 3", "roomgate-test-worker", "{room}"],
    ));

    supervisor.bind("short-lived").await.unwrap();
    wait_until_dead(&supervisor).await;

    let status = supervisor.current().await.expect("handle stays tracked");
    assert!(!status.alive);

    // Superseding a worker that already exited reports NotFound.
    let next = supervisor.bind("short-lived-2").await.unwrap();
    assert_eq!(
        next.superseded.map(|s| s.outcome),
        Some(TerminationOutcome::NotFound)
    );

    wait_until_dead(&supervisor).await;
    assert_eq!(supervisor.shutdown().await, Some(TerminationOutcome::NotFound));
}

#[tokio::test]
async fn test_sigterm_ignoring_worker_is_killed() {
    let supervisor = WorkerSupervisor::new(stubborn(200));

    let stubborn = supervisor.bind("stubborn").await.unwrap();
    // Give the shell a moment to install the trap.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(supervisor.shutdown().await, Some(TerminationOutcome::Terminated));
    assert!(!process_exists(stubborn.worker.pid));
}

#[tokio::test]
async fn test_concurrent_binds_leave_one_live_worker() {
    let mut config = sleeper();
    config.grace_period_ms = 1000;
    let supervisor = Arc::new(WorkerSupervisor::new(config));

    let mut handles = Vec::new();
    for i in 0..8 {
        let supervisor = supervisor.clone();
        handles.push(tokio::spawn(async move {
            supervisor.bind(&format!("room-{i}")).await
        }));
    }

    let mut pids = Vec::new();
    for handle in handles {
        let report = handle
            .await
            .expect("task should not panic")
            .expect("bind should succeed");
        pids.push(report.worker.pid);
    }

    let current = supervisor.current().await.expect("one worker is current");
    let alive: Vec<u32> = pids.into_iter().filter(|pid| process_exists(*pid)).collect();
    assert_eq!(alive, vec![current.pid], "only the current worker should be running");

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_empty_room_rejected() {
    let supervisor = WorkerSupervisor::new(sleeper());
    assert!(matches!(
        supervisor.bind(" ").await,
        Err(WorkerError::InvalidRoom(_))
    ));
    assert!(supervisor.current().await.is_none());
}

#[tokio::test]
async fn test_superseded_worker_children_are_terminated() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("child.pid");
    let supervisor = WorkerSupervisor::new(forking_worker(&pidfile, "wait"));

    let first = supervisor.bind("room-a").await.unwrap();
    let child = read_pidfile(&pidfile).await;
    assert!(process_exists(child));

    std::fs::remove_file(&pidfile).unwrap();
    let second = supervisor.bind("room-b").await.unwrap();
    assert_eq!(
        second.superseded.map(|s| s.outcome),
        Some(TerminationOutcome::Terminated)
    );
    assert!(!process_exists(first.worker.pid));
    assert!(wait_until_gone(child).await, "room-a child {child} survived");

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_children_of_exited_worker_are_terminated() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("child.pid");
    let supervisor = WorkerSupervisor::new(forking_worker(&pidfile, "exit 0"));

    supervisor.bind("room-a").await.unwrap();
    let child = read_pidfile(&pidfile).await;
    wait_until_dead(&supervisor).await;
    assert!(process_exists(child), "the orphaned child outlives its parent");

    std::fs::remove_file(&pidfile).unwrap();
    let next = supervisor.bind("room-b").await.unwrap();
    assert_eq!(
        next.superseded.map(|s| s.outcome),
        Some(TerminationOutcome::Terminated)
    );
    assert!(wait_until_gone(child).await, "orphan {child} survived");

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_dropped_bind_still_replaces_worker() {
    let supervisor = WorkerSupervisor::new(stubborn(500));

    let first = supervisor.bind("room-a").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The caller gives up while room-a is still inside its grace period.
    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), supervisor.bind("room-b")).await;
    assert!(abandoned.is_err(), "bind should still be waiting on room-a");

    let current = supervisor.current().await.expect("room-b should be launched");
    assert_eq!(current.room, "room-b");
    assert!(current.alive);
    assert!(!process_exists(first.worker.pid));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_try_current_reports_busy_during_bind() {
    let supervisor = Arc::new(WorkerSupervisor::new(stubborn(500)));
    supervisor.bind("room-a").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        supervisor.try_current().unwrap().map(|s| s.room),
        Some("room-a".to_string())
    );

    let binding = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.bind("room-b").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(supervisor.try_current(), Err(WorkerError::Busy)));

    binding.await.unwrap().unwrap();
    assert_eq!(
        supervisor.try_current().unwrap().map(|s| s.room),
        Some("room-b".to_string())
    );

    supervisor.shutdown().await;
}
