// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Integration tests for failure handling and supervisor strategies.

mod common;

use common::*;

use actor::{
    Directive, Error, Lifecycle, SupervisorStrategy, escalating_decider,
};

use std::time::Duration;

fn resuming_decider(_error: &Error) -> Directive {
    Directive::Resume
}

fn restarting_decider(_error: &Error) -> Directive {
    Directive::Restart
}

#[tokio::test]
async fn test_restart_directive_creates_fresh_instance() {
    let log = new_log();
    let (system, mut runner) = standalone();
    let a = system.spawn(Recorder::new("a", &log).props(), "a").unwrap();

    for text in ["count", "count", "fail", "count"] {
        a.tell(text.to_owned(), None);
    }
    runner.run_until_idle().await;

    assert_eq!(
        entries(&log),
        vec![
            "a:pre_start",
            "a:count",
            "a:count=1",
            "a:count",
            "a:count=2",
            "a:fail",
            "a:pre_restart Error: boom",
            "a:post_restart",
            "a:pre_start",
            "a:count",
            "a:count=1",
        ]
    );
    assert_eq!(a.as_local().unwrap().lifecycle(), Lifecycle::Running);
    assert!(!system.is_terminated());
}

#[tokio::test]
async fn test_panics_are_failures() {
    let log = new_log();
    let (system, mut runner) = standalone();
    let a = system.spawn(Recorder::new("a", &log).props(), "a").unwrap();

    a.tell("count".to_owned(), None);
    a.tell("panic".to_owned(), None);
    a.tell("count".to_owned(), None);
    runner.run_until_idle().await;

    assert_eq!(count(&log, "a:pre_restart Handler panicked: boom"), 1);
    assert_eq!(count(&log, "a:count=1"), 2);
    assert!(!system.is_terminated());
}

#[tokio::test]
async fn test_resume_directive_keeps_state() {
    let log = new_log();
    let (system, mut runner) = standalone();
    let parent = Recorder::new("p", &log)
        .with_children(1)
        .with_strategy(SupervisorStrategy::one_for_one(resuming_decider));
    system.spawn(parent.props(), "p").unwrap();
    runner.run_until_idle().await;

    let child = system.actor_ref("/user/p/c0");
    for text in ["count", "fail", "count"] {
        child.tell(text.to_owned(), None);
    }
    runner.run_until_idle().await;

    assert_eq!(count(&log, "p/c0:count=1"), 1);
    assert_eq!(count(&log, "p/c0:count=2"), 1);
    assert!(!entries(&log).iter().any(|e| e.contains("restart")));
    assert_eq!(
        child.as_local().unwrap().lifecycle(),
        Lifecycle::Running
    );
}

#[tokio::test]
async fn test_stop_directive() {
    let log = new_log();
    let (system, mut runner) = standalone();
    let parent = Recorder::new("p", &log)
        .with_children(2)
        .with_strategy(SupervisorStrategy::stopping());
    let p = system.spawn(parent.props(), "p").unwrap();
    runner.run_until_idle().await;

    let c0 = system.actor_ref("/user/p/c0");
    c0.tell("fail".to_owned(), None);
    c0.tell("after".to_owned(), None);
    runner.run_until_idle().await;

    assert!(c0.is_terminated());
    assert_eq!(count(&log, "p/c0:post_stop"), 1);
    assert_eq!(count(&log, "p/c0:after"), 0);
    assert!(p.child(&["c0"]).is_nobody());
    assert!(p.child(&["c1"]).is_local());
    assert_eq!(count(&log, "p/c1:post_stop"), 0);
}

#[tokio::test]
async fn test_restart_stops_children_before_new_instance() {
    let log = new_log();
    let (system, mut runner) = standalone();
    let p = system
        .spawn(Recorder::new("p", &log).with_children(3).props(), "p")
        .unwrap();
    runner.run_until_idle().await;
    let old_children: Vec<_> = (0..3)
        .map(|i| system.actor_ref(&format!("/user/p/c{}", i)))
        .collect();

    p.tell("fail".to_owned(), None);
    runner.run_until_idle().await;

    let post_restart = position(&log, "p:post_restart").unwrap();
    for i in 0..3 {
        let stop = format!("p/c{}:post_stop", i);
        assert_eq!(count(&log, &stop), 1);
        assert!(position(&log, &stop).unwrap() < post_restart);
        // Fresh children were spawned by the new instance.
        assert_eq!(count(&log, &format!("p/c{}:pre_start", i)), 2);
    }
    for old in old_children {
        assert!(old.is_terminated());
    }
    let new_child = system.actor_ref("/user/p/c0");
    assert!(new_child.is_local());
    assert!(!new_child.is_terminated());
}

#[tokio::test]
async fn test_suspend_and_resume_while_restarting_are_replayed() {
    let log = new_log();
    let (system, mut runner) = standalone();
    let p = system
        .spawn(Recorder::new("p", &log).with_children(2).props(), "p")
        .unwrap();
    runner.run_until_idle().await;
    let local = p.as_local().unwrap().clone();

    p.tell("fail".to_owned(), None);
    p.tell("after".to_owned(), None);
    while local.lifecycle() != Lifecycle::Restarting {
        assert!(runner.run_once().await);
    }
    local.suspend();
    local.resume(None);
    runner.run_until_idle().await;

    assert_eq!(local.lifecycle(), Lifecycle::Running);
    assert_eq!(count(&log, "p:post_restart"), 1);
    assert_eq!(count(&log, "p:after"), 1);
    assert!(
        position(&log, "p:post_restart").unwrap()
            < position(&log, "p:after").unwrap()
    );
}

#[tokio::test]
async fn test_all_for_one_restarts_siblings() {
    let log = new_log();
    let (system, mut runner) = standalone();
    let parent = Recorder::new("p", &log)
        .with_children(2)
        .with_strategy(SupervisorStrategy::all_for_one(restarting_decider));
    system.spawn(parent.props(), "p").unwrap();
    runner.run_until_idle().await;

    system.actor_ref("/user/p/c1").tell("count".to_owned(), None);
    system.actor_ref("/user/p/c0").tell("fail".to_owned(), None);
    runner.run_until_idle().await;
    system.actor_ref("/user/p/c1").tell("count".to_owned(), None);
    runner.run_until_idle().await;

    assert_eq!(count(&log, "p/c0:post_restart"), 1);
    assert_eq!(count(&log, "p/c1:post_restart"), 1);
    assert_eq!(count(&log, "p:post_restart"), 0);
    // The sibling lost its state.
    assert_eq!(count(&log, "p/c1:count=1"), 2);
    assert_eq!(count(&log, "p/c1:count=2"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_window_exhaustion_stops_the_child() {
    let log = new_log();
    let (system, mut runner) = standalone();
    let parent = Recorder::new("p", &log).with_children(1).with_strategy(
        SupervisorStrategy::one_for_one(restarting_decider)
            .with_retries(2, Some(Duration::from_secs(10))),
    );
    system.spawn(parent.props(), "p").unwrap();
    runner.run_until_idle().await;
    let child = system.actor_ref("/user/p/c0");

    child.tell("fail".to_owned(), None);
    runner.run_until_idle().await;
    child.tell("fail".to_owned(), None);
    runner.run_until_idle().await;
    assert_eq!(count(&log, "p/c0:post_restart"), 2);
    assert!(!child.is_terminated());

    child.tell("fail".to_owned(), None);
    runner.run_until_idle().await;
    assert_eq!(count(&log, "p/c0:post_restart"), 2);
    assert!(child.is_terminated());
}

#[tokio::test(start_paused = true)]
async fn test_retry_window_resets_after_elapsing() {
    let log = new_log();
    let (system, mut runner) = standalone();
    let parent = Recorder::new("p", &log).with_children(1).with_strategy(
        SupervisorStrategy::one_for_one(restarting_decider)
            .with_retries(1, Some(Duration::from_secs(1))),
    );
    system.spawn(parent.props(), "p").unwrap();
    runner.run_until_idle().await;
    let child = system.actor_ref("/user/p/c0");

    for _ in 0..3 {
        child.tell("fail".to_owned(), None);
        runner.run_until_idle().await;
        tokio::time::advance(Duration::from_secs(2)).await;
    }
    assert_eq!(count(&log, "p/c0:post_restart"), 3);
    assert!(!child.is_terminated());
}

#[tokio::test]
async fn test_escalation_reaches_grandparent() {
    let log = new_log();
    let (system, mut runner) = standalone();
    let parent = Recorder::new("p", &log)
        .with_children(1)
        .with_strategy(SupervisorStrategy::one_for_one(escalating_decider));
    system.spawn(parent.props(), "p").unwrap();
    runner.run_until_idle().await;

    system.actor_ref("/user/p/c0").tell("fail".to_owned(), None);
    runner.run_until_idle().await;

    // The user guardian restarts the parent, which replaces its children.
    assert_eq!(count(&log, "p:pre_restart Error: boom"), 1);
    assert_eq!(count(&log, "p:post_restart"), 1);
    assert_eq!(count(&log, "p/c0:post_stop"), 1);
    assert_eq!(count(&log, "p/c0:pre_start"), 2);
    assert_eq!(count(&log, "p/c0:post_restart"), 0);
    assert!(!system.is_terminated());
}
