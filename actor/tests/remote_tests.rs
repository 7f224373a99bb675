// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Integration tests for workers talking through the in-memory hub.

mod common;

use common::*;

use actor::{
    ActorSystem, DeadLetterReason, LocalHub, PoisonPill, SystemConfig,
    SystemRef, SystemRunner, WorkerAddress,
};
use tokio_util::sync::CancellationToken;

fn worker(hub: &LocalHub, name: &str) -> (SystemRef, SystemRunner) {
    init_logs();
    let (transport, inbound) = hub
        .attach(WorkerAddress::worker("cluster", name))
        .unwrap();
    ActorSystem::connect(
        SystemConfig::new("cluster").with_worker(name),
        CancellationToken::new(),
        transport,
        inbound,
    )
    .unwrap()
}

async fn settle(runners: &mut [&mut SystemRunner]) {
    for _ in 0..4 {
        for runner in runners.iter_mut() {
            runner.run_until_idle().await;
        }
    }
}

#[tokio::test]
async fn test_remote_ping_pong() {
    let log = new_log();
    let hub = LocalHub::new();
    let (system_a, mut runner_a) = worker(&hub, "a");
    let (system_b, mut runner_b) = worker(&hub, "b");
    let pinger = system_a
        .spawn(Recorder::new("pinger", &log).props(), "pinger")
        .unwrap();
    system_b
        .spawn(Recorder::new("ponger", &log).props(), "ponger")
        .unwrap();
    settle(&mut [&mut runner_a, &mut runner_b]).await;

    pinger.tell(
        SendTo {
            path: "rush://cluster@b/user/ponger".to_owned(),
            message: "ping".to_owned(),
        },
        None,
    );
    settle(&mut [&mut runner_a, &mut runner_b]).await;

    assert_eq!(count(&log, "ponger:ping"), 1);
    assert_eq!(count(&log, "pinger:pong"), 1);
}

#[tokio::test]
async fn test_remote_string_literal_arrives_as_string() {
    let log = new_log();
    let hub = LocalHub::new();
    let (system_a, mut runner_a) = worker(&hub, "a");
    let (system_b, mut runner_b) = worker(&hub, "b");
    let pinger = system_a
        .spawn(Recorder::new("pinger", &log).props(), "pinger")
        .unwrap();
    system_b
        .spawn(Recorder::new("ponger", &log).props(), "ponger")
        .unwrap();
    settle(&mut [&mut runner_a, &mut runner_b]).await;

    system_a
        .actor_ref("rush://cluster@b/user/ponger")
        .tell("ping", Some(pinger));
    settle(&mut [&mut runner_a, &mut runner_b]).await;

    assert_eq!(count(&log, "ponger:ping"), 1);
    assert_eq!(count(&log, "pinger:pong"), 1);
}

#[tokio::test]
async fn test_remote_reference_paths() {
    let hub = LocalHub::new();
    let (system_a, _runner_a) = worker(&hub, "a");

    let remote = system_a.actor_ref("rush://cluster@b/user/ponger");
    assert!(remote.is_remote());
    assert_eq!(
        remote.parent().path().to_string(),
        "rush://cluster@b/user"
    );
    assert_eq!(
        remote.child(&["x", "y"]).path().to_string(),
        "rush://cluster@b/user/ponger/x/y"
    );
    assert!(!remote.is_terminated());

    // The own address resolves locally.
    let own = system_a.actor_ref("rush://cluster@a/user");
    assert!(own.is_local());
}

#[tokio::test]
async fn test_remote_stale_uid_is_a_dead_letter() {
    let log = new_log();
    let hub = LocalHub::new();
    let (system_a, mut runner_a) = worker(&hub, "a");
    let (system_b, mut runner_b) = worker(&hub, "b");
    let mut dead_letters = system_b.dead_letters();
    let pinger = system_a
        .spawn(Recorder::new("pinger", &log).props(), "pinger")
        .unwrap();
    let ponger = system_b
        .spawn(Recorder::new("ponger", &log).props(), "ponger")
        .unwrap();
    settle(&mut [&mut runner_a, &mut runner_b]).await;

    pinger.tell(
        SendTo {
            path: format!(
                "rush://cluster@b/user/ponger#{}",
                ponger.path().uid() + 1000
            ),
            message: "ping".to_owned(),
        },
        None,
    );
    settle(&mut [&mut runner_a, &mut runner_b]).await;

    assert_eq!(count(&log, "ponger:ping"), 0);
    let letter = dead_letters.try_recv().unwrap();
    assert_eq!(letter.reason, DeadLetterReason::NoSuchActor);
    assert_eq!(letter.recipient.key(), "ponger");
}

#[tokio::test]
async fn test_remote_death_watch() {
    let log = new_log();
    let hub = LocalHub::new();
    let (system_a, mut runner_a) = worker(&hub, "a");
    let (system_b, mut runner_b) = worker(&hub, "b");
    let pinger = system_a
        .spawn(Recorder::new("pinger", &log).props(), "pinger")
        .unwrap();
    let ponger = system_b
        .spawn(Recorder::new("ponger", &log).props(), "ponger")
        .unwrap();
    settle(&mut [&mut runner_a, &mut runner_b]).await;

    let remote = system_a.actor_ref("rush://cluster@b/user/ponger");
    pinger.tell(Watch(remote), None);
    settle(&mut [&mut runner_a, &mut runner_b]).await;
    ponger.tell(PoisonPill, None);
    settle(&mut [&mut runner_a, &mut runner_b]).await;

    assert!(ponger.is_terminated());
    assert_eq!(count(&log, "pinger:terminated ponger true"), 1);
}

#[tokio::test]
async fn test_remote_watch_of_missing_actor() {
    let log = new_log();
    let hub = LocalHub::new();
    let (system_a, mut runner_a) = worker(&hub, "a");
    let (_system_b, mut runner_b) = worker(&hub, "b");
    let pinger = system_a
        .spawn(Recorder::new("pinger", &log).props(), "pinger")
        .unwrap();

    let remote = system_a.actor_ref("rush://cluster@b/user/ghost");
    pinger.tell(Watch(remote), None);
    settle(&mut [&mut runner_a, &mut runner_b]).await;

    assert_eq!(count(&log, "pinger:terminated ghost false"), 1);
}

#[tokio::test]
async fn test_unreachable_worker_is_a_dead_letter() {
    let log = new_log();
    let hub = LocalHub::new();
    let (system_a, mut runner_a) = worker(&hub, "a");
    let mut dead_letters = system_a.dead_letters();
    let pinger = system_a
        .spawn(Recorder::new("pinger", &log).props(), "pinger")
        .unwrap();

    pinger.tell(
        SendTo {
            path: "rush://cluster@c/user/anyone".to_owned(),
            message: "ping".to_owned(),
        },
        None,
    );
    runner_a.run_until_idle().await;

    let letter = dead_letters.try_recv().unwrap();
    assert!(matches!(letter.reason, DeadLetterReason::Transport(_)));
    assert!(!system_a.is_terminated());
}

#[tokio::test]
async fn test_unregistered_message_is_a_dead_letter() {
    struct Opaque;

    let hub = LocalHub::new();
    let (system_a, mut runner_a) = worker(&hub, "a");
    let mut dead_letters = system_a.dead_letters();

    system_a
        .actor_ref("rush://cluster@b/user/ponger")
        .tell(Opaque, None);
    runner_a.run_until_idle().await;

    let letter = dead_letters.try_recv().unwrap();
    assert!(matches!(letter.reason, DeadLetterReason::Codec(_)));
}
