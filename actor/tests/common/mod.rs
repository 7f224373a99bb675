// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Shared actors for the integration tests.

#![allow(dead_code)]

use actor::{
    Actor, ActorContext, ActorIdentity, ActorRef, ActorSystem, AnyMessage,
    Error, Identify, Props, Receive, ReceiveTimeout, SupervisorStrategy,
    SystemConfig, SystemRef, SystemRunner, Terminated,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

/// Ordered record of what the actors observed.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn count(log: &Log, entry: &str) -> usize {
    entries(log).iter().filter(|e| e.as_str() == entry).count()
}

pub fn position(log: &Log, entry: &str) -> Option<usize> {
    entries(log).iter().position(|e| e.as_str() == entry)
}

/// Prints the actor logs of a failing test. Filtered with `RUST_LOG`.
pub fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn standalone() -> (SystemRef, SystemRunner) {
    init_logs();
    ActorSystem::create(SystemConfig::default(), CancellationToken::new())
}

/// Asks the receiver to watch the wrapped reference.
pub struct Watch(pub ActorRef);

/// Asks the receiver to unwatch the wrapped reference.
pub struct Unwatch(pub ActorRef);

/// Asks the receiver to send `message` to `path`.
pub struct SendTo {
    pub path: String,
    pub message: String,
}

/// Asks the receiver to send `Identify(correlation)` to `path`.
pub struct IdentifyAt {
    pub path: String,
    pub correlation: u64,
}

/// Actor that writes every message and hook into a shared log.
///
/// String commands:
/// * `fail` returns an error, `panic` panics.
/// * `ping` answers `pong` to the sender.
/// * `count` increments a counter that starts over with every incarnation.
/// * `become` / `become-discard` switch to [`Loud`], `unbecome` goes back.
/// * `timeout:<ms>` sets the receive timeout, `no-timeout` clears it.
#[derive(Clone)]
pub struct Recorder {
    name: String,
    log: Log,
    count: u32,
    children: usize,
    strategy: SupervisorStrategy,
}

impl Recorder {
    pub fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_owned(),
            log: log.clone(),
            count: 0,
            children: 0,
            strategy: SupervisorStrategy::default(),
        }
    }

    /// Spawns `c0..c<n>` on every start.
    pub fn with_children(mut self, children: usize) -> Self {
        self.children = children;
        self
    }

    pub fn with_strategy(mut self, strategy: SupervisorStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn props(self) -> Props {
        Props::from_clone(self)
    }

    pub fn record(&self, entry: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, entry));
    }
}

#[async_trait]
impl Actor for Recorder {
    async fn pre_start(
        &mut self,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        self.record("pre_start");
        for index in 0..self.children {
            let name = format!("c{}", index);
            let child = Recorder::new(&format!("{}/{}", self.name, name), &self.log);
            ctx.spawn(child.props(), &name)?;
        }
        Ok(())
    }

    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        self.record("post_stop");
        Ok(())
    }

    async fn pre_restart(
        &mut self,
        ctx: &mut ActorContext<Self>,
        cause: &Error,
        _message: Option<&AnyMessage>,
    ) -> Result<(), Error> {
        self.record(&format!("pre_restart {}", cause));
        for child in ctx.children() {
            ctx.stop(&child);
        }
        Ok(())
    }

    async fn post_restart(
        &mut self,
        ctx: &mut ActorContext<Self>,
        _cause: &Error,
    ) -> Result<(), Error> {
        self.record("post_restart");
        self.pre_start(ctx).await
    }

    async fn receive(
        &mut self,
        ctx: &mut ActorContext<Self>,
        message: &AnyMessage,
    ) -> Result<(), Error> {
        if let Some(text) = message.downcast_ref::<String>() {
            self.record(text);
            match text.as_str() {
                "fail" => return Err(Error::Functional("boom".to_owned())),
                "panic" => panic!("boom"),
                "ping" => {
                    if let Some(sender) = ctx.sender() {
                        sender.tell("pong".to_owned(), Some(ctx.self_ref()));
                    }
                }
                "count" => {
                    self.count += 1;
                    self.record(&format!("count={}", self.count));
                }
                "become" => ctx.become_behavior(Loud, false),
                "become-discard" => ctx.become_behavior(Loud, true),
                "no-timeout" => ctx.set_receive_timeout(None),
                other => {
                    if let Some(millis) = other.strip_prefix("timeout:") {
                        let millis = millis
                            .parse::<u64>()
                            .map_err(|e| Error::Functional(e.to_string()))?;
                        ctx.set_receive_timeout(Some(Duration::from_millis(
                            millis,
                        )));
                    }
                }
            }
        } else if let Some(terminated) = message.downcast_ref::<Terminated>() {
            self.record(&format!(
                "terminated {} {}",
                terminated.actor.path().key(),
                terminated.existence_confirmed
            ));
        } else if let Some(Watch(target)) = message.downcast_ref::<Watch>() {
            ctx.watch(target);
        } else if let Some(Unwatch(target)) = message.downcast_ref::<Unwatch>() {
            ctx.unwatch(target);
        } else if let Some(send) = message.downcast_ref::<SendTo>() {
            let target = ctx.system().actor_ref(&send.path);
            target.tell(send.message.clone(), Some(ctx.self_ref()));
        } else if let Some(identify) = message.downcast_ref::<IdentifyAt>() {
            let target = ctx.system().actor_ref(&identify.path);
            target.tell(Identify(identify.correlation), Some(ctx.self_ref()));
        } else if let Some(identity) = message.downcast_ref::<ActorIdentity>() {
            let subject = identity
                .subject
                .as_ref()
                .map(|subject| subject.path().key())
                .unwrap_or_default();
            self.record(&format!(
                "identity {} {}",
                identity.correlation, subject
            ));
        } else if message.is::<ReceiveTimeout>() {
            self.record("timeout");
        }
        Ok(())
    }

    fn supervisor_strategy(&self) -> SupervisorStrategy {
        self.strategy.clone()
    }
}

/// Alternative handler: records strings in upper case.
pub struct Loud;

#[async_trait]
impl Receive<Recorder> for Loud {
    async fn receive(
        &self,
        actor: &mut Recorder,
        ctx: &mut ActorContext<Recorder>,
        message: &AnyMessage,
    ) -> Result<(), Error> {
        if let Some(text) = message.downcast_ref::<String>() {
            actor.record(&text.to_uppercase());
            match text.as_str() {
                "unbecome" => ctx.unbecome(),
                "become" => ctx.become_behavior(Loud, false),
                _ => {}
            }
        }
        Ok(())
    }
}
