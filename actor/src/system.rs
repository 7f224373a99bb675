// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The `system` module provides the `ActorSystem` type. The `ActorSystem` builds a worker:
//! the root guardian `/`, the user guardian `/user` below it, the dispatcher, the codec and,
//! for networked workers, the router in front of the transport. It hands back a
//! [`SystemRef`] to spawn and look up actors and a [`SystemRunner`] that drives the worker.
//!

use crate::{
    ActorContext, ActorPath, ActorRef, Error, Event, Terminated, WorkerAddress,
    actor::{Actor, Props},
    cell::{ActorCell, lock},
    codec::{Codec, CodecContext, PathResolver},
    config::SystemConfig,
    dead_letter::{DeadLetter, DeadLetters},
    dispatcher::Dispatcher,
    message::AnyMessage,
    reference::{LocalActorRef, NobodyRef, RemoteActorRef},
    router::Router,
    sink::Sink,
    supervision::SupervisorStrategy,
    transport::{InboundFrames, Transport},
};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc::error::TryRecvError};
use tokio_util::sync::CancellationToken;

use tracing::{debug, error};

use std::{
    any::Any,
    collections::HashMap,
    fmt::{Debug, Formatter},
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

/// Actor system.
///
pub struct ActorSystem {}

impl ActorSystem {
    /// Create a standalone worker.
    ///
    /// # Returns
    ///
    /// Returns a tuple with the system reference and the system runner.
    pub fn create(
        config: SystemConfig,
        token: CancellationToken,
    ) -> (SystemRef, SystemRunner) {
        let address = config.address();
        start(config, address, Codec::default(), None, token)
    }

    /// Create a worker connected to other workers through `transport`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Start` if the transport address does not name a worker of the
    /// configured system.
    ///
    pub fn connect(
        config: SystemConfig,
        token: CancellationToken,
        transport: Arc<dyn Transport>,
        inbound: InboundFrames,
    ) -> Result<(SystemRef, SystemRunner), Error> {
        Self::builder(config)
            .transport(transport, inbound)
            .build(token)
    }

    /// Builder for workers that need a custom codec.
    pub fn builder(config: SystemConfig) -> SystemBuilder {
        SystemBuilder {
            config,
            codec: None,
            transport: None,
        }
    }
}

/// Step-by-step construction of a worker.
pub struct SystemBuilder {
    config: SystemConfig,
    codec: Option<Codec>,
    transport: Option<(Arc<dyn Transport>, InboundFrames)>,
}

impl SystemBuilder {
    /// Codec shared by every worker of the system. Defaults to the built-in registrations.
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Connects the worker to other workers.
    pub fn transport(
        mut self,
        transport: Arc<dyn Transport>,
        inbound: InboundFrames,
    ) -> Self {
        self.transport = Some((transport, inbound));
        self
    }

    /// Builds the worker.
    ///
    /// # Errors
    ///
    /// Returns `Error::Start` if the transport address does not match the configuration.
    ///
    pub fn build(
        self,
        token: CancellationToken,
    ) -> Result<(SystemRef, SystemRunner), Error> {
        let codec = self.codec.unwrap_or_default();
        match self.transport {
            None => {
                let address = self.config.address();
                Ok(start(self.config, address, codec, None, token))
            }
            Some((transport, inbound)) => {
                let address = transport.address().clone();
                if address.is_local() || address.system() != self.config.name {
                    return Err(Error::Start(format!(
                        "transport address {} does not belong to system {}",
                        address, self.config.name
                    )));
                }
                if let Some(worker) = &self.config.worker {
                    if address.worker_name() != Some(worker.as_str()) {
                        return Err(Error::Start(format!(
                            "transport address {} is not worker {}",
                            address, worker
                        )));
                    }
                }
                Ok(start(
                    self.config,
                    address,
                    codec,
                    Some((transport, inbound)),
                    token,
                ))
            }
        }
    }
}

fn start(
    config: SystemConfig,
    address: WorkerAddress,
    codec: Codec,
    transport: Option<(Arc<dyn Transport>, InboundFrames)>,
    token: CancellationToken,
) -> (SystemRef, SystemRunner) {
    let (transport, inbound) = match transport {
        Some((transport, inbound)) => (Some(transport), Some(inbound)),
        None => (None, None),
    };
    let system = SystemRef {
        inner: Arc::new(SystemInner {
            local_address: WorkerAddress::local(&config.name),
            address,
            dead_letters: DeadLetters::new(
                config.dead_letter_capacity,
                config.log_dead_letters,
            ),
            config,
            codec,
            router: Router::new(transport),
            dispatcher: Dispatcher::new(),
            guardians: Mutex::new(None),
            helpers: RwLock::new(HashMap::new()),
            uids: AtomicU64::new(1),
            token: token.clone(),
            terminated: AtomicBool::new(false),
        }),
    };
    system.start_guardians();
    let runner = SystemRunner {
        system: system.clone(),
        inbound,
        stopping: false,
    };
    (system, runner)
}

struct Guardians {
    root: LocalActorRef,
    user: Option<LocalActorRef>,
}

struct SystemInner {
    config: SystemConfig,
    /// Address other workers reach this one at.
    address: WorkerAddress,
    /// Address of the paths created inside this worker.
    local_address: WorkerAddress,
    codec: Codec,
    router: Router,
    dispatcher: Dispatcher,
    dead_letters: DeadLetters,
    guardians: Mutex<Option<Guardians>>,
    helpers: RwLock<HashMap<String, Box<dyn Any + Send + Sync + 'static>>>,
    uids: AtomicU64,
    token: CancellationToken,
    terminated: AtomicBool,
}

/// System reference.
///
#[derive(Clone)]
pub struct SystemRef {
    inner: Arc<SystemInner>,
}

impl SystemRef {
    fn start_guardians(&self) {
        let root_path =
            ActorPath::root_of(self.inner.local_address.clone()).with_uid(self.next_uid());
        let root = LocalActorRef::new(ActorCell::new(
            root_path,
            None,
            self.clone(),
            Props::new(|_ctx| Ok(RootGuardian)),
        ));
        root.start();
        let user = match root
            .cell()
            .spawn_child(Props::new(|_ctx| Ok(UserGuardian)), "user")
        {
            Ok(user) => Some(user),
            Err(error) => {
                error!("User guardian could not be created: {}", error);
                None
            }
        };
        *lock(&self.inner.guardians) = Some(Guardians { root, user });
    }

    fn root(&self) -> Option<LocalActorRef> {
        lock(&self.inner.guardians)
            .as_ref()
            .map(|guardians| guardians.root.clone())
    }

    fn user(&self) -> Option<LocalActorRef> {
        lock(&self.inner.guardians)
            .as_ref()
            .and_then(|guardians| guardians.user.clone())
    }

    /// Launches a new top level actor at `/user/<name>`.
    ///
    /// # Arguments
    ///
    /// * `props` - Recipe of the actor.
    /// * `name` - The name of the actor to create.
    ///
    /// # Returns
    ///
    /// Returns the actor reference.
    ///
    /// # Error
    ///
    /// Returns `Error::Exists` if the actor already exists, `Error::InvalidName` for names
    /// that are not valid path segments and `Error::Start` once the system stopped.
    ///
    pub fn spawn(&self, props: Props, name: &str) -> Result<ActorRef, Error> {
        let user = self.user().ok_or_else(|| {
            Error::Start("actor system is not running".to_owned())
        })?;
        user.cell().spawn_child(props, name).map(ActorRef::Local)
    }

    /// Launches a new top level actor with a generated name.
    pub fn spawn_anonymous(&self, props: Props) -> Result<ActorRef, Error> {
        let user = self.user().ok_or_else(|| {
            Error::Start("actor system is not running".to_owned())
        })?;
        user.cell().spawn_anonymous_child(props).map(ActorRef::Local)
    }

    /// Reference to the actor at `path`. Paths of this worker resolve to a local
    /// reference, or `Nobody` if nothing lives there or the uid is stale. Paths of other
    /// workers resolve to a remote reference.
    pub fn resolve(&self, path: &ActorPath) -> ActorRef {
        let path = path.localize(&self.inner.address);
        if path.address() == &self.inner.local_address {
            self.lookup(&path)
        } else if !path.address().is_local() {
            ActorRef::Remote(RemoteActorRef::new(path, self.clone()))
        } else {
            self.nobody(path)
        }
    }

    /// Parses `path` and resolves it. See [`SystemRef::resolve`]. Paths without an
    /// address, like `/user/manager`, belong to this worker. A malformed path is `Nobody`.
    pub fn actor_ref(&self, path: &str) -> ActorRef {
        let local = !path.contains("://");
        match ActorPath::parse(path) {
            Ok(parsed) if local => self.resolve(
                &parsed.with_address(self.inner.local_address.clone()),
            ),
            Ok(parsed) => self.resolve(&parsed),
            Err(error) => {
                debug!("Path {} does not resolve: {}", path, error);
                let literal = ActorPath::from(path);
                if local {
                    self.nobody(
                        literal.with_address(self.inner.local_address.clone()),
                    )
                } else {
                    self.nobody(literal)
                }
            }
        }
    }

    /// Like [`SystemRef::resolve`], but paths of other workers are `Nobody`.
    pub(crate) fn resolve_local(&self, path: &ActorPath) -> ActorRef {
        let path = path.localize(&self.inner.address);
        if path.address() == &self.inner.local_address {
            self.lookup(&path)
        } else {
            self.nobody(path)
        }
    }

    fn lookup(&self, path: &ActorPath) -> ActorRef {
        let Some(mut current) = self.root() else {
            return self.nobody(path.clone());
        };
        for segment in path.segments() {
            match current.cell().child_ref(segment) {
                Some(child) => current = child,
                None => return self.nobody(path.clone()),
            }
        }
        if path.uid() != 0 && current.path().uid() != path.uid() {
            return self.nobody(path.clone());
        }
        ActorRef::Local(current)
    }

    fn nobody(&self, path: ActorPath) -> ActorRef {
        ActorRef::Nobody(NobodyRef::new(path, self.inner.dead_letters.clone()))
    }

    /// The user guardian, parent of every top level actor.
    pub fn user_guardian(&self) -> Option<ActorRef> {
        self.user().map(ActorRef::Local)
    }

    /// The root guardian.
    pub fn root_guardian(&self) -> Option<ActorRef> {
        self.root().map(ActorRef::Local)
    }

    /// Address other workers reach this one at. Local for standalone workers.
    pub fn address(&self) -> &WorkerAddress {
        &self.inner.address
    }

    /// Name of the actor system.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Configuration of the worker.
    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    /// Codec of the worker.
    pub fn codec(&self) -> &Codec {
        &self.inner.codec
    }

    /// Subscribes to the dead letters published from now on.
    pub fn dead_letters(&self) -> broadcast::Receiver<DeadLetter> {
        self.inner.dead_letters.subscribe()
    }

    /// Stops the worker: the root guardian stops and the runner returns once the whole
    /// tree terminated.
    pub fn stop_system(&self) {
        self.inner.token.cancel();
    }

    /// True once the root guardian terminated.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// Add a helper to the actor system.
    pub fn add_helper<H>(&self, name: &str, helper: H)
    where
        H: Any + Send + Sync + Clone + 'static,
    {
        if let Ok(mut helpers) = self.inner.helpers.write() {
            helpers.insert(name.to_owned(), Box::new(helper));
        }
    }

    /// Get a helper from the actor system.
    /// If the helper does not exist, a None is returned.
    pub fn get_helper<H>(&self, name: &str) -> Option<H>
    where
        H: Any + Send + Sync + Clone + 'static,
    {
        let helpers = self.inner.helpers.read().ok()?;
        helpers
            .get(name)
            .and_then(|any| any.downcast_ref::<H>())
            .cloned()
    }

    /// Run a sink. The sink will be run in a separate task.
    ///
    pub fn run_sink<E>(&self, mut sink: Sink<E>)
    where
        E: Event,
    {
        tokio::spawn(async move {
            sink.run().await;
        });
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub(crate) fn router(&self) -> &Router {
        &self.inner.router
    }

    pub(crate) fn dead_letter_channel(&self) -> &DeadLetters {
        &self.inner.dead_letters
    }

    pub(crate) fn next_uid(&self) -> u64 {
        self.inner.uids.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn with_codec_context<R>(
        &self,
        f: impl FnOnce(&Codec, &CodecContext<'_>) -> R,
    ) -> R {
        let ctx = CodecContext {
            address: &self.inner.address,
            resolver: self,
        };
        f(&self.inner.codec, &ctx)
    }

    /// A broken invariant: the worker stops.
    pub(crate) fn fatal(&self, path: &ActorPath, error: &Error) {
        error!("Fatal error in actor {}: {}. Stopping the worker.", path, error);
        self.inner.token.cancel();
    }

    pub(crate) fn root_terminated(&self) {
        self.inner.terminated.store(true, Ordering::SeqCst);
        *lock(&self.inner.guardians) = None;
        self.inner.token.cancel();
    }
}

impl PathResolver for SystemRef {
    fn resolve(&self, path: &ActorPath) -> ActorRef {
        SystemRef::resolve(self, path)
    }
}

impl Debug for SystemRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SystemRef({})", self.inner.address)
    }
}

/// Top of the tree. Stops itself, and so the worker, once the user guardian is gone.
struct RootGuardian;

#[async_trait]
impl Actor for RootGuardian {
    async fn pre_start(
        &mut self,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        if let Some(user) = ctx.child("user") {
            ctx.watch(&user);
        }
        Ok(())
    }

    async fn receive(
        &mut self,
        ctx: &mut ActorContext<Self>,
        message: &AnyMessage,
    ) -> Result<(), Error> {
        if let Some(terminated) = message.downcast_ref::<Terminated>() {
            debug!(
                "User guardian {} terminated, stopping the root guardian.",
                terminated.actor.path()
            );
            ctx.stop(&ctx.self_ref());
        }
        Ok(())
    }

    fn supervisor_strategy(&self) -> SupervisorStrategy {
        SupervisorStrategy::stopping()
    }
}

/// Parent of the top level actors.
struct UserGuardian;

#[async_trait]
impl Actor for UserGuardian {
    async fn receive(
        &mut self,
        ctx: &mut ActorContext<Self>,
        message: &AnyMessage,
    ) -> Result<(), Error> {
        debug!(
            "User guardian {} ignores {}.",
            ctx.path(),
            message.type_name()
        );
        Ok(())
    }
}

enum RunnerEvent {
    Cancelled,
    Frame(Option<Vec<u8>>),
    Work,
}

async fn next_frame(inbound: &mut Option<InboundFrames>) -> Option<Vec<u8>> {
    match inbound {
        Some(inbound) => inbound.recv().await,
        None => std::future::pending().await,
    }
}

/// System runner.
pub struct SystemRunner {
    system: SystemRef,
    inbound: Option<InboundFrames>,
    stopping: bool,
}

impl SystemRunner {
    /// Run the actor system until the root guardian terminated.
    pub async fn run(&mut self) {
        debug!("Running actor system...");
        loop {
            self.drain_inbound();
            self.check_cancelled();
            self.system.dispatcher().run_until_idle().await;
            if self.system.is_terminated() {
                break;
            }

            let token = self.system.inner.token.clone();
            let stopping = self.stopping;
            let dispatcher = &self.system.inner.dispatcher;
            let inbound = &mut self.inbound;
            let event = tokio::select! {
                _ = token.cancelled(), if !stopping => RunnerEvent::Cancelled,
                frame = next_frame(inbound) => RunnerEvent::Frame(frame),
                _ = dispatcher.notified() => RunnerEvent::Work,
            };
            match event {
                RunnerEvent::Cancelled | RunnerEvent::Work => {}
                RunnerEvent::Frame(Some(frame)) => {
                    self.system.router().receive(&self.system, &frame)
                }
                RunnerEvent::Frame(None) => {
                    debug!("Inbound channel closed.");
                    self.inbound = None;
                }
            }
        }
        debug!("Actor system stopped.");
    }

    /// Processes every frame and message available now, then returns. Timers and other
    /// tasks are not waited for.
    pub async fn run_until_idle(&mut self) {
        loop {
            let frames = self.drain_inbound();
            self.check_cancelled();
            if frames == 0 && self.system.dispatcher().is_idle() {
                break;
            }
            self.system.dispatcher().run_until_idle().await;
        }
    }

    /// Delivers the frames available now and runs a single scheduler turn. Returns false
    /// if no cell had work.
    pub async fn run_once(&mut self) -> bool {
        self.drain_inbound();
        self.check_cancelled();
        self.system.dispatcher().run_turn().await
    }

    fn check_cancelled(&mut self) {
        if self.stopping || !self.system.inner.token.is_cancelled() {
            return;
        }
        self.stopping = true;
        debug!("Stopping actor system...");
        match self.system.root() {
            Some(root) => root.stop(),
            None => self.system.inner.terminated.store(true, Ordering::SeqCst),
        }
    }

    fn drain_inbound(&mut self) -> usize {
        let mut count = 0;
        loop {
            let next = match &mut self.inbound {
                Some(inbound) => inbound.try_recv(),
                None => return count,
            };
            match next {
                Ok(frame) => {
                    count += 1;
                    self.system.router().receive(&self.system, &frame);
                }
                Err(TryRecvError::Empty) => return count,
                Err(TryRecvError::Disconnected) => {
                    self.inbound = None;
                    return count;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::{dead_letter::DeadLetterReason, transport::LocalHub};

    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_stop_actor_system() {
        let token = CancellationToken::new();
        let (system, mut runner) =
            ActorSystem::create(SystemConfig::default(), token.clone());

        let handle = tokio::spawn(async move {
            runner.run().await;
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        assert!(logs_contain("Running actor system..."));
        token.cancel();
        handle.await.unwrap();

        assert!(system.is_terminated());
        assert!(logs_contain("Stopping actor system..."));
        assert!(logs_contain("Actor system stopped."));
    }

    #[tokio::test]
    async fn test_guardians() {
        let (system, mut runner) =
            ActorSystem::create(SystemConfig::default(), CancellationToken::new());
        runner.run_until_idle().await;

        let root = system.root_guardian().unwrap();
        let user = system.user_guardian().unwrap();
        assert!(root.path().is_empty());
        assert_eq!(user.path().element_string(), "/user");
        assert_eq!(user.parent(), root);
        assert_eq!(system.actor_ref("/user"), user);
        assert!(system.actor_ref("/user/missing").is_nobody());
    }

    #[tokio::test]
    async fn test_helpers() {
        let (system, _) =
            ActorSystem::create(SystemConfig::default(), CancellationToken::new());
        let helper = TestHelper { value: 42 };
        system.add_helper("test", helper);
        let helper: Option<TestHelper> = system.get_helper("test");
        assert_eq!(helper, Some(TestHelper { value: 42 }));
        assert_eq!(system.get_helper::<TestHelper>("other"), None);
    }

    #[tokio::test]
    async fn test_malformed_path_resolves_to_nobody() {
        let (system, mut runner) =
            ActorSystem::create(SystemConfig::default(), CancellationToken::new());
        runner.run_until_idle().await;
        let mut dead_letters = system.dead_letters();

        let typo = system.actor_ref("/user/x#bad");
        assert!(typo.is_nobody());
        assert!(system.actor_ref("rush://local/user/x#bad").is_nobody());

        typo.tell(crate::PoisonPill, None);
        typo.tell(
            Terminated {
                actor: typo.clone(),
                existence_confirmed: true,
                address_terminated: false,
            },
            None,
        );
        runner.run_until_idle().await;

        assert!(!system.is_terminated());
        assert!(!system.root_guardian().unwrap().is_terminated());
        assert!(!system.user_guardian().unwrap().is_terminated());
        let letter = dead_letters.try_recv().unwrap();
        assert_eq!(letter.reason, DeadLetterReason::NoSuchActor);
        assert_eq!(letter.recipient.key(), "x#bad");
    }

    #[test]
    fn test_connect_checks_address() {
        let hub = LocalHub::new();
        let (transport, inbound) =
            hub.attach(WorkerAddress::worker("other", "a")).unwrap();
        let result = ActorSystem::connect(
            SystemConfig::default(),
            CancellationToken::new(),
            transport,
            inbound,
        );
        assert!(matches!(result, Err(Error::Start(_))));
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct TestHelper {
        pub value: i32,
    }
}
