// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Transport
//!
//! Frames exchanged between workers and the channel that carries them. The runtime only
//! needs a reliable channel ordered per pair of workers; [`LocalHub`] provides one in
//! memory for workers hosted by the same process.
//!

use crate::{ActorPath, Error, WorkerAddress, codec::EncodedValue};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use tracing::debug;

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    /// A user message.
    Tell,
    /// `sender` starts watching `receiver`.
    Watch,
    /// `sender` stops watching `receiver`.
    Unwatch,
    /// `sender` terminated, `receiver` watched it.
    DeathWatchNotification,
}

/// Record sent between workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportEnvelope {
    /// What the frame carries.
    pub kind: EnvelopeKind,
    /// Globalized path of the sender.
    pub sender: Option<ActorPath>,
    /// Globalized path of the recipient.
    pub receiver: ActorPath,
    /// The message, or the flags of a death-watch notification.
    pub message: EncodedValue,
}

impl TransportEnvelope {
    /// Serializes the envelope into a frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(bincode::serialize(self)?)
    }

    /// Parses a frame.
    pub fn from_bytes(frame: &[u8]) -> Result<Self, Error> {
        Ok(bincode::deserialize(frame)?)
    }
}

/// Flags of a death-watch notification crossing workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DeathWatchFlags {
    pub existence_confirmed: bool,
    pub address_terminated: bool,
}

/// Frames received by a worker.
pub type InboundFrames = mpsc::UnboundedReceiver<Vec<u8>>;

/// Outbound side of the channel between workers.
pub trait Transport: Send + Sync {
    /// Globalized address of the local worker.
    fn address(&self) -> &WorkerAddress;

    /// Hands a frame to the worker at `to`, without blocking.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if `to` is unknown or unreachable.
    ///
    fn send(&self, to: &WorkerAddress, frame: Vec<u8>) -> Result<(), Error>;
}

type Routes = HashMap<WorkerAddress, mpsc::UnboundedSender<Vec<u8>>>;

/// In-memory hub connecting the workers of one process.
#[derive(Clone, Default)]
pub struct LocalHub {
    routes: Arc<RwLock<Routes>>,
}

impl LocalHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a worker to the hub.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the address is local or already attached.
    ///
    pub fn attach(
        &self,
        address: WorkerAddress,
    ) -> Result<(Arc<dyn Transport>, InboundFrames), Error> {
        if address.is_local() {
            return Err(Error::Transport(format!(
                "{} has no worker name",
                address
            )));
        }
        let mut routes = self
            .routes
            .write()
            .map_err(|e| Error::Transport(e.to_string()))?;
        if routes.contains_key(&address) {
            return Err(Error::Transport(format!(
                "{} is attached already",
                address
            )));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        routes.insert(address.clone(), sender);
        debug!("Worker {} attached to the hub.", address);
        let transport = HubTransport {
            address,
            hub: self.clone(),
        };
        Ok((Arc::new(transport), receiver))
    }

    /// Disconnects a worker. Frames sent to it afterwards fail.
    pub fn detach(&self, address: &WorkerAddress) {
        if let Ok(mut routes) = self.routes.write() {
            routes.remove(address);
        }
    }
}

struct HubTransport {
    address: WorkerAddress,
    hub: LocalHub,
}

impl Transport for HubTransport {
    fn address(&self) -> &WorkerAddress {
        &self.address
    }

    fn send(&self, to: &WorkerAddress, frame: Vec<u8>) -> Result<(), Error> {
        let routes = self
            .hub
            .routes
            .read()
            .map_err(|e| Error::Transport(e.to_string()))?;
        let route = routes.get(to).ok_or_else(|| {
            Error::Transport(format!("no route to {}", to))
        })?;
        route
            .send(frame)
            .map_err(|_| Error::Transport(format!("{} is gone", to)))
    }
}
