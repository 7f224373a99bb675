// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Configuration
//!
//! Settings of one worker. The value is plain data: load it however the host process
//! likes (it deserializes with serde) and hand it to [`crate::ActorSystem`].
//!

use crate::{WorkerAddress, path::DEFAULT_SYSTEM};

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Name of the actor system the worker belongs to.
    pub name: String,
    /// Name of the worker inside the system. Required to talk to other workers.
    pub worker: Option<String>,
    /// Dead letters kept for slow subscribers.
    pub dead_letter_capacity: usize,
    /// Receive timeout every new actor starts with.
    pub default_receive_timeout: Option<Duration>,
    /// Log every dead letter at warn level.
    pub log_dead_letters: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SYSTEM.to_owned(),
            worker: None,
            dead_letter_capacity: 1024,
            default_receive_timeout: None,
            log_dead_letters: true,
        }
    }
}

impl SystemConfig {
    /// Configuration of a standalone worker of system `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Sets the worker name.
    pub fn with_worker(mut self, worker: &str) -> Self {
        self.worker = Some(worker.to_owned());
        self
    }

    /// Address other workers reach this one at, local if no worker name is set.
    pub fn address(&self) -> WorkerAddress {
        match &self.worker {
            Some(worker) => WorkerAddress::worker(&self.name, worker),
            None => WorkerAddress::local(&self.name),
        }
    }
}
