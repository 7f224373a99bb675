// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dispatcher
//!
//! Cooperative run queue of a worker. Cells with work are queued once; a turn runs one cell
//! and puts it back at the end of the queue if work is left.
//!

use crate::cell::{ActorCell, lock};

use tokio::sync::Notify;

use std::{collections::VecDeque, sync::Arc, sync::Mutex};

#[derive(Default)]
pub(crate) struct Dispatcher {
    queue: Mutex<VecDeque<Arc<ActorCell>>>,
    notify: Notify,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `cell` unless it is queued already.
    pub fn schedule(&self, cell: &Arc<ActorCell>) {
        if cell.try_claim() {
            lock(&self.queue).push_back(cell.clone());
            self.notify.notify_one();
        }
    }

    /// Resolves once work has been queued since the last call.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn is_idle(&self) -> bool {
        lock(&self.queue).is_empty()
    }

    /// Runs one turn of the next queued cell. False if nothing was queued.
    pub async fn run_turn(&self) -> bool {
        let next = lock(&self.queue).pop_front();
        let Some(cell) = next else {
            return false;
        };
        cell.run_turn().await;
        if cell.release() {
            self.schedule(&cell);
        }
        true
    }

    /// Runs turns until the queue is empty, yielding to the host between turns.
    pub async fn run_until_idle(&self) {
        while self.run_turn().await {
            tokio::task::yield_now().await;
        }
    }
}
