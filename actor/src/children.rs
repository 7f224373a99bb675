// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Children container
//!
//! Bookkeeping of the children of one cell. Besides the child records the container knows
//! whether the cell is waiting for some of its children to die, and why: the reason decides
//! what the cell does once the last of them is gone.
//!

use crate::{ActorPath, Error, reference::LocalActorRef};

use tokio::time::Instant;

use std::{collections::BTreeMap, time::Duration};

/// Why a cell waits for children to terminate.
#[derive(Debug, Clone, PartialEq)]
pub enum SuspendReason {
    /// Children stopped on request. The cell keeps running.
    UserRequest,
    /// The cell restarts once the children are gone.
    Recreation(Error),
    /// The cell is created again once the children are gone.
    Creation,
    /// The cell terminates once the children are gone.
    Termination,
}

impl SuspendReason {
    /// True if the cell must not process stash-when-waiting system messages meanwhile.
    pub fn is_waiting_for_children(&self) -> bool {
        matches!(self, SuspendReason::Recreation(_) | SuspendReason::Creation)
    }
}

/// Restart statistics of one child.
#[derive(Debug, Clone, Default)]
pub struct ChildRestartStats {
    retries: u32,
    window_start: Option<Instant>,
}

impl ChildRestartStats {
    /// Number of restarts counted so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Counts one restart and tells whether it is allowed.
    ///
    /// Without a limit every restart is allowed. With a limit but no window the restarts
    /// are counted forever. With a window the count restarts once the window elapsed.
    pub fn request_restart_permission(
        &mut self,
        max_retries: Option<u32>,
        within: Option<Duration>,
    ) -> bool {
        match (max_retries, within) {
            (Some(max), _) if max < 1 => false,
            (Some(max), None) => {
                self.retries += 1;
                self.retries <= max
            }
            (max, Some(window)) => {
                self.retries_in_window_okay(max.unwrap_or(1), window)
            }
            (None, None) => true,
        }
    }

    fn retries_in_window_okay(&mut self, max: u32, window: Duration) -> bool {
        let now = Instant::now();
        let start = *self.window_start.get_or_insert(now);
        if now.duration_since(start) <= window {
            self.retries += 1;
            self.retries <= max
        } else {
            self.retries = 1;
            self.window_start = Some(now);
            true
        }
    }
}

/// Record of one child.
#[derive(Debug, Clone)]
pub struct ChildRecord {
    /// The child.
    pub child: LocalActorRef,
    /// Restart statistics kept by the parent.
    pub stats: ChildRestartStats,
    terminating: bool,
}

impl ChildRecord {
    fn new(child: LocalActorRef) -> Self {
        Self {
            child,
            stats: ChildRestartStats::default(),
            terminating: false,
        }
    }

    /// True once the parent asked the child to stop.
    pub fn is_terminating(&self) -> bool {
        self.terminating
    }
}

#[derive(Debug, Clone)]
enum ContainerState {
    Normal,
    Terminating {
        to_die: Vec<ActorPath>,
        reason: SuspendReason,
    },
    Terminated,
}

/// Children of a cell, keyed by name.
#[derive(Debug)]
pub struct ChildrenContainer {
    children: BTreeMap<String, ChildRecord>,
    state: ContainerState,
}

impl Default for ChildrenContainer {
    fn default() -> Self {
        Self {
            children: BTreeMap::new(),
            state: ContainerState::Normal,
        }
    }
}

impl ChildrenContainer {
    /// Empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new child.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken or the owning cell is terminating.
    ///
    pub fn insert(&mut self, child: LocalActorRef) -> Result<(), Error> {
        match &self.state {
            ContainerState::Terminated
            | ContainerState::Terminating {
                reason: SuspendReason::Termination,
                ..
            } => {
                return Err(Error::Create(format!(
                    "cannot create child {} while terminating",
                    child.path()
                )));
            }
            _ => {}
        }
        let name = child.path().key();
        if self.children.contains_key(&name) {
            return Err(Error::Exists(child.path().without_uid()));
        }
        self.children.insert(name, ChildRecord::new(child));
        Ok(())
    }

    /// Record of the child named `name`.
    pub fn get(&self, name: &str) -> Option<&ChildRecord> {
        self.children.get(name)
    }

    /// Record of the child at `path`. A defined uid must match the live incarnation.
    pub fn get_by_path(&self, path: &ActorPath) -> Option<&ChildRecord> {
        self.children
            .get(&path.key())
            .filter(|record| record.child.path().same_actor(path))
    }

    /// Mutable record of the child at `path`.
    pub fn get_by_path_mut(
        &mut self,
        path: &ActorPath,
    ) -> Option<&mut ChildRecord> {
        self.children
            .get_mut(&path.key())
            .filter(|record| record.child.path().same_actor(path))
    }

    /// Every child, terminating or not, ordered by name.
    pub fn children(&self) -> Vec<LocalActorRef> {
        self.children
            .values()
            .map(|record| record.child.clone())
            .collect()
    }

    /// Mutable access to every record.
    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut ChildRecord> {
        self.children.values_mut()
    }

    /// Number of registered children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// True without children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Marks the child at `path` as going to die. Returns false if it is not a child.
    pub fn shall_die(&mut self, path: &ActorPath) -> bool {
        let Some(record) = self.get_by_path_mut(path) else {
            return false;
        };
        record.terminating = true;
        let path = record.child.path().clone();
        match &mut self.state {
            ContainerState::Normal => {
                self.state = ContainerState::Terminating {
                    to_die: vec![path],
                    reason: SuspendReason::UserRequest,
                };
            }
            ContainerState::Terminating { to_die, .. } => {
                if !to_die.contains(&path) {
                    to_die.push(path);
                }
            }
            ContainerState::Terminated => {}
        }
        true
    }

    /// Forgets a terminated child.
    ///
    /// Returns the reason the cell waited for, once the last dying child is gone.
    ///
    /// # Errors
    ///
    /// Returns `Error::Fatal` if the child was marked as dying but the container does not
    /// wait for it.
    ///
    pub fn remove(
        &mut self,
        path: &ActorPath,
    ) -> Result<Option<SuspendReason>, Error> {
        let Some(record) = self.get_by_path(path) else {
            return Ok(None);
        };
        let key = record.child.path().key();
        let terminating = record.terminating;
        let child_path = record.child.path().clone();
        self.children.remove(&key);

        match &mut self.state {
            ContainerState::Normal if terminating => Err(Error::Fatal(
                format!(
                    "child {} was stopping but its parent did not wait for it",
                    child_path
                ),
            )),
            ContainerState::Normal | ContainerState::Terminated => Ok(None),
            ContainerState::Terminating { to_die, reason } => {
                to_die.retain(|p| !p.same_actor(&child_path));
                if !to_die.is_empty() {
                    return Ok(None);
                }
                let reason = reason.clone();
                self.state = if reason == SuspendReason::Termination {
                    ContainerState::Terminated
                } else {
                    ContainerState::Normal
                };
                Ok(Some(reason))
            }
        }
    }

    /// Replaces the reason the cell waits for. Returns false if it waits for nobody.
    pub fn set_termination_reason(&mut self, new_reason: SuspendReason) -> bool {
        match &mut self.state {
            ContainerState::Terminating { reason, .. } => {
                *reason = new_reason;
                true
            }
            _ => false,
        }
    }

    /// Final state of a terminated cell.
    pub fn set_terminated(&mut self) {
        self.state = ContainerState::Terminated;
    }

    /// True unless the owning cell is stopping or stopped.
    pub fn is_normal(&self) -> bool {
        matches!(
            self.state,
            ContainerState::Normal
                | ContainerState::Terminating {
                    reason: SuspendReason::UserRequest,
                    ..
                }
        )
    }

    /// True while the owning cell is stopping or stopped.
    pub fn is_terminating(&self) -> bool {
        !self.is_normal()
            && !matches!(
                self.state,
                ContainerState::Terminating {
                    reason: SuspendReason::Recreation(_)
                        | SuspendReason::Creation,
                    ..
                }
            )
    }

    /// True once the owning cell terminated.
    pub fn is_terminated(&self) -> bool {
        matches!(self.state, ContainerState::Terminated)
    }

    /// True while the owning cell waits for children before restarting or creating.
    pub fn is_waiting_for_children(&self) -> bool {
        match &self.state {
            ContainerState::Terminating { reason, .. } => {
                reason.is_waiting_for_children()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_restart_permission_without_limit() {
        let mut stats = ChildRestartStats::default();
        for _ in 0..100 {
            assert!(stats.request_restart_permission(None, None));
        }
    }

    #[test]
    fn test_restart_permission_zero_retries() {
        let mut stats = ChildRestartStats::default();
        assert!(!stats.request_restart_permission(Some(0), None));
        assert!(!stats.request_restart_permission(
            Some(0),
            Some(Duration::from_secs(1))
        ));
    }

    #[test]
    fn test_restart_permission_counts_forever() {
        let mut stats = ChildRestartStats::default();
        assert!(stats.request_restart_permission(Some(2), None));
        assert!(stats.request_restart_permission(Some(2), None));
        assert!(!stats.request_restart_permission(Some(2), None));
        assert_eq!(stats.retries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_permission_window() {
        let mut stats = ChildRestartStats::default();
        let window = Some(Duration::from_secs(10));
        assert!(stats.request_restart_permission(Some(2), window));
        assert!(stats.request_restart_permission(Some(2), window));
        assert!(!stats.request_restart_permission(Some(2), window));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(stats.request_restart_permission(Some(2), window));
        assert_eq!(stats.retries(), 1);
        assert!(stats.request_restart_permission(Some(2), window));
        assert!(!stats.request_restart_permission(Some(2), window));
    }

    #[test]
    fn test_suspend_reason_waiting() {
        assert!(SuspendReason::Creation.is_waiting_for_children());
        assert!(
            SuspendReason::Recreation(Error::Functional("x".into()))
                .is_waiting_for_children()
        );
        assert!(!SuspendReason::UserRequest.is_waiting_for_children());
        assert!(!SuspendReason::Termination.is_waiting_for_children());
    }

    #[test]
    fn test_empty_container_states() {
        let mut container = ChildrenContainer::new();
        assert!(container.is_normal());
        assert!(!container.is_terminating());
        assert!(!container.set_termination_reason(SuspendReason::Termination));
        container.set_terminated();
        assert!(container.is_terminated());
        assert!(container.is_terminating());
        assert!(!container.is_normal());
    }
}
