// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Death watch bookkeeping.

use super::ActorCell;
use crate::{
    ActorRef, Error, message::Terminated, system_message::SystemMessage,
};

use tracing::{debug, warn};

use std::sync::Arc;

impl ActorCell {
    /// Registers this cell as watcher of `target`.
    pub(crate) fn watch(self: &Arc<Self>, target: &ActorRef) {
        if target.path().same_actor(&self.path) {
            return;
        }
        let newly_watched = {
            let mut state = self.state();
            if state
                .watching
                .iter()
                .any(|watched| watched.path().same_actor(target.path()))
            {
                false
            } else {
                state.watching.push(target.clone());
                true
            }
        };
        if newly_watched {
            target.send_system_message(SystemMessage::Watch {
                watchee: target.clone(),
                watcher: self.self_ref(),
            });
        }
    }

    /// Removes the registration and any `Terminated` of `target` not delivered yet.
    pub(crate) fn unwatch(self: &Arc<Self>, target: &ActorRef) {
        if target.path().same_actor(&self.path) {
            return;
        }
        let was_watched = {
            let mut state = self.state();
            let before = state.watching.len();
            state
                .watching
                .retain(|watched| !watched.path().same_actor(target.path()));
            state
                .terminated_queued
                .retain(|path| !path.same_actor(target.path()));
            before != state.watching.len()
        };
        if was_watched {
            target.send_system_message(SystemMessage::Unwatch {
                watchee: target.clone(),
                watcher: self.self_ref(),
            });
        }
    }

    pub(super) fn add_watcher(
        self: &Arc<Self>,
        watchee: ActorRef,
        watcher: ActorRef,
    ) {
        let watchee_is_self = watchee.path().same_actor(&self.path);
        let watcher_is_self = watcher.path().same_actor(&self.path);
        if watchee_is_self && !watcher_is_self {
            let mut state = self.state();
            if !state
                .watched_by
                .iter()
                .any(|known| known.path().same_actor(watcher.path()))
            {
                debug!("Actor {} now watched by {}.", self.path, watcher.path());
                state.watched_by.push(watcher);
            }
        } else if !watchee_is_self && watcher_is_self {
            self.watch(&watchee);
        } else {
            warn!(
                "Illegal Watch({}, {}) for {}.",
                watchee.path(),
                watcher.path(),
                self.path
            );
        }
    }

    pub(super) fn remove_watcher(
        self: &Arc<Self>,
        watchee: ActorRef,
        watcher: ActorRef,
    ) {
        let watchee_is_self = watchee.path().same_actor(&self.path);
        let watcher_is_self = watcher.path().same_actor(&self.path);
        if watchee_is_self && !watcher_is_self {
            let mut state = self.state();
            state
                .watched_by
                .retain(|known| !known.path().same_actor(watcher.path()));
            debug!(
                "Actor {} no longer watched by {}.",
                self.path,
                watcher.path()
            );
        } else if !watchee_is_self && watcher_is_self {
            self.unwatch(&watchee);
        } else {
            warn!(
                "Illegal Unwatch({}, {}) for {}.",
                watchee.path(),
                watcher.path(),
                self.path
            );
        }
    }

    /// Handles a `DeathWatchNotification`: queues `Terminated` for a watched actor and
    /// updates the children container for a child.
    pub(super) async fn watched_actor_terminated(
        self: &Arc<Self>,
        actor: ActorRef,
        existence_confirmed: bool,
        address_terminated: bool,
    ) -> Result<(), Error> {
        let (deliver, is_child) = {
            let mut state = self.state();
            let before = state.watching.len();
            state
                .watching
                .retain(|watched| !watched.path().same_actor(actor.path()));
            let watched = before != state.watching.len();
            let deliver = watched && !state.children.is_terminating();
            if deliver {
                state.terminated_queued.push(actor.path().clone());
            }
            let is_child = state.children.get_by_path(actor.path()).is_some();
            (deliver, is_child)
        };
        if deliver {
            self.self_ref().tell(
                Terminated {
                    actor: actor.clone(),
                    existence_confirmed,
                    address_terminated,
                },
                Some(actor.clone()),
            );
        }
        if is_child {
            self.handle_child_terminated(&actor).await?;
        }
        Ok(())
    }

    /// Notifies every watcher but the parent, which is notified on its own.
    pub(super) fn tell_watchers_we_died(self: &Arc<Self>) {
        let watchers = std::mem::take(&mut self.state().watched_by);
        for watcher in watchers {
            let is_parent = self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.path().same_actor(watcher.path()));
            if !is_parent {
                watcher.send_system_message(
                    SystemMessage::DeathWatchNotification {
                        actor: self.self_ref(),
                        existence_confirmed: true,
                        address_terminated: false,
                    },
                );
            }
        }
    }

    /// Drops every registration of this cell as watcher.
    pub(super) fn unwatch_watched_actors(self: &Arc<Self>) {
        let watching = {
            let mut state = self.state();
            state.terminated_queued.clear();
            std::mem::take(&mut state.watching)
        };
        for watched in watching {
            watched.send_system_message(SystemMessage::Unwatch {
                watchee: watched.clone(),
                watcher: self.self_ref(),
            });
        }
    }
}
