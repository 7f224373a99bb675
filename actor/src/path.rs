// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor path
//!
//! The `path` module provides the [`ActorPath`] and [`WorkerAddress`] types. A path names an
//! actor inside the supervision tree of a worker, and the address names the worker itself.
//!

use crate::Error;

use serde::{Deserialize, Serialize};

use std::fmt::{Error as FmtError, Formatter};
use std::str::FromStr;

/// Protocol prefix used by the textual form of addresses.
pub const PROTOCOL: &str = "rush";

/// System name used by paths parsed without an explicit address.
pub const DEFAULT_SYSTEM: &str = "local";

/// Address of the worker hosting an actor.
///
/// A worker is an isolated execution context owning a subtree of actors. Two tiers exist:
/// the address of a path created inside a worker is *local* (`worker` is `None`) until it is
/// globalized for transmission, at which point it carries the name of the worker that
/// hosts the actor. Any worker can resolve a globalized address.
///
/// # Textual form
///
/// - Local: `rush://system`
/// - Globalized: `rush://system@worker`
///
#[derive(
    Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct WorkerAddress {
    system: String,
    worker: Option<String>,
}

impl WorkerAddress {
    /// Address of a worker-local path for the given actor system.
    pub fn local(system: &str) -> Self {
        Self {
            system: system.to_owned(),
            worker: None,
        }
    }

    /// Address of a named worker for the given actor system.
    pub fn worker(system: &str, worker: &str) -> Self {
        Self {
            system: system.to_owned(),
            worker: Some(worker.to_owned()),
        }
    }

    /// Name of the actor system.
    pub fn system(&self) -> &str {
        &self.system
    }

    /// Name of the worker, if the address has been globalized.
    pub fn worker_name(&self) -> Option<&str> {
        self.worker.as_deref()
    }

    /// True if the address has not been globalized.
    pub fn is_local(&self) -> bool {
        self.worker.is_none()
    }
}

impl Default for WorkerAddress {
    fn default() -> Self {
        WorkerAddress::local(DEFAULT_SYSTEM)
    }
}

impl std::fmt::Display for WorkerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match &self.worker {
            Some(worker) => write!(f, "{}://{}@{}", PROTOCOL, self.system, worker),
            None => write!(f, "{}://{}", PROTOCOL, self.system),
        }
    }
}

impl std::fmt::Debug for WorkerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self)
    }
}

impl FromStr for WorkerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(PROTOCOL)
            .and_then(|rest| rest.strip_prefix("://"))
            .ok_or_else(|| Error::Functional(format!("Invalid address '{}'", s)))?;
        match rest.split_once('@') {
            Some((system, worker)) if !system.is_empty() && !worker.is_empty() => {
                Ok(WorkerAddress::worker(system, worker))
            }
            None if !rest.is_empty() => Ok(WorkerAddress::local(rest)),
            _ => Err(Error::Functional(format!("Invalid address '{}'", s))),
        }
    }
}

/// Hierarchical actor path providing unique addressing for actors within a worker tree.
///
/// `ActorPath` represents the location of an actor in the supervision hierarchy, similar to a
/// filesystem path, qualified by the [`WorkerAddress`] of the worker hosting it and by the
/// `uid` of one particular incarnation of the actor.
///
/// # Structure
///
/// - `segments`: names from the root guardian down to the actor (`["user", "manager"]`).
/// - `uid`: identifies the incarnation. `0` means undefined: the path was built by hand or
///   derived from another path and matches whichever actor currently lives there.
/// - `address`: the worker the actor lives in.
///
/// # Equality
///
/// Two paths are equal only when address, segments and uid all match. Use
/// [`ActorPath::same_actor`] to compare while treating an undefined uid as a wildcard.
///
/// # Textual form
///
/// `rush://system@worker/user/manager#17`. Paths parsed with `From<&str>` from a bare
/// `/user/manager` string get a local address for the [`DEFAULT_SYSTEM`].
///
/// # Usage Patterns
///
/// ```ignore
/// use actor::ActorPath;
///
/// let manager = ActorPath::from("/user/manager");
/// let worker = manager.clone() / "worker";
/// assert!(manager.is_parent_of(&worker));
/// assert_eq!(worker.key(), "worker");
/// ```
///
#[derive(
    Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActorPath {
    address: WorkerAddress,
    segments: Vec<String>,
    uid: u64,
}

impl ActorPath {
    /// Creates a path from its parts.
    pub fn new(address: WorkerAddress, segments: Vec<String>, uid: u64) -> Self {
        Self {
            address,
            segments,
            uid,
        }
    }

    /// The root guardian path of the given worker.
    pub fn root_of(address: WorkerAddress) -> Self {
        Self::new(address, Vec::new(), 0)
    }

    /// Worker address of this path.
    pub fn address(&self) -> &WorkerAddress {
        &self.address
    }

    /// Names from the root guardian down to this actor.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Incarnation identifier, `0` when undefined.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Same path bound to a specific incarnation.
    pub fn with_uid(&self, uid: u64) -> Self {
        Self {
            uid,
            ..self.clone()
        }
    }

    /// Same path with an undefined uid.
    pub fn without_uid(&self) -> Self {
        self.with_uid(0)
    }

    /// Same path hosted at another address.
    pub fn with_address(&self, address: WorkerAddress) -> Self {
        Self {
            address,
            ..self.clone()
        }
    }

    /// Path of the child named `name`, with an undefined uid.
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_owned());
        Self::new(self.address.clone(), segments, 0)
    }

    /// Extracts the top-level segment of this path. Top-level and empty paths return
    /// themselves.
    pub fn root(&self) -> Self {
        if self.segments.len() <= 1 {
            self.without_uid()
        } else {
            Self::new(
                self.address.clone(),
                self.segments.iter().take(1).cloned().collect(),
                0,
            )
        }
    }

    /// Path of the supervising actor. The parent of a top-level path is the empty path of the
    /// root guardian, and the root guardian is its own parent.
    pub fn parent(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self::new(self.address.clone(), segments, 0)
    }

    /// Name of the actor (last segment), empty for the root guardian.
    pub fn key(&self) -> String {
        self.segments.last().cloned().unwrap_or_default()
    }

    /// Depth of the path.
    pub fn level(&self) -> usize {
        self.segments.len()
    }

    /// Ancestor at the given depth. Out of range levels return the path itself.
    pub fn at_level(&self, level: usize) -> Self {
        if level < 1 || level >= self.level() {
            self.clone()
        } else {
            Self::new(
                self.address.clone(),
                self.segments.iter().take(level).cloned().collect(),
                0,
            )
        }
    }

    /// True for the root guardian path.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if `other` lives strictly below this path on the same worker.
    pub fn is_ancestor_of(&self, other: &ActorPath) -> bool {
        self.address == other.address
            && other.segments.len() > self.segments.len()
            && other.segments.starts_with(&self.segments)
    }

    /// True if this path lives strictly below `other` on the same worker.
    pub fn is_descendant_of(&self, other: &ActorPath) -> bool {
        other.is_ancestor_of(self)
    }

    /// True if `other` is a direct child of this path.
    pub fn is_parent_of(&self, other: &ActorPath) -> bool {
        self.is_ancestor_of(other) && other.level() == self.level() + 1
    }

    /// True if this path is a direct child of `other`.
    pub fn is_child_of(&self, other: &ActorPath) -> bool {
        other.is_parent_of(self)
    }

    /// True for paths directly below the root guardian.
    pub fn is_top_level(&self) -> bool {
        self.segments.len() == 1
    }

    /// Compares two paths treating an undefined uid on either side as a wildcard.
    pub fn same_actor(&self, other: &ActorPath) -> bool {
        self.address == other.address
            && self.segments == other.segments
            && (self.uid == other.uid || self.uid == 0 || other.uid == 0)
    }

    /// Makes a worker-local path resolvable from other workers by stamping the address of
    /// the hosting worker. Already globalized paths are returned unchanged.
    pub fn globalize(&self, address: &WorkerAddress) -> Self {
        if self.address.is_local() && self.address.system == address.system {
            self.with_address(address.clone())
        } else {
            self.clone()
        }
    }

    /// Inverse of [`ActorPath::globalize`]: paths hosted at `address` become local again.
    pub fn localize(&self, address: &WorkerAddress) -> Self {
        if &self.address == address {
            self.with_address(WorkerAddress::local(&address.system))
        } else {
            self.clone()
        }
    }

    /// Path rendered without address and uid, e.g. `/user/manager`.
    pub fn element_string(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

/// Checks that `name` can be used as an actor name.
pub(crate) fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('#')
        || name.starts_with('$')
        || name.trim() != name
    {
        Err(Error::InvalidName(name.to_owned()))
    } else {
        Ok(())
    }
}

fn split_segments(elements: &str) -> Result<(Vec<String>, u64), Error> {
    let (elements, uid) = match elements.rsplit_once('#') {
        Some((elements, uid)) => {
            let uid = uid.parse::<u64>().map_err(|e| {
                Error::Functional(format!("Invalid uid '{}': {}", uid, e))
            })?;
            (elements, uid)
        }
        None => (elements, 0),
    };
    let segments = elements
        .split('/')
        .filter(|x| !x.trim().is_empty())
        .map(|s| s.to_string())
        .collect();
    Ok((segments, uid))
}

impl ActorPath {
    /// Parses either the full form `rush://system@worker/a/b#uid` or the local form
    /// `/a/b#uid`, which gets the default address.
    ///
    /// # Errors
    ///
    /// Returns `Error::Functional` if the address or the uid is malformed.
    ///
    pub fn parse(path: &str) -> Result<Self, Error> {
        if path.contains("://") {
            return ActorPath::from_str(path);
        }
        let (segments, uid) = split_segments(path)?;
        Ok(ActorPath::new(WorkerAddress::default(), segments, uid))
    }
}

/// Lenient conversion. A string that does not parse keeps every character in its
/// segments, so it never names the root or a live actor.
impl From<&str> for ActorPath {
    fn from(str: &str) -> Self {
        ActorPath::parse(str).unwrap_or_else(|_| {
            let segments = str
                .split('/')
                .filter(|x| !x.trim().is_empty())
                .map(|s| s.to_string())
                .collect();
            ActorPath::new(WorkerAddress::default(), segments, 0)
        })
    }
}

impl From<String> for ActorPath {
    fn from(string: String) -> Self {
        ActorPath::from(string.as_str())
    }
}

impl From<&String> for ActorPath {
    fn from(string: &String) -> Self {
        ActorPath::from(string.as_str())
    }
}

impl FromStr for ActorPath {
    type Err = Error;

    /// Parses the full textual form `rush://system[@worker]/a/b[#uid]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(PROTOCOL)
            .and_then(|rest| rest.strip_prefix("://"))
            .ok_or_else(|| Error::Functional(format!("Invalid path '{}'", s)))?;
        let (authority, elements) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };
        let address =
            WorkerAddress::from_str(&format!("{}://{}", PROTOCOL, authority))?;
        let (segments, uid) = split_segments(elements)?;
        Ok(ActorPath::new(address, segments, uid))
    }
}

impl std::ops::Div<&str> for ActorPath {
    type Output = ActorPath;

    fn div(self, rhs: &str) -> Self::Output {
        let mut keys = self.segments;
        let mut tokens: Vec<String> = rhs
            .split('/')
            .filter(|x| !x.trim().is_empty())
            .map(|s| s.to_string())
            .collect();

        keys.append(&mut tokens);
        ActorPath::new(self.address, keys, 0)
    }
}

impl std::fmt::Display for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}{}", self.address, self.element_string())?;
        if self.uid != 0 {
            write!(f, "#{}", self.uid)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self)
    }
}
