// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Actor runtime for single-threaded cooperative workers.
//! Re-exports the `actor` crate: cells, supervision, death watch, addressing and the
//! transport between workers.

pub use actor::*;
