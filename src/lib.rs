// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! granlock: a multigranularity lock manager for transactional data stores
//!
//! Transactions lock a database/table/page/record hierarchy with intent locks,
//! block in FIFO order on conflicts, and escalate fine-grained locks into
//! coarse ones when that is simpler.

pub mod concurrency;

pub use concurrency::{
    ensure_sufficient_lock_held, Lock, LockConfig, LockContext, LockError, LockHierarchy,
    LockManager, LockType, ResourceName, TxnId,
};
