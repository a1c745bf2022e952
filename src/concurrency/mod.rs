// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Multigranularity locking over a resource hierarchy.
//!
//! This module lets concurrent transactions lock a hierarchy of resources
//! (database, tables, pages, records) at coarse or fine granularity:
//! - Six lock types (NL, IS, IX, S, SIX, X) with intent semantics
//! - A lock manager holding every grant, with FIFO wait queues
//! - Lock contexts tracking explicit and effective locks per resource
//! - Escalation of many fine-grained locks into one coarse lock
//! - A declarative acquisition policy that takes the minimal set of locks
//!
//! # Key Concepts
//!
//! ## Intent Locks
//!
//! Before locking a resource, a transaction must hold an intent lock on every
//! ancestor: IS above S locks, IX above X locks. A coarse S or X lock covers
//! the whole subtree, so the *effective* lock on a resource may be stronger
//! than the lock recorded for it explicitly.
//!
//! ## Fairness
//!
//! Requests on a resource are granted in arrival order. A shared request that
//! is compatible with the current holders still waits behind an earlier
//! exclusive request, so writers are not starved by a stream of readers.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use granlock::concurrency::{
//!     ensure_sufficient_lock_held, LockHierarchy, LockManager, LockType, TxnId,
//! };
//!
//! # fn example() -> Result<(), granlock::concurrency::LockError> {
//! let hierarchy = LockHierarchy::new(Arc::new(LockManager::new()));
//! let page = hierarchy.root().child_context("orders").child_context("page7");
//! let txn = TxnId(1);
//!
//! // Takes IS on the database and the table, then S on the page.
//! ensure_sufficient_lock_held(Some(&page), Some(txn), LockType::Shared)?;
//! assert_eq!(page.explicit_lock_type(txn), LockType::Shared);
//!
//! // Transaction end: release everything, deepest first.
//! hierarchy.release_all(txn)?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod config;
mod context;
mod error;
mod lock_type;
mod manager;
mod resource;
mod transaction;
mod util;

pub use config::LockConfig;
pub use context::{LockContext, LockHierarchy, DATABASE};
pub use error::LockError;
pub use lock_type::LockType;
pub use manager::{Lock, LockManager};
pub use resource::ResourceName;
pub use transaction::TxnId;
pub use util::ensure_sufficient_lock_held;
