// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Lock error types.

use super::{LockType, ResourceName, TxnId};

/// Errors reported by the lock manager, lock contexts and acquisition policy.
///
/// All of these are protocol errors surfaced to the caller. Waiting on a
/// conflicting lock is not an error; the call simply blocks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("{txn} already holds a lock on {resource}")]
    DuplicateLock { txn: TxnId, resource: ResourceName },

    #[error("{txn} holds no lock on {resource}")]
    NoLockHeld { txn: TxnId, resource: ResourceName },

    #[error("{txn} cannot promote {resource} from {from} to {to}")]
    InvalidPromotion {
        txn: TxnId,
        resource: ResourceName,
        from: LockType,
        to: LockType,
    },

    #[error("invalid lock request: {0}")]
    InvalidLock(String),

    #[error("{txn} was cancelled while waiting on {resource}")]
    Cancelled { txn: TxnId, resource: ResourceName },
}
