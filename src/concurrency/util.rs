// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Declarative lock acquisition.
//!
//! Callers state what they need to do with a resource (read it, write it, or
//! nothing) and [`ensure_sufficient_lock_held`] works out the smallest set of
//! acquisitions, promotions and escalations on the resource and its ancestors
//! that makes the request legal.

use tracing::{debug, trace};

use super::context::LockContext;
use super::error::LockError;
use super::{LockType, TxnId};

/// Ensures `txn` can perform actions requiring `request` on `context`.
///
/// `request` must be S, X or NL. Without a transaction or a context this is a
/// no-op: access outside a transaction is not locked. Ancestors are locked
/// top-down before the resource itself, and no lock stronger than needed is
/// ever requested. May block while conflicting locks are held.
pub fn ensure_sufficient_lock_held(
    context: Option<&LockContext>,
    txn: Option<TxnId>,
    request: LockType,
) -> Result<(), LockError> {
    if !matches!(
        request,
        LockType::Shared | LockType::Exclusive | LockType::NoLock
    ) {
        return Err(LockError::InvalidLock(format!(
            "can only ensure S, X or NL, not {request}"
        )));
    }
    let (Some(context), Some(txn)) = (context, txn) else {
        return Ok(());
    };
    if is_sufficient(context, txn, request) {
        return Ok(());
    }

    if let Some(parent) = context.parent_context() {
        if auto_escalate(&parent, txn)? && is_sufficient(context, txn, request) {
            return Ok(());
        }
        ensure_ancestor_lock(&parent, txn, request.parent_lock())?;
    }

    let explicit = context.explicit_lock_type(txn);
    trace!(
        txn = %txn,
        resource = %context.name(),
        explicit = %explicit,
        request = %request,
        "Ensuring lock"
    );
    match explicit {
        LockType::IntentExclusive if request == LockType::Shared => {
            context.promote(txn, LockType::SharedIntentExclusive)
        }
        // One swap straight to the lock that covers the request.
        held if held.is_intent() => context.escalate_to_cover(txn, request),
        LockType::NoLock => context.acquire(txn, request),
        _ => context.promote(txn, request),
    }
}

fn is_sufficient(context: &LockContext, txn: TxnId, request: LockType) -> bool {
    context.explicit_lock_type(txn).substitutable(request)
        || context.effective_lock_type(txn).substitutable(request)
}

/// Makes `context` hold at least the intent lock `needed`, fixing its own
/// ancestors first.
fn ensure_ancestor_lock(
    context: &LockContext,
    txn: TxnId,
    needed: LockType,
) -> Result<(), LockError> {
    if is_sufficient(context, txn, needed) {
        return Ok(());
    }
    if let Some(parent) = context.parent_context() {
        ensure_ancestor_lock(&parent, txn, needed.parent_lock())?;
    }

    match context.explicit_lock_type(txn) {
        LockType::NoLock => context.acquire(txn, needed),
        // S plus IX is SIX.
        LockType::Shared if needed == LockType::IntentExclusive => {
            context.promote(txn, LockType::SharedIntentExclusive)
        }
        _ => context.promote(txn, needed),
    }
}

/// Escalates `parent` when the configured saturation has been reached.
///
/// Returns true if an escalation happened.
fn auto_escalate(parent: &LockContext, txn: TxnId) -> Result<bool, LockError> {
    if !parent.explicit_lock_type(txn).is_intent() {
        return Ok(false);
    }
    let capacity = parent.capacity();
    let saturation = parent.saturation(txn);
    if !parent.config().should_escalate(capacity, saturation) {
        return Ok(false);
    }

    debug!(
        txn = %txn,
        resource = %parent.name(),
        capacity,
        saturation,
        "Auto-escalating saturated resource"
    );
    parent.escalate(txn)?;
    Ok(true)
}
