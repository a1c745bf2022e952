// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Lock manager: the grant table and per-resource wait queues.
//!
//! The lock manager is the single source of truth for which transaction holds
//! which lock. It knows nothing about the resource hierarchy; it only refuses
//! to grant incompatible locks and blocks callers until their request fits.
//!
//! All state lives behind one mutex so that [`LockManager::acquire_and_release`]
//! can swap locks on several resources in a single critical section. Blocked
//! callers park on a condition variable and are handed their grant by whichever
//! thread frees the conflicting lock.

use std::collections::{HashMap, VecDeque};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use super::error::LockError;
use super::{LockType, ResourceName, TxnId};

/// A lock held by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    /// Transaction holding this lock.
    pub txn: TxnId,
    /// Resource being locked.
    pub name: ResourceName,
    /// Lock type.
    pub lock_type: LockType,
}

/// A request waiting for a conflicting lock to be released.
#[derive(Debug)]
struct LockRequest {
    id: u64,
    txn: TxnId,
    lock_type: LockType,
    /// Locks released atomically when this request is granted.
    release: Vec<ResourceName>,
}

/// Where a blocked request joins the wait queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueuePosition {
    /// Lock conversions that must not wait behind new arrivals.
    Front,
    /// Plain arrival order.
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Granted,
    Cancelled,
}

/// Grants and waiters for one resource.
#[derive(Debug, Default)]
struct ResourceEntry {
    grants: Vec<Lock>,
    queue: VecDeque<LockRequest>,
}

impl ResourceEntry {
    /// Checks `lock_type` against every grant not held by `except`.
    fn compatible(&self, lock_type: LockType, except: TxnId) -> bool {
        self.grants
            .iter()
            .filter(|lock| lock.txn != except)
            .all(|lock| lock.lock_type.compatible(lock_type))
    }
}

#[derive(Debug, Default)]
struct LockTable {
    resources: HashMap<ResourceName, ResourceEntry>,
    /// Per-transaction index of held locks.
    by_txn: HashMap<TxnId, HashMap<ResourceName, LockType>>,
    /// Results for parked requests, consumed by the waiting thread.
    outcomes: HashMap<u64, Outcome>,
    next_request_id: u64,
}

impl LockTable {
    fn lock_type(&self, txn: TxnId, name: &ResourceName) -> LockType {
        self.by_txn
            .get(&txn)
            .and_then(|locks| locks.get(name))
            .copied()
            .unwrap_or_default()
    }

    fn entry(&mut self, name: &ResourceName) -> &mut ResourceEntry {
        self.resources.entry(name.clone()).or_default()
    }

    /// Sets the lock held by `txn` on `name`, replacing any existing grant.
    fn set_grant(&mut self, txn: TxnId, name: &ResourceName, lock_type: LockType) {
        let entry = self.entry(name);
        match entry.grants.iter_mut().find(|lock| lock.txn == txn) {
            Some(lock) => lock.lock_type = lock_type,
            None => entry.grants.push(Lock {
                txn,
                name: name.clone(),
                lock_type,
            }),
        }
        self.by_txn
            .entry(txn)
            .or_default()
            .insert(name.clone(), lock_type);
    }

    fn remove_grant(&mut self, txn: TxnId, name: &ResourceName) -> bool {
        let Some(entry) = self.resources.get_mut(name) else {
            return false;
        };
        let before = entry.grants.len();
        entry.grants.retain(|lock| lock.txn != txn);
        let removed = entry.grants.len() != before;
        if entry.grants.is_empty() && entry.queue.is_empty() {
            self.resources.remove(name);
        }
        if let Some(locks) = self.by_txn.get_mut(&txn) {
            locks.remove(name);
            if locks.is_empty() {
                self.by_txn.remove(&txn);
            }
        }
        removed
    }

    /// Grants `lock_type` on `name` and drops the locks in `release`.
    ///
    /// Returns the resources whose queues may now make progress.
    fn apply(
        &mut self,
        txn: TxnId,
        name: &ResourceName,
        lock_type: LockType,
        release: &[ResourceName],
    ) -> Vec<ResourceName> {
        let mut freed = Vec::new();
        for released in release.iter().filter(|r| *r != name) {
            if self.remove_grant(txn, released) {
                freed.push(released.clone());
            }
        }
        self.set_grant(txn, name, lock_type);
        freed
    }

    fn enqueue(&mut self, name: &ResourceName, request: LockRequest, position: QueuePosition) {
        let entry = self.entry(name);
        match position {
            QueuePosition::Front => entry.queue.push_front(request),
            QueuePosition::Back => entry.queue.push_back(request),
        }
    }

    /// Checks that `new_type` is a real upgrade of the lock `txn` holds on
    /// `name` and returns the current type.
    fn check_promotion(
        &self,
        txn: TxnId,
        name: &ResourceName,
        new_type: LockType,
    ) -> Result<LockType, LockError> {
        let current = self.lock_type(txn, name);
        if current == LockType::NoLock {
            return Err(LockError::NoLockHeld {
                txn,
                resource: name.clone(),
            });
        }
        if new_type == current || !new_type.substitutable(current) {
            return Err(LockError::InvalidPromotion {
                txn,
                resource: name.clone(),
                from: current,
                to: new_type,
            });
        }
        Ok(current)
    }

    fn next_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    /// Grants queued requests in FIFO order for as long as the head of each
    /// queue is compatible with the current holders.
    ///
    /// Granting a request may free locks elsewhere, so those queues are
    /// processed too. Returns true if anything was granted.
    fn process_queues(&mut self, names: Vec<ResourceName>) -> bool {
        let mut pending = names;
        let mut granted_any = false;
        while let Some(name) = pending.pop() {
            loop {
                let Some(entry) = self.resources.get_mut(&name) else {
                    break;
                };
                let grantable = entry
                    .queue
                    .front()
                    .is_some_and(|head| entry.compatible(head.lock_type, head.txn));
                if !grantable {
                    break;
                }
                let Some(request) = entry.queue.pop_front() else {
                    break;
                };
                debug!(
                    txn = %request.txn,
                    resource = %name,
                    lock = %request.lock_type,
                    "Granting queued lock request"
                );
                let freed = self.apply(request.txn, &name, request.lock_type, &request.release);
                self.outcomes.insert(request.id, Outcome::Granted);
                pending.extend(freed);
                granted_any = true;
            }
            if let Some(entry) = self.resources.get(&name) {
                if entry.grants.is_empty() && entry.queue.is_empty() {
                    self.resources.remove(&name);
                }
            }
        }
        granted_any
    }
}

/// Owner of every grant and wait queue.
///
/// Share one instance between all lock contexts (usually behind an `Arc`).
/// Calls that cannot be granted immediately block the calling thread until
/// the request is granted or cancelled with [`LockManager::cancel`].
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
    changed: Condvar,
}

impl LockManager {
    /// Creates an empty lock manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires `lock_type` on `name` for `txn`, blocking on conflict.
    ///
    /// The request is granted immediately only if it is compatible with every
    /// other holder and nobody is already queued on the resource; otherwise it
    /// waits behind earlier requests.
    pub fn acquire(
        &self,
        txn: TxnId,
        name: &ResourceName,
        lock_type: LockType,
    ) -> Result<(), LockError> {
        if lock_type == LockType::NoLock {
            return Err(LockError::InvalidLock(format!(
                "{txn} cannot acquire NL on {name}"
            )));
        }

        let mut table = self.table.lock();
        if table.lock_type(txn, name) != LockType::NoLock {
            return Err(LockError::DuplicateLock {
                txn,
                resource: name.clone(),
            });
        }

        let entry = table.entry(name);
        if entry.queue.is_empty() && entry.compatible(lock_type, txn) {
            table.set_grant(txn, name, lock_type);
            trace!(txn = %txn, resource = %name, lock = %lock_type, "Lock acquired");
            return Ok(());
        }

        let id = table.next_id();
        table.enqueue(
            name,
            LockRequest {
                id,
                txn,
                lock_type,
                release: Vec::new(),
            },
            QueuePosition::Back,
        );
        debug!(txn = %txn, resource = %name, lock = %lock_type, "Acquire blocked");
        self.wait_for(table, id, txn, name)
    }

    /// Releases the lock `txn` holds on `name` and wakes compatible waiters.
    pub fn release(&self, txn: TxnId, name: &ResourceName) -> Result<(), LockError> {
        let mut table = self.table.lock();
        if !table.remove_grant(txn, name) {
            return Err(LockError::NoLockHeld {
                txn,
                resource: name.clone(),
            });
        }
        trace!(txn = %txn, resource = %name, "Lock released");

        if table.process_queues(vec![name.clone()]) {
            self.changed.notify_all();
        }
        Ok(())
    }

    /// Upgrades the lock `txn` holds on `name` to `new_type`.
    ///
    /// `new_type` must be substitutable for the current type and differ from
    /// it. If it conflicts with another holder the call queues behind the
    /// requests already waiting and blocks.
    pub fn promote(
        &self,
        txn: TxnId,
        name: &ResourceName,
        new_type: LockType,
    ) -> Result<(), LockError> {
        let mut table = self.table.lock();
        let current = table.check_promotion(txn, name, new_type)?;

        if table.entry(name).compatible(new_type, txn) {
            table.set_grant(txn, name, new_type);
            debug!(txn = %txn, resource = %name, from = %current, to = %new_type, "Lock promoted");
            return Ok(());
        }

        let id = table.next_id();
        table.enqueue(
            name,
            LockRequest {
                id,
                txn,
                lock_type: new_type,
                release: Vec::new(),
            },
            QueuePosition::Back,
        );
        debug!(txn = %txn, resource = %name, from = %current, to = %new_type, "Promotion blocked");
        self.wait_for(table, id, txn, name)
    }

    /// Promotes the lock `txn` holds on `name` to `new_type` and releases
    /// every lock in `release` as one atomic step.
    ///
    /// Validated like [`LockManager::promote`] and queued the same way: on
    /// conflict the request waits behind the requests already queued, with
    /// the old locks still held.
    pub fn promote_and_release(
        &self,
        txn: TxnId,
        name: &ResourceName,
        new_type: LockType,
        release: &[ResourceName],
    ) -> Result<(), LockError> {
        let table = self.table.lock();
        table.check_promotion(txn, name, new_type)?;
        self.swap(table, txn, name, new_type, release, QueuePosition::Back)
    }

    /// Acquires `lock_type` on `name` and releases every lock in `release`
    /// as one atomic step.
    ///
    /// `name` may appear in `release`, in which case its existing lock is
    /// replaced. If the new lock conflicts, the request goes to the front of
    /// the queue (it converts locks the transaction already holds) and the old
    /// locks stay held until the swap happens.
    pub fn acquire_and_release(
        &self,
        txn: TxnId,
        name: &ResourceName,
        lock_type: LockType,
        release: &[ResourceName],
    ) -> Result<(), LockError> {
        if lock_type == LockType::NoLock {
            return Err(LockError::InvalidLock(format!(
                "{txn} cannot acquire NL on {name}"
            )));
        }

        let table = self.table.lock();
        if table.lock_type(txn, name) != LockType::NoLock && !release.contains(name) {
            return Err(LockError::DuplicateLock {
                txn,
                resource: name.clone(),
            });
        }
        self.swap(table, txn, name, lock_type, release, QueuePosition::Front)
    }

    /// Grants `lock_type` on `name` while dropping `release`, or parks the
    /// request at `position` until that can be done in one step.
    fn swap(
        &self,
        mut table: MutexGuard<'_, LockTable>,
        txn: TxnId,
        name: &ResourceName,
        lock_type: LockType,
        release: &[ResourceName],
        position: QueuePosition,
    ) -> Result<(), LockError> {
        if let Some(missing) = release
            .iter()
            .find(|r| table.lock_type(txn, r) == LockType::NoLock)
        {
            return Err(LockError::NoLockHeld {
                txn,
                resource: missing.clone(),
            });
        }

        if table.entry(name).compatible(lock_type, txn) {
            let mut freed = table.apply(txn, name, lock_type, release);
            debug!(
                txn = %txn,
                resource = %name,
                lock = %lock_type,
                released = freed.len(),
                "Lock swapped"
            );
            freed.push(name.clone());
            if table.process_queues(freed) {
                self.changed.notify_all();
            }
            return Ok(());
        }

        let id = table.next_id();
        table.enqueue(
            name,
            LockRequest {
                id,
                txn,
                lock_type,
                release: release.to_vec(),
            },
            position,
        );
        debug!(
            txn = %txn,
            resource = %name,
            lock = %lock_type,
            ?position,
            "Swap blocked"
        );
        self.wait_for(table, id, txn, name)
    }

    /// Removes every queued request of `txn` and wakes its blocked caller
    /// with [`LockError::Cancelled`].
    ///
    /// Other waiters keep their relative order. Returns the number of
    /// requests removed.
    pub fn cancel(&self, txn: TxnId) -> usize {
        let mut table = self.table.lock();
        let mut cancelled = Vec::new();
        let mut touched = Vec::new();
        for (name, entry) in table.resources.iter_mut() {
            let before = entry.queue.len();
            entry.queue.retain(|request| {
                if request.txn == txn {
                    cancelled.push(request.id);
                    false
                } else {
                    true
                }
            });
            if entry.queue.len() != before {
                touched.push(name.clone());
            }
        }
        if cancelled.is_empty() {
            return 0;
        }

        for id in &cancelled {
            table.outcomes.insert(*id, Outcome::Cancelled);
        }
        debug!(txn = %txn, requests = cancelled.len(), "Cancelled waiting requests");
        table.process_queues(touched);
        self.changed.notify_all();
        cancelled.len()
    }

    /// Returns the lock type `txn` holds on `name` (NL if none).
    pub fn lock_type(&self, txn: TxnId, name: &ResourceName) -> LockType {
        self.table.lock().lock_type(txn, name)
    }

    /// Returns the lock types `txn` holds on each of `names`, read under a
    /// single critical section.
    pub fn lock_types(&self, txn: TxnId, names: &[ResourceName]) -> Vec<LockType> {
        let table = self.table.lock();
        names.iter().map(|name| table.lock_type(txn, name)).collect()
    }

    /// Returns every lock held on `name`, in grant order.
    pub fn locks_on(&self, name: &ResourceName) -> Vec<Lock> {
        self.table
            .lock()
            .resources
            .get(name)
            .map(|entry| entry.grants.clone())
            .unwrap_or_default()
    }

    /// Returns every lock held by `txn`, ordered by resource name.
    pub fn locks_held(&self, txn: TxnId) -> Vec<Lock> {
        let table = self.table.lock();
        let mut locks: Vec<Lock> = table
            .by_txn
            .get(&txn)
            .map(|held| {
                held.iter()
                    .map(|(name, lock_type)| Lock {
                        txn,
                        name: name.clone(),
                        lock_type: *lock_type,
                    })
                    .collect()
            })
            .unwrap_or_default();
        locks.sort_by(|a, b| a.name.cmp(&b.name));
        locks
    }

    /// Number of requests waiting on `name`.
    pub fn queue_len(&self, name: &ResourceName) -> usize {
        self.table
            .lock()
            .resources
            .get(name)
            .map_or(0, |entry| entry.queue.len())
    }

    /// Returns true if `txn` has a request parked in any queue.
    pub fn is_waiting(&self, txn: TxnId) -> bool {
        self.table
            .lock()
            .resources
            .values()
            .any(|entry| entry.queue.iter().any(|request| request.txn == txn))
    }

    /// Parks the caller until request `id` is granted or cancelled.
    fn wait_for(
        &self,
        mut table: MutexGuard<'_, LockTable>,
        id: u64,
        txn: TxnId,
        name: &ResourceName,
    ) -> Result<(), LockError> {
        loop {
            let outcome = table.outcomes.remove(&id);
            match outcome {
                Some(Outcome::Granted) => {
                    trace!(txn = %txn, resource = %name, "Woken with grant");
                    return Ok(());
                }
                Some(Outcome::Cancelled) => {
                    return Err(LockError::Cancelled {
                        txn,
                        resource: name.clone(),
                    });
                }
                None => self.changed.wait(&mut table),
            }
        }
    }
}
