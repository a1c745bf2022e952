// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Lock contexts: the resource hierarchy layered on top of the lock manager.
//!
//! Every resource in the hierarchy has one [`LockContext`]. Contexts are
//! created lazily and live in an arena owned by the [`LockHierarchy`]; a
//! context refers to its parent by arena index, never by an owning pointer.
//!
//! Contexts never own grants. Explicit lock types are always read back from
//! the [`LockManager`]; the only state a context keeps is, per transaction,
//! how many of its direct children that transaction has locked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::config::LockConfig;
use super::error::LockError;
use super::manager::{Lock, LockManager};
use super::{LockType, ResourceName, TxnId};

/// Name of the root resource.
pub const DATABASE: &str = "database";

struct ContextNode {
    name: ResourceName,
    parent: Option<usize>,
    /// Number of child contexts created so far.
    children: AtomicUsize,
    /// Overrides `children` when set.
    capacity: Mutex<Option<usize>>,
    /// Per transaction: number of direct children it holds locks on.
    child_locks: Mutex<HashMap<TxnId, usize>>,
}

#[derive(Default)]
struct Arena {
    nodes: Vec<Arc<ContextNode>>,
    by_name: HashMap<ResourceName, usize>,
}

struct HierarchyShared {
    manager: Arc<LockManager>,
    config: LockConfig,
    arena: RwLock<Arena>,
}

impl HierarchyShared {
    fn context(self: &Arc<Self>, name: &ResourceName) -> LockContext {
        let id = self.node_id(name);
        self.context_at(id)
    }

    fn context_at(self: &Arc<Self>, id: usize) -> LockContext {
        let node = self.arena.read().nodes[id].clone();
        LockContext {
            shared: Arc::clone(self),
            node,
        }
    }

    /// Looks up a node, creating it and any missing ancestors.
    fn node_id(&self, name: &ResourceName) -> usize {
        if let Some(id) = self.arena.read().by_name.get(name) {
            return *id;
        }

        let parent = name.parent().map(|parent| self.node_id(&parent));
        let mut arena = self.arena.write();
        if let Some(id) = arena.by_name.get(name) {
            return *id;
        }
        let id = arena.nodes.len();
        arena.nodes.push(Arc::new(ContextNode {
            name: name.clone(),
            parent,
            children: AtomicUsize::new(0),
            capacity: Mutex::new(None),
            child_locks: Mutex::new(HashMap::new()),
        }));
        arena.by_name.insert(name.clone(), id);
        if let Some(parent) = parent {
            arena.nodes[parent].children.fetch_add(1, Ordering::Relaxed);
        }
        id
    }
}

/// Registry of every lock context, rooted at the `database` resource.
///
/// Cloning is cheap; clones share the same arena and lock manager.
#[derive(Clone)]
pub struct LockHierarchy {
    shared: Arc<HierarchyShared>,
}

impl LockHierarchy {
    /// Creates a hierarchy over `manager` with the default configuration.
    pub fn new(manager: Arc<LockManager>) -> Self {
        Self::with_config(manager, LockConfig::default())
    }

    /// Creates a hierarchy over `manager`.
    pub fn with_config(manager: Arc<LockManager>, config: LockConfig) -> Self {
        Self {
            shared: Arc::new(HierarchyShared {
                manager,
                config,
                arena: RwLock::new(Arena::default()),
            }),
        }
    }

    /// Returns the context of the `database` resource.
    pub fn root(&self) -> LockContext {
        self.shared.context(&ResourceName::root(DATABASE))
    }

    /// Returns the context for `name`, creating it if needed.
    pub fn context(&self, name: &ResourceName) -> LockContext {
        self.shared.context(name)
    }

    /// Returns the underlying lock manager.
    pub fn manager(&self) -> &Arc<LockManager> {
        &self.shared.manager
    }

    /// Releases every lock held by `txn`, deepest resources first.
    ///
    /// Returns the number of locks released.
    pub fn release_all(&self, txn: TxnId) -> Result<usize, LockError> {
        let mut locks = self.shared.manager.locks_held(txn);
        locks.sort_by(|a, b| b.name.depth().cmp(&a.name.depth()));
        for lock in &locks {
            self.context(&lock.name).release(txn)?;
        }
        debug!(txn = %txn, released = locks.len(), "Released all locks");
        Ok(locks.len())
    }
}

/// One node of the resource hierarchy.
///
/// Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct LockContext {
    shared: Arc<HierarchyShared>,
    node: Arc<ContextNode>,
}

impl LockContext {
    /// Name of the resource this context guards.
    #[inline]
    pub fn name(&self) -> &ResourceName {
        &self.node.name
    }

    /// Returns the parent context, or `None` at the root.
    pub fn parent_context(&self) -> Option<LockContext> {
        self.node.parent.map(|id| self.shared.context_at(id))
    }

    /// Returns the context of the child named `segment`.
    pub fn child_context(&self, segment: impl Into<String>) -> LockContext {
        self.shared.context(&self.node.name.child(segment))
    }

    /// Returns the configuration of the owning hierarchy.
    pub fn config(&self) -> &LockConfig {
        &self.shared.config
    }

    /// The lock `txn` holds on exactly this resource (NL if none).
    pub fn explicit_lock_type(&self, txn: TxnId) -> LockType {
        self.shared.manager.lock_type(txn, self.name())
    }

    /// The strongest permission `txn` has on this resource once ancestor locks
    /// are taken into account.
    ///
    /// X on an ancestor makes every descendant X; S or SIX on an ancestor makes
    /// every descendant at least S.
    pub fn effective_lock_type(&self, txn: TxnId) -> LockType {
        use LockType::*;

        let path = self.path();
        let types = self.shared.manager.lock_types(txn, &path);
        let Some((&explicit, ancestors)) = types.split_last() else {
            return NoLock;
        };

        let inherited = ancestors
            .iter()
            .fold(NoLock, |inherited, lock_type| match lock_type {
                Exclusive => Exclusive,
                Shared | SharedIntentExclusive if inherited != Exclusive => Shared,
                _ => inherited,
            });

        match (inherited, explicit) {
            (Exclusive, _) => Exclusive,
            (Shared, IntentExclusive) => SharedIntentExclusive,
            (Shared, SharedIntentExclusive | Exclusive) => explicit,
            (Shared, _) => Shared,
            _ => explicit,
        }
    }

    /// Acquires `lock_type` on this resource.
    ///
    /// The parent must already hold a lock that permits `lock_type`; this
    /// method never touches ancestors. Blocks while the lock conflicts with
    /// other transactions.
    pub fn acquire(&self, txn: TxnId, lock_type: LockType) -> Result<(), LockError> {
        if lock_type == LockType::NoLock {
            return Err(LockError::InvalidLock(format!(
                "{txn} cannot acquire NL on {}; release the lock instead",
                self.name()
            )));
        }
        let parent = self.parent_context();
        if let Some(parent) = &parent {
            parent.check_parent_permits(txn, lock_type, self.name())?;
        }
        if matches!(lock_type, LockType::Shared | LockType::IntentShared)
            && self.has_six_ancestor(txn)
        {
            return Err(LockError::InvalidLock(format!(
                "{txn} holds SIX above {}; {lock_type} would be redundant",
                self.name()
            )));
        }

        self.shared.manager.acquire(txn, self.name(), lock_type)?;
        if let Some(parent) = &parent {
            parent.adjust_child_locks(txn, 1);
        }
        Ok(())
    }

    /// Releases the lock `txn` holds on this resource.
    ///
    /// Fails while `txn` still holds locks on children of this resource.
    pub fn release(&self, txn: TxnId) -> Result<(), LockError> {
        let children = self.num_child_locks(txn);
        if children > 0 {
            return Err(LockError::InvalidLock(format!(
                "{txn} still holds {children} lock(s) below {}",
                self.name()
            )));
        }

        self.shared.manager.release(txn, self.name())?;
        if let Some(parent) = self.parent_context() {
            parent.adjust_child_locks(txn, -1);
        }
        Ok(())
    }

    /// Promotes the lock `txn` holds on this resource to `new_type`.
    ///
    /// Locks below this resource that the new lock makes redundant are
    /// released in the same atomic step: S and IS locks when promoting to
    /// SIX, everything when promoting to X. On conflict the promotion waits
    /// behind requests already queued on this resource.
    pub fn promote(&self, txn: TxnId, new_type: LockType) -> Result<(), LockError> {
        let current = self.explicit_lock_type(txn);
        if current == LockType::NoLock {
            return Err(LockError::NoLockHeld {
                txn,
                resource: self.name().clone(),
            });
        }
        if new_type == current || !new_type.substitutable(current) {
            return Err(LockError::InvalidPromotion {
                txn,
                resource: self.name().clone(),
                from: current,
                to: new_type,
            });
        }
        if let Some(parent) = self.parent_context() {
            parent.check_parent_permits(txn, new_type, self.name())?;
        }
        if new_type == LockType::SharedIntentExclusive && self.has_six_ancestor(txn) {
            return Err(LockError::InvalidLock(format!(
                "{txn} holds SIX above {}; SIX would be redundant",
                self.name()
            )));
        }

        let redundant: Vec<Lock> = match new_type {
            LockType::SharedIntentExclusive => self
                .descendant_locks(txn)
                .into_iter()
                .filter(|lock| {
                    matches!(lock.lock_type, LockType::Shared | LockType::IntentShared)
                })
                .collect(),
            LockType::Exclusive => self.descendant_locks(txn),
            _ => Vec::new(),
        };
        if redundant.is_empty() {
            return self.shared.manager.promote(txn, self.name(), new_type);
        }

        let release: Vec<ResourceName> = redundant.iter().map(|lock| lock.name.clone()).collect();
        self.shared
            .manager
            .promote_and_release(txn, self.name(), new_type, &release)?;
        self.forget_released(txn, &redundant);
        debug!(
            txn = %txn,
            resource = %self.name(),
            from = %current,
            to = %new_type,
            released = redundant.len(),
            "Promoted and released redundant locks"
        );
        Ok(())
    }

    /// Replaces every lock `txn` holds at or below this resource with a single
    /// lock here: X if any of them was IX, SIX or X, otherwise S.
    ///
    /// Escalating again without new acquisitions is a no-op.
    pub fn escalate(&self, txn: TxnId) -> Result<(), LockError> {
        self.escalate_to_cover(txn, LockType::NoLock)
    }

    /// Escalates like [`LockContext::escalate`], but to X whenever `request`
    /// is X, so the caller never needs a second promotion.
    pub(crate) fn escalate_to_cover(
        &self,
        txn: TxnId,
        request: LockType,
    ) -> Result<(), LockError> {
        let mut explicit = LockType::NoLock;
        let mut descendants = Vec::new();
        for lock in self.shared.manager.locks_held(txn) {
            if lock.name == *self.name() {
                explicit = lock.lock_type;
            } else if lock.name.is_descendant_of(self.name()) {
                descendants.push(lock);
            }
        }
        if explicit == LockType::NoLock && descendants.is_empty() {
            return Err(LockError::InvalidLock(format!(
                "{txn} holds no locks at or below {} to escalate",
                self.name()
            )));
        }

        let exclusive = std::iter::once(explicit)
            .chain(descendants.iter().map(|lock| lock.lock_type))
            .chain(std::iter::once(request))
            .any(|lock_type| {
                matches!(
                    lock_type,
                    LockType::IntentExclusive | LockType::SharedIntentExclusive | LockType::Exclusive
                )
            });
        let target = if exclusive {
            LockType::Exclusive
        } else {
            LockType::Shared
        };
        if explicit == target && descendants.is_empty() {
            return Ok(());
        }

        let parent = self.parent_context();
        if let Some(parent) = &parent {
            parent.check_parent_permits(txn, target, self.name())?;
        }

        let mut release: Vec<ResourceName> =
            descendants.iter().map(|lock| lock.name.clone()).collect();
        if explicit != LockType::NoLock {
            release.push(self.name().clone());
        }
        self.shared
            .manager
            .acquire_and_release(txn, self.name(), target, &release)?;

        self.forget_released(txn, &descendants);
        if explicit == LockType::NoLock {
            if let Some(parent) = &parent {
                parent.adjust_child_locks(txn, 1);
            }
        }
        debug!(
            txn = %txn,
            resource = %self.name(),
            from = %explicit,
            to = %target,
            released = descendants.len(),
            "Escalated locks"
        );
        Ok(())
    }

    /// Number of direct children of this resource on which `txn` holds locks.
    pub fn num_child_locks(&self, txn: TxnId) -> usize {
        self.node
            .child_locks
            .lock()
            .get(&txn)
            .copied()
            .unwrap_or(0)
    }

    /// Number of children this resource has, or the value set with
    /// [`LockContext::set_capacity`].
    pub fn capacity(&self) -> usize {
        match *self.node.capacity.lock() {
            Some(capacity) => capacity,
            None => self.node.children.load(Ordering::Relaxed),
        }
    }

    /// Overrides the capacity, e.g. with the page count of a table.
    pub fn set_capacity(&self, capacity: usize) {
        *self.node.capacity.lock() = Some(capacity);
    }

    /// Fraction of this resource's children locked by `txn`.
    pub fn saturation(&self, txn: TxnId) -> f64 {
        let capacity = self.capacity();
        if capacity == 0 {
            return 0.0;
        }
        self.num_child_locks(txn) as f64 / capacity as f64
    }

    /// Names from the root down to this resource.
    fn path(&self) -> Vec<ResourceName> {
        let mut path = vec![self.name().clone()];
        while let Some(parent) = path[path.len() - 1].parent() {
            path.push(parent);
        }
        path.reverse();
        path
    }

    fn has_six_ancestor(&self, txn: TxnId) -> bool {
        let mut path = self.path();
        path.pop();
        self.shared
            .manager
            .lock_types(txn, &path)
            .contains(&LockType::SharedIntentExclusive)
    }

    /// Locks `txn` holds strictly below this resource.
    fn descendant_locks(&self, txn: TxnId) -> Vec<Lock> {
        self.shared
            .manager
            .locks_held(txn)
            .into_iter()
            .filter(|lock| lock.name.is_descendant_of(self.name()))
            .collect()
    }

    /// Fails unless the lock `txn` holds here allows `child_type` on a child.
    fn check_parent_permits(
        &self,
        txn: TxnId,
        child_type: LockType,
        child: &ResourceName,
    ) -> Result<(), LockError> {
        let parent_type = self.explicit_lock_type(txn);
        if parent_type.can_be_parent_lock(child_type) {
            return Ok(());
        }
        Err(LockError::InvalidLock(format!(
            "{txn} holds {parent_type} on {}, which does not permit {child_type} on {child}",
            self.name()
        )))
    }

    /// Drops child-lock counts for locks that were released by a swap.
    fn forget_released(&self, txn: TxnId, released: &[Lock]) {
        for lock in released {
            if let Some(parent) = lock.name.parent() {
                self.shared.context(&parent).adjust_child_locks(txn, -1);
            }
        }
    }

    fn adjust_child_locks(&self, txn: TxnId, delta: isize) {
        let mut counts = self.node.child_locks.lock();
        let count = counts.entry(txn).or_insert(0);
        *count = count.saturating_add_signed(delta);
        if *count == 0 {
            counts.remove(&txn);
        }
    }
}

impl std::fmt::Debug for LockContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockContext")
            .field("name", &self.node.name)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    use LockType::*;

    fn setup() -> (LockHierarchy, LockContext, LockContext, Vec<LockContext>) {
        let hierarchy = LockHierarchy::new(Arc::new(LockManager::new()));
        let db = hierarchy.root();
        let table = db.child_context("orders");
        let pages = (0..3).map(|i| table.child_context(format!("page{i}"))).collect();
        (hierarchy, db, table, pages)
    }

    fn held(hierarchy: &LockHierarchy, txn: TxnId) -> Vec<(String, LockType)> {
        hierarchy
            .manager()
            .locks_held(txn)
            .into_iter()
            .map(|lock| (lock.name.to_string(), lock.lock_type))
            .collect()
    }

    /// Spins until `cond` holds; blocked threads give no other signal.
    fn wait_until(cond: impl Fn() -> bool) {
        for _ in 0..2000 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_contexts_are_shared() {
        let (hierarchy, db, table, _) = setup();
        let same = hierarchy.context(&ResourceName::root(DATABASE).child("orders"));

        assert_eq!(same.name(), table.name());
        assert_eq!(table.parent_context().unwrap().name(), db.name());
        assert!(db.parent_context().is_none());
        assert_eq!(table.capacity(), 3);
        assert_eq!(db.capacity(), 1);
    }

    #[test]
    fn test_acquire_requires_parent_lock() {
        let (_, db, table, _) = setup();
        let txn = TxnId(1);

        let result = table.acquire(txn, Shared);
        assert!(matches!(result, Err(LockError::InvalidLock(_))));

        db.acquire(txn, IntentShared).unwrap();
        let result = table.acquire(txn, Exclusive);
        assert!(matches!(result, Err(LockError::InvalidLock(_))));

        table.acquire(txn, Shared).unwrap();
        assert_eq!(table.explicit_lock_type(txn), Shared);
        assert_eq!(db.num_child_locks(txn), 1);
    }

    #[test]
    fn test_acquire_no_lock_rejected() {
        let (_, db, _, _) = setup();
        let result = db.acquire(TxnId(1), NoLock);
        assert!(matches!(result, Err(LockError::InvalidLock(_))));
    }

    #[test]
    fn test_acquire_redundant_under_six() {
        let (_, db, table, pages) = setup();
        let txn = TxnId(1);
        db.acquire(txn, IntentExclusive).unwrap();
        table.acquire(txn, SharedIntentExclusive).unwrap();

        let result = pages[0].acquire(txn, Shared);
        assert!(matches!(result, Err(LockError::InvalidLock(_))));
        let result = pages[0].acquire(txn, IntentShared);
        assert!(matches!(result, Err(LockError::InvalidLock(_))));

        pages[0].acquire(txn, Exclusive).unwrap();
    }

    #[test]
    fn test_acquire_duplicate() {
        let (_, db, _, _) = setup();
        db.acquire(TxnId(1), IntentShared).unwrap();
        let result = db.acquire(TxnId(1), IntentShared);
        assert!(matches!(result, Err(LockError::DuplicateLock { .. })));
    }

    #[test]
    fn test_release_top_down_order() {
        let (hierarchy, db, table, _) = setup();
        let txn = TxnId(1);
        db.acquire(txn, IntentExclusive).unwrap();
        table.acquire(txn, Exclusive).unwrap();

        let result = db.release(txn);
        assert!(matches!(result, Err(LockError::InvalidLock(_))));

        table.release(txn).unwrap();
        assert_eq!(db.num_child_locks(txn), 0);
        db.release(txn).unwrap();
        assert!(held(&hierarchy, txn).is_empty());

        let result = db.release(txn);
        assert!(matches!(result, Err(LockError::NoLockHeld { .. })));
    }

    #[test]
    fn test_effective_lock_type() {
        let (_, db, table, pages) = setup();
        let txn = TxnId(1);

        db.acquire(txn, IntentShared).unwrap();
        assert_eq!(table.effective_lock_type(txn), NoLock);

        table.acquire(txn, Shared).unwrap();
        assert_eq!(table.effective_lock_type(txn), Shared);
        assert_eq!(pages[0].effective_lock_type(txn), Shared);
        assert_eq!(pages[0].explicit_lock_type(txn), NoLock);
    }

    #[test]
    fn test_effective_lock_type_exclusive_ancestor() {
        let (_, db, table, pages) = setup();
        let txn = TxnId(1);
        db.acquire(txn, Exclusive).unwrap();

        assert_eq!(table.effective_lock_type(txn), Exclusive);
        assert_eq!(pages[2].effective_lock_type(txn), Exclusive);
        assert_eq!(pages[2].effective_lock_type(TxnId(2)), NoLock);
    }

    #[test]
    fn test_effective_lock_type_under_six() {
        let (_, db, table, pages) = setup();
        let txn = TxnId(1);
        db.acquire(txn, SharedIntentExclusive).unwrap();
        table.acquire(txn, IntentExclusive).unwrap();

        assert_eq!(db.effective_lock_type(txn), SharedIntentExclusive);
        assert_eq!(table.effective_lock_type(txn), SharedIntentExclusive);
        assert_eq!(pages[0].effective_lock_type(txn), Shared);

        pages[0].acquire(txn, Exclusive).unwrap();
        assert_eq!(pages[0].effective_lock_type(txn), Exclusive);
    }

    #[test]
    fn test_exclusive_blocks_other_transactions_below() {
        let (hierarchy, db, table, _) = setup();
        db.acquire(TxnId(1), IntentExclusive).unwrap();
        table.acquire(TxnId(1), Exclusive).unwrap();
        db.acquire(TxnId(2), IntentShared).unwrap();

        thread::scope(|s| {
            let reader = s.spawn(|| table.acquire(TxnId(2), IntentShared));
            wait_until(|| hierarchy.manager().is_waiting(TxnId(2)));
            assert_eq!(hierarchy.manager().cancel(TxnId(2)), 1);
            let result = reader.join().unwrap();
            assert!(matches!(result, Err(LockError::Cancelled { .. })));
        });

        assert_eq!(db.num_child_locks(TxnId(2)), 0);
        assert_eq!(held(&hierarchy, TxnId(2)), vec![("database".to_string(), IntentShared)]);
    }

    #[test]
    fn test_promote() {
        let (_, db, table, _) = setup();
        let txn = TxnId(1);
        db.acquire(txn, IntentShared).unwrap();
        table.acquire(txn, Shared).unwrap();

        let result = table.promote(txn, Exclusive);
        assert!(matches!(result, Err(LockError::InvalidLock(_))));

        db.promote(txn, IntentExclusive).unwrap();
        table.promote(txn, Exclusive).unwrap();
        assert_eq!(table.explicit_lock_type(txn), Exclusive);
        assert_eq!(db.num_child_locks(txn), 1);

        let result = table.promote(txn, Shared);
        assert!(matches!(result, Err(LockError::InvalidPromotion { .. })));
        let result = table.promote(TxnId(2), Exclusive);
        assert!(matches!(result, Err(LockError::NoLockHeld { .. })));
    }

    #[test]
    fn test_promote_to_six_releases_redundant_locks() {
        let (hierarchy, db, table, pages) = setup();
        let txn = TxnId(1);
        db.acquire(txn, IntentExclusive).unwrap();
        table.acquire(txn, IntentExclusive).unwrap();
        pages[0].acquire(txn, Shared).unwrap();
        pages[1].acquire(txn, IntentShared).unwrap();
        pages[1].child_context("rec0").acquire(txn, Shared).unwrap();
        pages[2].acquire(txn, Exclusive).unwrap();
        assert_eq!(table.num_child_locks(txn), 3);

        table.promote(txn, SharedIntentExclusive).unwrap();

        assert_eq!(
            held(&hierarchy, txn),
            vec![
                ("database".to_string(), IntentExclusive),
                ("database/orders".to_string(), SharedIntentExclusive),
                ("database/orders/page2".to_string(), Exclusive),
            ]
        );
        assert_eq!(table.num_child_locks(txn), 1);
        assert_eq!(pages[1].num_child_locks(txn), 0);
    }

    #[test]
    fn test_promote_six_to_exclusive_releases_descendants() {
        let (hierarchy, db, table, pages) = setup();
        let txn = TxnId(1);
        db.acquire(txn, IntentExclusive).unwrap();
        table.acquire(txn, SharedIntentExclusive).unwrap();
        pages[0].acquire(txn, Exclusive).unwrap();
        pages[1].acquire(txn, IntentExclusive).unwrap();
        pages[1].child_context("rec0").acquire(txn, Exclusive).unwrap();

        table.promote(txn, Exclusive).unwrap();

        assert_eq!(
            held(&hierarchy, txn),
            vec![
                ("database".to_string(), IntentExclusive),
                ("database/orders".to_string(), Exclusive),
            ]
        );
        assert_eq!(table.num_child_locks(txn), 0);
        assert_eq!(pages[1].num_child_locks(txn), 0);
        assert_eq!(db.num_child_locks(txn), 1);
    }

    #[test]
    fn test_promote_to_six_waits_for_earlier_request() {
        let (hierarchy, db, table, pages) = setup();
        let mgr = hierarchy.manager();
        db.acquire(TxnId(1), IntentExclusive).unwrap();
        db.acquire(TxnId(2), IntentExclusive).unwrap();
        db.acquire(TxnId(3), IntentShared).unwrap();
        table.acquire(TxnId(1), IntentShared).unwrap();
        pages[0].acquire(TxnId(1), Shared).unwrap();
        table.acquire(TxnId(2), IntentExclusive).unwrap();

        thread::scope(|s| {
            let reader = s.spawn(|| table.acquire(TxnId(3), Shared));
            wait_until(|| mgr.queue_len(table.name()) == 1);
            let upgrader = s.spawn(|| table.promote(TxnId(1), SharedIntentExclusive));
            wait_until(|| mgr.queue_len(table.name()) == 2);

            table.release(TxnId(2)).unwrap();
            reader.join().unwrap().unwrap();
            assert_eq!(table.explicit_lock_type(TxnId(3)), Shared);
            assert_eq!(table.explicit_lock_type(TxnId(1)), IntentShared);
            assert_eq!(pages[0].explicit_lock_type(TxnId(1)), Shared);

            table.release(TxnId(3)).unwrap();
            upgrader.join().unwrap().unwrap();
        });

        assert_eq!(
            held(&hierarchy, TxnId(1)),
            vec![
                ("database".to_string(), IntentExclusive),
                ("database/orders".to_string(), SharedIntentExclusive),
            ]
        );
        assert_eq!(table.num_child_locks(TxnId(1)), 0);
    }

    #[test]
    fn test_escalate_shared() {
        let (hierarchy, db, table, pages) = setup();
        let txn = TxnId(1);
        db.acquire(txn, IntentShared).unwrap();
        table.acquire(txn, IntentShared).unwrap();
        for page in &pages {
            page.acquire(txn, Shared).unwrap();
        }
        assert_eq!(table.saturation(txn), 1.0);

        table.escalate(txn).unwrap();

        assert_eq!(
            held(&hierarchy, txn),
            vec![
                ("database".to_string(), IntentShared),
                ("database/orders".to_string(), Shared),
            ]
        );
        assert_eq!(table.num_child_locks(txn), 0);
        assert_eq!(db.num_child_locks(txn), 1);
    }

    #[test]
    fn test_escalate_exclusive() {
        let (hierarchy, db, table, pages) = setup();
        let txn = TxnId(1);
        db.acquire(txn, IntentExclusive).unwrap();
        table.acquire(txn, IntentExclusive).unwrap();
        pages[0].acquire(txn, Shared).unwrap();
        pages[1].acquire(txn, Exclusive).unwrap();

        db.escalate(txn).unwrap();

        assert_eq!(held(&hierarchy, txn), vec![("database".to_string(), Exclusive)]);
        assert_eq!(db.num_child_locks(txn), 0);
        assert_eq!(table.num_child_locks(txn), 0);
    }

    #[test]
    fn test_escalate_idempotent() {
        let (hierarchy, db, table, pages) = setup();
        let txn = TxnId(1);
        db.acquire(txn, IntentShared).unwrap();
        table.acquire(txn, IntentShared).unwrap();
        pages[0].acquire(txn, Shared).unwrap();

        table.escalate(txn).unwrap();
        let once = held(&hierarchy, txn);
        table.escalate(txn).unwrap();

        assert_eq!(held(&hierarchy, txn), once);
        assert_eq!(db.num_child_locks(txn), 1);
    }

    #[test]
    fn test_escalate_nothing_held() {
        let (_, db, table, _) = setup();
        db.acquire(TxnId(1), IntentShared).unwrap();
        let result = table.escalate(TxnId(1));
        assert!(matches!(result, Err(LockError::InvalidLock(_))));
    }

    #[test]
    fn test_capacity_and_saturation() {
        let (_, db, table, pages) = setup();
        let txn = TxnId(1);
        table.set_capacity(10);
        db.acquire(txn, IntentShared).unwrap();
        table.acquire(txn, IntentShared).unwrap();
        pages[0].acquire(txn, Shared).unwrap();
        pages[1].acquire(txn, Shared).unwrap();

        assert_eq!(table.capacity(), 10);
        assert!((table.saturation(txn) - 0.2).abs() < f64::EPSILON);
        assert_eq!(table.saturation(TxnId(2)), 0.0);
        assert_eq!(pages[0].saturation(txn), 0.0);
    }

    #[test]
    fn test_release_all_clears_counts() {
        let (hierarchy, db, table, pages) = setup();
        let txn = TxnId(1);
        db.acquire(txn, IntentExclusive).unwrap();
        table.acquire(txn, IntentExclusive).unwrap();
        pages[0].acquire(txn, Exclusive).unwrap();
        pages[1].acquire(txn, Shared).unwrap();

        assert_eq!(hierarchy.release_all(txn).unwrap(), 4);

        assert!(held(&hierarchy, txn).is_empty());
        assert_eq!(db.num_child_locks(txn), 0);
        assert_eq!(table.num_child_locks(txn), 0);
    }
}
