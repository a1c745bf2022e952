// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The multigranularity lock type lattice.
//!
//! ```text
//!          NL   IS   IX   S    SIX  X
//! NL       ✓    ✓    ✓    ✓    ✓    ✓
//! IS       ✓    ✓    ✓    ✓    ✓    ✗
//! IX       ✓    ✓    ✓    ✗    ✗    ✗
//! S        ✓    ✓    ✗    ✓    ✗    ✗
//! SIX      ✓    ✓    ✗    ✗    ✗    ✗
//! X        ✓    ✗    ✗    ✗    ✗    ✗
//! ```

use std::fmt;

/// Lock types, from no permission to exclusive access.
///
/// There is no total order; only compatibility and substitutability are
/// defined between types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockType {
    /// No lock held.
    #[default]
    NoLock,
    /// Intent shared: shared locks may be taken on descendants.
    IntentShared,
    /// Intent exclusive: any lock may be taken on descendants.
    IntentExclusive,
    /// Shared: read access to the resource and all descendants.
    Shared,
    /// Shared with intent exclusive: S and IX on the same resource.
    SharedIntentExclusive,
    /// Exclusive: read and write access to the resource and all descendants.
    Exclusive,
}

impl LockType {
    /// Every lock type, for exhaustive checks.
    pub const ALL: [LockType; 6] = [
        LockType::NoLock,
        LockType::IntentShared,
        LockType::IntentExclusive,
        LockType::Shared,
        LockType::SharedIntentExclusive,
        LockType::Exclusive,
    ];

    /// Returns true if one transaction may hold `self` while another holds
    /// `other` on the same resource.
    pub fn compatible(self, other: LockType) -> bool {
        use LockType::*;
        match (self, other) {
            (NoLock, _) | (_, NoLock) => true,
            (Exclusive, _) | (_, Exclusive) => false,
            (IntentShared, _) | (_, IntentShared) => true,
            (IntentExclusive, IntentExclusive) => true,
            (Shared, Shared) => true,
            _ => false,
        }
    }

    /// The lock a parent resource must hold for `self` to be taken on a child.
    pub fn parent_lock(self) -> LockType {
        use LockType::*;
        match self {
            NoLock => NoLock,
            IntentShared | Shared => IntentShared,
            IntentExclusive | SharedIntentExclusive | Exclusive => IntentExclusive,
        }
    }

    /// Returns true if holding `self` on a resource allows holding `child`
    /// on one of its direct children.
    pub fn can_be_parent_lock(self, child: LockType) -> bool {
        use LockType::*;
        match (self, child) {
            (_, NoLock) => true,
            (IntentShared, IntentShared | Shared) => true,
            (IntentExclusive, _) => true,
            (SharedIntentExclusive, IntentExclusive | Exclusive) => true,
            _ => false,
        }
    }

    /// Returns true if holding `self` already grants everything `required`
    /// would.
    pub fn substitutable(self, required: LockType) -> bool {
        use LockType::*;
        match required {
            NoLock => true,
            IntentShared => matches!(self, IntentShared | IntentExclusive | SharedIntentExclusive),
            IntentExclusive => matches!(self, IntentExclusive | SharedIntentExclusive),
            Shared => matches!(self, Shared | SharedIntentExclusive | Exclusive),
            SharedIntentExclusive => matches!(self, SharedIntentExclusive | Exclusive),
            Exclusive => self == Exclusive,
        }
    }

    /// Returns true for the intent types IS, IX and SIX.
    #[inline]
    pub fn is_intent(self) -> bool {
        matches!(
            self,
            LockType::IntentShared | LockType::IntentExclusive | LockType::SharedIntentExclusive
        )
    }

    /// Short name, as used in the literature.
    pub fn as_str(self) -> &'static str {
        match self {
            LockType::NoLock => "NL",
            LockType::IntentShared => "IS",
            LockType::IntentExclusive => "IX",
            LockType::Shared => "S",
            LockType::SharedIntentExclusive => "SIX",
            LockType::Exclusive => "X",
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
