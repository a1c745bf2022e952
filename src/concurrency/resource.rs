// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Hierarchical resource names.

use std::fmt;
use std::sync::Arc;

/// Name of a lockable resource, e.g. `database/orders/page7`.
///
/// A name is a path of segments from the root of the hierarchy. Names are
/// cheap to clone and never change once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName {
    segments: Arc<[String]>,
}

impl ResourceName {
    /// Creates a root-level name.
    pub fn root(segment: impl Into<String>) -> Self {
        Self {
            segments: Arc::from(vec![segment.into()]),
        }
    }

    /// Creates a name from a full path of segments.
    ///
    /// Returns `None` for an empty path.
    pub fn from_segments<I, S>(segments: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: Arc::from(segments),
        })
    }

    /// Returns the name of a direct child of this resource.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.to_vec();
        segments.push(segment.into());
        Self {
            segments: Arc::from(segments),
        }
    }

    /// Returns the parent name, or `None` for a root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: Arc::from(&self.segments[..self.segments.len() - 1]),
        })
    }

    /// Number of segments; a root has depth 1.
    #[inline]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &ResourceName) -> bool {
        self.segments.len() > ancestor.segments.len()
            && self.segments.starts_with(&ancestor.segments)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}
