// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the lock hierarchy.

/// Configuration shared by every context of a [`LockHierarchy`].
///
/// [`LockHierarchy`]: super::LockHierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct LockConfig {
    /// Saturation (locked children / capacity) of a parent context at which
    /// the acquisition policy escalates the parent instead of taking another
    /// fine-grained lock. `None` disables auto-escalation.
    pub escalation_threshold: Option<f64>,
    /// Contexts with fewer children than this never auto-escalate.
    pub escalation_min_capacity: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: None,
            escalation_min_capacity: 10,
        }
    }
}

impl LockConfig {
    /// Enables auto-escalation at the given saturation.
    pub fn with_escalation_threshold(mut self, threshold: f64) -> Self {
        self.escalation_threshold = Some(threshold);
        self
    }

    /// Sets the minimum capacity for auto-escalation.
    pub fn with_escalation_min_capacity(mut self, capacity: usize) -> Self {
        self.escalation_min_capacity = capacity;
        self
    }

    /// Returns true if a context with this capacity and saturation should be
    /// escalated before more child locks are taken.
    pub fn should_escalate(&self, capacity: usize, saturation: f64) -> bool {
        match self.escalation_threshold {
            Some(threshold) => capacity >= self.escalation_min_capacity && saturation >= threshold,
            None => false,
        }
    }
}
