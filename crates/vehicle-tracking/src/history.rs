//! # Position History
//!
//! Ordered, deduplicated buffer of positions observed during one tracking
//! session.

use std::collections::VecDeque;

use serde::Serialize;

use crate::location::{Coordinates, VehiclePosition};

/// Ordered vehicle positions with no two adjacent entries at the same place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PositionHistory {
    entries: VecDeque<VehiclePosition>,
    #[serde(skip)]
    limit: Option<usize>,
}

impl PositionHistory {
    /// An empty history. A `limit` of `None` or zero retains everything.
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        Self { entries: VecDeque::new(), limit: limit.filter(|l| *l > 0) }
    }

    /// Append `position` unless it repeats the latest entry.
    ///
    /// Returns `true` when the history changed. Once the limit is reached the
    /// oldest entry is evicted.
    pub fn push(&mut self, position: VehiclePosition) -> bool {
        if self.entries.back().is_some_and(|last| last.same_place(&position)) {
            return false;
        }

        self.entries.push_back(position);
        if let Some(limit) = self.limit {
            while self.entries.len() > limit {
                self.entries.pop_front();
            }
        }
        true
    }

    #[must_use]
    pub fn latest(&self) -> Option<&VehiclePosition> {
        self.entries.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VehiclePosition> {
        self.entries.iter()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<VehiclePosition> {
        self.entries.iter().cloned().collect()
    }

    /// Coordinates of the traveled path, oldest first.
    #[must_use]
    pub fn path(&self) -> Vec<Coordinates> {
        self.entries.iter().map(|p| p.coordinates).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
