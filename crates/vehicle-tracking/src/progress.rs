//! # Trip Progress
//!
//! Classifies each route segment of a trip as traversed or pending from the
//! trip's "current order" marker, and derives the trip status.
//!
//! Everything here is pure: the same inputs always produce the same output.

use std::fmt::{self, Display};

use serde::{Serialize, Serializer};

use crate::location::Coordinates;
use crate::trip::{Trip, TripStop};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripStatus {
    NotStarted,
    InProgress { visited: u32, total: u32 },
    Completed,
}

impl TripStatus {
    /// `current_order == 0` is "not started" (checked first), otherwise
    /// `current_order >= total_stops` is "completed".
    #[must_use]
    pub const fn derive(current_order: u32, total_stops: u32) -> Self {
        if current_order == 0 {
            Self::NotStarted
        } else if current_order >= total_stops {
            Self::Completed
        } else {
            Self::InProgress { visited: current_order, total: total_stops }
        }
    }
}

impl Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::InProgress { visited, total } => {
                write!(f, "in progress, visited {visited} of {total} stops")
            }
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl Serialize for TripStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Leg of the route between two consecutive stops.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub from: TripStop,
    pub to: TripStop,
    pub traversed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripProgress {
    pub current_order: u32,
    pub total_stops: u32,
    pub status: TripStatus,
    /// Stops sorted by `sequence_order`.
    pub stops: Vec<TripStop>,
    pub segments: Vec<Segment>,
}

/// Pair stops (sorted by `sequence_order`) into segments and classify them.
///
/// Segment `i -> i+1` is traversed when `current_order > 0` and the
/// destination's `sequence_order <= current_order`. A completed trip has
/// every segment traversed.
#[must_use]
pub fn derive_progress(stops: &[TripStop], current_order: u32, total_stops: u32) -> TripProgress {
    let status = TripStatus::derive(current_order, total_stops);

    let mut ordered = stops.to_vec();
    ordered.sort_by_key(|s| s.sequence_order);

    let segments = ordered
        .windows(2)
        .map(|pair| {
            let traversed = status == TripStatus::Completed
                || (current_order > 0 && pair[1].sequence_order <= current_order);
            Segment { from: pair[0].clone(), to: pair[1].clone(), traversed }
        })
        .collect();

    TripProgress { current_order, total_stops, status, stops: ordered, segments }
}

impl From<&Trip> for TripProgress {
    fn from(trip: &Trip) -> Self {
        derive_progress(&trip.stops, trip.current_order, trip.total_stops)
    }
}

impl TripProgress {
    /// Polyline through the traversed part of the route.
    #[must_use]
    pub fn traversed_path(&self) -> Vec<Coordinates> {
        path(self.segments.iter().filter(|s| s.traversed))
    }

    /// Polyline through the part of the route still to travel.
    #[must_use]
    pub fn pending_path(&self) -> Vec<Coordinates> {
        path(self.segments.iter().filter(|s| !s.traversed))
    }

    /// Whether `stop` has been passed.
    #[must_use]
    pub fn is_visited(&self, stop: &TripStop) -> bool {
        match self.status {
            TripStatus::NotStarted => false,
            TripStatus::Completed => true,
            TripStatus::InProgress { .. } => stop.sequence_order <= self.current_order,
        }
    }
}

// Joins consecutive segments into one polyline. Segments are contiguous in
// sorted order and traversal is monotone, so each filter yields one run.
fn path<'a>(segments: impl Iterator<Item = &'a Segment>) -> Vec<Coordinates> {
    let mut points: Vec<Coordinates> = Vec::new();
    for segment in segments {
        if points.last() != Some(&segment.from.coordinates) {
            points.push(segment.from.coordinates);
        }
        points.push(segment.to.coordinates);
    }
    points
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::trip::StopKind;

    fn stop(order: u32) -> TripStop {
        TripStop {
            id: format!("s{order}"),
            name: format!("Stop {order}"),
            kind: if order == 1 { StopKind::Pickup } else { StopKind::Dropoff },
            coordinates: Coordinates::new(f64::from(order), f64::from(order) * 10.0),
            sequence_order: order,
            address: None,
            arrival_time: None,
        }
    }

    #[test]
    fn three_stops_in_progress() {
        let progress = derive_progress(&[stop(1), stop(2), stop(3)], 2, 3);

        assert_eq!(progress.status.to_string(), "in progress, visited 2 of 3 stops");
        assert_eq!(progress.segments.len(), 2);
        assert!(progress.segments[0].traversed);
        assert!(!progress.segments[1].traversed);
    }

    #[test]
    fn sorts_by_sequence_order() {
        let progress = derive_progress(&[stop(3), stop(1), stop(2)], 2, 3);

        let orders: Vec<_> =
            progress.segments.iter().map(|s| (s.from.sequence_order, s.to.sequence_order)).collect();
        assert_eq!(orders, vec![(1, 2), (2, 3)]);
        assert_eq!(progress.stops, vec![stop(1), stop(2), stop(3)]);
    }

    #[test]
    fn not_started_has_nothing_traversed() {
        let progress = derive_progress(&[stop(1), stop(2), stop(3)], 0, 3);

        assert_eq!(progress.status, TripStatus::NotStarted);
        assert_eq!(progress.status.to_string(), "not started");
        assert!(progress.segments.iter().all(|s| !s.traversed));
        assert!(progress.traversed_path().is_empty());
    }

    #[test]
    fn completed_traverses_everything() {
        // stop orders beyond total_stops still count as traversed once completed
        let progress = derive_progress(&[stop(1), stop(5), stop(9)], 3, 3);

        assert_eq!(progress.status, TripStatus::Completed);
        assert_eq!(progress.status.to_string(), "completed");
        assert!(progress.segments.iter().all(|s| s.traversed));
        assert!(progress.pending_path().is_empty());
    }

    #[test]
    fn zero_and_one_stop() {
        let empty = derive_progress(&[], 0, 0);
        assert!(empty.segments.is_empty());
        assert_eq!(empty.status, TripStatus::NotStarted);

        let single = derive_progress(&[stop(1)], 1, 1);
        assert!(single.segments.is_empty());
        assert_eq!(single.stops, vec![stop(1)]);
        assert_eq!(single.status, TripStatus::Completed);
    }

    #[test]
    fn idempotent() {
        let stops = [stop(2), stop(1), stop(3), stop(4)];
        assert_eq!(derive_progress(&stops, 2, 4), derive_progress(&stops, 2, 4));
    }

    #[test]
    fn split_paths() {
        let progress = derive_progress(&[stop(1), stop(2), stop(3), stop(4)], 2, 4);

        assert_eq!(
            progress.traversed_path(),
            vec![Coordinates::new(1.0, 10.0), Coordinates::new(2.0, 20.0)]
        );
        assert_eq!(
            progress.pending_path(),
            vec![Coordinates::new(2.0, 20.0), Coordinates::new(3.0, 30.0), Coordinates::new(4.0, 40.0)]
        );
        assert!(progress.is_visited(&stop(2)));
        assert!(!progress.is_visited(&stop(3)));
    }

    #[test]
    fn status_serializes_as_text() {
        let json = serde_json::to_value(TripStatus::InProgress { visited: 1, total: 4 })
            .expect("serializes");
        assert_eq!(json, serde_json::json!("in progress, visited 1 of 4 stops"));
    }
}
