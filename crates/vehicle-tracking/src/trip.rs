//! # Trip Read Model
//!
//! Trips, their ordered stops, and the assigned vehicle, as published by the
//! trip management API.

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use realtime::{Config, Error, HttpRequest, Identity, Result, bad_request};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::location::Coordinates;
use crate::{de, request};

/// Retrieve a trip by id.
///
/// # Errors
///
/// Returns an error when the trip API request fails or the response cannot be
/// deserialized.
pub async fn fetch_trip<P>(trip_id: &str, provider: &P) -> Result<Trip>
where
    P: Config + HttpRequest + Identity,
{
    let path = format!("/trips/{}", urlencoding::encode(trip_id));
    let body = request::get(&path, provider).await?;
    Trip::from_payload(&body)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TripRecord", rename_all = "camelCase")]
pub struct Trip {
    pub trip_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vehicle_id: Option<String>,
    pub current_order: u32,
    pub total_stops: u32,
    pub stops: Vec<TripStop>,
}

impl Trip {
    #[must_use]
    pub const fn new(trip_id: String, current_order: u32, total_stops: u32, stops: Vec<TripStop>) -> Self {
        Self { trip_id, vehicle_id: None, current_order, total_stops, stops }
    }

    /// Assign a vehicle. Blank ids clear the assignment.
    #[must_use]
    pub fn with_vehicle(mut self, vehicle_id: &str) -> Self {
        let vehicle_id = vehicle_id.trim();
        self.vehicle_id = (!vehicle_id.is_empty()).then(|| vehicle_id.to_string());
        self
    }

    /// The assigned vehicle, if any.
    #[must_use]
    pub fn vehicle_id(&self) -> Option<&str> {
        self.vehicle_id.as_deref()
    }

    /// Parse a trip response body, bare or wrapped in `{"data": ..}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] when the body is not a valid trip.
    pub fn from_payload(body: &[u8]) -> Result<Self> {
        let value = match serde_json::from_slice::<Value>(body)? {
            Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
                map.remove("data").unwrap_or_default()
            }
            other => other,
        };
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStop {
    pub id: String,
    pub name: String,
    pub kind: StopKind,
    pub coordinates: Coordinates,
    pub sequence_order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum StopKind {
    Pickup,
    Dropoff,
}

impl FromStr for StopKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "pickup" => Ok(Self::Pickup),
            "dropoff" => Ok(Self::Dropoff),
            _ => Err(bad_request!("unknown stop type: {}", s)),
        }
    }
}

impl TryFrom<String> for StopKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl Display for StopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pickup => write!(f, "pickup"),
            Self::Dropoff => write!(f, "dropoff"),
        }
    }
}

#[derive(Deserialize)]
struct TripRecord {
    #[serde(rename = "tripId", alias = "trip_id", alias = "id")]
    trip_id: Option<Value>,
    #[serde(rename = "vehicleId", alias = "vehicle_id")]
    vehicle_id: Option<Value>,
    #[serde(rename = "currentOrder", alias = "current_order")]
    current_order: Option<Value>,
    #[serde(rename = "totalStop", alias = "total_stop", alias = "totalStops", alias = "total_stops")]
    total_stops: Option<Value>,
    #[serde(rename = "stop", alias = "stops", default)]
    stops: Vec<StopRecord>,
}

#[derive(Deserialize)]
struct StopRecord {
    #[serde(rename = "stopId", alias = "stop_id", alias = "id")]
    id: Option<Value>,
    #[serde(rename = "nameStop", alias = "name_stop", alias = "name")]
    name: Option<String>,
    #[serde(rename = "type", alias = "kind")]
    kind: StopKind,
    #[serde(alias = "latitude")]
    lat: Option<Value>,
    #[serde(alias = "lon", alias = "longitude")]
    lng: Option<Value>,
    // nested form written by `TripStop` itself
    coordinates: Option<Value>,
    #[serde(alias = "sequenceOrder", alias = "sequence_order")]
    order: Option<Value>,
    address: Option<String>,
    #[serde(alias = "arrivalTime", alias = "arrival_time")]
    arrive: Option<Value>,
}

impl TryFrom<TripRecord> for Trip {
    type Error = Error;

    fn try_from(record: TripRecord) -> Result<Self> {
        let trip_id =
            de::id(record.trip_id.as_ref()).ok_or_else(|| bad_request!("trip has no id"))?;

        let stops = record
            .stops
            .into_iter()
            .filter_map(|stop| {
                let nested = |key: &str| stop.coordinates.as_ref().and_then(|c| c.get(key));
                let latitude = de::float(stop.lat.as_ref().or_else(|| nested("latitude")));
                let longitude = de::float(stop.lng.as_ref().or_else(|| nested("longitude")));
                let Some(coordinates) = Coordinates::finite(latitude, longitude) else {
                    tracing::debug!(trip_id = %trip_id, "dropping stop with non-finite coordinates");
                    return None;
                };
                Some(TripStop {
                    id: de::id(stop.id.as_ref()).unwrap_or_default(),
                    name: stop.name.unwrap_or_default(),
                    kind: stop.kind,
                    coordinates,
                    sequence_order: de::count(stop.order.as_ref()),
                    address: stop.address.filter(|a| !a.trim().is_empty()),
                    arrival_time: de::timestamp(stop.arrive.as_ref()),
                })
            })
            .collect::<Vec<_>>();

        let total_stops = match record.total_stops {
            Some(ref total) if !total.is_null() => de::count(Some(total)),
            _ => u32::try_from(stops.len()).unwrap_or(u32::MAX),
        };

        Ok(Self {
            trip_id,
            vehicle_id: de::id(record.vehicle_id.as_ref()),
            current_order: de::count(record.current_order.as_ref()),
            total_stops,
            stops,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const TRIP: &[u8] = br#"{
        "tripId": 42,
        "vehicleId": "bus-7",
        "currentOrder": 1,
        "totalStop": 2,
        "stop": [
            {"stopId": "s2", "nameStop": "Depot", "type": "DROP_OFF", "lat": "-36.85", "lng": "174.76", "order": 2},
            {"stopId": "s1", "nameStop": "School", "type": "pickup", "lat": -36.84, "lng": 174.75, "order": 1, "arrive": "2024-05-01T08:00:00Z", "address": "1 Queen St"}
        ]
    }"#;

    #[test]
    fn camel_case_trip() {
        let trip = Trip::from_payload(TRIP).expect("parses");

        assert_eq!(trip.trip_id, "42");
        assert_eq!(trip.vehicle_id(), Some("bus-7"));
        assert_eq!(trip.current_order, 1);
        assert_eq!(trip.total_stops, 2);
        assert_eq!(trip.stops.len(), 2);

        let depot = &trip.stops[0];
        assert_eq!(depot.kind, StopKind::Dropoff);
        assert_eq!(depot.sequence_order, 2);
        assert_eq!(depot.coordinates, Coordinates::new(-36.85, 174.76));
        assert_eq!(depot.arrival_time, None);

        let school = &trip.stops[1];
        assert_eq!(school.kind, StopKind::Pickup);
        assert_eq!(school.address.as_deref(), Some("1 Queen St"));
        assert!(school.arrival_time.is_some());
    }

    #[test]
    fn snake_case_wrapped_trip() {
        let body = br#"{"data": {"trip_id": "t-1", "vehicle_id": "  ", "current_order": 0, "stops": [
            {"id": 1, "name": "A", "kind": "Pick-Up", "latitude": 1.0, "longitude": 2.0, "sequence_order": 1}
        ]}}"#;
        let trip = Trip::from_payload(body).expect("parses");

        assert_eq!(trip.trip_id, "t-1");
        assert_eq!(trip.vehicle_id(), None);
        assert_eq!(trip.total_stops, 1);
        assert_eq!(trip.stops[0].id, "1");
    }

    #[test]
    fn unknown_stop_kind() {
        let body = br#"{"tripId": "t", "stop": [{"type": "layover", "lat": 1, "lng": 2, "order": 1}]}"#;
        let Err(err) = Trip::from_payload(body) else {
            panic!("should reject unknown stop type");
        };
        assert!(matches!(err, Error::InvalidFormat(_)));
        assert!(err.to_string().contains("unknown stop type"));
    }

    #[test]
    fn missing_trip_id() {
        assert!(matches!(Trip::from_payload(br#"{"stop": []}"#), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn non_finite_stop_dropped() {
        let body = br#"{"tripId": "t", "stop": [
            {"type": "pickup", "lat": "NaN", "lng": 2, "order": 1},
            {"type": "dropoff", "lat": 1, "lng": 2, "order": 2}
        ]}"#;
        let trip = Trip::from_payload(body).expect("parses");
        assert_eq!(trip.stops.len(), 1);
        assert_eq!(trip.stops[0].kind, StopKind::Dropoff);
    }

    #[test]
    fn serialized_trip_parses_back() {
        let trip = Trip::from_payload(TRIP).expect("parses");
        let body = serde_json::to_vec(&trip).expect("serializes");

        assert_eq!(Trip::from_payload(&body).expect("parses"), trip);
    }

    #[test]
    fn with_vehicle() {
        let trip = Trip::new("t".to_string(), 0, 0, vec![]);
        assert_eq!(trip.clone().with_vehicle("v1").vehicle_id(), Some("v1"));
        assert_eq!(trip.with_vehicle(" ").vehicle_id(), None);
    }
}
