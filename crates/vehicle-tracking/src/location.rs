//! # Vehicle Location
//!
//! Fetches a vehicle's current coordinate from `GET /vehicles/location/{id}`.

use chrono::{DateTime, Utc};
use realtime::{Config, HttpRequest, Identity, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{de, request};

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Coordinates only when both components are finite.
    #[must_use]
    pub fn finite(latitude: f64, longitude: f64) -> Option<Self> {
        (latitude.is_finite() && longitude.is_finite()).then_some(Self { latitude, longitude })
    }

    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// One observed vehicle position. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePosition {
    pub coordinates: Coordinates,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl VehiclePosition {
    #[must_use]
    pub const fn new(coordinates: Coordinates) -> Self {
        Self { coordinates, log_id: None, observed_at: None }
    }

    /// Exact coordinate equality, ignoring log id and timestamp.
    #[must_use]
    pub fn same_place(&self, other: &Self) -> bool {
        self.coordinates == other.coordinates
    }

    /// Parse a location response body.
    ///
    /// Returns `Ok(None)` when either coordinate is missing or non-finite.
    ///
    /// # Errors
    ///
    /// Returns an error when the body is not a JSON object.
    pub fn from_payload(body: &[u8]) -> serde_json::Result<Option<Self>> {
        let record = match serde_json::from_slice::<LocationEnvelope>(body)? {
            LocationEnvelope::Wrapped { data } | LocationEnvelope::Bare(data) => data,
        };
        Ok(record.into_position())
    }
}

/// Fetch the current position of a vehicle.
///
/// Non-finite samples are discarded and reported as `Ok(None)`.
///
/// # Errors
///
/// Returns [`realtime::Error::BadGateway`] on transport failure or non-success
/// status, and [`realtime::Error::InvalidFormat`] when the body is not JSON.
pub async fn fetch_location<P>(vehicle_id: &str, provider: &P) -> Result<Option<VehiclePosition>>
where
    P: Config + HttpRequest + Identity,
{
    let path = format!("/vehicles/location/{}", urlencoding::encode(vehicle_id));
    let body = request::get(&path, provider).await?;

    let position = VehiclePosition::from_payload(&body)?;
    if position.is_none() {
        tracing::debug!(vehicle_id = %vehicle_id, "discarding non-finite location sample");
    }

    Ok(position)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LocationEnvelope {
    Wrapped { data: LocationRecord },
    Bare(LocationRecord),
}

// Field names drift between camelCase and snake_case across API versions.
#[derive(Deserialize)]
struct LocationRecord {
    #[serde(alias = "latitude")]
    lat: Option<Value>,
    #[serde(alias = "lon", alias = "longitude")]
    lng: Option<Value>,
    #[serde(rename = "vehicleLogId", alias = "vehicle_log_id")]
    vehicle_log_id: Option<Value>,
    #[serde(rename = "timeVehicleLog", alias = "time_vehicle_log")]
    time_vehicle_log: Option<Value>,
}

impl LocationRecord {
    fn into_position(self) -> Option<VehiclePosition> {
        let coordinates =
            Coordinates::finite(de::float(self.lat.as_ref()), de::float(self.lng.as_ref()))?;
        Some(VehiclePosition {
            coordinates,
            log_id: de::id(self.vehicle_log_id.as_ref()),
            observed_at: de::timestamp(self.time_vehicle_log.as_ref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn camel_case_payload() {
        let body = br#"{"lat": -36.8485, "lng": 174.7633, "vehicleLogId": 981, "timeVehicleLog": "2024-05-01T10:15:30Z"}"#;
        let position = VehiclePosition::from_payload(body).expect("parses").expect("finite");

        assert_eq!(position.coordinates, Coordinates::new(-36.8485, 174.7633));
        assert_eq!(position.log_id.as_deref(), Some("981"));
        assert!(position.observed_at.is_some());
    }

    #[test]
    fn snake_case_string_payload() {
        let body = br#"{"latitude": "21.0285", "longitude": "105.8542", "vehicle_log_id": "log-7", "time_vehicle_log": 1714558530000}"#;
        let position = VehiclePosition::from_payload(body).expect("parses").expect("finite");

        assert_eq!(position.coordinates, Coordinates::new(21.0285, 105.8542));
        assert_eq!(position.log_id.as_deref(), Some("log-7"));
        assert_eq!(position.observed_at.map(|t| t.timestamp()), Some(1_714_558_530));
    }

    #[test]
    fn wrapped_payload() {
        let body = br#"{"data": {"lat": 1.5, "lng": 2.5}}"#;
        let position = VehiclePosition::from_payload(body).expect("parses").expect("finite");
        assert_eq!(position.coordinates, Coordinates::new(1.5, 2.5));
        assert_eq!(position.log_id, None);
    }

    #[test]
    fn non_finite_is_discarded() {
        assert_eq!(VehiclePosition::from_payload(br#"{"lat": "NaN", "lng": 105.8}"#).ok(), Some(None));
        assert_eq!(VehiclePosition::from_payload(br#"{"lat": "inf", "lng": 105.8}"#).ok(), Some(None));
        assert_eq!(VehiclePosition::from_payload(br#"{"lat": null, "lng": 105.8}"#).ok(), Some(None));
        assert_eq!(VehiclePosition::from_payload(br#"{"lng": 105.8}"#).ok(), Some(None));
    }

    #[test]
    fn not_json_is_an_error() {
        assert!(VehiclePosition::from_payload(b"<html>").is_err());
        assert!(VehiclePosition::from_payload(b"[1, 2]").is_err());
    }

    #[test]
    fn same_place_ignores_metadata() {
        let a = VehiclePosition {
            coordinates: Coordinates::new(1.0, 2.0),
            log_id: Some("a".to_string()),
            observed_at: None,
        };
        let b = VehiclePosition::new(Coordinates::new(1.0, 2.0));
        assert!(a.same_place(&b));
        assert!(!a.same_place(&VehiclePosition::new(Coordinates::new(1.0, 2.000_001))));
    }
}
