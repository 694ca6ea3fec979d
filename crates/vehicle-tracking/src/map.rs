//! # Map Render Adapter
//!
//! Turns the tracking and progress models into a renderer-agnostic scene and
//! hands it to a third-party mapping engine through [`MapRenderer`].
//!
//! Empty or partial input (no history, no trip, no live position) always
//! produces an empty-but-valid scene.

use serde::Serialize;
use serde_json::{Value, json};

use crate::location::{Coordinates, VehiclePosition};
use crate::progress::TripProgress;
use crate::trip::StopKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    /// Path actually driven, from the position history.
    Traveled,

    /// Planned route already passed.
    Traversed,

    /// Planned route still ahead.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum MarkerKind {
    Stop { kind: StopKind, visited: bool },
    Vehicle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub position: Coordinates,
    pub kind: MarkerKind,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polyline {
    pub points: Vec<Coordinates>,
    pub style: PathStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub south_west: Coordinates,
    pub north_east: Coordinates,
}

impl Bounds {
    /// Smallest box containing every point, or `None` when there are none.
    #[must_use]
    pub fn enclosing<'a>(points: impl IntoIterator<Item = &'a Coordinates>) -> Option<Self> {
        points.into_iter().filter(|c| c.is_finite()).fold(None, |bounds, c| {
            Some(match bounds {
                None => Self { south_west: *c, north_east: *c },
                Some(Self { south_west, north_east }) => Self {
                    south_west: Coordinates::new(
                        south_west.latitude.min(c.latitude),
                        south_west.longitude.min(c.longitude),
                    ),
                    north_east: Coordinates::new(
                        north_east.latitude.max(c.latitude),
                        north_east.longitude.max(c.longitude),
                    ),
                },
            })
        })
    }
}

/// Everything to draw for one vehicle/trip view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapScene {
    pub traveled: Vec<Coordinates>,
    pub route: Vec<Polyline>,
    pub markers: Vec<Marker>,
    pub bounds: Option<Bounds>,
}

impl MapScene {
    #[must_use]
    pub fn compose(
        history: &[Coordinates], progress: Option<&TripProgress>, live: Option<&VehiclePosition>,
    ) -> Self {
        let route = progress
            .map(|p| {
                p.segments
                    .iter()
                    .map(|s| Polyline {
                        points: vec![s.from.coordinates, s.to.coordinates],
                        style: if s.traversed { PathStyle::Traversed } else { PathStyle::Pending },
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut markers = Vec::new();
        if let Some(progress) = progress {
            markers.extend(progress.stops.iter().map(|stop| Marker {
                position: stop.coordinates,
                kind: MarkerKind::Stop { kind: stop.kind, visited: progress.is_visited(stop) },
                label: Some(stop.name.clone()).filter(|n| !n.is_empty()),
            }));
        }
        if let Some(live) = live.filter(|p| p.coordinates.is_finite()) {
            markers.push(Marker {
                position: live.coordinates,
                kind: MarkerKind::Vehicle,
                label: live.log_id.clone(),
            });
        }

        let bounds = Bounds::enclosing(
            history
                .iter()
                .chain(route.iter().flat_map(|r| r.points.iter()))
                .chain(markers.iter().map(|m| &m.position)),
        );

        Self { traveled: history.to_vec(), route, markers, bounds }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.traveled.is_empty() && self.route.is_empty() && self.markers.is_empty()
    }
}

/// Boundary to the external mapping engine.
pub trait MapRenderer {
    fn clear(&mut self);

    fn draw_polyline(&mut self, points: &[Coordinates], style: PathStyle);

    fn draw_marker(&mut self, marker: &Marker);

    fn fit_bounds(&mut self, bounds: Bounds);
}

/// Draw `scene`. Polylines with fewer than two points are skipped.
pub fn render<R: MapRenderer + ?Sized>(scene: &MapScene, renderer: &mut R) {
    renderer.clear();

    for line in scene.route.iter().filter(|l| l.points.len() >= 2) {
        renderer.draw_polyline(&line.points, line.style);
    }
    if scene.traveled.len() >= 2 {
        renderer.draw_polyline(&scene.traveled, PathStyle::Traveled);
    }
    for marker in &scene.markers {
        renderer.draw_marker(marker);
    }
    if let Some(bounds) = scene.bounds {
        renderer.fit_bounds(bounds);
    }
}

/// Emits a GeoJSON `FeatureCollection` for web map libraries. Positions are
/// written `[lng, lat]`.
#[derive(Debug, Default)]
pub struct GeoJsonRenderer {
    features: Vec<Value>,
    bbox: Option<Bounds>,
}

impl GeoJsonRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        let mut collection = json!({
            "type": "FeatureCollection",
            "features": self.features,
        });
        if let Some(b) = self.bbox {
            collection["bbox"] = json!([
                b.south_west.longitude,
                b.south_west.latitude,
                b.north_east.longitude,
                b.north_east.latitude
            ]);
        }
        collection
    }
}

const fn position(c: &Coordinates) -> [f64; 2] {
    [c.longitude, c.latitude]
}

impl MapRenderer for GeoJsonRenderer {
    fn clear(&mut self) {
        self.features.clear();
        self.bbox = None;
    }

    fn draw_polyline(&mut self, points: &[Coordinates], style: PathStyle) {
        self.features.push(json!({
            "type": "Feature",
            "geometry": {
                "type": "LineString",
                "coordinates": points.iter().map(position).collect::<Vec<_>>(),
            },
            "properties": { "style": style },
        }));
    }

    fn draw_marker(&mut self, marker: &Marker) {
        let mut properties = json!(marker.kind);
        if let Some(label) = &marker.label {
            properties["label"] = json!(label);
        }
        self.features.push(json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": position(&marker.position) },
            "properties": properties,
        }));
    }

    fn fit_bounds(&mut self, bounds: Bounds) {
        self.bbox = Some(bounds);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::progress::derive_progress;
    use crate::trip::TripStop;

    fn stop(order: u32, lat: f64, lng: f64) -> TripStop {
        TripStop {
            id: format!("s{order}"),
            name: format!("Stop {order}"),
            kind: StopKind::Dropoff,
            coordinates: Coordinates::new(lat, lng),
            sequence_order: order,
            address: None,
            arrival_time: None,
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl MapRenderer for Recorder {
        fn clear(&mut self) {
            self.calls.push("clear".to_string());
        }

        fn draw_polyline(&mut self, points: &[Coordinates], style: PathStyle) {
            self.calls.push(format!("line {style:?} {}", points.len()));
        }

        fn draw_marker(&mut self, marker: &Marker) {
            self.calls.push(format!("marker {:?}", marker.kind));
        }

        fn fit_bounds(&mut self, _: Bounds) {
            self.calls.push("fit".to_string());
        }
    }

    #[test]
    fn empty_inputs_render_empty_map() {
        let scene = MapScene::compose(&[], None, None);
        assert!(scene.is_empty());
        assert_eq!(scene.bounds, None);

        let mut recorder = Recorder::default();
        render(&scene, &mut recorder);
        assert_eq!(recorder.calls, vec!["clear"]);

        let mut geojson = GeoJsonRenderer::new();
        render(&scene, &mut geojson);
        assert_eq!(geojson.into_value(), json!({"type": "FeatureCollection", "features": []}));
    }

    #[test]
    fn single_point_history_is_not_a_line() {
        let scene = MapScene::compose(&[Coordinates::new(1.0, 2.0)], None, None);

        let mut recorder = Recorder::default();
        render(&scene, &mut recorder);
        assert_eq!(recorder.calls, vec!["clear", "fit"]);
    }

    #[test]
    fn trip_without_stops() {
        let progress = derive_progress(&[], 0, 0);
        let scene = MapScene::compose(&[], Some(&progress), None);
        assert!(scene.is_empty());
    }

    #[test]
    fn single_stop_trip_has_marker() {
        let progress = derive_progress(&[stop(1, -36.84, 174.75)], 0, 1);
        let scene = MapScene::compose(&[], Some(&progress), None);

        assert!(scene.route.is_empty());
        assert_eq!(
            scene.markers,
            vec![Marker {
                position: Coordinates::new(-36.84, 174.75),
                kind: MarkerKind::Stop { kind: StopKind::Dropoff, visited: false },
                label: Some("Stop 1".to_string()),
            }]
        );
        assert_eq!(
            scene.bounds,
            Some(Bounds {
                south_west: Coordinates::new(-36.84, 174.75),
                north_east: Coordinates::new(-36.84, 174.75)
            })
        );

        let mut recorder = Recorder::default();
        render(&scene, &mut recorder);
        assert_eq!(
            recorder.calls,
            vec!["clear", "marker Stop { kind: Dropoff, visited: false }", "fit"]
        );
    }

    #[test]
    fn full_scene() {
        let progress = derive_progress(&[stop(1, 0.0, 0.0), stop(2, 1.0, 1.0), stop(3, 2.0, 2.0)], 2, 3);
        let history = [Coordinates::new(0.0, 0.0), Coordinates::new(0.5, 0.6)];
        let live = VehiclePosition::new(Coordinates::new(0.5, 0.6));

        let scene = MapScene::compose(&history, Some(&progress), Some(&live));

        assert_eq!(scene.route.len(), 2);
        assert_eq!(scene.route[0].style, PathStyle::Traversed);
        assert_eq!(scene.route[1].style, PathStyle::Pending);
        // three stops plus the vehicle
        assert_eq!(scene.markers.len(), 4);
        assert_eq!(
            scene.bounds,
            Some(Bounds {
                south_west: Coordinates::new(0.0, 0.0),
                north_east: Coordinates::new(2.0, 2.0)
            })
        );

        let mut recorder = Recorder::default();
        render(&scene, &mut recorder);
        assert_eq!(
            recorder.calls,
            vec![
                "clear",
                "line Traversed 2",
                "line Pending 2",
                "line Traveled 2",
                "marker Stop { kind: Dropoff, visited: true }",
                "marker Stop { kind: Dropoff, visited: true }",
                "marker Stop { kind: Dropoff, visited: false }",
                "marker Vehicle",
                "fit",
            ]
        );
    }

    #[test]
    fn geojson_uses_lng_lat() {
        let live = VehiclePosition::new(Coordinates::new(-36.8, 174.7));
        let scene = MapScene::compose(&[], None, Some(&live));

        let mut geojson = GeoJsonRenderer::new();
        render(&scene, &mut geojson);
        let value = geojson.into_value();

        assert_eq!(value["features"][0]["geometry"]["coordinates"], json!([174.7, -36.8]));
        assert_eq!(value["features"][0]["properties"]["type"], json!("vehicle"));
        assert_eq!(value["bbox"], json!([174.7, -36.8, 174.7, -36.8]));
    }
}
