use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use camera_stream::CameraStatus;
use http::StatusCode;
use realtime::HttpError;
use serde_json::Value;
use vehicle_tracking::notifications::{self, Notification};
use vehicle_tracking::{LocationSnapshot, TripSnapshot};

use crate::state::AppState;

type HttpResult<T> = Result<T, HttpError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/vehicles/{vehicle_id}/tracking",
            get(tracking).post(start_tracking).delete(stop_tracking),
        )
        .route("/vehicles/{vehicle_id}/camera", get(camera))
        .route("/vehicles/{vehicle_id}/camera/start", post(start_camera))
        .route("/vehicles/{vehicle_id}/camera/stop", post(stop_camera))
        .route("/vehicles/{vehicle_id}/camera/frame", get(camera_frame))
        .route("/trips/{trip_id}", get(trip))
        .route("/trips/{trip_id}/watch", post(watch_trip).delete(unwatch_trip))
        .route("/trips/{trip_id}/map", get(trip_map))
        .route("/notifications", get(notifications))
        .with_state(state)
}

#[axum::debug_handler]
async fn start_tracking(
    State(state): State<AppState>, Path(vehicle_id): Path<String>,
) -> (StatusCode, Json<LocationSnapshot>) {
    (StatusCode::ACCEPTED, Json(state.start_tracking(&vehicle_id).await))
}

#[axum::debug_handler]
async fn stop_tracking(
    State(state): State<AppState>, Path(vehicle_id): Path<String>,
) -> HttpResult<StatusCode> {
    state.stop_tracking(&vehicle_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn tracking(
    State(state): State<AppState>, Path(vehicle_id): Path<String>,
) -> HttpResult<Json<LocationSnapshot>> {
    Ok(Json(state.tracking(&vehicle_id).await?))
}

#[axum::debug_handler]
async fn watch_trip(
    State(state): State<AppState>, Path(trip_id): Path<String>,
) -> (StatusCode, Json<TripSnapshot>) {
    (StatusCode::ACCEPTED, Json(state.watch_trip(&trip_id).await))
}

#[axum::debug_handler]
async fn unwatch_trip(
    State(state): State<AppState>, Path(trip_id): Path<String>,
) -> HttpResult<StatusCode> {
    state.unwatch_trip(&trip_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn trip(
    State(state): State<AppState>, Path(trip_id): Path<String>,
) -> HttpResult<Json<TripSnapshot>> {
    Ok(Json(state.trip(&trip_id).await?))
}

#[axum::debug_handler]
async fn trip_map(
    State(state): State<AppState>, Path(trip_id): Path<String>,
) -> HttpResult<Json<Value>> {
    Ok(Json(state.trip_map(&trip_id).await?))
}

#[axum::debug_handler]
async fn start_camera(
    State(state): State<AppState>, Path(vehicle_id): Path<String>,
) -> (StatusCode, Json<CameraStatus>) {
    (StatusCode::ACCEPTED, Json(state.start_camera(&vehicle_id).await))
}

#[axum::debug_handler]
async fn stop_camera(
    State(state): State<AppState>, Path(vehicle_id): Path<String>,
) -> HttpResult<StatusCode> {
    state.stop_camera(&vehicle_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn camera(
    State(state): State<AppState>, Path(vehicle_id): Path<String>,
) -> HttpResult<Json<CameraStatus>> {
    Ok(Json(state.camera(&vehicle_id).await?))
}

#[axum::debug_handler]
async fn camera_frame(
    State(state): State<AppState>, Path(vehicle_id): Path<String>,
) -> HttpResult<impl IntoResponse> {
    let frame = state.camera_frame(&vehicle_id).await?;
    Ok(([(header::CONTENT_TYPE, frame.format.content_type())], frame.data))
}

#[axum::debug_handler]
async fn notifications() -> Json<Vec<Notification>> {
    Json(notifications::read())
}
