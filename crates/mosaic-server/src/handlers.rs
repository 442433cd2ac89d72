use crate::auth::SECRET_HEADER;
use crate::error::ApiError;
use crate::events::{ServerMessage, publish};
use crate::AppState;
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{BytesRejection, JsonRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use mosaic_core::{NewPlacement, Placement, PlacementId, Rect, ServiceError, SnapConfig};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/placements`.
#[derive(Debug, Deserialize)]
pub struct CreatePlacementRequest {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub image_ref: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub name: String,
    pub url: String,
}

impl ImageInfo {
    fn new(name: String) -> Self {
        let url = format!("/api/images/{}", name);
        Self { name, url }
    }
}

/// Parameters clients need to run snapping locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub snap: SnapConfig,
    pub max_image_size: usize,
    pub max_tile_extent: f64,
    pub max_coordinate: f64,
    /// Whether deletion is possible at all on this server.
    pub deletion_enabled: bool,
}

fn credential(headers: &HeaderMap) -> Option<&str> {
    headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok())
}

pub async fn list_placements(State(state): State<AppState>) -> Json<Vec<Placement>> {
    Json(state.service.list())
}

pub async fn create_placement(
    State(state): State<AppState>,
    body: Result<Json<CreatePlacementRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Placement>), ApiError> {
    let Json(req) = body.map_err(|rejection| ApiError::InvalidProposal(rejection.body_text()))?;
    let rect = Rect::new(req.x, req.y, req.w, req.h)
        .map_err(|e| ApiError::InvalidGeometry(e.to_string()))?;
    let mut proposal = NewPlacement::new(rect, req.image_ref);
    proposal.caption = req.caption;

    let placement = state.service.commit(proposal).await?;
    publish(
        &state.events,
        ServerMessage::PlacementAdded {
            placement: placement.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(placement)))
}

pub async fn delete_placement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let id: PlacementId = id.parse().map_err(|_| ApiError::NotFound)?;
    state
        .service
        .delete(id, credential(&headers), state.authorizer.as_ref())
        .await?;
    publish(&state.events, ServerMessage::PlacementRemoved { id });
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_placements(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state
        .service
        .clear(credential(&headers), state.authorizer.as_ref())
        .await;
    let removed: &[Placement] = match &result {
        Ok(removed) => removed.as_slice(),
        Err(ServiceError::ClearIncomplete { removed, .. }) => removed.as_slice(),
        Err(_) => &[],
    };
    for placement in removed {
        publish(&state.events, ServerMessage::PlacementRemoved { id: placement.id });
    }
    let removed = result?;
    Ok(Json(serde_json::json!({ "deleted": removed.len() })))
}

pub async fn upload_image(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<ImageInfo>), ApiError> {
    let max = state.config.max_image_size;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(max)
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })?;
    if body.len() > max {
        return Err(ApiError::PayloadTooLarge(max));
    }
    if body.is_empty() {
        return Err(ApiError::BadRequest("No file provided".to_string()));
    }

    let name = state.service.upload_image(body.to_vec()).await?;
    Ok((StatusCode::CREATED, Json(ImageInfo::new(name))))
}

pub async fn list_images(State(state): State<AppState>) -> Result<Json<Vec<ImageInfo>>, ApiError> {
    let names = state.service.list_images().await?;
    Ok(Json(names.into_iter().map(ImageInfo::new).collect()))
}

pub async fn get_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (data, format) = state.service.image(&name).await?;
    Ok((
        [
            (header::CONTENT_TYPE, format.mime_type()),
            // Stored names are unique and images are never rewritten.
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        data,
    ))
}

pub async fn get_config(State(state): State<AppState>) -> Json<ClientConfig> {
    Json(ClientConfig {
        snap: state.config.snap,
        max_image_size: state.config.max_image_size,
        max_tile_extent: state.config.guard.max_extent,
        max_coordinate: state.config.guard.max_coordinate,
        deletion_enabled: state.authorizer.is_enabled(),
    })
}

/// Index page
pub async fn index() -> &'static str {
    "Mosaic Server - REST API under /api, live updates via WebSocket at /ws"
}

/// Health check
pub async fn health() -> &'static str {
    "ok"
}
