//! Committed tiles and commit proposals.

use crate::geometry::{Bounded, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a placement.
pub type PlacementId = Uuid;

/// A tile that has been accepted into the mosaic.
///
/// Placements are only created by the guard and never change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub id: PlacementId,
    #[serde(flatten)]
    pub rect: Rect,
    /// Locator of the tile image (an uploaded image name or external URL).
    pub image_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Commit order; later commits have larger values.
    #[serde(default)]
    pub seq: u64,
}

impl Bounded for Placement {
    fn bounds(&self) -> Rect {
        self.rect
    }
}

/// A request to add a tile to the mosaic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlacement {
    #[serde(flatten)]
    pub rect: Rect,
    pub image_ref: String,
    #[serde(default)]
    pub caption: Option<String>,
}

impl NewPlacement {
    pub fn new(rect: Rect, image_ref: impl Into<String>) -> Self {
        Self {
            rect,
            image_ref: image_ref.into(),
            caption: None,
        }
    }

    /// Attach a caption. Blank captions are dropped.
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = normalize_caption(Some(caption.into()));
        self
    }
}

impl Bounded for NewPlacement {
    fn bounds(&self) -> Rect {
        self.rect
    }
}

/// Trim a caption and turn blank ones into `None`.
pub fn normalize_caption(caption: Option<String>) -> Option<String> {
    caption
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}
