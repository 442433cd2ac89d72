//! The ghost tile: an uncommitted image being positioned by a user.

use crate::geometry::{Bounded, GeometryResult, Rect, is_adjacent_to_any};
use crate::image::ImageFormat;
use crate::placement::NewPlacement;
use crate::snap::{PositionSnap, SizeSnap, Snapper};

/// Largest side of a freshly dropped ghost, before the user resizes it.
pub const DEFAULT_GHOST_SIZE: f64 = 300.0;

/// Image bytes waiting to be uploaded with the ghost.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    /// Original image width in pixels.
    pub source_width: u32,
    /// Original image height in pixels.
    pub source_height: u32,
}

impl PendingImage {
    /// Wrap raw image bytes, detecting the format from magic bytes.
    pub fn new(data: Vec<u8>, source_width: u32, source_height: u32) -> Option<Self> {
        let format = ImageFormat::from_magic_bytes(&data)?;
        if source_width == 0 || source_height == 0 {
            return None;
        }
        Some(Self {
            data,
            format,
            source_width,
            source_height,
        })
    }

    /// Width over height of the source image.
    pub fn aspect_ratio(&self) -> f64 {
        self.source_width as f64 / self.source_height as f64
    }
}

/// The tile currently being dragged or resized. Has no identity until committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Ghost {
    rect: Rect,
    image: PendingImage,
}

impl Ghost {
    /// Drop a ghost at `(x, y)`, scaled so its longer side is at most `max_side`.
    pub fn new(image: PendingImage, x: f64, y: f64, max_side: f64) -> GeometryResult<Self> {
        let aspect = image.aspect_ratio();
        let (w, h) = if aspect >= 1.0 {
            let w = (image.source_width as f64).min(max_side);
            (w, (w / aspect).round().max(1.0))
        } else {
            let h = (image.source_height as f64).min(max_side);
            ((h * aspect).round().max(1.0), h)
        };
        Ok(Self {
            rect: Rect::new(x, y, w, h)?,
            image,
        })
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn image(&self) -> &PendingImage {
        &self.image
    }

    /// Move the ghost to where the pointer released it, snapping to settled edges.
    pub fn drag_to<T: Bounded>(
        &mut self,
        x: f64,
        y: f64,
        settled: &[T],
        snapper: &mut Snapper,
    ) -> GeometryResult<PositionSnap> {
        let moved = self.rect.with_origin(x, y)?;
        let (rect, result) = snapper.snap_position(moved, settled);
        self.rect = rect;
        Ok(result)
    }

    /// Resize to `width` keeping the top-left corner and aspect ratio, then snap.
    pub fn resize_to<T: Bounded>(
        &mut self,
        width: f64,
        settled: &[T],
        snapper: &mut Snapper,
    ) -> GeometryResult<SizeSnap> {
        let height = (width / self.rect.aspect_ratio()).round();
        let resized = self.rect.with_size(width, height)?;
        let (rect, result) = snapper.snap_size(resized, settled);
        self.rect = rect;
        Ok(result)
    }

    /// Admission gate: the first tile may go anywhere, later ones must touch the mosaic.
    ///
    /// This only shapes how the mosaic grows; the server does not enforce it.
    pub fn can_submit<T: Bounded>(&self, settled: &[T], tolerance: f64) -> bool {
        settled.is_empty() || is_adjacent_to_any(&self.rect, settled, tolerance)
    }

    /// Turn the ghost into a commit proposal once its image has been uploaded.
    pub fn into_proposal(self, image_ref: impl Into<String>, caption: Option<String>) -> NewPlacement {
        let proposal = NewPlacement::new(self.rect, image_ref);
        match caption {
            Some(caption) => proposal.with_caption(caption),
            None => proposal,
        }
    }
}

impl Bounded for Ghost {
    fn bounds(&self) -> Rect {
        self.rect
    }
}
