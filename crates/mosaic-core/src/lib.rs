//! Mosaic Core Library
//!
//! Spatial placement engine for the shared image mosaic: rectangle geometry,
//! edge snapping, the placement consistency guard and the pan/zoom viewport.

pub mod geometry;
pub mod ghost;
pub mod guard;
pub mod image;
pub mod placement;
pub mod service;
pub mod snap;
pub mod storage;
pub mod viewport;

pub use geometry::{Bounded, DEFAULT_TOLERANCE, GeometryError, Rect, is_adjacent, overlaps, touches};
pub use ghost::{Ghost, PendingImage};
pub use guard::{Authorizer, CommitError, DeleteError, GuardConfig, PlacementGuard};
pub use image::ImageFormat;
pub use placement::{NewPlacement, Placement, PlacementId};
pub use service::{MosaicService, RestoreReport, ServiceError};
pub use snap::{SnapConfig, SnapEvent, SnapKind, Snapper, snap_position, snap_size};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use viewport::Viewport;
