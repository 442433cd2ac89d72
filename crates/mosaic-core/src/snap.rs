//! Edge snapping for tiles being dragged or resized.

use crate::geometry::{Bounded, DEFAULT_TOLERANCE, Rect, edges_of, find_overlap};
use kurbo::{Point, Size};
use serde::{Deserialize, Serialize};

/// Distance threshold for edge snapping (in world units).
pub const SNAP_THRESHOLD: f64 = 80.0;

/// Minimum distance between the fixed corner and a resize target.
pub const MIN_RESIZE_EXTENT: f64 = 50.0;

/// Tuning knobs for the snapping engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Edges further than this are ignored.
    pub threshold: f64,
    /// Overlap tolerance used to validate a position snap.
    pub tolerance: f64,
    /// A resize target must lie strictly beyond the anchor plus this offset.
    pub min_resize_extent: f64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            threshold: SNAP_THRESHOLD,
            tolerance: DEFAULT_TOLERANCE,
            min_resize_extent: MIN_RESIZE_EXTENT,
        }
    }
}

/// Result of a position snap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSnap {
    /// The corrected top-left corner.
    pub point: Point,
    /// Whether the X coordinate was snapped.
    pub snapped_x: bool,
    /// Whether the Y coordinate was snapped.
    pub snapped_y: bool,
}

impl PositionSnap {
    /// Create a result with no snapping.
    pub fn none(point: Point) -> Self {
        Self {
            point,
            snapped_x: false,
            snapped_y: false,
        }
    }

    /// Check if any snapping occurred.
    pub fn is_snapped(&self) -> bool {
        self.snapped_x || self.snapped_y
    }
}

/// Result of a size snap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeSnap {
    /// The corrected size.
    pub size: Size,
    /// Whether an edge target was applied.
    pub snapped: bool,
}

impl SizeSnap {
    /// Create a result with no snapping.
    pub fn none(size: Size) -> Self {
        Self {
            size,
            snapped: false,
        }
    }
}

/// Nearest target strictly closer than `threshold`, with its distance.
///
/// The first target wins when several are equally close.
fn nearest_edge(value: f64, targets: &[f64], threshold: f64) -> Option<(f64, f64)> {
    let mut best = None;
    let mut best_dist = threshold;
    for &target in targets {
        let dist = (value - target).abs();
        if dist < best_dist {
            best = Some((target, dist));
            best_dist = dist;
        }
    }
    best
}

/// Snap one axis: `start` is the leading edge, `extent` the tile's size on that axis.
///
/// The leading edge wins ties. Returns the new leading coordinate, if any.
fn snap_axis(start: f64, extent: f64, targets: &[f64], threshold: f64) -> Option<f64> {
    let lead = nearest_edge(start, targets, threshold);
    let trail = nearest_edge(start + extent, targets, threshold);
    match (lead, trail) {
        (Some((target, d_lead)), Some((_, d_trail))) if d_lead <= d_trail => Some(target),
        (Some((target, _)), None) => Some(target),
        (_, Some((target, _))) => Some(target - extent),
        (None, None) => None,
    }
}

/// Snap a dragged tile so one of its edges lines up with a settled edge.
///
/// Each axis is snapped independently. If the snapped tile would overlap a
/// settled tile the whole snap is discarded and the original position comes
/// back unchanged, so callers must not assume a snap always moves the tile.
pub fn snap_position<T: Bounded>(moving: Rect, settled: &[T], config: &SnapConfig) -> PositionSnap {
    let original = moving.origin();
    if settled.is_empty() {
        return PositionSnap::none(original);
    }

    let edges = edges_of(settled);
    let new_x = snap_axis(moving.x(), moving.width(), &edges.xs, config.threshold);
    let new_y = snap_axis(moving.y(), moving.height(), &edges.ys, config.threshold);
    if new_x.is_none() && new_y.is_none() {
        return PositionSnap::none(original);
    }

    let candidate = match moving.with_origin(
        new_x.unwrap_or(moving.x()),
        new_y.unwrap_or(moving.y()),
    ) {
        Ok(candidate) => candidate,
        Err(_) => return PositionSnap::none(original),
    };

    if let Some(blocker) = find_overlap(&candidate, settled, config.tolerance) {
        log::debug!(
            "position snap to ({}, {}) discarded: collides with {:?}",
            candidate.x(),
            candidate.y(),
            blocker.bounds()
        );
        return PositionSnap::none(original);
    }

    PositionSnap {
        point: candidate.origin(),
        snapped_x: new_x.is_some(),
        snapped_y: new_y.is_some(),
    }
}

/// Snap a tile being resized from its top-left corner, preserving its aspect ratio.
///
/// Either the right edge or the bottom edge is pulled onto a settled edge,
/// whichever is closer (right wins ties); the other dimension follows the
/// aspect ratio and is rounded to whole units. No overlap validation happens
/// here: resize previews may overlap until the tile is committed.
pub fn snap_size<T: Bounded>(resizing: Rect, settled: &[T], config: &SnapConfig) -> SizeSnap {
    let original = resizing.size();
    if settled.is_empty() {
        return SizeSnap::none(original);
    }

    let edges = edges_of(settled);
    let (x, y) = (resizing.x(), resizing.y());
    let ratio = resizing.aspect_ratio();

    let right = nearest_edge(resizing.right(), &edges.xs, config.threshold)
        .filter(|&(target, _)| target > x + config.min_resize_extent);
    let bottom = nearest_edge(resizing.bottom(), &edges.ys, config.threshold)
        .filter(|&(target, _)| target > y + config.min_resize_extent);

    let size = match (right, bottom) {
        (Some((target, d_right)), Some((_, d_bottom))) if d_right <= d_bottom => {
            let w = target - x;
            Size::new(w, (w / ratio).round())
        }
        (Some((target, _)), None) => {
            let w = target - x;
            Size::new(w, (w / ratio).round())
        }
        (_, Some((target, _))) => {
            let h = target - y;
            Size::new((h * ratio).round(), h)
        }
        (None, None) => return SizeSnap::none(original),
    };

    // Extreme aspect ratios can round the follower dimension down to zero.
    if size.width <= 0.0 || size.height <= 0.0 {
        return SizeSnap::none(original);
    }

    SizeSnap {
        size,
        snapped: true,
    }
}

/// Which gesture a snap corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapKind {
    Position,
    Size,
}

/// Notification emitted whenever a snap actually changed a tile.
///
/// Presentation layers drain these to play feedback (sound, highlight).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnapEvent {
    SnapApplied { kind: SnapKind, rect: Rect },
}

/// Stateful snapping front-end that queues [`SnapEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct Snapper {
    config: SnapConfig,
    events: Vec<SnapEvent>,
}

impl Snapper {
    /// Create a snapper with the given configuration.
    pub fn new(config: SnapConfig) -> Self {
        Self {
            config,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SnapConfig {
        &self.config
    }

    /// Snap a dragged tile and return the corrected rectangle.
    pub fn snap_position<T: Bounded>(&mut self, moving: Rect, settled: &[T]) -> (Rect, PositionSnap) {
        let result = snap_position(moving, settled, &self.config);
        let rect = moving
            .with_origin(result.point.x, result.point.y)
            .unwrap_or(moving);
        if result.is_snapped() {
            self.events.push(SnapEvent::SnapApplied {
                kind: SnapKind::Position,
                rect,
            });
        }
        (rect, result)
    }

    /// Snap a resized tile and return the corrected rectangle.
    pub fn snap_size<T: Bounded>(&mut self, resizing: Rect, settled: &[T]) -> (Rect, SizeSnap) {
        let result = snap_size(resizing, settled, &self.config);
        let rect = resizing
            .with_size(result.size.width, result.size.height)
            .unwrap_or(resizing);
        if result.snapped {
            self.events.push(SnapEvent::SnapApplied {
                kind: SnapKind::Size,
                rect,
            });
        }
        (rect, result)
    }

    /// Drain the queued snap events.
    pub fn poll_events(&mut self) -> Vec<SnapEvent> {
        std::mem::take(&mut self.events)
    }
}
