//! Geometry kernel: overlap, adjacency and edge extraction for axis-aligned tiles.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distance under which two edges count as touching rather than overlapping.
pub const DEFAULT_TOLERANCE: f64 = 2.0;

/// Errors raised when a rectangle fails validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("{field} of {value} exceeds the limit of {max}")]
    TooLarge {
        field: &'static str,
        value: f64,
        max: f64,
    },
}

/// Result type for geometry validation.
pub type GeometryResult<T> = Result<T, GeometryError>;

/// Unvalidated wire shape of a rectangle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawRect {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

/// An axis-aligned rectangle in world units.
///
/// Width and height are always positive and every component is finite; the
/// only way to obtain a `Rect` is through [`Rect::new`] (deserialization
/// included), so downstream code never re-checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRect", into = "RawRect")]
pub struct Rect {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

fn finite(field: &'static str, value: f64) -> GeometryResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(GeometryError::NonFinite { field, value })
    }
}

fn positive(field: &'static str, value: f64) -> GeometryResult<f64> {
    let value = finite(field, value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(GeometryError::NonPositive { field, value })
    }
}

impl Rect {
    /// Create a validated rectangle from its top-left corner and size.
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> GeometryResult<Self> {
        Ok(Self {
            x: finite("x", x)?,
            y: finite("y", y)?,
            w: positive("w", w)?,
            h: positive("h", h)?,
        })
    }

    /// Same rectangle moved so its top-left corner sits at `(x, y)`.
    pub fn with_origin(self, x: f64, y: f64) -> GeometryResult<Self> {
        Self::new(x, y, self.w, self.h)
    }

    /// Same anchor with a new size.
    pub fn with_size(self, w: f64, h: f64) -> GeometryResult<Self> {
        Self::new(self.x, self.y, w, h)
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn width(&self) -> f64 {
        self.w
    }

    pub fn height(&self) -> f64 {
        self.h
    }

    /// X coordinate of the right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Y coordinate of the bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Width over height.
    pub fn aspect_ratio(&self) -> f64 {
        self.w / self.h
    }

    pub fn origin(&self) -> kurbo::Point {
        kurbo::Point::new(self.x, self.y)
    }

    pub fn size(&self) -> kurbo::Size {
        kurbo::Size::new(self.w, self.h)
    }

    /// Reject rectangles whose width or height exceeds `max`.
    pub fn check_extent(&self, max: f64) -> GeometryResult<()> {
        if self.w > max {
            return Err(GeometryError::TooLarge {
                field: "w",
                value: self.w,
                max,
            });
        }
        if self.h > max {
            return Err(GeometryError::TooLarge {
                field: "h",
                value: self.h,
                max,
            });
        }
        Ok(())
    }

    /// Reject rectangles with an edge farther than `max` from the origin.
    ///
    /// Far from the origin an `f64` cannot represent the tile's extent, so
    /// `right()` collapses onto `x` and overlap tests stop working.
    pub fn check_bounds(&self, max: f64) -> GeometryResult<()> {
        let edges = [
            ("x", self.x),
            ("y", self.y),
            ("right", self.right()),
            ("bottom", self.bottom()),
        ];
        for (field, value) in edges {
            if value.abs() > max {
                return Err(GeometryError::TooLarge { field, value, max });
            }
        }
        Ok(())
    }

    /// Convert to a kurbo rectangle (corner representation).
    pub fn to_kurbo(&self) -> kurbo::Rect {
        kurbo::Rect::new(self.x, self.y, self.right(), self.bottom())
    }

    /// Convert from a kurbo rectangle, normalizing the corner order.
    pub fn from_kurbo(rect: kurbo::Rect) -> GeometryResult<Self> {
        let rect = rect.abs();
        Self::new(rect.x0, rect.y0, rect.width(), rect.height())
    }
}

impl TryFrom<RawRect> for Rect {
    type Error = GeometryError;

    fn try_from(raw: RawRect) -> Result<Self, Self::Error> {
        Rect::new(raw.x, raw.y, raw.w, raw.h)
    }
}

impl From<Rect> for RawRect {
    fn from(rect: Rect) -> Self {
        RawRect {
            x: rect.x,
            y: rect.y,
            w: rect.w,
            h: rect.h,
        }
    }
}

/// Anything that occupies a rectangle of the plane.
pub trait Bounded {
    /// The rectangle this item occupies, in world units.
    fn bounds(&self) -> Rect;
}

impl Bounded for Rect {
    fn bounds(&self) -> Rect {
        *self
    }
}

impl<T: Bounded + ?Sized> Bounded for &T {
    fn bounds(&self) -> Rect {
        (**self).bounds()
    }
}

/// True iff the interiors of `a` and `b` intersect by more than `tol` on both axes.
pub fn overlaps(a: &Rect, b: &Rect, tol: f64) -> bool {
    a.x < b.right() - tol
        && a.right() > b.x + tol
        && a.y < b.bottom() - tol
        && a.bottom() > b.y + tol
}

/// True iff some edge of `a` lies within `tol` of the opposite edge of `b`.
pub fn touches(a: &Rect, b: &Rect, tol: f64) -> bool {
    touches_x(a, b, tol) || touches_y(a, b, tol)
}

fn touches_x(a: &Rect, b: &Rect, tol: f64) -> bool {
    (a.right() - b.x).abs() < tol || (b.right() - a.x).abs() < tol
}

fn touches_y(a: &Rect, b: &Rect, tol: f64) -> bool {
    (a.bottom() - b.y).abs() < tol || (b.bottom() - a.y).abs() < tol
}

fn spans_overlap(a0: f64, a1: f64, b0: f64, b1: f64) -> bool {
    a0 < b1 && a1 > b0
}

/// True iff `a` and `b` share a stretch of edge.
///
/// They must touch on one axis and their spans must overlap on the other, so a
/// shared corner point alone does not count.
pub fn is_adjacent(a: &Rect, b: &Rect, tol: f64) -> bool {
    let share_x_span = spans_overlap(a.x, a.right(), b.x, b.right());
    let share_y_span = spans_overlap(a.y, a.bottom(), b.y, b.bottom());
    (touches_x(a, b, tol) && share_y_span) || (touches_y(a, b, tol) && share_x_span)
}

/// First settled item that `rect` overlaps, if any.
pub fn find_overlap<'a, T: Bounded>(rect: &Rect, settled: &'a [T], tol: f64) -> Option<&'a T> {
    settled.iter().find(|item| overlaps(rect, &item.bounds(), tol))
}

/// True iff `rect` overlaps any settled item.
pub fn overlaps_any<T: Bounded>(rect: &Rect, settled: &[T], tol: f64) -> bool {
    find_overlap(rect, settled, tol).is_some()
}

/// True iff `rect` is adjacent to at least one settled item.
pub fn is_adjacent_to_any<T: Bounded>(rect: &Rect, settled: &[T], tol: f64) -> bool {
    settled
        .iter()
        .any(|item| is_adjacent(rect, &item.bounds(), tol))
}

/// Candidate snap targets: every left/right x and top/bottom y of a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Edges {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

/// Collect the edges of every item. Duplicates are kept.
pub fn edges_of<T: Bounded>(items: &[T]) -> Edges {
    let mut edges = Edges {
        xs: Vec::with_capacity(items.len() * 2),
        ys: Vec::with_capacity(items.len() * 2),
    };
    for item in items {
        let r = item.bounds();
        edges.xs.push(r.x);
        edges.xs.push(r.right());
        edges.ys.push(r.y);
        edges.ys.push(r.bottom());
    }
    edges
}

/// Smallest rectangle containing every item, or `None` for an empty collection.
pub fn bounding_box<T: Bounded>(items: &[T]) -> Option<Rect> {
    let mut iter = items.iter().map(|item| item.bounds().to_kurbo());
    let first = iter.next()?;
    let union = iter.fold(first, |acc, r| acc.union(r));
    Rect::from_kurbo(union).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Rect {
        Rect::new(x, y, w, h).unwrap()
    }

    #[test]
    fn test_rect_rejects_degenerate_sizes() {
        assert!(matches!(
            Rect::new(0.0, 0.0, 0.0, 10.0),
            Err(GeometryError::NonPositive { field: "w", .. })
        ));
        assert!(matches!(
            Rect::new(0.0, 0.0, 10.0, -5.0),
            Err(GeometryError::NonPositive { field: "h", .. })
        ));
        assert!(matches!(
            Rect::new(f64::NAN, 0.0, 10.0, 10.0),
            Err(GeometryError::NonFinite { field: "x", .. })
        ));
        assert!(matches!(
            Rect::new(0.0, 0.0, f64::INFINITY, 10.0),
            Err(GeometryError::NonFinite { field: "w", .. })
        ));
    }

    #[test]
    fn test_rect_accessors() {
        let r = rect(10.0, 20.0, 100.0, 50.0);
        assert_eq!(r.right(), 110.0);
        assert_eq!(r.bottom(), 70.0);
        assert!((r.aspect_ratio() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_check_extent() {
        let r = rect(0.0, 0.0, 100.0, 5000.0);
        assert!(r.check_extent(5000.0).is_ok());
        assert!(matches!(
            r.check_extent(4096.0),
            Err(GeometryError::TooLarge { field: "h", .. })
        ));
    }

    #[test]
    fn test_check_bounds() {
        assert!(rect(-1000.0, 900.0, 100.0, 100.0).check_bounds(1000.0).is_ok());
        assert!(matches!(
            rect(950.0, 0.0, 100.0, 10.0).check_bounds(1000.0),
            Err(GeometryError::TooLarge { field: "right", .. })
        ));
        assert!(matches!(
            rect(0.0, -1001.0, 10.0, 10.0).check_bounds(1000.0),
            Err(GeometryError::TooLarge { field: "y", .. })
        ));
        assert!(matches!(
            rect(1.0e20, 0.0, 50.0, 50.0).check_bounds(1.0e9),
            Err(GeometryError::TooLarge { field: "x", .. })
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Rect = serde_json::from_str(r#"{"x":1,"y":2,"w":3,"h":4}"#).unwrap();
        assert_eq!(ok, rect(1.0, 2.0, 3.0, 4.0));

        let bad = serde_json::from_str::<Rect>(r#"{"x":1,"y":2,"w":0,"h":4}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_serialize_flat_fields() {
        let json = serde_json::to_value(rect(1.0, 2.0, 3.0, 4.0)).unwrap();
        assert_eq!(json, serde_json::json!({"x": 1.0, "y": 2.0, "w": 3.0, "h": 4.0}));
    }

    #[test]
    fn test_overlapping_rects() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        let b = rect(50.0, 50.0, 100.0, 100.0);
        assert!(overlaps(&a, &b, DEFAULT_TOLERANCE));
        assert!(overlaps(&b, &a, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_touching_rects_do_not_overlap() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        let right = rect(100.0, 0.0, 50.0, 50.0);
        let below = rect(0.0, 100.0, 50.0, 50.0);
        assert!(!overlaps(&a, &right, DEFAULT_TOLERANCE));
        assert!(!overlaps(&a, &below, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_rounding_noise_within_tolerance() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        let b = rect(98.5, 0.0, 50.0, 50.0);
        assert!(!overlaps(&a, &b, DEFAULT_TOLERANCE));
        assert!(overlaps(&a, &b, 0.0));
    }

    #[test]
    fn test_containment_overlaps() {
        let outer = rect(0.0, 0.0, 100.0, 100.0);
        let inner = rect(30.0, 30.0, 20.0, 20.0);
        assert!(overlaps(&outer, &inner, DEFAULT_TOLERANCE));
        assert!(overlaps(&inner, &outer, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_touches() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        assert!(touches(&a, &rect(101.0, 500.0, 10.0, 10.0), DEFAULT_TOLERANCE));
        assert!(touches(&a, &rect(-10.0, 300.0, 10.0, 10.0), DEFAULT_TOLERANCE));
        assert!(!touches(&a, &rect(103.0, 0.0, 10.0, 10.0), DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_adjacent_side_by_side() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        assert!(is_adjacent(&a, &rect(100.0, 20.0, 50.0, 50.0), DEFAULT_TOLERANCE));
        assert!(is_adjacent(&a, &rect(20.0, -50.0, 50.0, 50.0), DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_corner_contact_is_not_adjacent() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        let corner = rect(100.0, 100.0, 50.0, 50.0);
        assert!(touches(&a, &corner, DEFAULT_TOLERANCE));
        assert!(!is_adjacent(&a, &corner, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_touching_edge_without_span_overlap() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        // Right edge lines up but the tile is far below.
        let far = rect(100.0, 400.0, 50.0, 50.0);
        assert!(!is_adjacent(&a, &far, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_any_helpers() {
        let settled = vec![rect(0.0, 0.0, 100.0, 100.0), rect(200.0, 0.0, 100.0, 100.0)];
        let between = rect(100.0, 0.0, 100.0, 50.0);
        assert!(!overlaps_any(&between, &settled, DEFAULT_TOLERANCE));
        assert!(is_adjacent_to_any(&between, &settled, DEFAULT_TOLERANCE));

        let clash = rect(250.0, 50.0, 10.0, 10.0);
        assert_eq!(find_overlap(&clash, &settled, DEFAULT_TOLERANCE), Some(&settled[1]));
    }

    #[test]
    fn test_edges_of() {
        let edges = edges_of(&[rect(0.0, 0.0, 100.0, 50.0), rect(100.0, 0.0, 20.0, 20.0)]);
        assert_eq!(edges.xs, vec![0.0, 100.0, 100.0, 120.0]);
        assert_eq!(edges.ys, vec![0.0, 50.0, 0.0, 20.0]);
        assert_eq!(edges_of::<Rect>(&[]), Edges::default());
    }

    #[test]
    fn test_bounding_box() {
        assert_eq!(bounding_box::<Rect>(&[]), None);
        let bbox = bounding_box(&[rect(-10.0, 0.0, 20.0, 20.0), rect(100.0, 50.0, 10.0, 30.0)]).unwrap();
        assert_eq!(bbox, rect(-10.0, 0.0, 120.0, 80.0));
    }

    #[test]
    fn test_kurbo_roundtrip() {
        let r = rect(5.0, 6.0, 7.0, 8.0);
        assert_eq!(Rect::from_kurbo(r.to_kurbo()).unwrap(), r);
        let flipped = kurbo::Rect::new(12.0, 14.0, 5.0, 6.0);
        assert_eq!(Rect::from_kurbo(flipped).unwrap(), r);
    }
}
