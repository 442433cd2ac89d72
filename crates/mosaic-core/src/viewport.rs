//! Viewport module for pan/zoom transforms.

use crate::geometry::{Bounded, bounding_box};
use kurbo::{Affine, Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Smallest allowed scale.
pub const MIN_SCALE: f64 = 0.05;
/// Largest allowed scale.
pub const MAX_SCALE: f64 = 5.0;
/// Multiplicative step used by the zoom in/out controls.
pub const ZOOM_STEP: f64 = 1.1;
/// Padding around content when fitting the view (in world units).
pub const DEFAULT_FIT_PADDING: f64 = 40.0;

/// Viewport manages the view transform for the mosaic.
///
/// It handles panning (translation) and zooming (scaling) operations,
/// converting between screen coordinates and world coordinates:
/// `screen = world * scale + pan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Current zoom level.
    pub scale: f64,
    /// Current translation offset, in screen pixels.
    pub pan: Vec2,
    /// Size of the rendering surface, in screen pixels.
    pub screen_size: Size,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(Size::ZERO)
    }
}

impl Viewport {
    /// Create a viewport showing the default view for a surface of the given size.
    pub fn new(screen_size: Size) -> Self {
        let mut viewport = Self {
            scale: 1.0,
            pan: Vec2::ZERO,
            screen_size,
        };
        viewport.default_view();
        viewport
    }

    /// Get the affine transform for rendering.
    ///
    /// This transform converts world coordinates to screen coordinates.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.pan) * Affine::scale(self.scale)
    }

    /// Get the inverse transform for input handling.
    ///
    /// This transform converts screen coordinates to world coordinates.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.scale) * Affine::translate(-self.pan)
    }

    /// Convert a screen point to world coordinates.
    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        Point::new(
            (screen_point.x - self.pan.x) / self.scale,
            (screen_point.y - self.pan.y) / self.scale,
        )
    }

    /// Convert a world point to screen coordinates.
    pub fn world_to_screen(&self, world_point: Point) -> Point {
        Point::new(
            world_point.x * self.scale + self.pan.x,
            world_point.y * self.scale + self.pan.y,
        )
    }

    /// The part of the world currently visible on screen.
    pub fn visible_world_rect(&self) -> kurbo::Rect {
        let top_left = self.screen_to_world(Point::ZERO);
        let bottom_right =
            self.screen_to_world(Point::new(self.screen_size.width, self.screen_size.height));
        kurbo::Rect::from_points(top_left, bottom_right)
    }

    /// Update the surface size (window resize). Scale and pan are kept.
    pub fn set_screen_size(&mut self, screen_size: Size) {
        self.screen_size = screen_size;
    }

    /// Pan the view by a delta in screen coordinates.
    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan += delta;
    }

    /// Zoom to `new_scale`, keeping the world point under `screen_pointer` fixed.
    pub fn zoom_at_point(&mut self, new_scale: f64, screen_pointer: Point) {
        if !new_scale.is_finite() {
            return;
        }
        let new_scale = new_scale.clamp(MIN_SCALE, MAX_SCALE);
        let world_pointer = self.screen_to_world(screen_pointer);
        self.scale = new_scale;
        self.pan = Vec2::new(
            screen_pointer.x - world_pointer.x * new_scale,
            screen_pointer.y - world_pointer.y * new_scale,
        );
    }

    /// Multiply the scale by `factor` about a screen point.
    pub fn zoom_by(&mut self, factor: f64, screen_pointer: Point) {
        self.zoom_at_point(self.scale * factor, screen_pointer);
    }

    /// One zoom step in, about the centre of the screen.
    pub fn zoom_in(&mut self) {
        self.zoom_by(ZOOM_STEP, self.screen_center());
    }

    /// One zoom step out, about the centre of the screen.
    pub fn zoom_out(&mut self) {
        self.zoom_by(1.0 / ZOOM_STEP, self.screen_center());
    }

    /// Zoom level as a whole percentage, for status readouts.
    pub fn zoom_percent(&self) -> u32 {
        (self.scale * 100.0).round() as u32
    }

    /// Fit the view so every placement is visible, centred, with `padding` around it.
    ///
    /// Falls back to the default view when there is nothing to show or the
    /// surface has no area.
    pub fn fit_to_content<T: Bounded>(&mut self, placements: &[T], padding: f64) {
        let Some(bounds) = bounding_box(placements) else {
            self.default_view();
            return;
        };
        if self.screen_size.width <= 0.0 || self.screen_size.height <= 0.0 {
            self.default_view();
            return;
        }

        let padded = bounds.to_kurbo().inflate(padding.max(0.0), padding.max(0.0));
        let scale_x = self.screen_size.width / padded.width();
        let scale_y = self.screen_size.height / padded.height();
        self.scale = scale_x.min(scale_y).clamp(MIN_SCALE, MAX_SCALE);

        // Center the bounds in the viewport
        let content_center = padded.center();
        let screen_center = self.screen_center();
        self.pan = Vec2::new(
            screen_center.x - content_center.x * self.scale,
            screen_center.y - content_center.y * self.scale,
        );
    }

    /// Fit to content when there is any, otherwise return to the default view.
    pub fn reset_view<T: Bounded>(&mut self, placements: &[T], padding: f64) {
        if placements.is_empty() {
            self.default_view();
        } else {
            self.fit_to_content(placements, padding);
        }
    }

    /// Scale 1 with the world origin at the centre of the screen.
    fn default_view(&mut self) {
        self.scale = 1.0;
        self.pan = self.screen_center().to_vec2();
    }

    fn screen_center(&self) -> Point {
        Point::new(self.screen_size.width / 2.0, self.screen_size.height / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    const EPS: f64 = 1e-9;

    fn screen() -> Size {
        Size::new(800.0, 600.0)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < EPS, "{} != {}", a, b);
    }

    #[test]
    fn test_default_viewport() {
        let viewport = Viewport::new(screen());
        assert_close(viewport.scale, 1.0);
        assert_eq!(viewport.pan, Vec2::new(400.0, 300.0));
        let origin = viewport.world_to_screen(Point::ZERO);
        assert_eq!(origin, Point::new(400.0, 300.0));
    }

    #[test]
    fn test_screen_to_world_with_pan_and_scale() {
        let mut viewport = Viewport::new(screen());
        viewport.pan = Vec2::new(50.0, 100.0);
        viewport.scale = 2.0;
        let world = viewport.screen_to_world(Point::new(150.0, 300.0));
        assert_close(world.x, 50.0);
        assert_close(world.y, 100.0);
    }

    #[test]
    fn test_roundtrip_conversion() {
        let mut viewport = Viewport::new(screen());
        viewport.pan = Vec2::new(30.0, -20.0);
        viewport.scale = 1.5;

        let original = Point::new(123.0, 456.0);
        let back = viewport.world_to_screen(viewport.screen_to_world(original));
        assert_close(back.x, original.x);
        assert_close(back.y, original.y);
    }

    #[test]
    fn test_affine_matches_point_math() {
        let mut viewport = Viewport::new(screen());
        viewport.pan = Vec2::new(-12.0, 7.5);
        viewport.scale = 0.75;
        let p = Point::new(31.0, -4.0);
        let via_affine = viewport.transform() * p;
        let direct = viewport.world_to_screen(p);
        assert_close(via_affine.x, direct.x);
        assert_close(via_affine.y, direct.y);
        let back = viewport.inverse_transform() * via_affine;
        assert_close(back.x, p.x);
        assert_close(back.y, p.y);
    }

    #[test]
    fn test_zoom_keeps_pointer_fixed() {
        let mut viewport = Viewport::new(screen());
        viewport.pan = Vec2::new(-40.0, 25.0);
        viewport.scale = 0.8;
        for (new_scale, pointer) in [
            (1.7, Point::new(120.0, 80.0)),
            (0.3, Point::new(799.0, 1.0)),
            (4.2, Point::new(400.0, 300.0)),
        ] {
            let before = viewport.screen_to_world(pointer);
            viewport.zoom_at_point(new_scale, pointer);
            let after = viewport.screen_to_world(pointer);
            assert_close(viewport.scale, new_scale);
            assert!((before.x - after.x).abs() < 1e-6);
            assert!((before.y - after.y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zoom_in_then_out_restores_view() {
        let mut viewport = Viewport::new(screen());
        viewport.pan = Vec2::new(12.0, -80.0);
        viewport.scale = 1.3;
        let (scale, pan) = (viewport.scale, viewport.pan);
        let pointer = Point::new(250.0, 410.0);

        viewport.zoom_at_point(scale * 1.1, pointer);
        viewport.zoom_at_point(viewport.scale / 1.1, pointer);

        assert!((viewport.scale - scale).abs() < 1e-9);
        assert!((viewport.pan.x - pan.x).abs() < 1e-9);
        assert!((viewport.pan.y - pan.y).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_clamp() {
        let mut viewport = Viewport::new(screen());
        viewport.zoom_at_point(0.001, Point::ZERO);
        assert_close(viewport.scale, MIN_SCALE);

        viewport.zoom_at_point(1000.0, Point::ZERO);
        assert_close(viewport.scale, MAX_SCALE);

        viewport.zoom_at_point(f64::NAN, Point::ZERO);
        assert_close(viewport.scale, MAX_SCALE);
    }

    #[test]
    fn test_zoom_buttons() {
        let mut viewport = Viewport::new(screen());
        viewport.zoom_in();
        assert_close(viewport.scale, ZOOM_STEP);
        assert_eq!(viewport.zoom_percent(), 110);
        viewport.zoom_out();
        assert_close(viewport.scale, 1.0);
        // The screen centre still shows the world origin.
        let center = viewport.screen_to_world(Point::new(400.0, 300.0));
        assert!(center.x.abs() < 1e-9 && center.y.abs() < 1e-9);
    }

    #[test]
    fn test_pan_by() {
        let mut viewport = Viewport::new(screen());
        viewport.pan_by(Vec2::new(10.0, 20.0));
        assert_eq!(viewport.pan, Vec2::new(410.0, 320.0));
    }

    #[test]
    fn test_fit_to_content_centers_and_scales() {
        let placements = [
            Rect::new(0.0, 0.0, 100.0, 100.0).unwrap(),
            Rect::new(100.0, 0.0, 300.0, 100.0).unwrap(),
        ];
        let mut viewport = Viewport::new(screen());
        viewport.fit_to_content(&placements, 0.0);

        // 400x100 content in an 800x600 screen: width limits the scale.
        assert_close(viewport.scale, 2.0);
        let center = viewport.world_to_screen(Point::new(200.0, 50.0));
        assert_close(center.x, 400.0);
        assert_close(center.y, 300.0);
    }

    #[test]
    fn test_fit_to_content_with_padding() {
        let placements = [Rect::new(0.0, 0.0, 200.0, 200.0).unwrap()];
        let mut viewport = Viewport::new(screen());
        viewport.fit_to_content(&placements, 100.0);
        // Padded box is 400x400; height limits to 1.5.
        assert_close(viewport.scale, 1.5);
        let top_left = viewport.world_to_screen(Point::new(-100.0, -100.0));
        assert_close(top_left.y, 0.0);
        assert_close(top_left.x, 100.0);
    }

    #[test]
    fn test_fit_to_content_clamps_scale() {
        let tiny = [Rect::new(0.0, 0.0, 1.0, 1.0).unwrap()];
        let mut viewport = Viewport::new(screen());
        viewport.fit_to_content(&tiny, 0.0);
        assert_close(viewport.scale, MAX_SCALE);

        let huge = [Rect::new(0.0, 0.0, 1_000_000.0, 10.0).unwrap()];
        viewport.fit_to_content(&huge, 0.0);
        assert_close(viewport.scale, MIN_SCALE);
    }

    #[test]
    fn test_fit_and_reset_empty_fall_back_to_default() {
        let mut viewport = Viewport::new(screen());
        viewport.zoom_at_point(3.0, Point::new(10.0, 10.0));
        viewport.fit_to_content::<Rect>(&[], DEFAULT_FIT_PADDING);
        assert_eq!(viewport, Viewport::new(screen()));

        viewport.zoom_in();
        viewport.reset_view::<Rect>(&[], DEFAULT_FIT_PADDING);
        assert_eq!(viewport, Viewport::new(screen()));
    }

    #[test]
    fn test_reset_view_fits_content() {
        let placements = [Rect::new(1000.0, 1000.0, 50.0, 50.0).unwrap()];
        let mut reset = Viewport::new(screen());
        reset.reset_view(&placements, DEFAULT_FIT_PADDING);
        let mut fitted = Viewport::new(screen());
        fitted.fit_to_content(&placements, DEFAULT_FIT_PADDING);
        assert_eq!(reset, fitted);
    }

    #[test]
    fn test_visible_world_rect() {
        let mut viewport = Viewport::new(screen());
        viewport.scale = 2.0;
        viewport.pan = Vec2::ZERO;
        let visible = viewport.visible_world_rect();
        assert_eq!(visible, kurbo::Rect::new(0.0, 0.0, 400.0, 300.0));
    }
}
