//! Document space to view space transform.
//!
//! The transform is a uniform scale by `zoom`. Pan is the rendering surface's
//! scroll offset and is tracked here only so the surface can be driven; it is
//! never folded into [`Viewport::to_view`] or [`Viewport::to_doc`]. A click at
//! pointer position `p` is recorded at `p / zoom` regardless of scroll.

use doc_model::DocPoint;

pub const ZOOM_STEP: f64 = 1.1;
pub const MIN_ZOOM: f64 = 0.05;
pub const MAX_ZOOM: f64 = 20.0;

/// A point on the rendering surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewPoint {
    pub x: f64,
    pub y: f64,
}

impl ViewPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }

    /// `self - other`, component-wise.
    pub fn delta_from(self, other: ViewPoint) -> (f64, f64) {
        (self.x - other.x, self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    zoom: f64,
    scroll: ViewPoint,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { zoom: 1.0, scroll: ViewPoint::default() }
    }
}

impl Viewport {
    pub fn with_zoom(zoom: f64) -> Self {
        let mut viewport = Self::default();
        viewport.set_zoom(zoom);
        viewport
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Sets zoom, clamped to `[MIN_ZOOM, MAX_ZOOM]`. Non-finite input is ignored.
    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() {
            self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        }
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom * ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom / ZOOM_STEP);
    }

    pub fn to_view(&self, point: DocPoint) -> ViewPoint {
        ViewPoint::new(point.x * self.zoom, point.y * self.zoom)
    }

    pub fn to_doc(&self, point: ViewPoint) -> DocPoint {
        DocPoint::new(point.x / self.zoom, point.y / self.zoom)
    }

    /// Current scroll offset of the surface.
    pub fn scroll(&self) -> ViewPoint {
        self.scroll
    }

    /// Scrolls the surface; dragging content right scrolls left.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.scroll = self.scroll.offset(-dx, -dy);
    }
}
