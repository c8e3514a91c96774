//! Overlay composition: note markers on top of a page raster.
//!
//! Each marker is a fixed-radius disc at the note's view position with its
//! alias label to the right. The surface that presents a frame owns hit
//! testing; [`RenderCompositor::pick`] maps a surface point back to a note key.

use crate::viewport::{ViewPoint, Viewport};
use doc_model::{Note, NoteKey};
use image::Rgba;
use pdf_engine::RgbaImage;

pub const MARKER_RADIUS: f64 = 5.0;
pub const LABEL_OFFSET: f64 = 10.0;

// No glyph rendering here; labels are laid out at a fixed advance per char.
const LABEL_ADVANCE: f64 = 7.0;
const LABEL_HALF_HEIGHT: f64 = 6.0;
const LABEL_BAR_HALF_HEIGHT: f64 = 1.0;

const MARKER_FILL: Rgba<u8> = Rgba([255, 0, 0, 255]);
const LABEL_FILL: Rgba<u8> = Rgba([0, 0, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRect {
    pub min: ViewPoint,
    pub max: ViewPoint,
}

impl HitRect {
    pub fn contains(&self, point: ViewPoint) -> bool {
        (self.min.x..=self.max.x).contains(&point.x) && (self.min.y..=self.max.y).contains(&point.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub key: NoteKey,
    pub alias: String,
    pub center: ViewPoint,
}

impl Marker {
    pub fn label_origin(&self) -> ViewPoint {
        self.center.offset(LABEL_OFFSET, 0.0)
    }

    pub fn label_width(&self) -> f64 {
        self.alias.chars().count() as f64 * LABEL_ADVANCE
    }

    /// Disc and label together, one hit target.
    pub fn hit_rect(&self) -> HitRect {
        let label_end = self.label_origin().x + self.label_width();
        let half_height = MARKER_RADIUS.max(LABEL_HALF_HEIGHT);
        HitRect {
            min: ViewPoint::new(self.center.x - MARKER_RADIUS, self.center.y - half_height),
            max: ViewPoint::new(
                label_end.max(self.center.x + MARKER_RADIUS),
                self.center.y + half_height,
            ),
        }
    }
}

/// Positions a marker for each note at `viewport.to_view(anchor)`.
pub fn layout_markers<'a>(
    notes: impl IntoIterator<Item = (&'a NoteKey, &'a Note)>,
    viewport: &Viewport,
) -> Vec<Marker> {
    notes
        .into_iter()
        .map(|(key, note)| Marker {
            key: key.clone(),
            alias: note.alias.clone(),
            center: viewport.to_view(key.point()),
        })
        .collect()
}

/// Topmost marker under `point`. Later markers are drawn above earlier ones.
pub fn pick_marker(markers: &[Marker], point: ViewPoint) -> Option<&Marker> {
    markers.iter().rev().find(|marker| marker.hit_rect().contains(point))
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub page: RgbaImage,
    pub markers: Vec<Marker>,
}

/// Presentation surface for composed frames.
pub trait RenderCompositor {
    fn present(&mut self, frame: Frame);
    fn pick(&self, point: ViewPoint) -> Option<NoteKey>;
}

/// Paints markers straight into the page raster.
#[derive(Debug, Default)]
pub struct RasterCompositor {
    image: Option<RgbaImage>,
    markers: Vec<Marker>,
}

impl RasterCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.image.as_ref()
    }

    pub fn into_image(self) -> Option<RgbaImage> {
        self.image
    }
}

impl RenderCompositor for RasterCompositor {
    fn present(&mut self, frame: Frame) {
        let Frame { mut page, markers } = frame;
        for marker in &markers {
            paint_marker(&mut page, marker);
        }
        self.image = Some(page);
        self.markers = markers;
    }

    fn pick(&self, point: ViewPoint) -> Option<NoteKey> {
        pick_marker(&self.markers, point).map(|marker| marker.key.clone())
    }
}

fn paint_marker(image: &mut RgbaImage, marker: &Marker) {
    let center = marker.center;
    let radius_sq = MARKER_RADIUS * MARKER_RADIUS;
    fill_region(
        image,
        (center.x - MARKER_RADIUS, center.y - MARKER_RADIUS),
        (center.x + MARKER_RADIUS, center.y + MARKER_RADIUS),
        |x, y| (x - center.x).powi(2) + (y - center.y).powi(2) <= radius_sq,
        MARKER_FILL,
    );

    let origin = marker.label_origin();
    fill_region(
        image,
        (origin.x, origin.y - LABEL_BAR_HALF_HEIGHT),
        (origin.x + marker.label_width(), origin.y + LABEL_BAR_HALF_HEIGHT),
        |_, _| true,
        LABEL_FILL,
    );
}

fn fill_region(
    image: &mut RgbaImage,
    min: (f64, f64),
    max: (f64, f64),
    inside: impl Fn(f64, f64) -> bool,
    color: Rgba<u8>,
) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let clamp_x = |v: f64| v.floor().clamp(0.0, f64::from(width - 1)) as u32;
    let clamp_y = |v: f64| v.floor().clamp(0.0, f64::from(height - 1)) as u32;

    if max.0 < 0.0 || max.1 < 0.0 || min.0 >= f64::from(width) || min.1 >= f64::from(height) {
        return;
    }

    for y in clamp_y(min.1)..=clamp_y(max.1) {
        for x in clamp_x(min.0)..=clamp_x(max.0) {
            let (px, py) = (f64::from(x) + 0.5, f64::from(y) + 0.5);
            if inside(px, py) {
                image.put_pixel(x, y, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::DocPoint;

    fn note_at(x: f64, y: f64, alias: &str) -> (NoteKey, Note) {
        (NoteKey::new("a.pdf", 0, DocPoint::new(x, y)), Note::new(alias, "body"))
    }

    #[test]
    fn markers_follow_zoom() {
        let (key, note) = note_at(120.0, 80.0, "A1");
        let markers = layout_markers([(&key, &note)], &Viewport::with_zoom(2.0));

        assert_eq!(markers[0].center, ViewPoint::new(240.0, 160.0));
        assert_eq!(markers[0].label_origin(), ViewPoint::new(250.0, 160.0));
    }

    #[test]
    fn hit_rect_covers_disc_and_label() {
        let (key, note) = note_at(50.0, 50.0, "Alpha");
        let markers = layout_markers([(&key, &note)], &Viewport::default());

        assert_eq!(pick_marker(&markers, ViewPoint::new(46.0, 50.0)).map(|m| &m.key), Some(&key));
        assert_eq!(pick_marker(&markers, ViewPoint::new(90.0, 52.0)).map(|m| &m.key), Some(&key));
        assert!(pick_marker(&markers, ViewPoint::new(50.0, 60.0)).is_none());
        assert!(pick_marker(&markers, ViewPoint::new(40.0, 50.0)).is_none());
    }

    #[test]
    fn present_paints_marker_and_resolves_pick() {
        let (key, note) = note_at(20.0, 20.0, "A");
        let markers = layout_markers([(&key, &note)], &Viewport::default());
        let page = RgbaImage::from_pixel(64, 64, Rgba([255, 255, 255, 255]));

        let mut compositor = RasterCompositor::new();
        compositor.present(Frame { page, markers });

        let image = compositor.image().expect("frame should be kept");
        assert_eq!(*image.get_pixel(20, 20), MARKER_FILL);
        assert_eq!(*image.get_pixel(32, 20), LABEL_FILL);
        assert_eq!(*image.get_pixel(5, 5), Rgba([255, 255, 255, 255]));
        assert_eq!(compositor.pick(ViewPoint::new(21.0, 19.0)), Some(key));
        assert_eq!(compositor.pick(ViewPoint::new(1.0, 1.0)), None);
    }

    #[test]
    fn markers_off_the_page_are_clipped() {
        let (key, note) = note_at(-100.0, 500.0, "far");
        let markers = layout_markers([(&key, &note)], &Viewport::default());
        let page = RgbaImage::from_pixel(16, 16, Rgba([255, 255, 255, 255]));

        let mut compositor = RasterCompositor::new();
        compositor.present(Frame { page, markers });

        let image = compositor.into_image().expect("frame should be kept");
        assert!(image.pixels().all(|pixel| *pixel == Rgba([255, 255, 255, 255])));
    }
}
