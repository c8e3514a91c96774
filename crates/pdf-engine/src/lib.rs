//! Page decoding and rasterization boundary.
//!
//! The annotation engine only needs three things from a PDF backend: open a
//! file, count its pages, and turn one page into a raster at a zoom factor.
//! [`PdfEngine`] is that seam. [`LopdfEngine`] is the built-in backend: it
//! parses page geometry with `lopdf` and produces a blank page raster of the
//! right size, which is enough for placing and compositing note markers.

use image::{ImageBuffer, Rgba};
use log::{debug, warn};
use lopdf::Document;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Page size used when a page carries no readable `MediaBox` (US Letter).
pub const DEFAULT_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

const PAGE_FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);
const PAGE_EDGE: Rgba<u8> = Rgba([220, 220, 220, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Page dimensions in document space (points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// Pixel dimensions of this page when rendered at `zoom`.
    pub fn scaled(self, zoom: f64) -> (u32, u32) {
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
        let width = (f64::from(self.width_pt) * zoom).round().max(1.0) as u32;
        let height = (f64::from(self.height_pt) * zoom).round().max(1.0) as u32;
        (width, height)
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Document and render collaborator.
///
/// Implementations own their open documents; callers only ever hold
/// [`DocumentHandle`]s.
pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(&self, handle: DocumentHandle, page_index: u32)
        -> Result<PageSize, PdfEngineError>;
    /// Renders one page at `zoom` pixels per point.
    fn render_page(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        zoom: f64,
    ) -> Result<RgbaImage, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, Vec<PageSize>>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (page_number, object_id) in pages {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| media_box_size(array));

            sizes.push(size.unwrap_or_else(|| {
                warn!("event=page_size module=pdf_engine status=fallback page={page_number}");
                DEFAULT_PAGE_SIZE
            }));
        }

        if sizes.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        Ok(sizes)
    }

    fn sizes(&self, handle: DocumentHandle) -> Result<&[PageSize], PdfEngineError> {
        self.docs
            .get(&handle)
            .map(Vec::as_slice)
            .ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

fn media_box_size(array: &[lopdf::Object]) -> Option<PageSize> {
    let [x0, y0, x1, y1] = array else {
        return None;
    };
    let corner = |a: &lopdf::Object| -> Option<f32> {
        a.as_float().ok().or_else(|| a.as_i64().ok().map(|value| value as f32))
    };
    let (x0, y0, x1, y1) = (corner(x0)?, corner(y0)?, corner(x1)?, corner(y1)?);

    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        debug!(
            "event=document_open module=pdf_engine status=ok handle={} pages={}",
            handle.raw(),
            page_sizes.len()
        );
        self.docs.insert(handle, page_sizes);

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.sizes(handle)?.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let sizes = self.sizes(handle)?;
        sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: sizes.len() as u32,
        })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        zoom: f64,
    ) -> Result<RgbaImage, PdfEngineError> {
        let (width, height) = self.page_size(handle, page_index)?.scaled(zoom);
        let mut image = RgbaImage::from_pixel(width, height, PAGE_FILL);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, PAGE_EDGE);
                image.put_pixel(x, height - 1, PAGE_EDGE);
            }
            for y in 0..height {
                image.put_pixel(0, y, PAGE_EDGE);
                image.put_pixel(width - 1, y, PAGE_EDGE);
            }
        }

        Ok(image)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

/// Builds an in-memory PDF with `page_count` pages of the given size.
///
/// Used by tests and fixtures across the workspace.
pub fn blank_pdf(page_count: u32, size: PageSize) -> Result<Vec<u8>, PdfEngineError> {
    use lopdf::{dictionary, Object};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let media_box = vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Real(size.width_pt),
        Object::Real(size.height_pt),
    ];

    let kids: Vec<Object> = (0..page_count)
        .map(|_| {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => media_box.clone(),
            });
            Object::Reference(page_id)
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => i64::from(page_count),
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_page_pdf() -> Vec<u8> {
        blank_pdf(3, PageSize { width_pt: 200.0, height_pt: 100.0 }).expect("pdf should build")
    }

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(three_page_pdf())).expect("open should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 3);
        assert_eq!(
            engine.page_size(handle, 2).expect("size should succeed"),
            PageSize { width_pt: 200.0, height_pt: 100.0 }
        );
    }

    #[test]
    fn render_scales_page_by_zoom() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(three_page_pdf())).expect("open should succeed");

        let image = engine.render_page(handle, 0, 1.5).expect("render should succeed");
        assert_eq!((image.width(), image.height()), (300, 150));

        let image = engine.render_page(handle, 0, 1.0).expect("render should succeed");
        assert_eq!((image.width(), image.height()), (200, 100));
    }

    #[test]
    fn render_rejects_page_past_end() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(three_page_pdf())).expect("open should succeed");

        let err = engine.render_page(handle, 3, 1.0).expect_err("page 3 does not exist");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 3, page_count: 3 }));
    }

    #[test]
    fn invalid_handle_returns_error() {
        let engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");

        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }

    #[test]
    fn closed_handle_is_forgotten() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(three_page_pdf())).expect("open should succeed");

        engine.close(handle).expect("close should succeed");
        assert!(engine.page_count(handle).is_err());
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"not a pdf".to_vec()))
            .expect_err("garbage should not open");

        assert!(matches!(err, PdfEngineError::Parse(_)));
    }

    #[test]
    fn degenerate_zoom_falls_back_to_unit_scale() {
        let size = PageSize { width_pt: 10.0, height_pt: 20.0 };
        assert_eq!(size.scaled(0.0), (10, 20));
        assert_eq!(size.scaled(f64::NAN), (10, 20));
    }
}
