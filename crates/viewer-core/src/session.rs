//! Which file and page is active.
//!
//! Invariant: while a document is active, `0 <= page < page_count`.

use log::{debug, info, warn};
use pdf_engine::{DocumentHandle, OpenSource, PdfEngine, PdfEngineError, RgbaImage};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to open document: {0}")]
    Engine(#[from] PdfEngineError),
    #[error("no loaded file named `{0}`")]
    UnknownFile(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActivePage {
    handle: DocumentHandle,
    page: u32,
    page_count: u32,
}

#[derive(Debug)]
pub struct DocumentSession<E> {
    engine: E,
    files: Vec<LoadedFile>,
    active_name: Option<String>,
    active: Option<ActivePage>,
}

/// Display name of a path: its final component.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

impl<E: PdfEngine> DocumentSession<E> {
    pub fn new(engine: E) -> Self {
        Self { engine, files: Vec::new(), active_name: None, active: None }
    }

    /// Registers `paths` under their display names and activates the first one
    /// at page 0. A name already loaded is re-pointed at the new path.
    ///
    /// Returns the activated name, or `None` when `paths` is empty.
    pub fn load_files(&mut self, paths: &[PathBuf]) -> Result<Option<String>, SessionError> {
        let Some(first) = paths.first() else {
            return Ok(None);
        };

        for path in paths {
            let name = display_name(path);
            match self.files.iter_mut().find(|file| file.name == name) {
                Some(existing) => existing.path = path.clone(),
                None => self.files.push(LoadedFile { name, path: path.clone() }),
            }
        }

        let name = display_name(first);
        self.switch_file(&name)?;
        Ok(Some(name))
    }

    /// Makes a loaded file active at page 0.
    pub fn switch_file(&mut self, name: &str) -> Result<(), SessionError> {
        let path = self
            .files
            .iter()
            .find(|file| file.name == name)
            .map(|file| file.path.clone())
            .ok_or_else(|| SessionError::UnknownFile(name.to_owned()))?;

        let handle = self.engine.open(OpenSource::from(path.as_path()))?;
        let page_count = match self.engine.page_count(handle) {
            Ok(count) => count,
            Err(err) => {
                self.close_quietly(handle);
                return Err(err.into());
            }
        };

        if page_count == 0 {
            self.close_quietly(handle);
            return Err(PdfEngineError::Backend("document has no pages".to_owned()).into());
        }

        if let Some(previous) = self.active.take() {
            self.close_quietly(previous.handle);
        }

        info!("event=document_switch module=session status=ok file={name} pages={page_count}");
        self.active = Some(ActivePage { handle, page: 0, page_count });
        self.active_name = Some(name.to_owned());
        Ok(())
    }

    /// Closing is best effort: a handle the engine refuses to close is logged
    /// and forgotten.
    fn close_quietly(&mut self, handle: DocumentHandle) {
        if let Err(err) = self.engine.close(handle) {
            warn!(
                "event=document_close module=session status=error handle={} error={err}",
                handle.raw()
            );
        }
    }

    pub fn loaded_files(&self) -> &[LoadedFile] {
        &self.files
    }

    pub fn is_loaded(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_file(&self) -> Option<&str> {
        self.active.and(self.active_name.as_deref())
    }

    pub fn current_page(&self) -> Option<u32> {
        self.active.map(|active| active.page)
    }

    pub fn page_count(&self) -> Option<u32> {
        self.active.map(|active| active.page_count)
    }

    /// Advances one page. A no-op on the last page or with nothing loaded.
    pub fn next_page(&mut self) -> bool {
        self.step(|active| (active.page + 1 < active.page_count).then(|| active.page + 1))
    }

    /// Goes back one page. A no-op on page 0 or with nothing loaded.
    pub fn previous_page(&mut self) -> bool {
        self.step(|active| active.page.checked_sub(1))
    }

    pub fn go_to_page(&mut self, page: u32) -> bool {
        self.step(|active| (page < active.page_count && page != active.page).then_some(page))
    }

    fn step(&mut self, target: impl FnOnce(&ActivePage) -> Option<u32>) -> bool {
        let Some(active) = self.active.as_mut() else {
            debug!("event=page_step module=session status=skip reason=no_document");
            return false;
        };

        match target(active) {
            Some(page) => {
                active.page = page;
                true
            }
            None => false,
        }
    }

    /// Rasterizes the current page, or `None` with nothing loaded.
    pub fn render_current(&self, zoom: f64) -> Result<Option<RgbaImage>, SessionError> {
        let Some(active) = self.active else {
            return Ok(None);
        };

        Ok(Some(self.engine.render_page(active.handle, active.page, zoom)?))
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}
