use serde::{Deserialize, Serialize};
use std::fmt;

/// One document-space coordinate, stored as integer micro-units.
///
/// Note identity depends on exact coordinate equality, so keys never carry raw
/// floats. Conversion happens once, when a point enters the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocCoord(i64);

impl DocCoord {
    pub const UNITS_PER_POINT: f64 = 1_000_000.0;

    pub fn from_points(value: f64) -> Self {
        Self((value * Self::UNITS_PER_POINT).round() as i64)
    }

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn micros(self) -> i64 {
        self.0
    }

    pub fn points(self) -> f64 {
        self.0 as f64 / Self::UNITS_PER_POINT
    }
}

impl fmt::Display for DocCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.points())
    }
}

/// A point in document space (unscaled, zoom independent).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocPoint {
    pub x: f64,
    pub y: f64,
}

impl DocPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Identity of a note: file, zero-based page and anchor point.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteKey {
    pub file_name: String,
    pub page: u32,
    pub x: DocCoord,
    pub y: DocCoord,
}

impl NoteKey {
    pub fn new(file_name: impl Into<String>, page: u32, point: DocPoint) -> Self {
        Self {
            file_name: file_name.into(),
            page,
            x: DocCoord::from_points(point.x),
            y: DocCoord::from_points(point.y),
        }
    }

    pub fn point(&self) -> DocPoint {
        DocPoint::new(self.x.points(), self.y.points())
    }

    /// Same file and page, different anchor.
    pub fn moved_to(&self, point: DocPoint) -> Self {
        Self::new(self.file_name.clone(), self.page, point)
    }

    pub fn is_on(&self, file_name: &str, page: u32) -> bool {
        self.page == page && self.file_name == file_name
    }
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@({}, {})", self.file_name, self.page, self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub alias: String,
    pub text: String,
}

impl Note {
    pub fn new(alias: impl Into<String>, text: impl Into<String>) -> Self {
        Self { alias: alias.into(), text: text.into() }
    }
}

/// Flat persisted row, column for column with the `notes` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRow {
    pub file_name: String,
    pub page_num: i64,
    pub x: f64,
    pub y: f64,
    pub alias: String,
    pub note: String,
}

impl NoteRow {
    pub fn from_note(key: &NoteKey, note: &Note) -> Self {
        Self {
            file_name: key.file_name.clone(),
            page_num: i64::from(key.page),
            x: key.x.points(),
            y: key.y.points(),
            alias: note.alias.clone(),
            note: note.text.clone(),
        }
    }

    /// Splits a row into key and payload. Rows with a negative page are rejected.
    pub fn into_note(self) -> Option<(NoteKey, Note)> {
        let page = u32::try_from(self.page_num).ok()?;
        let key = NoteKey::new(self.file_name, page, DocPoint::new(self.x, self.y));
        Some((key, Note { alias: self.alias, text: self.note }))
    }
}
