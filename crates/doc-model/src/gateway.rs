//! Persistence gateway contract.
//!
//! The gateway is a flat table of [`NoteRow`]s. Rows are matched by the full
//! note key. There is no delete operation.

use crate::note::{NoteKey, NoteRow};
use std::error::Error;

/// Failure reported by a persistence backend.
#[derive(Debug, thiserror::Error)]
#[error("{inner}")]
pub struct GatewayError {
    inner: Box<dyn Error + Send + Sync + 'static>,
}

impl GatewayError {
    pub fn new(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self { inner: source.into() }
    }
}

pub trait NoteGateway {
    /// Every persisted row, for every file.
    fn fetch_all(&mut self) -> Result<Vec<NoteRow>, GatewayError>;
    /// Appends a row without looking for an existing one.
    fn insert(&mut self, row: &NoteRow) -> Result<(), GatewayError>;
    /// Replaces the text of rows matching `key`. Returns the number of rows touched.
    fn update_text(&mut self, key: &NoteKey, text: &str) -> Result<usize, GatewayError>;
    /// Updates the row matching the row's key, or inserts it when none exists.
    fn upsert(&mut self, row: &NoteRow) -> Result<(), GatewayError>;
    /// Moves rows matching `from` onto `to`. Returns the number of rows touched.
    fn reposition(&mut self, from: &NoteKey, to: &NoteKey) -> Result<usize, GatewayError>;
}

/// Vector-backed gateway with failure injection.
///
/// Keeps duplicate rows exactly like an append-only table would.
#[derive(Debug, Default, Clone)]
pub struct MemoryGateway {
    rows: Vec<NoteRow>,
    offline: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("note table is unreachable")]
struct Offline;

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<NoteRow>) -> Self {
        Self { rows, offline: false }
    }

    pub fn rows(&self) -> &[NoteRow] {
        &self.rows
    }

    /// While offline every operation fails.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    fn check(&self) -> Result<(), GatewayError> {
        if self.offline {
            return Err(GatewayError::new(Offline));
        }
        Ok(())
    }

    fn matching<'a>(&'a mut self, key: &'a NoteKey) -> impl Iterator<Item = &'a mut NoteRow> {
        self.rows.iter_mut().filter(move |row| row_matches(row, key))
    }
}

fn row_matches(row: &NoteRow, key: &NoteKey) -> bool {
    let Some((row_key, _)) = row.clone().into_note() else {
        return false;
    };
    &row_key == key
}

impl NoteGateway for MemoryGateway {
    fn fetch_all(&mut self) -> Result<Vec<NoteRow>, GatewayError> {
        self.check()?;
        Ok(self.rows.clone())
    }

    fn insert(&mut self, row: &NoteRow) -> Result<(), GatewayError> {
        self.check()?;
        self.rows.push(row.clone());
        Ok(())
    }

    fn update_text(&mut self, key: &NoteKey, text: &str) -> Result<usize, GatewayError> {
        self.check()?;
        let mut touched = 0;
        for row in self.matching(key) {
            row.note = text.to_owned();
            touched += 1;
        }
        Ok(touched)
    }

    fn upsert(&mut self, row: &NoteRow) -> Result<(), GatewayError> {
        self.check()?;
        let Some((key, _)) = row.clone().into_note() else {
            return Err(GatewayError::new(format!("invalid page number {}", row.page_num)));
        };

        let mut touched = false;
        for existing in self.matching(&key) {
            existing.alias = row.alias.clone();
            existing.note = row.note.clone();
            touched = true;
        }

        if !touched {
            self.rows.push(row.clone());
        }
        Ok(())
    }

    fn reposition(&mut self, from: &NoteKey, to: &NoteKey) -> Result<usize, GatewayError> {
        self.check()?;
        let mut touched = 0;
        for row in self.matching(from) {
            row.x = to.x.points();
            row.y = to.y.points();
            touched += 1;
        }
        Ok(touched)
    }
}
