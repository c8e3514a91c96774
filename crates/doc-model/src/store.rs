//! Authoritative in-memory note collection.
//!
//! # Invariants
//! - Memory is the source of truth. A failed gateway call leaves the in-memory
//!   change in place and marks the note unsaved until the next `save_all`.
//! - A note key never changes except through `reposition_note`.
//! - A move the gateway did not record is replayed before that note is
//!   written again, so the stored row never splits into two.
//! - Callers reach notes through a (file, page) or file scope, never through
//!   the raw mapping.

use crate::gateway::{GatewayError, NoteGateway};
use crate::note::{DocPoint, Note, NoteKey, NoteRow};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Insert,
    Update,
    Reposition,
    Save,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Reposition => "reposition",
            Self::Save => "save",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("note {operation} failed: {cause}")]
    Persistence { operation: Operation, cause: GatewayError },
}

impl StoreError {
    fn persistence(operation: Operation, cause: GatewayError) -> Self {
        warn!("event=note_persist module=store status=error op={operation} error={cause}");
        Self::Persistence { operation, cause }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct NoteStore<G> {
    gateway: G,
    notes: HashMap<NoteKey, Note>,
    unsaved: HashSet<NoteKey>,
    /// Current key to the key its stored row still sits under.
    moved_from: HashMap<NoteKey, NoteKey>,
}

impl<G: NoteGateway> NoteStore<G> {
    /// An empty store. Call [`NoteStore::reload_all`] to populate it.
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            notes: HashMap::new(),
            unsaved: HashSet::new(),
            moved_from: HashMap::new(),
        }
    }

    /// Replaces every in-memory note with the gateway's full table.
    ///
    /// Duplicate rows for one key collapse onto the last one read. On failure
    /// the current notes stay untouched.
    pub fn reload_all(&mut self) -> StoreResult<usize> {
        let rows =
            self.gateway.fetch_all().map_err(|err| StoreError::persistence(Operation::Load, err))?;
        let row_count = rows.len();

        let mut notes = HashMap::with_capacity(row_count);
        let mut skipped = 0usize;
        for row in rows {
            match row.into_note() {
                Some((key, note)) => {
                    notes.insert(key, note);
                }
                None => skipped += 1,
            }
        }

        if !self.unsaved.is_empty() {
            warn!(
                "event=notes_reload module=store status=discard unsaved={}",
                self.unsaved.len()
            );
        }

        info!(
            "event=notes_reload module=store status=ok rows={} notes={} skipped={}",
            row_count,
            notes.len(),
            skipped
        );

        self.notes = notes;
        self.unsaved.clear();
        self.moved_from.clear();
        Ok(self.notes.len())
    }

    /// Adds a note and persists it.
    ///
    /// Returns `Ok(false)` without touching anything when `alias` is empty.
    /// Creating onto an existing key overwrites that note.
    pub fn create_note(
        &mut self,
        key: NoteKey,
        alias: impl Into<String>,
        text: impl Into<String>,
    ) -> StoreResult<bool> {
        let alias = alias.into();
        if alias.is_empty() {
            debug!("event=note_create module=store status=skip reason=empty_alias");
            return Ok(false);
        }

        let note = Note { alias, text: text.into() };
        let row = NoteRow::from_note(&key, &note);
        let replaced = self.notes.insert(key.clone(), note).is_some();

        // A pending move may have left a stale row under this key; overwrite it.
        let pending = self.moved_from.len();
        self.moved_from.retain(|_, origin| *origin != key);
        let reclaimed = self.moved_from.len() != pending;

        let persisted = if replaced || reclaimed {
            self.gateway.upsert(&row)
        } else {
            self.gateway.insert(&row)
        };

        if let Err(err) = persisted {
            self.unsaved.insert(key);
            return Err(StoreError::persistence(Operation::Insert, err));
        }

        self.unsaved.remove(&key);
        info!("event=note_create module=store status=ok key={key} replaced={replaced}");
        Ok(true)
    }

    pub fn note(&self, key: &NoteKey) -> Option<&Note> {
        self.notes.get(key)
    }

    pub fn contains(&self, key: &NoteKey) -> bool {
        self.notes.contains_key(key)
    }

    /// Replaces a note's text. Unknown keys are a silent no-op (`Ok(false)`).
    pub fn update_note_text(
        &mut self,
        key: &NoteKey,
        text: impl Into<String>,
    ) -> StoreResult<bool> {
        let Some(note) = self.notes.get_mut(key) else {
            debug!("event=note_update module=store status=skip reason=unknown_key key={key}");
            return Ok(false);
        };

        note.text = text.into();
        let row = NoteRow::from_note(key, note);

        let persisted = match self.settle_move(key) {
            Ok(()) => match self.gateway.update_text(key, &row.note) {
                Ok(0) => self.gateway.upsert(&row),
                Ok(_) => Ok(()),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };

        if let Err(err) = persisted {
            self.unsaved.insert(key.clone());
            return Err(StoreError::persistence(Operation::Update, err));
        }

        self.unsaved.remove(key);
        info!("event=note_update module=store status=ok key={key}");
        Ok(true)
    }

    /// Moves a note to a new anchor on the same page, in memory and in storage.
    ///
    /// Returns the new key, or `None` when `key` is unknown or the target
    /// anchor already holds another note.
    pub fn reposition_note(&mut self, key: &NoteKey, to: DocPoint) -> StoreResult<Option<NoteKey>> {
        if !self.notes.contains_key(key) {
            debug!("event=note_move module=store status=skip reason=unknown_key key={key}");
            return Ok(None);
        }

        let target = key.moved_to(to);
        if &target == key {
            return Ok(Some(target));
        }
        if self.notes.contains_key(&target) {
            debug!("event=note_move module=store status=skip reason=occupied key={target}");
            return Ok(None);
        }

        let Some(note) = self.notes.remove(key) else {
            return Ok(None);
        };
        let row = NoteRow::from_note(&target, &note);
        self.notes.insert(target.clone(), note);
        let was_unsaved = self.unsaved.remove(key);
        let origin = self.moved_from.remove(key).unwrap_or_else(|| key.clone());

        let persisted = match self.gateway.reposition(&origin, &target) {
            Ok(0) => self.gateway.upsert(&row),
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        };

        if let Err(err) = persisted {
            self.moved_from.insert(target.clone(), origin);
            self.unsaved.insert(target);
            return Err(StoreError::persistence(Operation::Reposition, err));
        }

        if was_unsaved {
            // The row now exists under the new key but may carry stale text.
            if let Err(err) = self.gateway.upsert(&row) {
                self.unsaved.insert(target);
                return Err(StoreError::persistence(Operation::Reposition, err));
            }
        }

        info!("event=note_move module=store status=ok from={key} to={target}");
        Ok(Some(target))
    }

    /// Writes every note through an upsert. Repeated calls never duplicate rows.
    ///
    /// All notes are attempted; the first failure is returned after the pass.
    pub fn save_all(&mut self) -> StoreResult<usize> {
        let mut first_error = None;

        let pending: Vec<NoteKey> = self.moved_from.keys().cloned().collect();
        for key in &pending {
            if let Err(err) = self.settle_move(key) {
                first_error.get_or_insert(err);
            }
        }

        let mut keys: Vec<&NoteKey> =
            self.notes.keys().filter(|key| !self.moved_from.contains_key(*key)).collect();
        keys.sort();

        let mut saved = Vec::with_capacity(keys.len());

        for key in keys {
            let row = NoteRow::from_note(key, &self.notes[key]);
            match self.gateway.upsert(&row) {
                Ok(()) => saved.push(key.clone()),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        let count = saved.len();
        for key in &saved {
            self.unsaved.remove(key);
        }

        match first_error {
            Some(err) => Err(StoreError::persistence(Operation::Save, err)),
            None => {
                info!("event=notes_save module=store status=ok notes={count}");
                Ok(count)
            }
        }
    }

    /// Notes anchored on one page of one file, ordered by key.
    pub fn notes_for(&self, file_name: &str, page: u32) -> Vec<(&NoteKey, &Note)> {
        let mut notes: Vec<_> =
            self.notes.iter().filter(|(key, _)| key.is_on(file_name, page)).collect();
        notes.sort_by(|a, b| a.0.cmp(b.0));
        notes
    }

    /// Notes on every page of one file, ordered by page then anchor.
    pub fn notes_for_file(&self, file_name: &str) -> Vec<(&NoteKey, &Note)> {
        let mut notes: Vec<_> =
            self.notes.iter().filter(|(key, _)| key.file_name == file_name).collect();
        notes.sort_by(|a, b| a.0.cmp(b.0));
        notes
    }

    pub fn files(&self) -> BTreeSet<&str> {
        self.notes.keys().map(|key| key.file_name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn is_unsaved(&self, key: &NoteKey) -> bool {
        self.unsaved.contains(key)
    }

    pub fn unsaved_count(&self) -> usize {
        self.unsaved.len()
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Moves the stored row of `key` out from under a key it was repositioned
    /// away from while the gateway was failing.
    fn settle_move(&mut self, key: &NoteKey) -> Result<(), GatewayError> {
        let Some(origin) = self.moved_from.get(key) else {
            return Ok(());
        };
        self.gateway.reposition(origin, key)?;
        debug!("event=note_move module=store status=replayed from={origin} to={key}");
        self.moved_from.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    fn key(file: &str, page: u32, x: f64, y: f64) -> NoteKey {
        NoteKey::new(file, page, DocPoint::new(x, y))
    }

    fn store() -> NoteStore<MemoryGateway> {
        NoteStore::new(MemoryGateway::new())
    }

    #[test]
    fn created_note_reads_back_exactly() {
        let mut store = store();
        let k = key("report.pdf", 0, 120.0, 80.0);

        assert!(store.create_note(k.clone(), "A1", "first point").expect("create should work"));

        assert_eq!(store.note(&k), Some(&Note::new("A1", "first point")));
        assert_eq!(store.gateway().rows().len(), 1);
    }

    #[test]
    fn second_key_leaves_first_untouched() {
        let mut store = store();
        let k1 = key("report.pdf", 0, 120.0, 80.0);
        let k2 = key("report.pdf", 0, 121.0, 80.0);

        store.create_note(k1.clone(), "A1", "one").expect("create should work");
        store.create_note(k2.clone(), "A2", "two").expect("create should work");

        assert_eq!(store.note(&k1), Some(&Note::new("A1", "one")));
        assert_eq!(store.note(&k2), Some(&Note::new("A2", "two")));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn empty_alias_is_rejected_without_mutation() {
        let mut store = store();
        let created = store.create_note(key("a.pdf", 0, 1.0, 1.0), "", "text").expect("no error");

        assert!(!created);
        assert!(store.is_empty());
        assert!(store.gateway().rows().is_empty());
    }

    #[test]
    fn recreating_a_key_overwrites_without_duplicate_row() {
        let mut store = store();
        let k = key("a.pdf", 0, 1.0, 1.0);

        store.create_note(k.clone(), "old", "old").expect("create should work");
        store.create_note(k.clone(), "new", "new").expect("create should work");

        assert_eq!(store.note(&k), Some(&Note::new("new", "new")));
        assert_eq!(store.gateway().rows().len(), 1);
    }

    #[test]
    fn update_unknown_key_is_silent_noop() {
        let mut store = store();
        let updated =
            store.update_note_text(&key("a.pdf", 0, 1.0, 1.0), "text").expect("must not raise");

        assert!(!updated);
        assert!(store.is_empty());
    }

    #[test]
    fn update_changes_memory_and_row() {
        let mut store = store();
        let k = key("a.pdf", 1, 3.5, 4.5);
        store.create_note(k.clone(), "A", "before").expect("create should work");

        assert!(store.update_note_text(&k, "after").expect("update should work"));

        assert_eq!(store.note(&k).map(|n| n.text.as_str()), Some("after"));
        assert_eq!(store.gateway().rows()[0].note, "after");
    }

    #[test]
    fn reload_after_create_contains_note_once() {
        let mut store = store();
        let k = key("report.pdf", 0, 120.0, 80.0);
        store.create_note(k.clone(), "A1", "first point").expect("create should work");

        store.reload_all().expect("reload should work");

        assert_eq!(store.len(), 1);
        assert_eq!(store.notes_for("report.pdf", 0).len(), 1);
        assert_eq!(store.note(&k), Some(&Note::new("A1", "first point")));
    }

    #[test]
    fn reload_is_global_across_files() {
        let rows = vec![
            NoteRow::from_note(&key("a.pdf", 0, 1.0, 1.0), &Note::new("a", "a")),
            NoteRow::from_note(&key("b.pdf", 3, 2.0, 2.0), &Note::new("b", "b")),
        ];
        let mut store = NoteStore::new(MemoryGateway::with_rows(rows));

        assert_eq!(store.reload_all().expect("reload should work"), 2);
        assert_eq!(store.files().into_iter().collect::<Vec<_>>(), vec!["a.pdf", "b.pdf"]);
        assert!(store.notes_for("a.pdf", 3).is_empty());
        assert_eq!(store.notes_for("b.pdf", 3).len(), 1);
    }

    #[test]
    fn reload_collapses_legacy_duplicate_rows() {
        let k = key("a.pdf", 0, 1.0, 1.0);
        let rows = vec![
            NoteRow::from_note(&k, &Note::new("a", "old")),
            NoteRow::from_note(&k, &Note::new("a", "new")),
        ];
        let mut store = NoteStore::new(MemoryGateway::with_rows(rows));

        assert_eq!(store.reload_all().expect("reload should work"), 1);
        assert_eq!(store.note(&k).map(|n| n.text.as_str()), Some("new"));
    }

    // Not append-only: saving twice must not duplicate rows.
    #[test]
    fn save_all_is_idempotent_upsert() {
        let mut store = store();
        store.create_note(key("a.pdf", 0, 1.0, 1.0), "a", "a").expect("create should work");
        store.create_note(key("a.pdf", 0, 2.0, 1.0), "b", "b").expect("create should work");

        assert_eq!(store.save_all().expect("save should work"), 2);
        assert_eq!(store.save_all().expect("save should work"), 2);

        assert_eq!(store.gateway().rows().len(), 2);
    }

    #[test]
    fn failed_write_keeps_memory_and_marks_unsaved() {
        let mut store = store();
        store.gateway_mut().set_offline(true);
        let k = key("a.pdf", 0, 1.0, 1.0);

        let err = store.create_note(k.clone(), "a", "a").expect_err("offline create should fail");
        assert!(matches!(err, StoreError::Persistence { operation: Operation::Insert, .. }));
        assert_eq!(store.note(&k), Some(&Note::new("a", "a")));
        assert!(store.is_unsaved(&k));

        store.gateway_mut().set_offline(false);
        store.save_all().expect("save should work once online");
        assert_eq!(store.unsaved_count(), 0);
        assert_eq!(store.gateway().rows().len(), 1);
    }

    #[test]
    fn move_lost_offline_is_replayed_on_save() {
        let mut store = store();
        let from = key("a.pdf", 0, 10.0, 10.0);
        store.create_note(from.clone(), "a", "body").expect("create should work");

        store.gateway_mut().set_offline(true);
        store
            .reposition_note(&from, DocPoint::new(15.0, 12.5))
            .expect_err("offline move should fail");
        let to = key("a.pdf", 0, 15.0, 12.5);
        assert!(store.contains(&to));
        assert!(store.is_unsaved(&to));

        store.gateway_mut().set_offline(false);
        store.save_all().expect("save should work once online");
        assert_eq!(store.gateway().rows().len(), 1);

        assert_eq!(store.reload_all().expect("reload should work"), 1);
        assert_eq!(store.note(&to), Some(&Note::new("a", "body")));
        assert!(!store.contains(&from));
    }

    #[test]
    fn text_edit_after_lost_move_keeps_one_row() {
        let mut store = store();
        let from = key("a.pdf", 0, 1.0, 1.0);
        store.create_note(from.clone(), "a", "old").expect("create should work");

        store.gateway_mut().set_offline(true);
        store
            .reposition_note(&from, DocPoint::new(2.0, 2.0))
            .expect_err("offline move should fail");
        store.gateway_mut().set_offline(false);

        let to = key("a.pdf", 0, 2.0, 2.0);
        assert!(store.update_note_text(&to, "new").expect("update should work"));

        assert_eq!(store.reload_all().expect("reload should work"), 1);
        assert_eq!(store.note(&to).map(|n| n.text.as_str()), Some("new"));
    }

    #[test]
    fn note_created_on_vacated_key_replaces_stale_row() {
        let mut store = store();
        let first = key("a.pdf", 0, 1.0, 1.0);
        store.create_note(first.clone(), "a", "moved").expect("create should work");

        store.gateway_mut().set_offline(true);
        store
            .reposition_note(&first, DocPoint::new(3.0, 3.0))
            .expect_err("offline move should fail");
        store.gateway_mut().set_offline(false);

        store.create_note(first.clone(), "b", "new here").expect("create should work");
        store.save_all().expect("save should work");

        assert_eq!(store.reload_all().expect("reload should work"), 2);
        assert_eq!(store.note(&first), Some(&Note::new("b", "new here")));
        assert_eq!(store.note(&key("a.pdf", 0, 3.0, 3.0)), Some(&Note::new("a", "moved")));
    }

    #[test]
    fn failed_reload_keeps_current_notes() {
        let mut store = store();
        store.create_note(key("a.pdf", 0, 1.0, 1.0), "a", "a").expect("create should work");
        store.gateway_mut().set_offline(true);

        assert!(store.reload_all().is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reposition_moves_key_in_memory_and_storage() {
        let mut store = store();
        let k = key("a.pdf", 0, 10.0, 10.0);
        store.create_note(k.clone(), "a", "body").expect("create should work");

        let moved = store
            .reposition_note(&k, DocPoint::new(15.0, 12.5))
            .expect("reposition should work")
            .expect("note should move");

        assert_eq!(moved, key("a.pdf", 0, 15.0, 12.5));
        assert!(!store.contains(&k));
        assert_eq!(store.note(&moved), Some(&Note::new("a", "body")));

        store.reload_all().expect("reload should work");
        assert_eq!(store.len(), 1);
        assert!(store.contains(&moved));
    }

    #[test]
    fn reposition_onto_occupied_anchor_is_refused() {
        let mut store = store();
        let k1 = key("a.pdf", 0, 10.0, 10.0);
        let k2 = key("a.pdf", 0, 20.0, 20.0);
        store.create_note(k1.clone(), "a", "a").expect("create should work");
        store.create_note(k2.clone(), "b", "b").expect("create should work");

        let moved = store.reposition_note(&k1, DocPoint::new(20.0, 20.0)).expect("no error");

        assert!(moved.is_none());
        assert_eq!(store.note(&k1), Some(&Note::new("a", "a")));
        assert_eq!(store.note(&k2), Some(&Note::new("b", "b")));
    }

    #[test]
    fn notes_for_scopes_by_file_and_page() {
        let mut store = store();
        store.create_note(key("a.pdf", 0, 1.0, 1.0), "a0", "x").expect("create should work");
        store.create_note(key("a.pdf", 1, 1.0, 1.0), "a1", "x").expect("create should work");
        store.create_note(key("b.pdf", 0, 1.0, 1.0), "b0", "x").expect("create should work");

        let aliases: Vec<_> =
            store.notes_for("a.pdf", 0).into_iter().map(|(_, n)| n.alias.as_str()).collect();
        assert_eq!(aliases, vec!["a0"]);
        assert_eq!(store.notes_for_file("a.pdf").len(), 2);
    }
}
