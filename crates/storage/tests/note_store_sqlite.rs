use doc_model::{DocPoint, Note, NoteGateway, NoteKey, NoteStore};
use rusqlite::Connection;
use storage::{latest_schema_version, Settings, SqliteNoteGateway, Storage};

fn key(file: &str, page: u32, x: f64, y: f64) -> NoteKey {
    NoteKey::new(file, page, DocPoint::new(x, y))
}

#[test]
fn notes_survive_reopening_the_database() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let db_path = temp.path().join("notes.db");
    let k = key("report.pdf", 0, 120.0, 80.0);

    {
        let gateway = SqliteNoteGateway::open(&db_path).expect("db should open");
        let mut store = NoteStore::new(gateway);
        store.create_note(k.clone(), "A1", "first point").expect("create should work");
        store.update_note_text(&k, "edited").expect("update should work");
    }

    let gateway = SqliteNoteGateway::open(&db_path).expect("db should reopen");
    let mut store = NoteStore::new(gateway);
    assert_eq!(store.reload_all().expect("reload should work"), 1);
    assert_eq!(store.note(&k), Some(&Note::new("A1", "edited")));
}

#[test]
fn repeated_save_does_not_duplicate_rows() {
    let gateway = SqliteNoteGateway::open_in_memory().expect("db should open");
    let mut store = NoteStore::new(gateway);
    store.create_note(key("a.pdf", 0, 1.0, 2.0), "a", "a").expect("create should work");
    store.create_note(key("a.pdf", 2, 3.0, 4.0), "b", "b").expect("create should work");

    for _ in 0..3 {
        store.save_all().expect("save should work");
    }

    assert_eq!(store.gateway().row_count().expect("count should work"), 2);
}

#[test]
fn legacy_database_without_version_is_upgraded_in_place() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let db_path = temp.path().join("pdf_notes.db");

    {
        let conn = Connection::open(&db_path).expect("raw db should open");
        conn.execute_batch(
            "CREATE TABLE notes (
                id INTEGER PRIMARY KEY,
                file_name TEXT,
                page_num INTEGER,
                x REAL,
                y REAL,
                alias TEXT,
                note TEXT
            );
            INSERT INTO notes (file_name, page_num, x, y, alias, note)
            VALUES ('old.pdf', 1, 45.45454545454545, 18.181818181818183, 'L', 'legacy');
            INSERT INTO notes (file_name, page_num, x, y, alias, note)
            VALUES ('old.pdf', 1, 45.45454545454545, 18.181818181818183, 'L', 'legacy');",
        )
        .expect("legacy schema should be created");
    }

    let gateway = SqliteNoteGateway::open(&db_path).expect("legacy db should open");
    assert_eq!(gateway.schema_version().expect("version should read"), latest_schema_version());

    let mut store = NoteStore::new(gateway);
    assert_eq!(store.reload_all().expect("reload should work"), 1);

    let (legacy_key, _) = store.notes_for("old.pdf", 1)[0];
    let legacy_key = legacy_key.clone();
    store.update_note_text(&legacy_key, "touched").expect("update should work");

    let rows = store.gateway_mut().fetch_all().expect("fetch should work");
    assert!(rows.iter().all(|row| row.note == "touched"));
}

#[test]
fn database_newer_than_binary_is_refused() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let db_path = temp.path().join("future.db");
    {
        let conn = Connection::open(&db_path).expect("raw db should open");
        conn.execute_batch("PRAGMA user_version = 99;").expect("version should be set");
    }

    let err = SqliteNoteGateway::open(&db_path).err().expect("future schema should be refused");
    assert!(err.to_string().contains("newer than supported"));
}

#[test]
fn storage_opens_database_named_in_settings() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let storage = Storage::with_root(temp.path().join("nested"));

    let mut gateway = storage.open_notes(&Settings::default()).expect("db should open");
    assert!(gateway.fetch_all().expect("fetch should work").is_empty());
    assert!(temp.path().join("nested").join("pdf_notes.db").exists());
}
