//! SQLite note table.
//!
//! # Invariants
//! - Rows are matched by file, page and the anchor compared in integer
//!   micro-units, never by raw float equality.
//! - Connections are migrated before any note is read or written.

mod migrations;

use crate::StorageError;
use doc_model::{GatewayError, NoteGateway, NoteKey, NoteRow};
use log::{error, info};
use rusqlite::{named_params, params, Connection};
use std::path::Path;
use std::time::{Duration, Instant};

pub use migrations::latest_version as latest_schema_version;

const KEY_MATCH: &str = "file_name = :file_name
       AND page_num = :page_num
       AND CAST(ROUND(x * 1000000) AS INTEGER) = :x_micros
       AND CAST(ROUND(y * 1000000) AS INTEGER) = :y_micros";

pub struct SqliteNoteGateway {
    conn: Connection,
}

impl SqliteNoteGateway {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        Self::bootstrap("file", || Connection::open(path))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::bootstrap("memory", Connection::open_in_memory)
    }

    fn bootstrap(
        mode: &str,
        connect: impl FnOnce() -> rusqlite::Result<Connection>,
    ) -> Result<Self, StorageError> {
        let started_at = Instant::now();

        let result = connect().map_err(StorageError::from).and_then(|mut conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            migrations::apply_migrations(&mut conn)?;
            Ok(conn)
        });

        match result {
            Ok(conn) => {
                info!(
                    "event=db_open module=db status=ok mode={mode} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(Self { conn })
            }
            Err(err) => {
                error!(
                    "event=db_open module=db status=error mode={mode} duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    pub fn schema_version(&self) -> Result<u32, StorageError> {
        migrations::current_user_version(&self.conn)
    }

    pub fn row_count(&self) -> Result<usize, StorageError> {
        let count =
            self.conn.query_row("SELECT COUNT(*) FROM notes;", [], |row| row.get::<_, i64>(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn gateway_error(err: rusqlite::Error) -> GatewayError {
    GatewayError::new(err)
}

fn insert_row(conn: &Connection, row: &NoteRow) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO notes (file_name, page_num, x, y, alias, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![row.file_name, row.page_num, row.x, row.y, row.alias, row.note],
    )
}

impl NoteGateway for SqliteNoteGateway {
    fn fetch_all(&mut self) -> Result<Vec<NoteRow>, GatewayError> {
        let mut stmt = self
            .conn
            .prepare("SELECT file_name, page_num, x, y, alias, note FROM notes ORDER BY id;")
            .map_err(gateway_error)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(NoteRow {
                    file_name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    page_num: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                    x: row.get::<_, Option<f64>>(2)?.unwrap_or_default(),
                    y: row.get::<_, Option<f64>>(3)?.unwrap_or_default(),
                    alias: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    note: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                })
            })
            .map_err(gateway_error)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(gateway_error)
    }

    fn insert(&mut self, row: &NoteRow) -> Result<(), GatewayError> {
        insert_row(&self.conn, row).map_err(gateway_error)?;
        Ok(())
    }

    fn update_text(&mut self, key: &NoteKey, text: &str) -> Result<usize, GatewayError> {
        self.conn
            .execute(
                &format!("UPDATE notes SET note = :note WHERE {KEY_MATCH};"),
                named_params! {
                    ":note": text,
                    ":file_name": key.file_name,
                    ":page_num": i64::from(key.page),
                    ":x_micros": key.x.micros(),
                    ":y_micros": key.y.micros(),
                },
            )
            .map_err(gateway_error)
    }

    fn upsert(&mut self, row: &NoteRow) -> Result<(), GatewayError> {
        let Some((key, _)) = row.clone().into_note() else {
            return Err(GatewayError::new(format!("invalid page number {}", row.page_num)));
        };

        let tx = self.conn.transaction().map_err(gateway_error)?;
        let changed = tx
            .execute(
                &format!("UPDATE notes SET alias = :alias, note = :note WHERE {KEY_MATCH};"),
                named_params! {
                    ":alias": row.alias,
                    ":note": row.note,
                    ":file_name": key.file_name,
                    ":page_num": i64::from(key.page),
                    ":x_micros": key.x.micros(),
                    ":y_micros": key.y.micros(),
                },
            )
            .map_err(gateway_error)?;

        if changed == 0 {
            insert_row(&tx, row).map_err(gateway_error)?;
        }

        tx.commit().map_err(gateway_error)
    }

    fn reposition(&mut self, from: &NoteKey, to: &NoteKey) -> Result<usize, GatewayError> {
        self.conn
            .execute(
                &format!("UPDATE notes SET x = :new_x, y = :new_y WHERE {KEY_MATCH};"),
                named_params! {
                    ":new_x": to.x.points(),
                    ":new_y": to.y.points(),
                    ":file_name": from.file_name,
                    ":page_num": i64::from(from.page),
                    ":x_micros": from.x.micros(),
                    ":y_micros": from.y.micros(),
                },
            )
            .map_err(gateway_error)
    }
}
