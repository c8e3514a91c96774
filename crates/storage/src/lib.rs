use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod db;

pub use db::{latest_schema_version, SqliteNoteGateway};

const SETTINGS_SCHEMA_VERSION: u32 = 1;
const DEFAULT_DATABASE_FILE: &str = "pdf_notes.db";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion { db_version: u32, latest_supported: u32 },
}

/// User-editable settings, stored as `settings.json` under the data root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Note database. Relative paths resolve against the data root.
    pub database_file: PathBuf,
    pub initial_zoom: f64,
    pub start_in_edit_mode: bool,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_file: PathBuf::from(DEFAULT_DATABASE_FILE),
            initial_zoom: 1.0,
            start_in_edit_mode: true,
            log_level: "info".to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsEnvelope {
    version: u32,
    settings: Settings,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs =
            ProjectDirs::from("dev", "PdfNotes", "PdfNotes").ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_settings(&self) -> Result<Settings, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(Settings::default());
        }

        let bytes = fs::read(path)?;
        let envelope: SettingsEnvelope = serde_json::from_slice(&bytes)?;

        Ok(envelope.settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope =
            SettingsEnvelope { version: SETTINGS_SCHEMA_VERSION, settings: settings.clone() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.settings_path(), bytes)?;
        Ok(())
    }

    /// Absolute location of the note database named by `settings`.
    pub fn database_path(&self, settings: &Settings) -> PathBuf {
        if settings.database_file.is_absolute() {
            settings.database_file.clone()
        } else {
            self.root.join(&settings.database_file)
        }
    }

    /// Opens the note database named by `settings`, creating the data root if needed.
    pub fn open_notes(&self, settings: &Settings) -> Result<SqliteNoteGateway, StorageError> {
        let path = self.database_path(settings);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        SqliteNoteGateway::open(path)
    }

    fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        let settings = Settings {
            database_file: PathBuf::from("elsewhere.db"),
            initial_zoom: 1.5,
            start_in_edit_mode: false,
            log_level: "debug".to_owned(),
        };

        store.save_settings(&settings).expect("save should succeed");
        let loaded = store.load_settings().expect("load should succeed");

        assert_eq!(loaded, settings);
    }

    #[test]
    fn load_defaults_when_file_absent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        let loaded = store.load_settings().expect("load should succeed");
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        fs::write(
            temp.path().join("settings.json"),
            br#"{"version":1,"settings":{"initial_zoom":2.0}}"#,
        )
        .expect("settings should be written");

        let loaded = Storage::with_root(temp.path()).load_settings().expect("load should succeed");
        assert_eq!(loaded.initial_zoom, 2.0);
        assert_eq!(loaded.database_file, PathBuf::from(DEFAULT_DATABASE_FILE));
    }

    #[test]
    fn relative_database_resolves_under_root() {
        let store = Storage::with_root("/data/pdf-notes");
        let path = store.database_path(&Settings::default());
        assert_eq!(path, PathBuf::from("/data/pdf-notes/pdf_notes.db"));

        let absolute =
            Settings { database_file: PathBuf::from("/tmp/x.db"), ..Settings::default() };
        assert_eq!(store.database_path(&absolute), PathBuf::from("/tmp/x.db"));
    }
}
