use chrono::{NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, Result as SqlResult, ToSql};
use std::path::{Path, PathBuf};

use super::data::{MediaFilter, MediaKind, MediaRecord};
use crate::error::Result;
use crate::timeline::MediaSource;

/// The Library manages the SQLite media catalog.
/// It stores one row per photo or video plus the tags and people attached
/// to them. The timeline only ever reads it through [`MediaSource`].
pub struct Library {
    conn: Connection,
    db_path: PathBuf,
}

impl Library {
    /// Open (or create) the catalog in the user's data directory:
    /// - Linux: ~/.local/share/photo-timeline/catalog.db
    /// - macOS: ~/Library/Application Support/photo-timeline/catalog.db
    /// - Windows: %APPDATA%\photo-timeline\catalog.db
    pub fn new() -> Result<Self> {
        let db_path = Self::default_db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(&db_path)
    }

    /// Open the catalog at an explicit path
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        log::info!("Catalog opened at {}", db_path.display());

        let library = Library {
            conn,
            db_path: db_path.to_path_buf(),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Catalog that lives only as long as this value
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let library = Library {
            conn: Connection::open_in_memory()?,
            db_path: PathBuf::from(":memory:"),
        };
        library.init_schema()?;
        Ok(library)
    }

    fn default_db_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        path.push("photo-timeline");
        path.push("catalog.db");
        path
    }

    /// Create all tables and indexes if they don't exist
    fn init_schema(&self) -> SqlResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS media (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                path            TEXT NOT NULL UNIQUE,
                filename        TEXT NOT NULL,
                folder          TEXT NOT NULL,
                kind            TEXT NOT NULL,
                captured_at     TEXT NOT NULL,
                width           INTEGER NOT NULL DEFAULT 0,
                height          INTEGER NOT NULL DEFAULT 0,
                imported_at     INTEGER NOT NULL,
                file_status     TEXT NOT NULL DEFAULT 'exists'
            );
            CREATE TABLE IF NOT EXISTS media_tags (
                media_id        INTEGER NOT NULL,
                tag             TEXT NOT NULL,
                PRIMARY KEY (media_id, tag),
                FOREIGN KEY(media_id) REFERENCES media(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS media_people (
                media_id        INTEGER NOT NULL,
                person          TEXT NOT NULL,
                PRIMARY KEY (media_id, person),
                FOREIGN KEY(media_id) REFERENCES media(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_media_captured_at
                ON media(captured_at DESC);",
        )?;

        log::debug!("Catalog schema initialized");
        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Number of media rows, deleted files included
    pub fn media_count(&self) -> SqlResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))
    }

    /// Add a record to the catalog
    ///
    /// Returns `Ok(false)` when the path is already catalogued.
    pub fn insert_media(&self, record: &MediaRecord) -> SqlResult<bool> {
        let path_str = record.path.to_string_lossy().to_string();
        let filename = record
            .path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let folder = record
            .path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();

        let result = self.conn.execute(
            "INSERT INTO media (path, filename, folder, kind, captured_at, width, height, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                path_str,
                filename,
                folder,
                record.kind.as_str(),
                record.captured_at,
                record.width,
                record.height,
                Utc::now().timestamp(),
            ],
        );

        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    #[cfg(test)]
    pub fn add_tag(&self, path: &Path, tag: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO media_tags (media_id, tag)
             SELECT id, ?2 FROM media WHERE path = ?1",
            params![path.to_string_lossy(), tag],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn add_person(&self, path: &Path, person: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO media_people (media_id, person)
             SELECT id, ?2 FROM media WHERE path = ?1",
            params![path.to_string_lossy(), person],
        )?;
        Ok(())
    }

    /// Records matching `filter`, newest first
    pub fn query_media(&self, filter: &MediaFilter) -> SqlResult<Vec<MediaRecord>> {
        let mut sql = String::from(
            "SELECT path, captured_at, kind, width, height FROM media WHERE file_status = 'exists'",
        );
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(from) = filter.from {
            values.push(Box::new(from.and_hms_opt(0, 0, 0).unwrap_or_default()));
            sql.push_str(&format!(" AND captured_at >= ?{}", values.len()));
        }
        if let Some(next_day) = filter.to.and_then(|to| to.succ_opt()) {
            values.push(Box::new(next_day.and_hms_opt(0, 0, 0).unwrap_or_default()));
            sql.push_str(&format!(" AND captured_at < ?{}", values.len()));
        }
        if let Some(folder) = &filter.folder {
            let prefix = folder_prefix(folder);
            values.push(Box::new(prefix.chars().count() as i64));
            values.push(Box::new(prefix));
            sql.push_str(&format!(
                " AND substr(path, 1, ?{}) = ?{}",
                values.len() - 1,
                values.len()
            ));
        }
        if let Some(person) = &filter.person {
            values.push(Box::new(person.clone()));
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM media_people p WHERE p.media_id = media.id AND p.person = ?{})",
                values.len()
            ));
        }
        if let Some(tag) = &filter.tag {
            values.push(Box::new(tag.clone()));
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM media_tags t WHERE t.media_id = media.id AND t.tag = ?{})",
                values.len()
            ));
        }
        if let Some(kind) = filter.kind {
            values.push(Box::new(kind.as_str()));
            sql.push_str(&format!(" AND kind = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY captured_at DESC, path ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
            let path: String = row.get(0)?;
            let captured_at: NaiveDateTime = row.get(1)?;
            let kind: String = row.get(2)?;
            let kind = MediaKind::from_str(&kind)
                .ok_or_else(|| rusqlite::Error::InvalidColumnType(2, "kind".into(), Type::Text))?;
            Ok(MediaRecord {
                path: PathBuf::from(path),
                captured_at,
                kind,
                width: row.get(3)?,
                height: row.get(4)?,
            })
        })?;

        let records = rows.collect::<SqlResult<Vec<_>>>()?;
        Ok(records)
    }

    /// Verify that media files still exist on disk
    /// Mark as 'deleted' if file is missing so the timeline stops listing them
    pub fn verify_files(&self) -> SqlResult<usize> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, path FROM media WHERE file_status = 'exists'")?;

        let existing: Vec<(i64, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();

        let mut deleted_count = 0;
        for (id, file_path) in existing {
            if !Path::new(&file_path).exists() {
                self.conn.execute(
                    "UPDATE media SET file_status = 'deleted' WHERE id = ?1",
                    params![id],
                )?;
                deleted_count += 1;
            }
        }

        if deleted_count > 0 {
            log::warn!("Marked {} missing files as deleted", deleted_count);
        }

        Ok(deleted_count)
    }
}

impl MediaSource for Library {
    fn query(&self, filter: &MediaFilter) -> Result<Vec<MediaRecord>> {
        Ok(self.query_media(filter)?)
    }
}

/// Folder path with a trailing separator so `/a/b` does not match `/a/bc`
fn folder_prefix(folder: &Path) -> String {
    let mut prefix = folder.to_string_lossy().to_string();
    if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
        prefix.push(std::path::MAIN_SEPARATOR);
    }
    prefix
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn seeded() -> Library {
        let library = Library::in_memory().unwrap();
        let records = [
            MediaRecord::new("/photos/2024/a.jpg", at(2024, 5, 1, 9), MediaKind::Photo),
            MediaRecord::new("/photos/2024/b.mp4", at(2024, 5, 2, 18), MediaKind::Video),
            MediaRecord::new("/photos/2024x/c.jpg", at(2024, 5, 3, 12), MediaKind::Photo),
            MediaRecord::new("/other/d.jpg", at(2023, 12, 31, 23), MediaKind::Photo),
        ];
        for record in &records {
            assert!(library.insert_media(record).unwrap());
        }
        library
    }

    fn paths(records: &[MediaRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.path.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_query_orders_newest_first() {
        let library = seeded();
        let all = library.query_media(&MediaFilter::default()).unwrap();
        assert_eq!(
            paths(&all),
            ["/photos/2024x/c.jpg", "/photos/2024/b.mp4", "/photos/2024/a.jpg", "/other/d.jpg"]
        );
        assert_eq!(all[1].kind, MediaKind::Video);
        assert_eq!(all[1].captured_at, at(2024, 5, 2, 18));
    }

    #[test]
    fn test_duplicate_insert_is_skipped() {
        let library = seeded();
        let again = MediaRecord::new("/photos/2024/a.jpg", at(2024, 5, 1, 9), MediaKind::Photo);
        assert!(!library.insert_media(&again).unwrap());
        assert_eq!(library.media_count().unwrap(), 4);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let library = seeded();
        let filter = MediaFilter {
            from: NaiveDate::from_ymd_opt(2024, 5, 1),
            to: NaiveDate::from_ymd_opt(2024, 5, 2),
            ..Default::default()
        };
        let found = library.query_media(&filter).unwrap();
        assert_eq!(paths(&found), ["/photos/2024/b.mp4", "/photos/2024/a.jpg"]);
    }

    #[test]
    fn test_folder_filter_does_not_match_sibling_prefix() {
        let library = seeded();
        let filter = MediaFilter {
            folder: Some(PathBuf::from("/photos/2024")),
            ..Default::default()
        };
        let found = library.query_media(&filter).unwrap();
        assert_eq!(paths(&found), ["/photos/2024/b.mp4", "/photos/2024/a.jpg"]);
    }

    #[test]
    fn test_tag_person_and_kind_filters() {
        let library = seeded();
        library.add_tag(Path::new("/photos/2024/a.jpg"), "beach").unwrap();
        library.add_person(Path::new("/other/d.jpg"), "Sam").unwrap();

        let tagged = library
            .query_media(&MediaFilter {
                tag: Some("beach".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(paths(&tagged), ["/photos/2024/a.jpg"]);

        let person = library
            .query_media(&MediaFilter {
                person: Some("Sam".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(paths(&person), ["/other/d.jpg"]);

        let videos = library
            .query_media(&MediaFilter {
                kind: Some(MediaKind::Video),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(paths(&videos), ["/photos/2024/b.mp4"]);
    }

    #[test]
    fn test_verify_files_hides_missing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.jpg");
        std::fs::write(&present, b"x").unwrap();

        let library = Library::in_memory().unwrap();
        library
            .insert_media(&MediaRecord::new(&present, at(2024, 1, 1, 0), MediaKind::Photo))
            .unwrap();
        library
            .insert_media(&MediaRecord::new(
                dir.path().join("gone.jpg"),
                at(2024, 1, 2, 0),
                MediaKind::Photo,
            ))
            .unwrap();

        assert_eq!(library.verify_files().unwrap(), 1);
        let remaining = library.query_media(&MediaFilter::default()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path, present);
    }
}
