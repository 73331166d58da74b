/// Folder import
///
/// Walks a folder tree, classifies photos and videos by extension, reads
/// the capture time and adds everything to the catalog.
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use exif::{In, Tag, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::codec::{is_raw, read_exif};
use crate::error::Result;
use crate::state::data::{MediaKind, MediaRecord};
use crate::state::library::Library;

const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff", "avif",
];

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "webm", "3gp", "mts"];

/// Result of a folder import operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportResult {
    pub imported_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
}

/// Photo, video, or neither, judged by extension
pub fn classify(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    if PHOTO_EXTENSIONS.contains(&ext.as_str()) || is_raw(path) {
        Some(MediaKind::Photo)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Import every photo and video below `folder` into the catalog at `db_path`
///
/// Runs on the blocking pool: the catalog connection is opened on that
/// thread since `rusqlite::Connection` is not `Send`.
pub async fn import_folder_async(folder: PathBuf, db_path: PathBuf) -> ImportResult {
    let result = tokio::task::spawn_blocking(move || {
        let library = Library::open(&db_path)?;
        Ok::<_, crate::error::TimelineError>(import_folder(&library, &folder))
    })
    .await;

    match result {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            log::error!("Import failed: {}", e);
            ImportResult::default()
        }
        Err(e) => {
            log::error!("Import task panicked: {}", e);
            ImportResult::default()
        }
    }
}

/// Blocking implementation of the folder import
pub fn import_folder(library: &Library, folder: &Path) -> ImportResult {
    let mut result = ImportResult::default();
    log::info!("Scanning folder: {}", folder.display());

    for entry in WalkDir::new(folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(kind) = classify(path) else {
            continue;
        };

        let record = match read_record(path, kind) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Cannot read {}: {}", path.display(), e);
                result.failed_count += 1;
                continue;
            }
        };

        match library.insert_media(&record) {
            Ok(true) => {
                result.imported_count += 1;
                if result.imported_count % 100 == 0 {
                    log::info!("Imported {} files...", result.imported_count);
                }
            }
            Ok(false) => result.skipped_count += 1,
            Err(e) => {
                log::warn!("Error importing {}: {}", path.display(), e);
                result.failed_count += 1;
            }
        }
    }

    log::info!(
        "Import complete: {} new, {} skipped, {} failed",
        result.imported_count,
        result.skipped_count,
        result.failed_count
    );
    result
}

/// Build the catalog record for one file
pub fn read_record(path: &Path, kind: MediaKind) -> Result<MediaRecord> {
    let exif = match kind {
        MediaKind::Photo => read_exif(path),
        MediaKind::Video => None,
    };

    let captured_at = match exif.as_ref().and_then(exif_capture_time) {
        Some(captured_at) => captured_at,
        None => modified_time(path)?,
    };

    let (width, height) = match kind {
        MediaKind::Photo if !is_raw(path) => image::image_dimensions(path).unwrap_or((0, 0)),
        _ => (0, 0),
    };

    Ok(MediaRecord {
        path: path.to_path_buf(),
        captured_at,
        kind,
        width,
        height,
    })
}

/// DateTimeOriginal, falling back to DateTimeDigitized
pub fn exif_capture_time(exif: &exif::Exif) -> Option<NaiveDateTime> {
    parse_exif_datetime_tag(exif, Tag::DateTimeOriginal)
        .or_else(|| parse_exif_datetime_tag(exif, Tag::DateTimeDigitized))
}

fn parse_exif_datetime_tag(exif: &exif::Exif, tag: Tag) -> Option<NaiveDateTime> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Ascii(ref vec) = field.value else {
        return None;
    };
    let dt = exif::DateTime::from_ascii(vec.first()?).ok()?;
    let date = NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?;
    let time = NaiveTime::from_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)?;
    Some(NaiveDateTime::new(date, time))
}

/// File modification time in local time
fn modified_time(path: &Path) -> Result<NaiveDateTime> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).naive_local())
}
