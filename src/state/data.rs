/// Shared data structures for the timeline
///
/// These structs represent the data model that flows between
/// the catalog layer and the timeline core.
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::path::PathBuf;

/// Photo or video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Column value used by the catalog
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single photo or video in the timeline
///
/// Immutable once loaded; the path is the unique id.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub path: PathBuf,
    /// Local capture time (EXIF DateTimeOriginal, or file mtime)
    pub captured_at: NaiveDateTime,
    pub kind: MediaKind,
    pub width: u32,
    pub height: u32,
}

impl MediaRecord {
    pub fn new(path: impl Into<PathBuf>, captured_at: NaiveDateTime, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            captured_at,
            kind,
            width: 0,
            height: 0,
        }
    }

    /// The calendar day this record is grouped under
    pub fn day(&self) -> NaiveDate {
        self.captured_at.date()
    }
}

/// Query criteria handed to the catalog
///
/// Every field narrows the result; the default matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaFilter {
    /// Inclusive lower bound on the capture day
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the capture day
    pub to: Option<NaiveDate>,
    /// Only media below this folder
    pub folder: Option<PathBuf>,
    pub person: Option<String>,
    pub tag: Option<String>,
    pub kind: Option<MediaKind>,
}
