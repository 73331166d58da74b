/// Photo and video frame decoding
///
/// The timeline only needs pixels: `MediaDecoder` is the seam between the
/// thumbnail workers and whatever turns a file into an image. `FileDecoder`
/// is the real implementation used by the application.
use exif::{In, Tag};
use image::metadata::Orientation;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::error::{Result, TimelineError};

/// RAW containers whose preview is an embedded JPEG (common formats)
pub const RAW_EXTENSIONS: &[&str] = &[
    "nef", "dng", "cr2", "cr3", "arw", "raf", "orf", "rw2", "pef", "srw", "erf", "kdc", "dcr",
    "mos", "raw", "rwl",
];

/// Embedded JPEGs smaller than this are the 160x120 EXIF thumbnails
const MIN_PREVIEW_PIXELS: u64 = 320 * 240;

/// Most cameras put a usable preview near the start of the file
const RAW_HEAD_BYTES: usize = 512 * 1024;

/// Decoded photo plus the orientation it must be displayed with
pub struct DecodedPhoto {
    pub image: DynamicImage,
    pub orientation: Orientation,
}

impl DecodedPhoto {
    /// Pixels rotated/flipped for display
    pub fn into_oriented(self) -> DynamicImage {
        let mut image = self.image;
        image.apply_orientation(self.orientation);
        image
    }
}

/// Turns media files into pixels. Called from worker threads
pub trait MediaDecoder: Send + Sync {
    fn decode_photo(&self, path: &Path) -> Result<DecodedPhoto>;

    /// A still frame `at` into the video
    fn decode_video_frame(&self, path: &Path, at: Duration) -> Result<DynamicImage>;
}

pub fn is_raw(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| RAW_EXTENSIONS.contains(&ext.as_str()))
}

/// Decoder backed by the `image` crate, embedded RAW previews and `ffmpeg`
#[derive(Debug, Clone)]
pub struct FileDecoder {
    /// Where extracted video frames are kept between runs
    frame_cache_dir: PathBuf,
    ffmpeg: PathBuf,
}

impl FileDecoder {
    pub fn new(frame_cache_dir: PathBuf) -> Self {
        Self {
            frame_cache_dir,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }

    /// Frames cached under ~/.cache/photo-timeline/video-frames on Linux
    pub fn with_default_cache() -> Self {
        let mut path = dirs::cache_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(std::env::temp_dir);
        path.push("photo-timeline");
        path.push("video-frames");
        Self::new(path)
    }

    /// Cached frame location for a video
    pub fn frame_path(&self, video: &Path, at: Duration) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        video.hash(&mut hasher);
        at.as_millis().hash(&mut hasher);
        self.frame_cache_dir
            .join(format!("{:016x}.jpg", hasher.finish()))
    }

    fn extract_frame(&self, video: &Path, at: Duration, out: &Path) -> Result<()> {
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }

        let status = Command::new(&self.ffmpeg)
            .arg("-ss")
            .arg(format!("{:.3}", at.as_secs_f64()))
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1", "-y", "-loglevel", "error"])
            .arg(out)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| TimelineError::decode(video, format!("cannot run ffmpeg: {e}")))?;

        if !status.success() || !out.exists() {
            return Err(TimelineError::decode(
                video,
                format!("ffmpeg exited with {status}"),
            ));
        }
        Ok(())
    }
}

impl MediaDecoder for FileDecoder {
    fn decode_photo(&self, path: &Path) -> Result<DecodedPhoto> {
        let image = if is_raw(path) {
            decode_raw_preview(path)?
        } else {
            ImageReader::open(path)?.with_guessed_format()?.decode()?
        };

        Ok(DecodedPhoto {
            image,
            orientation: read_orientation(path),
        })
    }

    fn decode_video_frame(&self, path: &Path, at: Duration) -> Result<DynamicImage> {
        if !path.exists() {
            return Err(TimelineError::decode(path, "file not found"));
        }

        let frame = self.frame_path(path, at);
        if !frame.exists() {
            self.extract_frame(path, at, &frame)?;
            log::debug!("Extracted frame {} -> {}", path.display(), frame.display());
        }
        Ok(image::open(&frame)?)
    }
}

/// Embedded preview of a RAW file: search the head first, then the whole file
fn decode_raw_preview(path: &Path) -> Result<DynamicImage> {
    let head = read_head(path, RAW_HEAD_BYTES)?;
    // A preview cut off by the head limit parses but fails to decode
    let from_head = extract_largest_jpeg(&head)
        .and_then(|jpeg| image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg).ok());
    if let Some(image) = from_head {
        return Ok(image);
    }
    if head.len() < RAW_HEAD_BYTES {
        return Err(TimelineError::decode(path, "no embedded preview"));
    }

    let data = fs::read(path)?;
    let jpeg = extract_largest_jpeg(&data)
        .ok_or_else(|| TimelineError::decode(path, "no embedded preview"))?;
    Ok(image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?)
}

/// EXIF orientation, or no transform when the file carries none
pub fn read_orientation(path: &Path) -> Orientation {
    read_exif(path)
        .and_then(|exif| {
            exif.get_field(Tag::Orientation, In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .and_then(|value| u8::try_from(value).ok())
        .and_then(Orientation::from_exif)
        .unwrap_or(Orientation::NoTransforms)
}

pub fn read_exif(path: &Path) -> Option<exif::Exif> {
    let file = fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    exif::Reader::new().read_from_container(&mut reader).ok()
}

/// Largest JPEG preview embedded in `data`
///
/// RAW files carry one or more JPEG previews; the one with the most pixels
/// is the closest to the sensor resolution. Only the headers are parsed
/// here. The returned slice runs to the end of `data`, the JPEG decoder stops
/// at the stream's own end marker.
pub fn extract_largest_jpeg(data: &[u8]) -> Option<&[u8]> {
    const SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];

    data.windows(SOI.len())
        .enumerate()
        .filter(|(_, window)| *window == SOI)
        .filter_map(|(pos, _)| {
            let stream = &data[pos..];
            let (width, height) = ImageReader::with_format(Cursor::new(stream), ImageFormat::Jpeg)
                .into_dimensions()
                .ok()?;
            Some((u64::from(width) * u64::from(height), stream))
        })
        .filter(|(pixels, _)| *pixels >= MIN_PREVIEW_PIXELS)
        .max_by_key(|(pixels, _)| *pixels)
        .map(|(_, stream)| stream)
}

/// Read the first `max_bytes` of a file; enough for most embedded previews
pub fn read_head(path: &Path, max_bytes: usize) -> Result<Vec<u8>> {
    let file = fs::File::open(path)?;
    let mut data = Vec::with_capacity(max_bytes);
    file.take(max_bytes as u64).read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 31 % 256) as u8, (y * 17 % 256) as u8, ((x ^ y) % 256) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_is_raw() {
        assert!(is_raw(Path::new("/a/DSC_0001.NEF")));
        assert!(is_raw(Path::new("b.dng")));
        assert!(!is_raw(Path::new("c.jpg")));
        assert!(!is_raw(Path::new("noext")));
    }

    #[test]
    fn test_extract_largest_jpeg_from_container() {
        let small = jpeg_bytes(64, 48);
        let large = jpeg_bytes(640, 480);

        let mut container = b"II*\0 fake raw header".to_vec();
        container.extend_from_slice(&small);
        container.extend_from_slice(&[0u8; 64]);
        container.extend_from_slice(&large);
        container.extend_from_slice(b"sensor data");

        let found = extract_largest_jpeg(&container).unwrap();
        let decoded = image::load_from_memory_with_format(found, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (640, 480));
    }

    #[test]
    fn test_extract_without_jpeg() {
        assert!(extract_largest_jpeg(b"nothing to see here").is_none());
    }

    #[test]
    fn test_decode_photo_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        RgbImage::from_pixel(40, 30, Rgb([1, 2, 3])).save(&path).unwrap();

        let decoder = FileDecoder::new(dir.path().join("frames"));
        let decoded = decoder.decode_photo(&path).unwrap();

        assert_eq!(decoded.image.width(), 40);
        assert_eq!(decoded.orientation, Orientation::NoTransforms);
    }

    #[test]
    fn test_missing_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = FileDecoder::new(dir.path().join("frames"));

        assert!(decoder.decode_photo(&dir.path().join("gone.jpg")).is_err());
        assert!(decoder
            .decode_video_frame(&dir.path().join("gone.mp4"), Duration::from_secs(1))
            .is_err());
    }

    #[test]
    fn test_oriented_rotates_dimensions() {
        let photo = DecodedPhoto {
            image: DynamicImage::ImageRgb8(RgbImage::new(40, 30)),
            orientation: Orientation::Rotate90,
        };
        let oriented = photo.into_oriented();
        assert_eq!((oriented.width(), oriented.height()), (30, 40));
    }

    #[test]
    fn test_read_head() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, vec![7u8; 1000]).unwrap();

        assert_eq!(read_head(&path, 100).unwrap().len(), 100);
        assert_eq!(read_head(&path, 5000).unwrap().len(), 1000);
    }
}
