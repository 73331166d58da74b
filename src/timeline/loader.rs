/// Background thumbnail decoding
///
/// Jobs run on a small fixed pool of blocking threads so a slow RAW or
/// video never stalls the UI. Workers never touch timeline state: each
/// finished job is pushed into one shared completion channel and the UI
/// thread drains it when it ticks.
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::cache::Thumbnail;
use super::renderer::ItemTarget;
use crate::error::{Result, TimelineError};
use crate::media::placeholder::{photo_placeholder, video_placeholder};
use crate::media::MediaDecoder;
use crate::state::data::MediaKind;

/// Where in a video the still frame is taken from
const VIDEO_FRAME_AT: Duration = Duration::from_secs(1);

/// Which cache a finished job belongs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailPurpose {
    Grid,
    Preview,
}

/// One decode attempt
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTask {
    pub path: PathBuf,
    pub size: u32,
    pub kind: MediaKind,
    /// Load session the request was made in
    pub generation: u64,
    /// Grid cell waiting for the result; lightbox requests have none
    pub target: Option<ItemTarget>,
    pub purpose: ThumbnailPurpose,
}

/// A finished job, as delivered to the UI thread
///
/// `thumbnail` is `None` when a photo failed and the placeholder policy is
/// off. The job still reports back so callers can forget the request.
#[derive(Debug, Clone)]
pub struct Completion {
    pub task: LoadTask,
    pub thumbnail: Option<Thumbnail>,
}

/// Counts one job in flight until dropped
///
/// Lives inside the job closure, so a job cancelled by shutdown before it
/// ever ran is uncounted too.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn start(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct AsyncThumbnailLoader {
    /// Blocking pool; `None` once shut down
    runtime: Option<Runtime>,
    decoder: Arc<dyn MediaDecoder>,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
    in_flight: Arc<AtomicUsize>,
    photo_failure_placeholder: bool,
    shutdown_timeout: Duration,
}

impl AsyncThumbnailLoader {
    pub fn new(
        decoder: Arc<dyn MediaDecoder>,
        workers: usize,
        photo_failure_placeholder: bool,
        shutdown_timeout: Duration,
    ) -> Result<Self> {
        // The runtime is only a blocking pool: nothing is ever spawned on
        // its scheduler, so the current-thread flavour is enough.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .max_blocking_threads(workers.max(1))
            .thread_name("thumbnail-decode")
            .build()?;
        let (tx, rx) = unbounded_channel();

        log::info!("Thumbnail loader started with {} workers", workers);

        Ok(Self {
            runtime: Some(runtime),
            decoder,
            tx,
            rx,
            in_flight: Arc::new(AtomicUsize::new(0)),
            photo_failure_placeholder,
            shutdown_timeout,
        })
    }

    /// Queue a decode job; never blocks
    pub fn submit(&self, task: LoadTask) -> Result<()> {
        let Some(runtime) = &self.runtime else {
            return Err(TimelineError::LoaderClosed);
        };

        let decoder = Arc::clone(&self.decoder);
        let tx = self.tx.clone();
        let photo_failure_placeholder = self.photo_failure_placeholder;
        let in_flight = InFlight::start(&self.in_flight);

        runtime.spawn_blocking(move || {
            // Sent before the guard drops, so an idle loader has nothing unsent
            let _in_flight = in_flight;
            let thumbnail = decode_task(decoder.as_ref(), &task, photo_failure_placeholder);
            // The receiver only goes away with the loader itself
            let _ = tx.send(Completion { task, thumbnail });
        });
        Ok(())
    }

    /// Next finished job, if any
    pub fn try_recv(&mut self) -> Option<Completion> {
        self.rx.try_recv().ok()
    }

    /// Every job finished since the last drain, in completion order
    pub fn drain(&mut self) -> Vec<Completion> {
        let mut completions = Vec::new();
        while let Some(completion) = self.try_recv() {
            completions.push(completion);
        }
        completions
    }

    /// Jobs submitted but not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether finished jobs are waiting to be drained
    pub fn has_completions(&self) -> bool {
        !self.rx.is_empty()
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    /// Stop accepting jobs and wait up to `timeout` for running ones
    ///
    /// Jobs still running after the timeout finish on detached threads;
    /// their results land in the channel and are ignored by the caller.
    /// Queued jobs that never started are dropped.
    pub fn shutdown(&mut self, timeout: Duration) {
        if let Some(runtime) = self.runtime.take() {
            log::info!(
                "Shutting down thumbnail loader ({} jobs in flight)",
                self.in_flight()
            );
            runtime.shutdown_timeout(timeout);
        }
    }

    /// Poll until every submitted job has finished
    #[cfg(test)]
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while self.in_flight() > 0 {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }
}

impl Drop for AsyncThumbnailLoader {
    fn drop(&mut self) {
        // Dropping a runtime waits for blocking jobs without limit
        self.shutdown(self.shutdown_timeout);
    }
}

/// Decode one job into a thumbnail, applying the failure policy
///
/// Videos always produce something; photos produce a placeholder only when
/// `photo_failure_placeholder` is set, otherwise the failure is logged and
/// reported without a thumbnail.
fn decode_task(
    decoder: &dyn MediaDecoder,
    task: &LoadTask,
    photo_failure_placeholder: bool,
) -> Option<Thumbnail> {
    let decoded = match task.kind {
        MediaKind::Photo => decoder
            .decode_photo(&task.path)
            .map(|photo| photo.into_oriented()),
        MediaKind::Video => decoder.decode_video_frame(&task.path, VIDEO_FRAME_AT),
    };

    match decoded {
        Ok(image) => {
            log::debug!("Decoded {} @{}", task.path.display(), task.size);
            Some(Thumbnail {
                image: Arc::new(fit_within(image, task.size)),
                placeholder: false,
            })
        }
        Err(e) => {
            log::warn!("Thumbnail failed for {}: {}", task.path.display(), e);
            let glyph = match task.kind {
                MediaKind::Video => video_placeholder(task.size),
                MediaKind::Photo if photo_failure_placeholder => photo_placeholder(task.size),
                MediaKind::Photo => return None,
            };
            Some(Thumbnail {
                image: Arc::new(glyph),
                placeholder: true,
            })
        }
    }
}

/// Downscale to fit a `size` x `size` box, keeping the aspect ratio
///
/// Images already inside the box are left at their own size.
pub fn fit_within(image: DynamicImage, size: u32) -> RgbaImage {
    if image.width() <= size && image.height() <= size {
        return image.into_rgba8();
    }
    image.resize(size, size, FilterType::Triangle).into_rgba8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimelineError;
    use crate::media::codec::DecodedPhoto;
    use crate::timeline::cache::ThumbnailCache;
    use image::metadata::Orientation;
    use image::Rgba;
    use std::path::Path;

    /// Photos named `missing*` fail, everything else is a 400x300 tile
    struct FakeDecoder {
        calls: AtomicUsize,
        first_call_delay: Duration,
    }

    impl FakeDecoder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                first_call_delay: Duration::ZERO,
            }
        }
    }

    impl MediaDecoder for FakeDecoder {
        fn decode_photo(&self, path: &Path) -> Result<DecodedPhoto> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if path.to_string_lossy().contains("missing") {
                return Err(TimelineError::decode(path, "file not found"));
            }
            let shade = if call == 0 {
                std::thread::sleep(self.first_call_delay);
                10
            } else {
                20
            };
            Ok(DecodedPhoto {
                image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(400, 300, Rgba([shade, 0, 0, 255]))),
                orientation: Orientation::NoTransforms,
            })
        }

        fn decode_video_frame(&self, path: &Path, _at: Duration) -> Result<DynamicImage> {
            Err(TimelineError::decode(path, "no ffmpeg in tests"))
        }
    }

    fn task(path: &str, kind: MediaKind) -> LoadTask {
        LoadTask {
            path: PathBuf::from(path),
            size: 200,
            kind,
            generation: 1,
            target: None,
            purpose: ThumbnailPurpose::Grid,
        }
    }

    fn loader(decoder: FakeDecoder, photo_placeholder: bool) -> AsyncThumbnailLoader {
        AsyncThumbnailLoader::new(Arc::new(decoder), 3, photo_placeholder, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_photo_is_downscaled_preserving_aspect() {
        let mut loader = loader(FakeDecoder::new(), true);
        assert!(loader.submit(task("/a.jpg", MediaKind::Photo)).is_ok());
        assert!(loader.wait_idle(Duration::from_secs(5)));

        let done = loader.drain();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].task.path, PathBuf::from("/a.jpg"));
        let thumbnail = done[0].thumbnail.as_ref().unwrap();
        assert_eq!(thumbnail.image.dimensions(), (200, 150));
        assert!(!thumbnail.placeholder);
    }

    #[test]
    fn test_failed_photo_reports_back_without_thumbnail() {
        let mut loader = loader(FakeDecoder::new(), false);
        loader.submit(task("/missing.jpg", MediaKind::Photo)).unwrap();
        assert!(loader.wait_idle(Duration::from_secs(5)));

        let done = loader.drain();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].task.path, PathBuf::from("/missing.jpg"));
        assert!(done[0].thumbnail.is_none());
    }

    #[test]
    fn test_failed_photo_gets_placeholder_by_default() {
        let mut loader = loader(FakeDecoder::new(), true);
        loader.submit(task("/missing.jpg", MediaKind::Photo)).unwrap();
        assert!(loader.wait_idle(Duration::from_secs(5)));

        let done = loader.drain();
        assert_eq!(done.len(), 1);
        assert!(done[0].thumbnail.as_ref().unwrap().placeholder);
    }

    #[test]
    fn test_failed_video_always_gets_placeholder() {
        let mut loader = loader(FakeDecoder::new(), false);
        loader.submit(task("/clip.mp4", MediaKind::Video)).unwrap();
        assert!(loader.wait_idle(Duration::from_secs(5)));

        let done = loader.drain();
        assert_eq!(done.len(), 1);
        let thumbnail = done[0].thumbnail.as_ref().unwrap();
        assert!(thumbnail.placeholder);
        assert_eq!(thumbnail.image.dimensions(), (200, 200));
    }

    #[test]
    fn test_results_fan_in_from_all_workers() {
        let mut loader = loader(FakeDecoder::new(), true);
        for i in 0..20 {
            loader.submit(task(&format!("/{i}.jpg"), MediaKind::Photo)).unwrap();
        }
        assert!(loader.wait_idle(Duration::from_secs(5)));

        let mut paths: Vec<PathBuf> = loader.drain().into_iter().map(|c| c.task.path).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 20);
    }

    #[test]
    fn test_duplicate_submission_last_completion_wins() {
        let decoder = FakeDecoder {
            calls: AtomicUsize::new(0),
            first_call_delay: Duration::from_millis(100),
        };
        let mut loader = loader(decoder, true);
        loader.submit(task("/a.jpg", MediaKind::Photo)).unwrap();
        loader.submit(task("/a.jpg", MediaKind::Photo)).unwrap();
        assert!(loader.wait_idle(Duration::from_secs(5)));

        let done = loader.drain();
        assert_eq!(done.len(), 2);

        let mut cache = ThumbnailCache::unbounded("grid");
        for completion in done {
            if let Some(thumbnail) = completion.thumbnail {
                cache.put(&completion.task.path, completion.task.size, thumbnail);
            }
        }
        assert_eq!(cache.len(), 1);
        // the delayed decode finished last, so its pixels are what remain
        let kept = cache.get(Path::new("/a.jpg"), 200).unwrap();
        assert_eq!(kept.image.get_pixel(0, 0)[0], 10);
    }

    #[test]
    fn test_submit_after_shutdown_is_refused() {
        let mut loader = loader(FakeDecoder::new(), true);
        loader.shutdown(Duration::from_secs(1));

        assert!(!loader.is_running());
        assert!(matches!(
            loader.submit(task("/a.jpg", MediaKind::Photo)),
            Err(TimelineError::LoaderClosed)
        ));
        assert_eq!(loader.in_flight(), 0);
    }

    #[test]
    fn test_completions_are_visible_once_idle() {
        let mut loader = loader(FakeDecoder::new(), true);
        loader.submit(task("/a.jpg", MediaKind::Photo)).unwrap();
        assert!(loader.wait_idle(Duration::from_secs(5)));

        // nothing in flight, but the result has not been drained yet
        assert!(loader.has_completions());
        assert_eq!(loader.drain().len(), 1);
        assert!(!loader.has_completions());
    }

    #[test]
    fn test_jobs_cancelled_by_shutdown_leave_nothing_in_flight() {
        let decoder = FakeDecoder {
            calls: AtomicUsize::new(0),
            first_call_delay: Duration::from_millis(300),
        };
        // one worker: the first job blocks it and the rest stay queued
        let mut loader =
            AsyncThumbnailLoader::new(Arc::new(decoder), 1, true, Duration::from_secs(2)).unwrap();
        for i in 0..4 {
            loader.submit(task(&format!("/{i}.jpg"), MediaKind::Photo)).unwrap();
        }
        loader.shutdown(Duration::from_millis(10));

        assert!(!loader.is_running());
        assert!(loader.wait_idle(Duration::from_secs(5)));
        assert_eq!(loader.in_flight(), 0);
    }

    #[test]
    fn test_job_dropped_unrun_is_uncounted() {
        let counter = Arc::new(AtomicUsize::new(0));
        let guard = InFlight::start(&counter);
        let job = move || {
            let _in_flight = guard;
        };
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // what the blocking pool does with a job it cancels
        drop(job);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fit_within_keeps_small_images() {
        let small = DynamicImage::ImageRgba8(RgbaImage::new(50, 80));
        assert_eq!(fit_within(small, 200).dimensions(), (50, 80));

        let tall = DynamicImage::ImageRgba8(RgbaImage::new(300, 900));
        assert_eq!(fit_within(tall, 300).dimensions(), (100, 300));
    }
}
