use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming};
use iced::widget::{button, column, container, row, scrollable, stack, text, Space};
use iced::{Element, Length, Subscription, Task, Theme};
use rfd::FileDialog;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod config;
mod error;
mod media;
mod state;
mod timeline;
mod ui;

use config::TimelineConfig;
use media::import::{import_folder_async, ImportResult};
use media::FileDecoder;
use state::data::{MediaFilter, MediaKind};
use state::library::Library;
use timeline::{ScrollEvent, ThumbnailPurpose, TimelineController};
use ui::timeline_view::{self, HandleStore};

/// How often the UI polls the timeline while it has work pending
const TICK_INTERVAL: Duration = Duration::from_millis(33);

const ZOOM_STEP: u32 = 50;
const MIN_THUMB_SIZE: u32 = 100;
const MAX_THUMB_SIZE: u32 = 400;

/// Main application state
struct PhotoTimeline {
    /// The media catalog
    library: Library,
    timeline: TimelineController,
    /// Grid thumbnails already uploaded as image handles
    thumbnails: HandleStore,
    /// Lightbox previews, pruned to what the preview cache still holds
    previews: HashMap<PathBuf, iced::widget::image::Handle>,
    /// Index of the record shown in the lightbox
    lightbox: Option<usize>,
    /// Status message to display to the user
    status: String,
    importing: bool,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// User clicked the "Import Folder" button
    ImportFolder,
    /// Background import completed with results
    ImportComplete(ImportResult),
    /// Timeline scrolled or resized
    Scrolled(scrollable::Viewport),
    Tick(Instant),
    ShowKind(Option<MediaKind>),
    ZoomIn,
    ZoomOut,
    OpenPreview(usize),
    PreviewPrevious,
    PreviewNext,
    ClosePreview,
    ToggleSelected(PathBuf),
    ClearSelection,
}

impl PhotoTimeline {
    fn new() -> error::Result<Self> {
        let config_path = TimelineConfig::default_path();
        let config = TimelineConfig::load(&config_path)?;
        if !config_path.exists() {
            // Leave the defaults where the user can find and edit them
            match config.save(&config_path) {
                Ok(()) => log::info!("Wrote default config to {}", config_path.display()),
                Err(e) => log::warn!("Could not write {}: {}", config_path.display(), e),
            }
        }
        let library = Library::new()?;
        let decoder = Arc::new(FileDecoder::with_default_cache());
        let mut timeline = TimelineController::new(config, decoder)?;

        let missing = library.verify_files()?;
        if missing > 0 {
            log::info!("{} catalog entries no longer exist on disk", missing);
        }
        timeline.load(&library, MediaFilter::default());

        let count = timeline.records().len();
        log::info!("Photo timeline initialized with {} items", count);

        Ok(Self {
            library,
            timeline,
            thumbnails: HandleStore::default(),
            previews: HashMap::new(),
            lightbox: None,
            status: format!("Ready. {} items in library.", count),
            importing: false,
        })
    }

    fn reload(&mut self, filter: MediaFilter) {
        self.lightbox = None;
        self.thumbnails.clear();
        self.previews.clear();
        self.timeline.load(&self.library, filter);
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::ImportFolder => {
                let folder = FileDialog::new()
                    .set_title("Select Folder with Photos and Videos")
                    .pick_folder();

                if let Some(folder_path) = folder {
                    self.status = format!("Importing from {}...", folder_path.display());
                    self.importing = true;

                    // The import opens its own catalog connection on a worker thread
                    let db_path = self.library.path().clone();
                    return Task::perform(
                        import_folder_async(folder_path, db_path),
                        Message::ImportComplete,
                    );
                }
                Task::none()
            }
            Message::ImportComplete(result) => {
                self.importing = false;
                self.status = format!(
                    "Import complete. Added {}, skipped {} duplicates, {} failed.",
                    result.imported_count, result.skipped_count, result.failed_count
                );
                match self.library.media_count() {
                    Ok(total) => self.status.push_str(&format!(" {} items in catalog.", total)),
                    Err(e) => log::warn!("Could not count catalog entries: {}", e),
                }
                let filter = self.timeline.session().filter.clone();
                self.reload(filter);
                Task::none()
            }
            Message::Scrolled(viewport) => {
                let bounds = viewport.bounds();
                let event = ScrollEvent {
                    offset_y: viewport.absolute_offset().y,
                    viewport_width: bounds.width,
                    viewport_height: bounds.height,
                };
                self.timeline.on_viewport_scrolled(event, Instant::now());
                Task::none()
            }
            Message::Tick(now) => {
                for ready in self.timeline.tick(now) {
                    match ready.purpose {
                        ThumbnailPurpose::Grid => {
                            self.thumbnails.insert(ready.path, ready.size, &ready.thumbnail);
                        }
                        ThumbnailPurpose::Preview => {
                            self.previews
                                .insert(ready.path, timeline_view::to_handle(&ready.thumbnail));
                        }
                    }
                }
                let timeline = &self.timeline;
                self.previews.retain(|path, _| timeline.has_preview(path));
                Task::none()
            }
            Message::ShowKind(kind) => {
                let filter = MediaFilter {
                    kind,
                    ..self.timeline.session().filter.clone()
                };
                self.reload(filter);
                Task::none()
            }
            Message::ZoomIn => {
                let size = self.timeline.session().thumb_size;
                self.timeline.set_zoom((size + ZOOM_STEP).min(MAX_THUMB_SIZE));
                Task::none()
            }
            Message::ZoomOut => {
                let size = self.timeline.session().thumb_size;
                self.timeline
                    .set_zoom(size.saturating_sub(ZOOM_STEP).max(MIN_THUMB_SIZE));
                Task::none()
            }
            Message::OpenPreview(index) => {
                self.show_preview(index);
                Task::none()
            }
            Message::PreviewPrevious => {
                if let Some(index) = self.lightbox.filter(|&i| i > 0) {
                    self.show_preview(index - 1);
                }
                Task::none()
            }
            Message::PreviewNext => {
                if let Some(index) = self.lightbox {
                    if index + 1 < self.timeline.records().len() {
                        self.show_preview(index + 1);
                    }
                }
                Task::none()
            }
            Message::ClosePreview => {
                self.lightbox = None;
                Task::none()
            }
            Message::ToggleSelected(path) => {
                self.timeline.toggle_selected(&path);
                Task::none()
            }
            Message::ClearSelection => {
                self.timeline.clear_selection();
                Task::none()
            }
        }
    }

    fn show_preview(&mut self, index: usize) {
        self.lightbox = Some(index);
        if let Some(thumbnail) = self.timeline.open_preview(index) {
            let path = self.timeline.records()[index].path.clone();
            self.previews
                .entry(path)
                .or_insert_with(|| timeline_view::to_handle(&thumbnail));
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let filter = self.timeline.session().filter.kind;
        let kind_button = |label, kind: Option<MediaKind>| {
            button(text(label).size(14))
                .on_press_maybe((filter != kind).then_some(Message::ShowKind(kind)))
        };
        let selected = self.timeline.session().selection_len();

        let toolbar = row![
            button("Import Folder").on_press_maybe((!self.importing).then_some(Message::ImportFolder)),
            kind_button("All", None),
            kind_button("Photos", Some(MediaKind::Photo)),
            kind_button("Videos", Some(MediaKind::Video)),
            button("-").on_press(Message::ZoomOut),
            button("+").on_press(Message::ZoomIn),
            button("Clear selection").on_press_maybe((selected > 0).then_some(Message::ClearSelection)),
            Space::with_width(Length::Fill),
            text(if selected > 0 {
                format!("{} selected  ·  {}", selected, self.status)
            } else {
                self.status.clone()
            })
            .size(14),
        ]
        .spacing(10)
        .padding(10);

        let content = column![toolbar, timeline_view::view(&self.timeline, &self.thumbnails)];

        let lightbox = self.lightbox.and_then(|index| {
            let record = self.timeline.records().get(index)?;
            Some(ui::lightbox::view(
                record,
                index,
                self.timeline.records().len(),
                self.previews.get(&record.path),
                self.timeline.is_preview_pending(&record.path),
                self.timeline.is_selected(&record.path),
            ))
        });

        match lightbox {
            Some(overlay) => stack![content, overlay].into(),
            None => container(content).into(),
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        if self.timeline.needs_tick() {
            iced::time::every(TICK_INTERVAL).map(Message::Tick)
        } else {
            Subscription::none()
        }
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

impl Drop for PhotoTimeline {
    fn drop(&mut self) {
        self.timeline.teardown();
    }
}

fn log_dir() -> Option<PathBuf> {
    let dir = dirs::data_dir()?.join("photo-timeline").join("logs");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

fn start_logging(log_dir: &Path) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str("info, iced=error, wgpu_hal=error, wgpu_core=error")?
        .log_to_file(FileSpec::default().directory(log_dir).basename("photo-timeline").suppress_timestamp())
        .rotate(Criterion::Size(1024 * 1024), Naming::Numbers, Cleanup::KeepLogFiles(3))
        .duplicate_to_stderr(Duplicate::Warn)
        .start()
}

fn main() -> iced::Result {
    // The handle has to outlive the application or the log file is closed
    let _logger = match log_dir() {
        Some(log_dir) => match start_logging(&log_dir) {
            Ok(handle) => Some(handle),
            Err(e) => {
                eprintln!("Failed to start logging: {e}");
                None
            }
        },
        None => {
            eprintln!("Failed to create log directory");
            None
        }
    };

    log::info!("Starting photo timeline {}", env!("CARGO_PKG_VERSION"));

    let app = match PhotoTimeline::new() {
        Ok(app) => app,
        Err(e) => {
            log::error!("Startup failed: {}", e);
            eprintln!("Failed to open the photo library: {e}");
            std::process::exit(1);
        }
    };

    iced::application("Photo Timeline", PhotoTimeline::update, PhotoTimeline::view)
        .subscription(PhotoTimeline::subscription)
        .theme(PhotoTimeline::theme)
        .centered()
        .run_with(move || (app, Task::none()))
}
