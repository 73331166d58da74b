/// Timeline grid view
///
/// Mirrors the layout computed by `VirtualGroupRenderer`: placeholder groups
/// are empty space of their estimated height, rendered groups are a header
/// followed by fixed-size cells. Thumbnails are uploaded to the GPU once as
/// image handles and looked up here by path.
use iced::widget::{button, column, container, image, scrollable, text, Column, Row, Space};
use iced::{ContentFit, Element, Length};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::timeline::renderer::GroupSlot;
use crate::timeline::{Thumbnail, TimelineController, TimelineStatus};
use crate::Message;

/// An uploaded grid thumbnail
pub struct CellImage {
    pub handle: image::Handle,
    /// Drawn glyph for media that could not be decoded
    pub placeholder: bool,
}

/// Image handles for every thumbnail delivered so far, per thumbnail size
#[derive(Default)]
pub struct HandleStore {
    by_size: HashMap<u32, HashMap<PathBuf, CellImage>>,
}

impl HandleStore {
    pub fn insert(&mut self, path: PathBuf, size: u32, thumbnail: &Thumbnail) {
        let cell = CellImage {
            handle: to_handle(thumbnail),
            placeholder: thumbnail.placeholder,
        };
        self.by_size.entry(size).or_default().insert(path, cell);
    }

    pub fn get(&self, path: &Path, size: u32) -> Option<&CellImage> {
        self.by_size.get(&size)?.get(path)
    }

    pub fn clear(&mut self) {
        self.by_size.clear();
    }
}

pub fn to_handle(thumbnail: &Thumbnail) -> image::Handle {
    let pixels = &thumbnail.image;
    image::Handle::from_rgba(pixels.width(), pixels.height(), pixels.as_raw().clone())
}

pub fn view<'a>(timeline: &'a TimelineController, handles: &'a HandleStore) -> Element<'a, Message> {
    if let TimelineStatus::Empty(message) = timeline.status() {
        return container(text(message.as_str()).size(18))
            .center(Length::Fill)
            .into();
    }

    let groups = timeline.renderer().slots().iter().map(|slot| {
        if slot.group.is_rendered() {
            rendered_group(timeline, handles, slot)
        } else {
            placeholder_group(timeline, slot)
        }
    });

    scrollable(Column::with_children(groups).width(Length::Fill))
        .on_scroll(Message::Scrolled)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

fn header<'a>(timeline: &'a TimelineController, slot: &'a GroupSlot) -> Element<'a, Message> {
    let metrics = timeline.renderer().metrics();
    let title = format!("{}  ·  {}", slot.group.title(), slot.group.len());

    container(text(title).size(16))
        .padding([0.0, metrics.margins / 2.0])
        .center_y(metrics.header_height)
        .into()
}

/// Same height as the grid it stands in for, so the scrollbar stays put
fn placeholder_group<'a>(timeline: &'a TimelineController, slot: &'a GroupSlot) -> Element<'a, Message> {
    let rest = (slot.height - timeline.renderer().metrics().header_height).max(0.0);
    column![header(timeline, slot), Space::with_height(rest)].into()
}

fn rendered_group<'a>(
    timeline: &'a TimelineController,
    handles: &'a HandleStore,
    slot: &'a GroupSlot,
) -> Element<'a, Message> {
    let metrics = timeline.renderer().metrics();
    let columns = timeline.renderer().columns().max(1);

    let rows = slot.group.members.chunks(columns).map(|chunk| -> Element<'a, Message> {
        Row::with_children(chunk.iter().map(|&member| cell(timeline, handles, member)))
            .spacing(metrics.spacing)
            .into()
    });

    let grid = container(Column::with_children(rows).spacing(metrics.spacing))
        .padding(metrics.margins / 2.0);

    column![header(timeline, slot), grid].into()
}

fn cell<'a>(timeline: &'a TimelineController, handles: &'a HandleStore, member: usize) -> Element<'a, Message> {
    let size = timeline.session().thumb_size;
    let edge = size as f32;
    let record = &timeline.records()[member];

    let content: Element<'a, Message> = match handles.get(&record.path, size) {
        // glyphs sit on the empty-cell tile so they read as "no picture"
        Some(cell) if cell.placeholder => container(image(cell.handle.clone()).width(edge).height(edge))
            .style(container::rounded_box)
            .into(),
        Some(cell) => image(cell.handle.clone())
            .width(edge)
            .height(edge)
            .content_fit(ContentFit::Contain)
            .into(),
        None => container(Space::new(edge, edge))
            .style(container::rounded_box)
            .into(),
    };

    let content: Element<'a, Message> = if timeline.is_selected(&record.path) {
        container(content).style(container::bordered_box).into()
    } else {
        content
    };

    button(content)
        .padding(0)
        .style(button::text)
        .on_press(Message::OpenPreview(member))
        .into()
}
