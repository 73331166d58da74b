/// Full-size preview overlay
use iced::widget::{button, column, container, image, opaque, row, text, Space};
use iced::{Color, ContentFit, Element, Length};

use crate::state::data::{MediaKind, MediaRecord};
use crate::Message;

pub fn view<'a>(
    record: &'a MediaRecord,
    index: usize,
    total: usize,
    preview: Option<&'a image::Handle>,
    pending: bool,
    selected: bool,
) -> Element<'a, Message> {
    let picture: Element<'a, Message> = match preview {
        Some(handle) => image(handle.clone())
            .width(Length::Fill)
            .height(Length::Fill)
            .content_fit(ContentFit::Contain)
            .into(),
        None => container(text(if pending {
            "Loading preview..."
        } else {
            "Preview unavailable"
        }))
        .center(Length::Fill)
        .into(),
    };

    let name = record
        .path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let kind = match record.kind {
        MediaKind::Photo => "",
        MediaKind::Video => "  (video)",
    };
    let caption = format!(
        "{}{}  ·  {}  ·  {} / {}",
        name,
        kind,
        record.captured_at.format("%Y-%m-%d %H:%M"),
        index + 1,
        total
    );

    let controls = row![
        button("Previous").on_press_maybe((index > 0).then_some(Message::PreviewPrevious)),
        button("Next").on_press_maybe((index + 1 < total).then_some(Message::PreviewNext)),
        button(if selected { "Deselect" } else { "Select" })
            .on_press(Message::ToggleSelected(record.path.clone())),
        Space::with_width(Length::Fill),
        text(caption).size(14),
        Space::with_width(Length::Fill),
        button("Close").on_press(Message::ClosePreview),
    ]
    .spacing(10);

    let content = column![picture, controls].spacing(12).padding(20);

    opaque(
        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .style(|_theme| container::Style {
                background: Some(Color::from_rgba(0.0, 0.0, 0.0, 0.92).into()),
                ..Default::default()
            }),
    )
}
