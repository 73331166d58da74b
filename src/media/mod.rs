/// Media decoding and import
///
/// This module handles:
/// - Decoding photos (including embedded JPEGs in RAW files) and video frames
/// - Generating placeholder glyphs for media that cannot be decoded
/// - Scanning folders into the catalog

pub mod codec;
pub mod import;
pub mod placeholder;

pub use codec::{FileDecoder, MediaDecoder};
