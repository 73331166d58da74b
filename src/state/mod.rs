/// State management module
///
/// This module handles all application state, including:
/// - The SQLite media catalog (library.rs)
/// - Shared data structures (data.rs)
/// - Per-timeline session state: filters, selection, zoom (session.rs)

pub mod data;
pub mod library;
pub mod session;
