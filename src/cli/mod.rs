//! Terminal commands that run outside the MCP server.

pub mod config;
pub mod search;

pub use config::show_config;
pub use search::search;

/// Shorten `text` to at most `max` characters, appending `...` when cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
