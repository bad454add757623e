pub mod logging;

pub use logging::init_logging;

/// Renders a countdown value as `m:ss` (minutes are not zero padded).
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
