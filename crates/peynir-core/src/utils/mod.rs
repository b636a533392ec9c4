//! Utility functions for display formatting.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{elapsed_string, format_file_size, parse_iso8601, strip_html, time_ago, TimeMode};
