use chrono::{DateTime, Utc};

const SIZE_UNITS: [&str; 7] = ["bytes", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Format a byte count for display, e.g. `"1.5 MB"` or `"512 bytes"`.
/// One decimal place, dropped when it is zero.
pub fn format_file_size(bytes: i64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let mut number = format!("{:.1}", value);
    if number.ends_with(".0") {
        number.truncate(number.len() - 2);
    }
    format!("{} {}", number, SIZE_UNITS[unit])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    /// `"5m"`
    Short,
    /// `"5 minutes ago"`
    Long,
}

/// Describe an elapsed number of seconds in the largest whole unit.
pub fn elapsed_string(seconds: i64, mode: TimeMode) -> String {
    let seconds = seconds.max(0);
    let (number, unit) = if seconds < 60 {
        (seconds, "second")
    } else if seconds / 60 < 60 {
        (seconds / 60, "minute")
    } else if seconds / 3600 < 24 {
        (seconds / 3600, "hour")
    } else if seconds / 86_400 < 30 {
        (seconds / 86_400, "day")
    } else if seconds / (86_400 * 30) < 12 {
        (seconds / (86_400 * 30), "month")
    } else {
        (seconds / (86_400 * 30 * 12), "year")
    };

    match mode {
        TimeMode::Short => format!("{}{}", number, &unit[..1]),
        TimeMode::Long => {
            let plural = if number == 1 { "" } else { "s" };
            format!("{} {}{} ago", number, unit, plural)
        }
    }
}

pub fn parse_iso8601(timestamp: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Relative age of an ISO-8601 timestamp, or an empty string if it does
/// not parse.
pub fn time_ago(timestamp: &str, mode: TimeMode) -> String {
    match parse_iso8601(timestamp) {
        Some(then) => elapsed_string((Utc::now() - then).num_seconds(), mode),
        None => String::new(),
    }
}

/// Strip HTML tags from a rendered post body, collapsing paragraph breaks
/// into newlines.
pub fn strip_html(s: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    let mut tag = String::new();

    for c in s.chars() {
        match c {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag.trim_start_matches('/').split_whitespace().next().unwrap_or("");
                if matches!(name, "p" | "br" | "br/" | "li" | "blockquote") && !result.ends_with('\n') {
                    result.push('\n');
                }
            }
            _ if in_tag => tag.push(c),
            _ => result.push(c),
        }
    }

    // Clean up HTML entities
    result
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
