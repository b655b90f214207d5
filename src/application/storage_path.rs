//! Storage location and file name derivation for attachments
//!
//! Directory layout is `<root>/<year>/<MonthName>`, falling back to
//! `<root>/Invalid_Date` whenever the order date cannot be read. All
//! returned paths use forward slashes.

use std::path::Path;

use chrono::Month;
use percent_encoding::percent_decode_str;

use super::attachment_acquirer::SkipReason;

pub const INVALID_DATE_DIR: &str = "Invalid_Date";

const ILLEGAL_FILENAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Forward-slash form of a path, independent of the host separator.
pub fn canonical(path: &str) -> String {
    path.replace('\\', "/")
}

/// Pure directory derivation; nothing is created on disk.
pub fn storage_dir_for(order_date: Option<&str>, download_root: &Path) -> String {
    let root = canonical(&download_root.to_string_lossy());
    let root = root.trim_end_matches('/');

    match order_date.and_then(year_and_month) {
        Some((year, month)) => format!("{root}/{year}/{month}"),
        None => format!("{root}/{INVALID_DATE_DIR}"),
    }
}

/// Derive the directory for `order_date` under `download_root` and create it.
///
/// Concurrent calls for the same year and month are safe.
pub async fn derive_storage_path(order_date: Option<&str>, download_root: &Path) -> std::io::Result<String> {
    let dir = storage_dir_for(order_date, download_root);
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

fn year_and_month(date: &str) -> Option<(&str, &'static str)> {
    let date = date.trim();
    let (year, month) = if date.contains('-') {
        let parts: Vec<&str> = date.split('-').collect();
        match parts.as_slice() {
            [year, month, _day] => (*year, *month),
            _ => return None,
        }
    } else if date.contains('/') {
        let parts: Vec<&str> = date.split('/').collect();
        match parts.as_slice() {
            [_day, month, year] => (*year, *month),
            _ => return None,
        }
    } else {
        return None;
    };

    if !is_digits(year) || !is_digits(month) {
        return None;
    }

    let month = month.parse::<u8>().ok()?;
    let name = Month::try_from(month).ok()?.name();
    Some((year, name))
}

fn is_digits(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
}

/// Stable file name `<second-to-last segment>_<decoded last segment>`.
pub fn attachment_file_name(url: &str, expected_extension: &str) -> Result<String, SkipReason> {
    if !url.ends_with(expected_extension) {
        return Err(SkipReason::UnexpectedExtension);
    }

    let mut segments = url.rsplit('/');
    let (Some(last), Some(parent)) = (segments.next(), segments.next()) else {
        return Err(SkipReason::MalformedUrl);
    };

    let decoded = percent_decode_str(last).decode_utf8_lossy().replace(' ', "_");
    let joined = format!("{parent}_{decoded}");
    Ok(joined
        .chars()
        .map(|c| if ILLEGAL_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect())
}

/// Cut `path` so it starts at `marker`; paths without the marker are returned whole.
///
/// Relative paths are matched as if rooted, so a relative and an absolute
/// download root yield the same stored form.
pub fn relative_to_marker(path: &str, marker: &str) -> String {
    let path = canonical(path);
    let rooted = if path.starts_with('/') {
        path.clone()
    } else {
        format!("/{path}")
    };
    match rooted.find(marker) {
        Some(index) => rooted[index..].to_string(),
        None => path,
    }
}
