//! Where uploaded bytes land on disk.
//!
//! Layout: `<save root>/<sanitized subdir?>/<YYYY-MM-DD>/<timestamp>_<name>`.
//! The timestamp prefix carries microseconds, so every saved name is unique
//! and no overwrite handling or locking is needed.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct SavedFile {
    pub filename: String,
    pub path: String,
    pub size: u64,
}

/// Validate and normalize the subdirectory hint so it can only resolve to a
/// path strictly under the save root. Returns `None` when nothing usable is
/// left after normalization (empty, `/`, `.` and the like).
pub fn sanitize_subdir(subdir: &str) -> Result<Option<String>, AppError> {
    let trimmed = subdir.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if trimmed.contains('\0') {
        return Err(AppError::BadRequest("Subdir contains invalid null byte".into()));
    }

    // Decode percent-encoding before validation to prevent bypass via %2e%2e
    let decoded = percent_decode(trimmed);

    if decoded.contains('\\') {
        return Err(AppError::BadRequest("Subdir contains invalid backslash".into()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        // Empty segments also swallow absolute-path prefixes: "/campaign"
        // normalizes to "campaign", relative to the save root.
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(AppError::BadRequest("Invalid subdir path".into()));
        }
        if segment.chars().any(|c| c.is_control()) {
            return Err(AppError::BadRequest(
                "Subdir contains invalid control characters".into(),
            ));
        }
        if !segment
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' '))
        {
            return Err(AppError::BadRequest("Subdir contains invalid characters".into()));
        }
        segments.push(segment);
    }

    if segments.is_empty() {
        Ok(None)
    } else {
        Ok(Some(segments.join("/")))
    }
}

/// Simple percent-decoding for subdir validation.
/// Decodes %XX sequences to their byte values.
fn percent_decode(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                result.push((hi << 4 | lo) as char);
                i += 3;
                continue;
            }
        }
        result.push(bytes[i] as char);
        i += 1;
    }
    result
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Target directory for one request: save root, then the sanitized subdir if
/// any, then the current date.
pub fn dated_dir(root: &Path, subdir: Option<&str>, now: DateTime<Local>) -> PathBuf {
    let mut dir = root.to_path_buf();
    if let Some(sub) = subdir {
        dir.push(sub);
    }
    dir.push(now.format("%Y-%m-%d").to_string());
    dir
}

/// Basename of the client-supplied filename, or a fallback for nameless parts.
pub fn safe_basename(original: Option<&str>) -> String {
    original
        .and_then(|name| Path::new(name).file_name())
        .map(|n| n.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload.bin".to_string())
}

/// Microsecond-stamped final name, e.g. `20240301_120000_123456_a.png`.
pub fn timestamped_name(now: DateTime<Local>, basename: &str) -> String {
    format!("{}_{}", now.format("%Y%m%d_%H%M%S_%6f"), basename)
}

/// Write one uploaded file into `dir`. The timestamp is taken per file, so
/// repeated names within a request still end up distinct.
pub async fn save_file(
    dir: &Path,
    original: Option<&str>,
    data: &[u8],
) -> Result<SavedFile, AppError> {
    let basename = safe_basename(original);
    let filename = timestamped_name(Local::now(), &basename);
    let path = dir.join(&filename);

    tokio::fs::write(&path, data)
        .await
        .map_err(|e| AppError::Internal(format!("Failed saving {}: {}", basename, e)))?;

    Ok(SavedFile {
        filename,
        path: path.display().to_string(),
        size: data.len() as u64,
    })
}
