//! Path utilities for media references, temp layout and concat manifests

use std::path::{Path, PathBuf};

use crate::domain::model::JobId;

/// Prefix of the per-job working directory under the temp root
pub const WORK_DIR_PREFIX: &str = "atacut_";

/// Turn a `file://` URI into a filesystem path; anything else is returned as is
pub fn normalize_media_reference(reference: &str) -> String {
    let reference = reference.trim();
    let Some(rest) = reference.strip_prefix("file://") else {
        return reference.to_string();
    };

    // file://localhost/path and file:///path both name /path
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    let decoded = percent_decode(rest);

    // file:///C:/media/a.mp4 -> C:/media/a.mp4
    let bytes = decoded.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'/' && bytes[2] == b':' && bytes[1].is_ascii_alphabetic() {
        return decoded[1..].to_string();
    }
    decoded
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Resolve a path against the current directory without touching the filesystem
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Per-job working directory: `<temp_root>/atacut_<job id>`
pub fn job_work_dir(temp_root: &Path, job_id: JobId) -> PathBuf {
    temp_root.join(format!("{}{}", WORK_DIR_PREFIX, job_id))
}

/// Intermediate segment path for the re-encoded clip at `index` in timeline
/// order; the index keeps names unique when clip ids repeat or sanitize alike
pub fn segment_path(work_dir: &Path, index: usize, clip_id: &str, extension: &str) -> PathBuf {
    work_dir.join(format!(
        "clip_{:03}_{}.{}",
        index,
        sanitize_file_component(clip_id),
        extension
    ))
}

/// Concat manifest path inside the working directory
pub fn manifest_path(work_dir: &Path) -> PathBuf {
    work_dir.join("concat_list.txt")
}

/// Replace characters that are unsafe in file names
pub fn sanitize_file_component(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "clip".to_string()
    } else {
        cleaned
    }
}

/// Quote a path for one `file '...'` line of a concat manifest
pub fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}
