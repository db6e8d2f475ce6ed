//! Destination path sanitization.
//!
//! Every destination is resolved under a caller-supplied base directory.
//! Directory segments and the file-name segment are cleaned independently,
//! so nothing in a file name can reintroduce a separator or climb out of
//! the base directory.

use std::path::{Path, PathBuf};

use url::Url;

use super::error::DownloadError;

/// Characters rejected by at least one mainstream filesystem.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Device names Windows refuses as file stems.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Resolves `raw` to a safe path under `base_dir`.
///
/// - `/` and `\` both separate segments; drive prefixes lose their `:`.
/// - Empty, `.` and `..` segments are dropped, so the result never escapes `base_dir`.
/// - `base_dir` is made absolute first, so the result is always absolute.
/// - An absolute `raw` that already lives under `base_dir` is re-rooted rather
///   than nested, which makes the function idempotent. Relative paths are
///   always nested, even when they begin with the base directory's name.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidDestination`] when the file-name segment is
/// empty after sanitization (e.g. `"downloads/"` or `"../.."`).
pub fn sanitize_destination(raw: &str, base_dir: &Path) -> Result<PathBuf, DownloadError> {
    let base_dir = std::path::absolute(base_dir).unwrap_or_else(|_| base_dir.to_path_buf());
    let relative = strip_base(raw, &base_dir);
    let mut segments: Vec<&str> = relative.split(['/', '\\']).collect();
    let raw_file_name = segments.pop().unwrap_or_default();

    let file_name = sanitize_segment(raw_file_name);
    if file_name.is_empty() {
        return Err(DownloadError::invalid_destination(
            raw,
            "file name is empty after sanitization",
        ));
    }

    let mut path = base_dir;
    for dir in segments
        .into_iter()
        .map(sanitize_segment)
        .filter(|s| !s.is_empty())
    {
        path.push(dir);
    }
    path.push(file_name);
    Ok(path)
}

fn strip_base(raw: &str, base_dir: &Path) -> String {
    let raw_path = Path::new(raw);
    if !raw_path.is_absolute() {
        return raw.to_string();
    }
    match raw_path.strip_prefix(base_dir) {
        Ok(rest) => rest.to_string_lossy().into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// Cleans one path segment. Returns an empty string for traversal segments.
fn sanitize_segment(segment: &str) -> String {
    let stripped: String = segment
        .chars()
        .filter(|c| !INVALID_CHARS.contains(c) && !c.is_control())
        .collect();

    // Windows silently drops trailing dots and spaces; this also collapses `.`/`..`.
    let trimmed = stripped.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        return String::new();
    }

    let stem = trimmed.split('.').next().unwrap_or(trimmed);
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Derives a file name from the last URL path segment, percent-decoded.
///
/// Returns `None` when the URL has no usable last segment.
#[must_use]
pub fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    // A decoded `%2F` must not become a directory.
    let name = sanitize_segment(&decoded.replace(['/', '\\'], "_"));
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> PathBuf {
        PathBuf::from("/srv/downloads")
    }

    #[test]
    fn test_sanitize_plain_relative_path() {
        let path = sanitize_destination("isos/debian.iso", &base()).unwrap();
        assert_eq!(path, PathBuf::from("/srv/downloads/isos/debian.iso"));
    }

    #[test]
    fn test_sanitize_neutralizes_traversal() {
        let path = sanitize_destination("../../etc/passwd", &base()).unwrap();
        assert!(path.starts_with(base()), "escaped base: {}", path.display());
        assert_eq!(path, PathBuf::from("/srv/downloads/etc/passwd"));
    }

    #[test]
    fn test_sanitize_reroots_absolute_paths() {
        let path = sanitize_destination("/etc/shadow", &base()).unwrap();
        assert_eq!(path, PathBuf::from("/srv/downloads/etc/shadow"));
    }

    #[test]
    fn test_sanitize_strips_drive_and_backslashes() {
        let path = sanitize_destination(r"C:\Windows\..\win.ini", &base()).unwrap();
        assert_eq!(path, PathBuf::from("/srv/downloads/C/Windows/win.ini"));
    }

    #[test]
    fn test_sanitize_strips_invalid_chars_from_file_name() {
        let path = sanitize_destination("a/b<c>d?e*.bin", &base()).unwrap();
        assert_eq!(path, PathBuf::from("/srv/downloads/a/bcde.bin"));
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        let path = sanitize_destination("re\u{0}port\n.pdf", &base()).unwrap();
        assert_eq!(path, PathBuf::from("/srv/downloads/report.pdf"));
    }

    #[test]
    fn test_sanitize_prefixes_reserved_names() {
        let path = sanitize_destination("con.txt", &base()).unwrap();
        assert_eq!(path, PathBuf::from("/srv/downloads/_con.txt"));
    }

    #[test]
    fn test_sanitize_trims_trailing_dots_and_spaces() {
        let path = sanitize_destination("notes. . ", &base()).unwrap();
        assert_eq!(path, PathBuf::from("/srv/downloads/notes"));
    }

    #[test]
    fn test_sanitize_keeps_dotfiles() {
        let path = sanitize_destination(".config/app.toml", &base()).unwrap();
        assert_eq!(path, PathBuf::from("/srv/downloads/.config/app.toml"));
    }

    #[test]
    fn test_sanitize_rejects_empty_file_name() {
        for raw in ["", "dir/", "..", "../..", "a/...", "???"] {
            let result = sanitize_destination(raw, &base());
            assert!(
                matches!(result, Err(DownloadError::InvalidDestination { .. })),
                "expected InvalidDestination for {raw:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "file.bin",
            "../../etc/passwd",
            r"C:\Users\me\..\x.iso",
            "a/./b//c/d.tar.gz",
            "NUL",
            "weird:name?.txt",
            "/srv/downloads/../escape.txt",
            "trailing. /name . ",
        ];
        for raw in inputs {
            let once = sanitize_destination(raw, &base()).unwrap();
            let twice = sanitize_destination(once.to_str().unwrap(), &base()).unwrap();
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_sanitize_relative_base_dir() {
        let base = PathBuf::from("downloads");
        let path = sanitize_destination("../x.bin", &base).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("downloads/x.bin"));
        let again = sanitize_destination(path.to_str().unwrap(), &base).unwrap();
        assert_eq!(again, path);
    }

    #[test]
    fn test_relative_base_name_as_destination_is_nested() {
        let base = PathBuf::from("downloads");
        let path = sanitize_destination("downloads", &base).unwrap();
        assert!(path.ends_with("downloads/downloads"), "got {}", path.display());
    }

    #[test]
    fn test_relative_base_prefix_does_not_collide() {
        let base = PathBuf::from("downloads");
        let plain = sanitize_destination("a.bin", &base).unwrap();
        let prefixed = sanitize_destination("downloads/a.bin", &base).unwrap();
        assert_ne!(plain, prefixed);
        assert!(plain.ends_with("downloads/a.bin"));
        assert!(prefixed.ends_with("downloads/downloads/a.bin"));
    }

    #[test]
    fn test_filename_from_url_decodes_segment() {
        let url = Url::parse("https://example.com/files/my%20image.iso?x=1").unwrap();
        assert_eq!(filename_from_url(&url).as_deref(), Some("my image.iso"));
    }

    #[test]
    fn test_filename_from_url_rejects_encoded_separator() {
        let url = Url::parse("https://example.com/a%2F..%2Fb.bin").unwrap();
        assert_eq!(filename_from_url(&url).as_deref(), Some("a_.._b.bin"));
    }

    #[test]
    fn test_filename_from_url_trailing_slash() {
        let url = Url::parse("https://example.com/dir/").unwrap();
        assert_eq!(filename_from_url(&url), None);
    }
}
