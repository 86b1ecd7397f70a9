//! Path sanitization and traversal protection for the upload root.
//!
//! Upload names are *rewritten* into something safe; paths coming from
//! delete/serve URLs are *validated* and rejected if they try to escape.

use std::path::{Component, Path, PathBuf};

use crate::{FiledropError, Result};

/// Maximum length of a single sanitized path segment, in characters.
pub const MAX_SEGMENT_LENGTH: usize = 255;

/// Sanitize one path segment of an uploaded name.
///
/// Keeps alphanumerics (including non-ASCII letters), `-`, `_` and `.`;
/// turns whitespace runs into a single `_`; drops everything else; strips
/// leading and trailing `.` and `_`.
pub fn secure_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut pending_space = false;

    for c in segment.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
            if pending_space && !out.is_empty() {
                out.push('_');
            }
            pending_space = false;
            out.push(c);
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    trimmed.chars().take(MAX_SEGMENT_LENGTH).collect()
}

/// Sanitize a client-supplied upload name into a relative path.
///
/// Both `/` and `\` separate segments so that nested names from any client
/// keep their directory structure. `.`, `..` and empty segments are dropped,
/// so the result can never climb out of the upload root.
///
/// # Errors
///
/// Returns [`FiledropError::InvalidPath`] if nothing usable remains.
pub fn sanitize_upload_path(raw: &str) -> Result<String> {
    let segments: Vec<String> = raw
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(secure_segment)
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return Err(FiledropError::InvalidPath(format!(
            "file name {raw:?} has no usable characters"
        )));
    }

    Ok(segments.join("/"))
}

/// Validate a relative path taken from a request URL.
///
/// Rejects paths that are empty, absolute, or contain `..`, root or prefix
/// components. `.` components are dropped. The result uses `/` separators.
pub fn validate_relative(path: &str) -> Result<String> {
    if path.trim().is_empty() {
        return Err(FiledropError::InvalidPath("path cannot be empty".to_string()));
    }
    if path.contains('\\') {
        return Err(FiledropError::InvalidPath(format!(
            "path cannot contain backslashes: {path}"
        )));
    }

    let as_path = Path::new(path);
    if as_path.is_absolute() {
        return Err(FiledropError::InvalidPath(format!(
            "path cannot be absolute: {path}"
        )));
    }

    let mut segments = Vec::new();
    for component in as_path.components() {
        match component {
            Component::Normal(name) => match name.to_str() {
                Some(name) => segments.push(name),
                None => {
                    return Err(FiledropError::InvalidPath(format!(
                        "path is not valid UTF-8: {path}"
                    )))
                }
            },
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(FiledropError::InvalidPath(format!(
                    "path cannot contain '..': {path}"
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(FiledropError::InvalidPath(format!(
                    "path cannot contain root or prefix: {path}"
                )))
            }
        }
    }

    if segments.is_empty() {
        return Err(FiledropError::InvalidPath(format!(
            "path normalized to empty: {path}"
        )));
    }

    Ok(segments.join("/"))
}

/// Join a validated relative path (with `/` separators) onto the root.
pub fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
}

/// Check that `candidate` resolves inside `root` once symlinks are followed.
///
/// Both paths must exist.
pub fn is_within_root(root: &Path, candidate: &Path) -> Result<bool> {
    let root = root
        .canonicalize()
        .map_err(|e| FiledropError::file(root.display().to_string(), e))?;
    let candidate = candidate
        .canonicalize()
        .map_err(|e| FiledropError::file(candidate.display().to_string(), e))?;
    Ok(candidate.starts_with(&root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_segment_keeps_safe_characters() {
        assert_eq!(secure_segment("report-2024_v1.pdf"), "report-2024_v1.pdf");
    }

    #[test]
    fn test_secure_segment_whitespace_becomes_underscore() {
        assert_eq!(secure_segment("my  holiday photo.jpg"), "my_holiday_photo.jpg");
    }

    #[test]
    fn test_secure_segment_strips_unsafe_characters() {
        assert_eq!(secure_segment("a<b>c:d\"e|f?g*.txt"), "abcdefg.txt");
    }

    #[test]
    fn test_secure_segment_strips_leading_dots() {
        assert_eq!(secure_segment(".bashrc"), "bashrc");
        assert_eq!(secure_segment("..."), "");
        assert_eq!(secure_segment("_x_"), "x");
    }

    #[test]
    fn test_secure_segment_keeps_unicode_letters() {
        assert_eq!(secure_segment("日本語ファイル.txt"), "日本語ファイル.txt");
    }

    #[test]
    fn test_sanitize_plain_name() {
        assert_eq!(sanitize_upload_path("notes.txt").unwrap(), "notes.txt");
    }

    #[test]
    fn test_sanitize_keeps_nested_structure() {
        assert_eq!(
            sanitize_upload_path("folder1/sub dir/file.txt").unwrap(),
            "folder1/sub_dir/file.txt"
        );
        assert_eq!(
            sanitize_upload_path("folder1\\file.txt").unwrap(),
            "folder1/file.txt"
        );
    }

    #[test]
    fn test_sanitize_drops_traversal_segments() {
        assert_eq!(
            sanitize_upload_path("../../etc/passwd").unwrap(),
            "etc/passwd"
        );
        assert_eq!(sanitize_upload_path("a/../b.txt").unwrap(), "a/b.txt");
        assert_eq!(sanitize_upload_path("/abs/./x.txt").unwrap(), "abs/x.txt");
    }

    #[test]
    fn test_sanitize_rejects_empty_result() {
        assert!(matches!(
            sanitize_upload_path("../.."),
            Err(FiledropError::InvalidPath(_))
        ));
        assert!(sanitize_upload_path("").is_err());
        assert!(sanitize_upload_path("???").is_err());
    }

    #[test]
    fn test_validate_relative_accepts_nested() {
        assert_eq!(validate_relative("a/b/c.txt").unwrap(), "a/b/c.txt");
        assert_eq!(validate_relative("./a/./b").unwrap(), "a/b");
    }

    #[test]
    fn test_validate_relative_rejects_traversal() {
        assert!(matches!(
            validate_relative("../secret"),
            Err(FiledropError::InvalidPath(_))
        ));
        assert!(validate_relative("a/../../b").is_err());
    }

    #[test]
    fn test_validate_relative_rejects_absolute_and_empty() {
        assert!(validate_relative("/etc/passwd").is_err());
        assert!(validate_relative("").is_err());
        assert!(validate_relative(".").is_err());
        assert!(validate_relative("a\\..\\b").is_err());
    }

    #[test]
    fn test_join_relative_stays_under_root() {
        let root = Path::new("/srv/drop");
        let joined = join_relative(root, "a/b.txt");
        assert_eq!(joined, Path::new("/srv/drop/a/b.txt"));
        assert!(joined.starts_with(root));
    }

    #[test]
    fn test_is_within_root() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let inner = temp_dir.path().join("inner.txt");
        std::fs::write(&inner, b"x").unwrap();

        assert!(is_within_root(temp_dir.path(), &inner).unwrap());

        let other = tempfile::TempDir::new().unwrap();
        assert!(!is_within_root(temp_dir.path(), other.path()).unwrap());
    }
}
