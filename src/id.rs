/// Content-addressed identifiers.
///
/// Every indexed entry is keyed by the SHA-1 digest of a canonical key: the
/// absolute path for content and folder entries, the bare file name for
/// name entries. The same key always produces the same id, which is what
/// lets a resumed run test membership against committed entries.
use std::path::Path;

use sha1::{Digest, Sha1};

/// Length of a rendered id (160-bit digest as lowercase hex).
pub const ID_LEN: usize = 40;

/// Hash `key` into a fixed-length lowercase hex id.
#[must_use]
pub fn make_id(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical key for a content or folder entry: the path as a string.
#[must_use]
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Canonical key for a file-name entry: the final path component.
///
/// Returns `None` for paths without a file name (e.g. `/` or `..`).
#[must_use]
pub fn name_key(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_id_known_digest() {
        // sha1("abc")
        assert_eq!(make_id("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_make_id_deterministic() {
        let key = "/home/user/docs/report.pdf";
        assert_eq!(make_id(key), make_id(key));
    }

    #[test]
    fn test_make_id_distinct_keys() {
        assert_ne!(make_id("/a/b.txt"), make_id("/a/b.txt "));
        assert_ne!(make_id("report.pdf"), make_id("Report.pdf"));
    }

    #[test]
    fn test_make_id_shape() {
        for key in ["", "x", "relatório anual.docx", "/tmp/一二三"] {
            let id = make_id(key);
            assert_eq!(id.len(), ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_name_key() {
        assert_eq!(
            name_key(Path::new("/data/projects/notes.txt")).as_deref(),
            Some("notes.txt")
        );
        assert_eq!(name_key(Path::new("/")), None);
    }

    #[test]
    fn test_path_key_matches_display() {
        let p = Path::new("/data/projects/notes.txt");
        assert_eq!(path_key(p), "/data/projects/notes.txt");
    }
}
