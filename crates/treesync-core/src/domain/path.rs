//! Path rules shared by the scanner, dispatcher, and working set
//!
//! Two predicates matter everywhere in TreeSync:
//!
//! - **Hidden paths**: any path with a segment starting with `.` is
//!   excluded from tracking.
//! - **Separator-bounded ancestry**: subtree operations on `/a/b` must
//!   cover `/a/b` and `/a/b/...` but never the sibling `/a/bc`.

use std::path::{Component, Path};

/// Marker prefix for hidden path segments
const HIDDEN_MARKER: char = '.';

/// True if any segment of `path` begins with the hidden marker
///
/// Checks every normal component, so `/data/.git/config` is hidden even
/// though the final segment is not.
pub fn is_hidden(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(seg) => seg
            .to_string_lossy()
            .starts_with(HIDDEN_MARKER),
        _ => false,
    })
}

/// True if `path` equals `ancestor` or lives strictly inside it
///
/// The comparison is component-wise, so string prefixes that are not path
/// prefixes (`/a/b` vs `/a/bc`) never match.
pub fn is_self_or_descendant(path: &Path, ancestor: &Path) -> bool {
    path == ancestor || path.starts_with(ancestor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_hidden_leaf_segment() {
        assert!(is_hidden(Path::new("/data/.env")));
    }

    #[test]
    fn test_hidden_intermediate_segment() {
        assert!(is_hidden(Path::new("/data/.git/config")));
    }

    #[test]
    fn test_visible_path() {
        assert!(!is_hidden(Path::new("/data/docs/readme.md")));
    }

    #[test]
    fn test_dot_in_middle_of_segment_is_visible() {
        assert!(!is_hidden(Path::new("/data/archive.tar.gz")));
    }

    #[test]
    fn test_descendant_matches() {
        assert!(is_self_or_descendant(
            Path::new("/a/b/c.txt"),
            Path::new("/a/b")
        ));
    }

    #[test]
    fn test_self_matches() {
        assert!(is_self_or_descendant(Path::new("/a/b"), Path::new("/a/b")));
    }

    #[test]
    fn test_string_prefix_sibling_does_not_match() {
        // /a/bc merely shares a string prefix with /a/b
        assert!(!is_self_or_descendant(
            Path::new("/a/bc"),
            Path::new("/a/b")
        ));
        assert!(!is_self_or_descendant(
            Path::new("/a/bc/d.txt"),
            Path::new("/a/b")
        ));
    }
}
