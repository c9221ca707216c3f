//! Highlighted excerpts around the first literal match of a query.
//!
//! All offsets are in characters, so multi-byte text never splits inside a
//! code point.

const HIGHLIGHT: &str = "**";
const ELLIPSIS: &str = "...";

/// Case-insensitive position of `needle` in `haystack`, in characters.
fn find_ignore_case(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&start| {
        haystack[start..start + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a.to_lowercase().eq(b.to_lowercase()))
    })
}

fn push_flat(out: &mut String, chars: &[char]) {
    out.extend(chars.iter().map(|&c| if c == '\n' { ' ' } else { c }));
}

/// Excerpt of `document` around the first case-insensitive occurrence of
/// `query`, with the match wrapped in `**`.
///
/// Keeps up to `before` characters ahead of the match and `after` past its
/// end. Without a match the first `after` characters are returned, followed
/// by `...` when the document is longer. Newlines become spaces. An empty
/// document has no snippet.
#[must_use]
pub fn extract_snippet(document: &str, query: &str, before: usize, after: usize) -> Option<String> {
    if document.is_empty() {
        return None;
    }

    let doc: Vec<char> = document.chars().collect();
    let needle: Vec<char> = query.chars().collect();
    let mut out = String::new();

    let Some(start) = find_ignore_case(&doc, &needle) else {
        push_flat(&mut out, &doc[..after.min(doc.len())]);
        if doc.len() > after {
            out.push_str(ELLIPSIS);
        }
        return Some(out);
    };

    let end = start + needle.len();
    let from = start.saturating_sub(before);
    let to = (end + after).min(doc.len());

    push_flat(&mut out, &doc[from..start]);
    out.push_str(HIGHLIGHT);
    push_flat(&mut out, &doc[start..end]);
    out.push_str(HIGHLIGHT);
    push_flat(&mut out, &doc[end..to]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_found() {
        assert_eq!(
            extract_snippet("hello world example text", "world", 2, 5).as_deref(),
            Some("o **world** exam")
        );
    }

    #[test]
    fn test_snippet_not_found() {
        assert_eq!(
            extract_snippet("abcdef", "zzz", 30, 3).as_deref(),
            Some("abc...")
        );
        // Short documents get no ellipsis.
        assert_eq!(extract_snippet("abc", "zzz", 30, 3).as_deref(), Some("abc"));
    }

    #[test]
    fn test_snippet_empty_document() {
        assert_eq!(extract_snippet("", "x", 30, 200), None);
    }

    #[test]
    fn test_snippet_keeps_original_case() {
        assert_eq!(
            extract_snippet("Annual REPORT 2024", "report", 7, 3).as_deref(),
            Some("Annual **REPORT** 20")
        );
    }

    #[test]
    fn test_snippet_flattens_newlines() {
        assert_eq!(
            extract_snippet("line one\nline two\nthree", "two", 5, 3).as_deref(),
            Some("line **two** th")
        );
        assert_eq!(
            extract_snippet("a\nb\nc", "zzz", 0, 10).as_deref(),
            Some("a b c")
        );
    }

    #[test]
    fn test_snippet_window_clamped_at_edges() {
        assert_eq!(
            extract_snippet("match at start", "match", 50, 50).as_deref(),
            Some("**match** at start")
        );
        assert_eq!(
            extract_snippet("ends with match", "MATCH", 5, 50).as_deref(),
            Some("with **match**")
        );
    }

    #[test]
    fn test_snippet_counts_characters() {
        assert_eq!(
            extract_snippet("relatório ação final", "ação", 3, 2).as_deref(),
            Some("io **ação** f")
        );
    }

    #[test]
    fn test_snippet_empty_query_is_not_a_match() {
        assert_eq!(extract_snippet("abcdef", "", 1, 4).as_deref(), Some("abcd..."));
    }
}
