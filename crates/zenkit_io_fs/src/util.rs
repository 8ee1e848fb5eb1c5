use globset::{GlobBuilder, GlobMatcher};

use crate::spec::FileIoError;

////////////////////////////////////////////////////////////////////////////////
// #region PatternMatching

const C_GLOB_META: [char; 3] = ['*', '?', '['];

/// Compile a shell-style pattern with `fnmatch` rules.
///
/// With `if_literal_separator`, `*` and `?` never match `/` (path globbing);
/// without it the pattern behaves like `fnmatch` on a single name.
pub(crate) fn compile_glob(
    pattern: &str,
    if_literal_separator: bool,
) -> Result<GlobMatcher, FileIoError> {
    let glob = GlobBuilder::new(&translate_fnmatch(pattern))
        .literal_separator(if_literal_separator)
        .backslash_escape(false)
        .build()
        .map_err(|e| FileIoError::InvalidPattern(format!("`{pattern}` ({e})")))?;
    Ok(glob.compile_matcher())
}

/// Rewrite an `fnmatch` pattern into globset syntax.
///
/// Braces are literal, runs of `*` collapse to one `*`, and a `[` without a
/// closing `]` is literal. A leading `^` in a class is a member, not a
/// negation.
fn translate_fnmatch(pattern: &str) -> String {
    let l_chars: Vec<char> = pattern.chars().collect();
    let n_len = l_chars.len();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut idx = 0;
    while idx < n_len {
        let ch = l_chars[idx];
        idx += 1;
        match ch {
            '*' => {
                while idx < n_len && l_chars[idx] == '*' {
                    idx += 1;
                }
                out.push('*');
            }
            '{' => out.push_str("[{]"),
            '}' => out.push_str("[}]"),
            '[' => {
                let mut idx_end = idx;
                if idx_end < n_len && l_chars[idx_end] == '!' {
                    idx_end += 1;
                }
                if idx_end < n_len && l_chars[idx_end] == ']' {
                    idx_end += 1;
                }
                while idx_end < n_len && l_chars[idx_end] != ']' {
                    idx_end += 1;
                }
                if idx_end >= n_len {
                    out.push_str("[[]");
                    continue;
                }
                let body: String = l_chars[idx..idx_end].iter().collect();
                match body.strip_prefix('^') {
                    Some("") => out.push('^'),
                    Some(rest) => {
                        out.push('[');
                        out.push_str(rest);
                        out.push_str("^]");
                    }
                    None => {
                        out.push('[');
                        out.push_str(&body);
                        out.push(']');
                    }
                }
                idx = idx_end + 1;
            }
            other => out.push(other),
        }
    }
    out
}

/// Split a glob into its literal directory prefix and the remaining pattern.
///
/// The prefix keeps its trailing `/`; it is empty when the first component
/// already contains a wildcard. Returns `None` for patterns without wildcards.
pub(crate) fn split_glob_prefix(pattern: &str) -> Option<(&str, &str)> {
    let idx_meta = pattern.find(C_GLOB_META)?;
    let idx_split = pattern[..idx_meta].rfind('/').map(|i| i + 1).unwrap_or(0);
    Some((&pattern[..idx_split], &pattern[idx_split..]))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

/// Join a base path and a child name with `/`, like `os.path.join`.
pub(crate) fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() || name.starts_with('/') {
        return name.to_string();
    }
    if base.ends_with('/') {
        return format!("{base}{name}");
    }
    format!("{base}/{name}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{compile_glob, join_path, split_glob_prefix, translate_fnmatch};
    use crate::spec::FileIoError;

    #[test]
    fn fnmatch_style_glob_matches_basenames() {
        let matcher = compile_glob("*.png", false).unwrap();
        assert!(matcher.is_match("a.png"));
        assert!(!matcher.is_match("b.txt"));

        let matcher = compile_glob("img_[!0-4].png", false).unwrap();
        assert!(matcher.is_match("img_7.png"));
        assert!(!matcher.is_match("img_3.png"));
    }

    #[test]
    fn literal_separator_keeps_star_within_component() {
        let matcher = compile_glob("/data/*.csv", true).unwrap();
        assert!(matcher.is_match("/data/a.csv"));
        assert!(!matcher.is_match("/data/sub/a.csv"));
    }

    #[test]
    fn braces_backslashes_and_open_brackets_are_literal() {
        let matcher = compile_glob("{a,b}.txt", false).unwrap();
        assert!(matcher.is_match("{a,b}.txt"));
        assert!(!matcher.is_match("a.txt"));
        assert!(!matcher.is_match("b.txt"));

        let matcher = compile_glob("[x", false).unwrap();
        assert!(matcher.is_match("[x"));
        assert!(!matcher.is_match("x"));

        let matcher = compile_glob(r"a\*", false).unwrap();
        assert!(matcher.is_match(r"a\bc"));
        assert!(!matcher.is_match("a*"));

        let matcher = compile_glob("[^a]x", false).unwrap();
        assert!(matcher.is_match("^x"));
        assert!(matcher.is_match("ax"));
        assert!(!matcher.is_match("bx"));
    }

    #[test]
    fn translation_collapses_stars_and_keeps_classes() {
        assert_eq!(translate_fnmatch("**/x.csv"), "*/x.csv");
        assert_eq!(translate_fnmatch("[!_]*"), "[!_]*");
        assert_eq!(translate_fnmatch("[]]"), "[]]");
        assert_eq!(translate_fnmatch("[^]"), "^");
        assert_eq!(translate_fnmatch("{a}"), "[{]a[}]");
    }

    #[test]
    fn invalid_range_rejected() {
        assert!(matches!(
            compile_glob("[z-a]", false),
            Err(FileIoError::InvalidPattern(_))
        ));
    }

    #[test]
    fn glob_prefix_split() {
        assert_eq!(
            split_glob_prefix("/data/run_*/x.csv"),
            Some(("/data/", "run_*/x.csv"))
        );
        assert_eq!(split_glob_prefix("*.txt"), Some(("", "*.txt")));
        assert_eq!(split_glob_prefix("/plain/path"), None);
        assert_eq!(split_glob_prefix("/data/{a,b}.txt"), None);
    }

    #[test]
    fn join_path_behaves_like_os_path_join() {
        assert_eq!(join_path("/a", "b"), "/a/b");
        assert_eq!(join_path("/a/", "b"), "/a/b");
        assert_eq!(join_path("", "b"), "b");
        assert_eq!(join_path("gs://bucket", "k"), "gs://bucket/k");
        assert_eq!(join_path("/a", "/abs"), "/abs");
    }
}
