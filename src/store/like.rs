//! SQL `LIKE`-style pattern matching for catalog lookups.
//!
//! `%` matches any run of characters (including none) and `_` matches exactly
//! one. Literal characters compare ASCII case-insensitively, as in SQLite.
//! Patterns compile once into an anchored [`Regex`].

use regex::Regex;

use crate::error::{StoreError, StoreResult};

/// A compiled `LIKE` pattern.
#[derive(Debug, Clone)]
pub struct LikePattern {
    regex: Regex,
}

impl LikePattern {
    /// Compile a `LIKE` pattern, anchored at both ends.
    pub fn new(pattern: &str) -> StoreResult<Self> {
        // `(?s)` lets wildcards span the lines of a multi-valued cell; without
        // `m`, `^` and `$` still anchor the whole cell.
        let mut source = String::from("(?s)^");
        let mut prev_run = false;
        for c in pattern.chars() {
            match c {
                '%' if prev_run => {}
                '%' => source.push_str(".*"),
                '_' => source.push('.'),
                // `(?i)` would fold non-ASCII letters too.
                c if c.is_ascii_alphabetic() => {
                    source.push('[');
                    source.push(c.to_ascii_lowercase());
                    source.push(c.to_ascii_uppercase());
                    source.push(']');
                }
                c => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
            prev_run = c == '%';
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| StoreError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { regex })
    }

    /// Compile a lookup pattern: one without wildcards matches as a substring.
    pub fn for_lookup(pattern: &str) -> StoreResult<Self> {
        if pattern.contains(['%', '_']) {
            Self::new(pattern)
        } else {
            Self::new(&format!("%{pattern}%"))
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn like(pattern: &str) -> LikePattern {
        LikePattern::new(pattern).unwrap()
    }

    #[test]
    fn prefix_pattern() {
        let p = like("AUSTEN%");
        assert!(p.matches("AUSTEN, JANE"));
        assert!(p.matches("AUSTEN"));
        assert!(!p.matches("MILTON, JOHN"));
        assert!(!p.matches("NOT AUSTEN"));
    }

    #[test]
    fn single_character_wildcard() {
        let p = like("M_LTON%");
        assert!(p.matches("MILTON, JOHN"));
        assert!(!p.matches("MLTON"));
    }

    #[test]
    fn ascii_case_insensitive() {
        assert!(like("austen%").matches("AUSTEN, JANE"));
        assert!(!like("doré%").matches("DORÉ, GUSTAVE"));
        assert!(like("DORÉ%").matches("DORÉ, GUSTAVE"));
    }

    #[test]
    fn interior_runs_backtrack() {
        let p = like("%JANE%AUSTEN%");
        assert!(p.matches("JANE JANE AUSTEN"));
        assert!(!p.matches("AUSTEN, JANE"));
        assert!(like("%%").matches(""));
        assert!(!like("_").matches(""));
    }

    #[test]
    fn multi_line_cells() {
        let cell = "SMITH, JOHN\nAUSTEN, JANE";
        assert!(!like("AUSTEN%").matches(cell));
        assert!(like("%AUSTEN%").matches(cell));
        assert!(like("SMITH%JANE").matches(cell));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(like("%(1608-1674)").matches("MILTON, JOHN (1608-1674)"));
        assert!(!like("A.B").matches("AXB"));
        assert!(like("C++%").matches("C++ PRIMER"));
        assert!(!like("[AB]%").matches("A"));
    }

    #[test]
    fn lookup_without_wildcards_is_substring() {
        let p = LikePattern::for_lookup("Milton, John").unwrap();
        assert!(p.matches("MILTON, JOHN, 1608-1674"));
        assert!(p.matches("HAWKINS, A.\nMILTON, JOHN"));
        assert!(!LikePattern::for_lookup("AUSTEN%").unwrap().matches("X AUSTEN"));
    }
}
