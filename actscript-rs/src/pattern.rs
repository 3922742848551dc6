//! Pattern matching for `Replace` rules and the `like` / `match` functions.
//!
//! ## Match modes
//!
//! | Mode | Description |
//! |------|-------------|
//! | [`MatchMode::Regex`]  | [`regex`] crate syntax; `$1` / `${name}` in replacements |
//! | [`MatchMode::Glob`]   | `*`, `?`, `[…]` / `[^…]`, `\x`; whole-text match |
//! | [`MatchMode::Exact`]  | whole-text equality |
//! | [`MatchMode::Substr`] | substring search |
//!
//! All modes are case-insensitive unless the pattern is built with
//! [`Pattern::case_sensitive`].

use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    Regex,
    Glob,
    Exact,
    Substr,
}

impl MatchMode {
    /// Parse a mode name (`regex`, `glob`, `exact`, `substr`), ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "regex" | "regexp" => Some(MatchMode::Regex),
            "glob" | "wildcard" => Some(MatchMode::Glob),
            "exact" | "simple" => Some(MatchMode::Exact),
            "substr" | "substring" => Some(MatchMode::Substr),
            _ => None,
        }
    }
}

/// Error returned when a pattern cannot be compiled.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("regex error: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("glob error: {0}")]
    InvalidGlob(String),
}

// Arc so that cloning a Pattern never recompiles.
#[derive(Clone)]
enum Compiled {
    Regex(Arc<Regex>),
    Glob(Vec<char>),
    Exact,
    /// Lowercased needle when case-insensitive.
    Substr(String),
}

/// A compiled pattern.
#[derive(Clone)]
pub struct Pattern {
    src: String,
    mode: MatchMode,
    ignore_case: bool,
    compiled: Compiled,
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern")
            .field("src", &self.src)
            .field("mode", &self.mode)
            .field("ignore_case", &self.ignore_case)
            .finish()
    }
}

impl Pattern {
    /// Compile a case-insensitive pattern.
    pub fn new(src: &str, mode: MatchMode) -> Result<Self, PatternError> {
        Self::build(src, mode, true)
    }

    pub fn case_sensitive(src: &str, mode: MatchMode) -> Result<Self, PatternError> {
        Self::build(src, mode, false)
    }

    fn build(src: &str, mode: MatchMode, ignore_case: bool) -> Result<Self, PatternError> {
        let compiled = match mode {
            MatchMode::Regex => Compiled::Regex(Arc::new(
                RegexBuilder::new(src)
                    .case_insensitive(ignore_case)
                    .dot_matches_new_line(true)
                    .build()?,
            )),
            MatchMode::Glob => {
                check_glob(src).map_err(PatternError::InvalidGlob)?;
                Compiled::Glob(src.chars().collect())
            }
            MatchMode::Exact => Compiled::Exact,
            MatchMode::Substr => Compiled::Substr(if ignore_case {
                src.to_lowercase()
            } else {
                src.to_owned()
            }),
        };
        Ok(Pattern {
            src: src.to_owned(),
            mode,
            ignore_case,
            compiled,
        })
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Returns `true` if this pattern matches `text`.
    pub fn matches(&self, text: &str) -> bool {
        match &self.compiled {
            Compiled::Regex(re) => re.is_match(text),
            Compiled::Glob(p) => {
                let t: Vec<char> = text.chars().collect();
                glob_match(p, &t, self.ignore_case)
            }
            Compiled::Exact => self.eq_text(text),
            Compiled::Substr(needle) => self.find_substr(text, needle).is_some(),
        }
    }

    /// Replace every match in `text` with `replacement`.
    ///
    /// Regex replacements expand `$1`-style group references; glob and exact
    /// patterns replace the whole text when it matches.
    pub fn replace_all(&self, text: &str, replacement: &str) -> String {
        match &self.compiled {
            Compiled::Regex(re) => re.replace_all(text, replacement).into_owned(),
            Compiled::Glob(_) | Compiled::Exact => {
                if self.matches(text) {
                    replacement.to_owned()
                } else {
                    text.to_owned()
                }
            }
            Compiled::Substr(needle) => {
                if needle.is_empty() {
                    return text.to_owned();
                }
                let mut out = String::with_capacity(text.len());
                let mut rest = text;
                while let Some((start, end)) = self.find_substr(rest, needle) {
                    out.push_str(&rest[..start]);
                    out.push_str(replacement);
                    rest = &rest[end..];
                }
                out.push_str(rest);
                out
            }
        }
    }

    fn eq_text(&self, text: &str) -> bool {
        if self.ignore_case {
            text.to_lowercase() == self.src.to_lowercase()
        } else {
            text == self.src
        }
    }

    /// Byte range of the first occurrence of `needle` in `text`.
    fn find_substr(&self, text: &str, needle: &str) -> Option<(usize, usize)> {
        if !self.ignore_case {
            return text.find(needle).map(|s| (s, s + needle.len()));
        }
        if text.is_ascii() && needle.is_ascii() {
            return substr_find_ascii_ci(text, needle);
        }
        // Non-ASCII: compare lowercased char windows and map back to bytes.
        let needle_len = needle.chars().count();
        let starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        for (k, &start) in starts.iter().enumerate() {
            let end = starts.get(k + needle_len).copied().unwrap_or(text.len());
            if k + needle_len > starts.len() {
                break;
            }
            if text[start..end].to_lowercase() == needle {
                return Some((start, end));
            }
        }
        None
    }
}

/// ASCII case-insensitive substring search without allocating.
fn substr_find_ascii_ci(text: &str, needle_lower: &str) -> Option<(usize, usize)> {
    let h = text.as_bytes();
    let n = needle_lower.as_bytes();
    if n.is_empty() {
        return Some((0, 0));
    }
    if n.len() > h.len() {
        return None;
    }
    (0..=h.len() - n.len())
        .find(|&i| h[i..i + n.len()].iter().zip(n).all(|(a, b)| a.to_ascii_lowercase() == *b))
        .map(|i| (i, i + n.len()))
}

// ── Glob matching ─────────────────────────────────────────────────────────────
//
//   *      any sequence of characters
//   ?      any single character
//   [...]  character class, `[^...]` negated, `a-z` ranges
//   \x     literal x

fn check_glob(src: &str) -> Result<(), String> {
    let mut chars = src.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if chars.next().is_none() {
                    return Err("pattern ends with '\\'".into());
                }
            }
            '[' => {
                let mut closed = false;
                for d in chars.by_ref() {
                    if d == ']' {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(format!("unmatched '[' in {src:?}"));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn chars_eq(a: char, b: char, ignore_case: bool) -> bool {
    a == b || (ignore_case && a.to_lowercase().eq(b.to_lowercase()))
}

/// Match one pattern element at `p[0]` against `c`; returns the pattern
/// length consumed on success.
fn match_one(p: &[char], c: char, ignore_case: bool) -> Option<usize> {
    match p[0] {
        '?' => Some(1),
        '\\' if p.len() > 1 => chars_eq(p[1], c, ignore_case).then_some(2),
        '[' => {
            let mut i = 1;
            let negated = p.get(1) == Some(&'^');
            if negated {
                i += 1;
            }
            let mut matched = false;
            while i < p.len() && p[i] != ']' {
                if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
                    let (lo, hi) = (p[i], p[i + 2]);
                    let in_range = |x: char| lo <= x && x <= hi;
                    if in_range(c)
                        || (ignore_case
                            && (c.to_lowercase().any(in_range) || c.to_uppercase().any(in_range)))
                    {
                        matched = true;
                    }
                    i += 3;
                } else {
                    if chars_eq(p[i], c, ignore_case) {
                        matched = true;
                    }
                    i += 1;
                }
            }
            (matched != negated).then_some(i + 1)
        }
        lit => chars_eq(lit, c, ignore_case).then_some(1),
    }
}

/// Whole-text glob match with single-star backtracking.
fn glob_match(p: &[char], t: &[char], ignore_case: bool) -> bool {
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            pi += 1;
            star = Some((pi, ti));
            continue;
        }
        if pi < p.len() {
            if let Some(n) = match_one(&p[pi..], t[ti], ignore_case) {
                pi += n;
                ti += 1;
                continue;
            }
        }
        match star {
            Some((sp, st)) => {
                pi = sp;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_is_case_insensitive_by_default() {
        let p = Pattern::new("hello", MatchMode::Regex).unwrap();
        assert!(p.matches("say HELLO"));
        let p = Pattern::case_sensitive("hello", MatchMode::Regex).unwrap();
        assert!(!p.matches("say HELLO"));
    }

    #[test]
    fn regex_replace_expands_groups() {
        let p = Pattern::new(r"(\w+)@(\w+)", MatchMode::Regex).unwrap();
        assert_eq!(p.replace_all("a@b c@d", "$2.$1"), "b.a d.c");
    }

    #[test]
    fn invalid_patterns_are_errors() {
        assert!(Pattern::new("(", MatchMode::Regex).is_err());
        assert!(Pattern::new("[abc", MatchMode::Glob).is_err());
        assert!(Pattern::new("abc\\", MatchMode::Glob).is_err());
    }

    #[test]
    fn glob_matching() {
        let m = |p: &str, t: &str| Pattern::new(p, MatchMode::Glob).unwrap().matches(t);
        assert!(m("*.txt", "README.TXT"));
        assert!(m("a?c", "abc"));
        assert!(!m("a?c", "abbc"));
        assert!(m("[a-c]*", "banana"));
        assert!(!m("[^a-c]*", "banana"));
        assert!(m("*a*a*a", "aaaa"));
        assert!(m("\\*", "*"));
        assert!(m("", ""));
        assert!(!m("", "x"));
    }

    #[test]
    fn substr_replace_ignores_case() {
        let p = Pattern::new("ab", MatchMode::Substr).unwrap();
        assert_eq!(p.replace_all("xAByab", "-"), "x-y-");
        let p = Pattern::new("é", MatchMode::Substr).unwrap();
        assert_eq!(p.replace_all("cafÉ!", "e"), "cafe!");
    }

    #[test]
    fn exact_mode() {
        let p = Pattern::new("Yes", MatchMode::Exact).unwrap();
        assert!(p.matches("yes"));
        assert!(!p.matches("yes!"));
        assert_eq!(p.replace_all("YES", "1"), "1");
    }

    #[test]
    fn mode_names() {
        assert_eq!(MatchMode::from_name("Glob"), Some(MatchMode::Glob));
        assert_eq!(MatchMode::from_name("nope"), None);
    }
}
