//! Glob expansion over listing entries.
//!
//! Patterns are matched against an entry's path relative to the listing
//! root, segment by segment:
//!
//! - `*` matches within one segment, `?` matches one character
//! - `[abc]`, `[a-z]`, `[!abc]` match one character from a class
//! - `{a,b}` expands to alternatives
//! - `**` matches zero or more whole segments
//!
//! A leading `/` is accepted and ignored: every pattern is anchored at the
//! listing root, so `*.txt` only matches top-level files.

use std::cell::Cell;

use filestore_common::{Error, NormalizedPath, Result};

/// Upper bound on matcher steps per path; pathological patterns give up
/// and count as no match.
const MAX_MATCH_CALLS: usize = 100_000;

/// One segment of a compiled pattern.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Wildcard(Vec<char>),
    Globstar,
}

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    alternatives: Vec<Vec<Segment>>,
}

/// Anything the expander can filter: it must know its path relative to the
/// listing root.
pub trait Matchable {
    /// Path relative to the listing root.
    fn relative_path(&self) -> &NormalizedPath;
}

impl Matchable for NormalizedPath {
    fn relative_path(&self) -> &NormalizedPath {
        self
    }
}

impl Pattern {
    /// Compile a glob pattern.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty pattern, an unclosed `[` or `{`, or a
    ///   `..` segment
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.trim_matches('/').is_empty() {
            return Err(Error::InvalidInput("Empty glob pattern".to_string()));
        }

        let alternatives = expand_braces(pattern)?
            .iter()
            .map(|alt| compile(alt))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source: pattern.to_string(),
            alternatives,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether a root-relative path matches.
    pub fn matches(&self, path: &NormalizedPath) -> bool {
        let components: Vec<&str> = path.segments().iter().map(String::as_str).collect();
        self.alternatives.iter().any(|segments| {
            let budget = Budget::new();
            match_segments(segments, &components, &budget)
        })
    }

    /// Keep the entries whose relative path matches, in input order.
    pub fn expand<T: Matchable>(&self, entries: Vec<T>) -> Vec<T> {
        entries
            .into_iter()
            .filter(|entry| self.matches(entry.relative_path()))
            .collect()
    }
}

fn compile(pattern: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    for part in pattern.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(Error::InvalidInput(format!(
                    "'..' is not allowed in pattern '{}'",
                    pattern
                )));
            }
            "**" => {
                if !matches!(segments.last(), Some(Segment::Globstar)) {
                    segments.push(Segment::Globstar);
                }
            }
            part if is_literal(part) => segments.push(Segment::Literal(part.to_string())),
            part => {
                check_classes(part)?;
                let mut chars: Vec<char> = part.chars().collect();
                chars.dedup_by(|a, b| *a == '*' && *b == '*');
                segments.push(Segment::Wildcard(chars));
            }
        }
    }
    Ok(segments)
}

fn is_literal(part: &str) -> bool {
    !part.contains(['*', '?', '['])
}

fn check_classes(part: &str) -> Result<()> {
    let mut open = false;
    for c in part.chars() {
        match c {
            '[' if !open => open = true,
            ']' if open => open = false,
            _ => {}
        }
    }
    if open {
        return Err(Error::InvalidInput(format!("Unclosed '[' in '{}'", part)));
    }
    Ok(())
}

/// Expand `{a,b}` groups into separate patterns. Nested groups are
/// expanded recursively.
fn expand_braces(pattern: &str) -> Result<Vec<String>> {
    let Some(start) = pattern.find('{') else {
        return Ok(vec![pattern.to_string()]);
    };

    let mut depth = 0;
    let mut end = None;
    let mut splits = Vec::new();
    for (i, c) in pattern[start..].char_indices() {
        let idx = start + i;
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(idx);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(idx),
            _ => {}
        }
    }
    let end = end.ok_or_else(|| {
        Error::InvalidInput(format!("Unclosed '{{' in pattern '{}'", pattern))
    })?;

    let prefix = &pattern[..start];
    let suffix = &pattern[end + 1..];
    let mut bounds = vec![start];
    bounds.extend(splits);
    bounds.push(end);

    let mut expanded = Vec::new();
    for pair in bounds.windows(2) {
        let option = &pattern[pair[0] + 1..pair[1]];
        expanded.extend(expand_braces(&format!("{}{}{}", prefix, option, suffix))?);
    }
    Ok(expanded)
}

fn match_segments(segments: &[Segment], components: &[&str], budget: &Budget) -> bool {
    if !budget.spend() {
        return false;
    }
    match segments.split_first() {
        None => components.is_empty(),
        Some((Segment::Globstar, rest)) => (0..=components.len())
            .any(|skip| match_segments(rest, &components[skip..], budget)),
        Some((Segment::Literal(lit), rest)) => components
            .split_first()
            .is_some_and(|(component, remaining)| {
                lit.as_str() == *component && match_segments(rest, remaining, budget)
            }),
        Some((Segment::Wildcard(pat), rest)) => components
            .split_first()
            .is_some_and(|(component, remaining)| {
                let text: Vec<char> = component.chars().collect();
                match_wildcard(pat, &text, budget) && match_segments(rest, remaining, budget)
            }),
    }
}

/// Match one path segment against a wildcard pattern.
fn match_wildcard(pat: &[char], text: &[char], budget: &Budget) -> bool {
    if !budget.spend() {
        return false;
    }
    match pat.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => {
            (0..=text.len()).any(|skip| match_wildcard(rest, &text[skip..], budget))
        }
        Some(('?', rest)) => !text.is_empty() && match_wildcard(rest, &text[1..], budget),
        Some(('[', _)) => match (text.first(), parse_class(&pat[1..])) {
            (Some(&c), Some((class, consumed))) => {
                class.matches(c) && match_wildcard(&pat[1 + consumed..], &text[1..], budget)
            }
            _ => false,
        },
        Some((&p, rest)) => text.first() == Some(&p) && match_wildcard(rest, &text[1..], budget),
    }
}

/// Recursion budget shared by one `matches` call. Once spent, every
/// remaining branch reports no match.
struct Budget {
    calls: Cell<usize>,
}

impl Budget {
    fn new() -> Self {
        Self { calls: Cell::new(0) }
    }

    fn spend(&self) -> bool {
        let count = self.calls.get() + 1;
        self.calls.set(count);
        count <= MAX_MATCH_CALLS
    }
}

struct CharClass {
    negated: bool,
    items: Vec<(char, char)>,
}

impl CharClass {
    fn matches(&self, c: char) -> bool {
        let hit = self.items.iter().any(|&(lo, hi)| lo <= c && c <= hi);
        hit != self.negated
    }
}

/// Parse a class body after `[`. Returns the class and the number of chars
/// consumed including the closing `]`.
fn parse_class(body: &[char]) -> Option<(CharClass, usize)> {
    let mut idx = 0;
    let negated = matches!(body.first(), Some('!') | Some('^'));
    if negated {
        idx += 1;
    }

    let mut items = Vec::new();
    let mut first = true;
    while idx < body.len() {
        let c = body[idx];
        if c == ']' && !first {
            return Some((CharClass { negated, items }, idx + 1));
        }
        first = false;
        if idx + 2 < body.len() && body[idx + 1] == '-' && body[idx + 2] != ']' {
            items.push((c, body[idx + 2]));
            idx += 3;
        } else {
            items.push((c, c));
            idx += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(path: &str) -> NormalizedPath {
        NormalizedPath::parse(path).unwrap()
    }

    fn matches(pattern: &str, path: &str) -> bool {
        Pattern::new(pattern).unwrap().matches(&p(path))
    }

    #[test]
    fn test_star_stays_in_segment() {
        assert!(matches("*.txt", "file01.txt"));
        assert!(!matches("*.txt", "dir/file01.txt"));
        assert!(matches("dir/*.txt", "dir/file01.txt"));
    }

    #[test]
    fn test_globstar_spans_segments() {
        assert!(matches("**", "a"));
        assert!(matches("**", "a/b/c.txt"));
        assert!(matches("**/*.txt", "top.txt"));
        assert!(matches("**/*.txt", "a/b/deep.txt"));
        assert!(matches("a/**/z", "a/z"));
        assert!(matches("a/**/z", "a/b/c/z"));
        assert!(!matches("a/**/z", "b/z"));
    }

    #[test]
    fn test_anchored_at_depth() {
        assert!(matches("/subdir*/**/*.txt", "subdir 01/file moved.txt"));
        assert!(matches("/subdir*/**/*.txt", "subdir-02/x/y.txt"));
        assert!(!matches("/subdir*/**/*.txt", "file01.txt"));
        assert!(!matches("/subdir*/**/*.txt", "other/subdir 01/a.txt"));
    }

    #[test]
    fn test_question_and_classes() {
        assert!(matches("file0?.txt", "file01.txt"));
        assert!(!matches("file0?.txt", "file001.txt"));
        assert!(matches("file[0-9][0-9].txt", "file42.txt"));
        assert!(!matches("file[!0-9]*.txt", "file4.txt"));
        assert!(matches("file[!0-9]*.txt", "filex.txt"));
        assert!(matches("[]]", "]"));
    }

    #[test]
    fn test_braces() {
        assert!(matches("*.{txt,json}", "a.json"));
        assert!(matches("*.{txt,json}", "a.txt"));
        assert!(!matches("*.{txt,json}", "a.md"));
        assert!(matches("{a,b/{c,d}}/x", "b/d/x"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(Pattern::new("").is_err());
        assert!(Pattern::new("/").is_err());
        assert!(Pattern::new("file[0-9").is_err());
        assert!(Pattern::new("*.{txt").is_err());
        assert!(Pattern::new("../*").is_err());
    }

    #[test]
    fn test_backtracking_is_bounded() {
        let long = "a".repeat(40);
        let started = std::time::Instant::now();
        assert!(!matches("*a*a*a*a*a*a*a*a*a*b", &long));
        assert!(!matches("**/**/x*y*z*/**/q", &vec!["xa"; 30].join("/")));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));

        // Ordinary star-heavy patterns still match.
        assert!(matches("*a*a*", &long));
        assert!(matches("**/*.txt", &format!("{}/f.txt", vec!["d"; 30].join("/"))));
    }

    #[test]
    fn test_expand_preserves_order() {
        let entries = vec![p("b.txt"), p("a.md"), p("c/d.txt"), p("a.txt")];
        let matched = Pattern::new("**/*.txt").unwrap().expand(entries);
        let names: Vec<String> = matched.iter().map(|e| e.as_relative()).collect();
        assert_eq!(names, vec!["b.txt", "c/d.txt", "a.txt"]);
    }
}
