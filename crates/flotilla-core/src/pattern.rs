//! Shell-style name patterns (`test*`, `test_?.rs`, `[!_]*`)
//!
//! Patterns cross process boundaries as strings, so workers rebuild the same
//! matchers the coordinator uses.

use crate::error::{HarnessError, HarnessResult};
use regex::Regex;

/// A set of glob patterns; a name matches if any pattern matches it
#[derive(Debug, Clone)]
pub struct NameMatcher {
    globs: Vec<String>,
    compiled: Vec<Regex>,
}

impl NameMatcher {
    /// Compile a list of globs
    pub fn new<S: AsRef<str>>(globs: &[S]) -> HarnessResult<Self> {
        let mut compiled = Vec::with_capacity(globs.len());
        for glob in globs {
            let glob = glob.as_ref();
            let regex = Regex::new(&glob_to_regex(glob)).map_err(|e| HarnessError::Pattern {
                pattern: glob.to_string(),
                error: e.to_string(),
            })?;
            compiled.push(regex);
        }

        Ok(Self {
            globs: globs.iter().map(|g| g.as_ref().to_string()).collect(),
            compiled,
        })
    }

    /// Single-pattern convenience constructor
    pub fn single(glob: &str) -> HarnessResult<Self> {
        Self::new(&[glob])
    }

    /// Case-sensitive match against any pattern
    pub fn matches(&self, name: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(name))
    }

    /// The source globs
    pub fn globs(&self) -> &[String] {
        &self.globs
    }
}

/// Translate a glob into an anchored regular expression
fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    let mut class: &[char] = &chars[i + 1..end];
                    out.push('[');
                    if class.first() == Some(&'!') {
                        out.push('^');
                        class = &class[1..];
                    }
                    for &c in class {
                        if c == '\\' || c == '[' || c == ']' || c == '^' {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                    out.push(']');
                    i = end;
                }
                None => out.push_str("\\["),
            },
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Index of the `]` closing the class opened at `open`, if any
fn class_end(chars: &[char], open: usize) -> Option<usize> {
    let mut j = open + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    // a leading ']' is a literal member of the class
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("test*", "test_add", true)]
    #[case("test*", "test", true)]
    #[case("test*", "helper_test", false)]
    #[case("test*.rs", "test_math.rs", true)]
    #[case("test*.rs", "test_math.rs.bak", false)]
    #[case("test_?", "test_a", true)]
    #[case("test_?", "test_ab", false)]
    #[case("[!_]*", "_private", false)]
    #[case("[!_]*", "public", true)]
    #[case("data[12]", "data2", true)]
    #[case("a.b", "axb", false)]
    #[case("weird[", "weird[", true)]
    fn test_glob_matching(#[case] glob: &str, #[case] name: &str, #[case] expected: bool) {
        let matcher = NameMatcher::single(glob).unwrap();
        assert_eq!(matcher.matches(name), expected, "{glob} vs {name}");
    }

    #[test]
    fn test_any_pattern_matches() {
        let matcher = NameMatcher::new(&["test*", "check_*"]).unwrap();
        assert!(matcher.matches("check_bounds"));
        assert!(matcher.matches("test_bounds"));
        assert!(!matcher.matches("bounds"));
        assert_eq!(matcher.globs().len(), 2);
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let matcher = NameMatcher::new::<&str>(&[]).unwrap();
        assert!(!matcher.matches("test_x"));
    }
}
