//! Test specifier grammar
//!
//! ```text
//! specifier := module_part [ ":" rest ]
//! module_part := dotted module name | path to a module file
//! rest := object [ "." member ]
//! ```
//!
//! A colon immediately followed by a path separator belongs to a drive
//! prefix (`C:\tests\test_a.rs`) and does not split the specifier.

use crate::error::{ResolutionError, ResolutionResult};
use std::fmt;

/// A parsed specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    module: String,
    rest: Option<String>,
}

impl Specifier {
    /// Parse a specifier, trimming surrounding whitespace
    pub fn parse(spec: &str) -> ResolutionResult<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ResolutionError::EmptySpecifier);
        }

        let (module, rest) = match split_point(spec) {
            Some(idx) => (&spec[..idx], Some(&spec[idx + 1..])),
            None => (spec, None),
        };

        let module = module.trim();
        if module.is_empty() {
            return Err(ResolutionError::EmptySpecifier);
        }

        Ok(Self {
            module: module.to_string(),
            rest: rest
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        })
    }

    /// The module part (dotted name or file path)
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Everything after the module separator
    pub fn rest(&self) -> Option<&str> {
        self.rest.as_deref()
    }

    /// Split `rest` into the object name and the optional member after the first dot
    pub fn object(&self) -> Option<(&str, Option<&str>)> {
        self.rest.as_deref().map(|rest| match rest.split_once('.') {
            Some((object, member)) => (object, Some(member)),
            None => (rest, None),
        })
    }

    /// Does the module part name a file rather than a dotted module?
    pub fn is_path(&self, extension: &str) -> bool {
        self.module
            .strip_suffix(extension)
            .is_some_and(|stem| stem.ends_with('.'))
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rest {
            Some(rest) => write!(f, "{}:{}", self.module, rest),
            None => write!(f, "{}", self.module),
        }
    }
}

/// Build `module:group.member` or `module:member`
pub fn join(module: &str, group: Option<&str>, member: &str) -> String {
    match group {
        Some(group) => format!("{}:{}.{}", module, group, member),
        None => format!("{}:{}", module, member),
    }
}

/// Byte index of the module separator, skipping a drive colon
fn split_point(spec: &str) -> Option<usize> {
    let bytes = spec.as_bytes();
    let mut from = 0;

    while let Some(offset) = spec[from..].find(':') {
        let idx = from + offset;
        match bytes.get(idx + 1) {
            Some(b'\\') | Some(b'/') => from = idx + 1,
            _ => return Some(idx),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("pkg.test_a", "pkg.test_a", None)]
    #[case("pkg.test_a:Group", "pkg.test_a", Some("Group"))]
    #[case("pkg.test_a:Group.test_x", "pkg.test_a", Some("Group.test_x"))]
    #[case("  tests/test_a.rs:test_fn  ", "tests/test_a.rs", Some("test_fn"))]
    #[case("C:\\work\\test_a.rs:Group", "C:\\work\\test_a.rs", Some("Group"))]
    #[case("C:/work/test_a.rs", "C:/work/test_a.rs", None)]
    #[case("pkg.test_a:", "pkg.test_a", None)]
    fn test_parse(#[case] spec: &str, #[case] module: &str, #[case] rest: Option<&str>) {
        let parsed = Specifier::parse(spec).unwrap();
        assert_eq!(parsed.module(), module);
        assert_eq!(parsed.rest(), rest);
    }

    #[test]
    fn test_empty_specifier() {
        assert_eq!(Specifier::parse("   "), Err(ResolutionError::EmptySpecifier));
        assert_eq!(Specifier::parse(":Group"), Err(ResolutionError::EmptySpecifier));
    }

    #[test]
    fn test_object_split_on_first_dot() {
        let parsed = Specifier::parse("m:Group.test_x.extra").unwrap();
        assert_eq!(parsed.object(), Some(("Group", Some("test_x.extra"))));

        let parsed = Specifier::parse("m:test_fn").unwrap();
        assert_eq!(parsed.object(), Some(("test_fn", None)));
    }

    #[test]
    fn test_path_detection() {
        assert!(Specifier::parse("a/test_b.rs").unwrap().is_path("rs"));
        assert!(!Specifier::parse("a.test_b").unwrap().is_path("rs"));
        assert!(!Specifier::parse("a.rs_helpers").unwrap().is_path("rs"));
    }

    #[test]
    fn test_display_and_join() {
        let parsed = Specifier::parse(" m : G.t ").unwrap();
        assert_eq!(parsed.to_string(), "m:G.t");
        assert_eq!(join("m", Some("G"), "t"), "m:G.t");
        assert_eq!(join("m", None, "t"), "m:t");
    }
}
