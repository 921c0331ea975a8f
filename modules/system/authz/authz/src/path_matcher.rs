//! Path patterns for HTTP permissions.
//!
//! - `/a/b` matches exactly `/a/b`
//! - `/a/b/*` matches `/a/b` and everything below it, but not `/a/bc`
//! - `/a/*/c` matches exactly one segment in place of `*`
//! - `/*` matches every path
//!
//! Paths are normalized before matching: repeated and trailing slashes are
//! collapsed and any query or fragment is dropped.

use std::fmt;

/// Error raised for malformed patterns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathPatternError {
    #[error("path pattern '{0}' must start with '/'")]
    NotAbsolute(String),

    #[error("path pattern '{0}' may only use '*' as a whole segment")]
    PartialWildcard(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
}

/// Parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    prefix: bool,
}

impl PathPattern {
    /// # Errors
    ///
    /// Returns [`PathPatternError`] for relative patterns or `*` inside a segment.
    pub fn parse(pattern: &str) -> Result<Self, PathPatternError> {
        let trimmed = pattern.trim();
        if !trimmed.starts_with('/') {
            return Err(PathPatternError::NotAbsolute(pattern.to_owned()));
        }
        let mut parts: Vec<&str> = normalized_segments(trimmed).collect();
        let prefix = parts.last() == Some(&"*");
        if prefix {
            parts.pop();
        }
        let segments = parts
            .into_iter()
            .map(|part| match part {
                "*" => Ok(Segment::Any),
                p if p.contains('*') => Err(PathPatternError::PartialWildcard(pattern.to_owned())),
                p => Ok(Segment::Literal(p.to_owned())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            raw: trimmed.to_owned(),
            segments,
            prefix,
        })
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let path: Vec<&str> = normalized_segments(strip_query(path)).collect();
        let fits = if self.prefix {
            path.len() >= self.segments.len()
        } else {
            path.len() == self.segments.len()
        };
        fits && self
            .segments
            .iter()
            .zip(&path)
            .all(|(segment, part)| match segment {
                Segment::Any => true,
                Segment::Literal(literal) => literal == part,
            })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Normalized form of a request path, as used for matching.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = normalized_segments(strip_query(path)).collect();
    format!("/{}", segments.join("/"))
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or_default()
}

fn normalized_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn pattern(p: &str) -> PathPattern {
        PathPattern::parse(p).unwrap()
    }

    #[test]
    fn exact_pattern() {
        let p = pattern("/one/two");
        assert!(p.matches("/one/two"));
        assert!(p.matches("/one/two/"));
        assert!(p.matches("//one//two"));
        assert!(!p.matches("/one"));
        assert!(!p.matches("/one/two/three"));
    }

    #[test]
    fn prefix_pattern_matches_self_and_children_only() {
        let p = pattern("/one/two/*");
        assert!(p.matches("/one/two"));
        assert!(p.matches("/one/two/"));
        assert!(p.matches("/one/two/three"));
        assert!(p.matches("/one/two/three/four"));
        assert!(!p.matches("/one/twothree"));
        assert!(!p.matches("/one"));
    }

    #[test]
    fn inner_wildcard_matches_one_segment() {
        let p = pattern("/one/*/three");
        assert!(p.matches("/one/two/three"));
        assert!(p.matches("/one/2/three"));
        assert!(!p.matches("/one/three"));
        assert!(!p.matches("/one/two/2/three"));

        let nested = pattern("/api/*/items/*");
        assert!(nested.matches("/api/v1/items"));
        assert!(nested.matches("/api/v1/items/42"));
        assert!(!nested.matches("/api/v1/other/42"));
    }

    #[test]
    fn root_wildcard_matches_everything() {
        let p = pattern("/*");
        assert!(p.matches("/"));
        assert!(p.matches("/anything/at/all"));

        let root = pattern("/");
        assert!(root.matches("/"));
        assert!(!root.matches("/a"));
    }

    #[test]
    fn query_and_fragment_are_ignored() {
        let p = pattern("/secured");
        assert!(p.matches("/secured?x=1"));
        assert!(p.matches("/secured#top"));
        assert!(p.matches("/secured/?x=1#top"));
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert_eq!(
            PathPattern::parse("secured"),
            Err(PathPatternError::NotAbsolute("secured".to_owned()))
        );
        assert!(matches!(
            PathPattern::parse("/sec*"),
            Err(PathPatternError::PartialWildcard(_))
        ));
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_path("//a///b/?q=1"), "/a/b");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }
}
