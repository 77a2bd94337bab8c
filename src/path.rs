//! Attribute paths into an entity graph.
//!
//! Paths are dot-separated attribute names with optional `[index]` suffixes
//! for list elements, e.g. `office.address[0].city`.

use std::fmt;
use std::str::FromStr;

/// A parsed attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePath {
    raw: String,
    segments: Vec<PathSegment>,
}

/// A segment in an attribute path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named attribute (e.g. "address", "city")
    Attribute(String),
    /// A list index (e.g. [0], [5])
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed path '{path}': {reason}")]
pub struct PathSyntaxError {
    pub path: String,
    pub reason: String,
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl AttributePath {
    /// Parse a path such as `emails[0].email`.
    ///
    /// # Example
    ///
    /// ```
    /// use caseschema::{AttributePath, PathSegment};
    ///
    /// let path = AttributePath::parse("office.address[0].city").unwrap();
    /// assert_eq!(path.segments().len(), 4);
    /// assert_eq!(path.segments()[2], PathSegment::Index(0));
    /// ```
    pub fn parse(path: &str) -> Result<Self, PathSyntaxError> {
        let error = |reason: String| PathSyntaxError {
            path: path.to_string(),
            reason,
        };

        if path.is_empty() {
            return Err(error("path is empty".to_string()));
        }

        let mut segments = Vec::new();
        for part in path.split('.') {
            let name_end = part.find('[').unwrap_or(part.len());
            let (name, mut rest) = part.split_at(name_end);

            if name.is_empty() {
                return Err(error("every segment must start with an attribute name".to_string()));
            }
            if !name.chars().all(is_identifier_char) {
                return Err(error(format!("'{}' is not a valid attribute name", name)));
            }
            segments.push(PathSegment::Attribute(name.to_string()));

            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .ok_or_else(|| error(format!("unterminated index in '{}'", part)))?;
                let index = rest[1..close]
                    .parse::<usize>()
                    .map_err(|_| error(format!("'{}' is not a list index", &rest[1..close])))?;
                segments.push(PathSegment::Index(index));

                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(error(format!("unexpected '{}' after index", rest)));
                }
            }
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    /// Build a path from already-validated segments.
    pub(crate) fn from_segments(segments: Vec<PathSegment>) -> Self {
        let mut raw = String::new();
        for segment in &segments {
            match segment {
                PathSegment::Attribute(name) => {
                    if !raw.is_empty() {
                        raw.push('.');
                    }
                    raw.push_str(name);
                }
                PathSegment::Index(index) => raw.push_str(&format!("[{}]", index)),
            }
        }
        Self { raw, segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Name of the attribute the path starts at.
    pub fn root(&self) -> &str {
        match self.segments.first() {
            Some(PathSegment::Attribute(name)) => name,
            _ => "",
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for AttributePath {
    type Err = PathSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
