//! Document addresses ("composite keys").
//!
//! An [`Address`] is an ordered list of [`Segment`]s, each a mapping key or a
//! list index. The string form is dot separated with a reserved `root` prefix:
//!
//! ```text
//! root                      the document itself
//! root.seo.description      document["seo"]["description"]
//! root.gallery.2.caption    document["gallery"][2]["caption"]
//! ```
//!
//! Keys containing `.` or `\` are written with a backslash escape, and keys
//! that look like an index (`"2"`) get a leading backslash so they survive the
//! round trip as keys. The empty key has no string form: schema fields never
//! resolve to one, and [`Address::parse`] rejects empty segments.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FieldError, Result};

/// Reserved leading segment of the string form.
pub const ROOT: &str = "root";

/// One step of an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// Key into a mapping. Must not be empty to have a string form.
    Key(String),
    /// Position in a list.
    Index(usize),
}

impl Segment {
    /// The key, if this is a mapping step.
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Segment::Key(k) => Some(k),
            Segment::Index(_) => None,
        }
    }

    /// The position, if this is a list step.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Key(_) => None,
            Segment::Index(i) => Some(*i),
        }
    }
}

impl From<&str> for Segment {
    fn from(value: &str) -> Self {
        Segment::Key(value.to_string())
    }
}

impl From<String> for Segment {
    fn from(value: String) -> Self {
        Segment::Key(value)
    }
}

impl From<usize> for Segment {
    fn from(value: usize) -> Self {
        Segment::Index(value)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Index(i) => write!(f, "{i}"),
            Segment::Key(k) => {
                if is_index_like(k) {
                    f.write_str("\\")?;
                }
                for ch in k.chars() {
                    if ch == '.' || ch == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{ch}")?;
                }
                Ok(())
            }
        }
    }
}

fn is_index_like(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Resolved location inside a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Vec<Segment>);

impl Address {
    /// The empty address, i.e. the document root.
    pub fn root() -> Self {
        Address(Vec::new())
    }

    /// Address made of `segments`, outermost first.
    pub fn new(segments: Vec<Segment>) -> Self {
        Address(segments)
    }

    /// Segments, outermost first.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Number of segments; the root has none.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Innermost segment.
    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Address of a mapping key below this one. An empty `key` yields an
    /// address without a string form.
    pub fn key(&self, key: impl Into<String>) -> Address {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.into()));
        Address(segments)
    }

    /// Address of a list item below this one.
    pub fn index(&self, index: usize) -> Address {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Address(segments)
    }

    /// Address with the last segment removed; the root stays the root.
    pub fn drop_last(&self) -> Address {
        let mut segments = self.0.clone();
        segments.pop();
        Address(segments)
    }

    /// Parent address, or `None` for the root.
    pub fn parent(&self) -> Option<Address> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.drop_last())
        }
    }

    /// Whether `prefix` is this address or one of its ancestors.
    pub fn starts_with(&self, prefix: &Address) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Whether one address is an ancestor of (or equal to) the other.
    pub fn overlaps(&self, other: &Address) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// Parse the dot-separated string form. The `root` prefix is optional.
    pub fn parse(s: &str) -> Result<Address> {
        if s.is_empty() || s == ROOT {
            return Ok(Address::root());
        }
        let rest = s.strip_prefix("root.").unwrap_or(s);

        let malformed = |reason: &str| FieldError::AddressResolution {
            address: Address::root(),
            reason: format!("malformed address `{s}`: {reason}"),
        };

        let mut segments = Vec::new();
        let mut buf = String::new();
        let mut escaped = false;
        let mut chars = rest.chars();
        loop {
            match chars.next() {
                Some('\\') => {
                    let Some(ch) = chars.next() else {
                        return Err(malformed("dangling escape"));
                    };
                    buf.push(ch);
                    escaped = true;
                }
                Some('.') => {
                    segments.push(finish_segment(&buf, escaped).map_err(malformed)?);
                    buf.clear();
                    escaped = false;
                }
                Some(ch) => buf.push(ch),
                None => {
                    segments.push(finish_segment(&buf, escaped).map_err(malformed)?);
                    break;
                }
            }
        }
        Ok(Address(segments))
    }
}

fn finish_segment(buf: &str, escaped: bool) -> std::result::Result<Segment, &'static str> {
    if buf.is_empty() {
        return Err("empty segment");
    }
    if !escaped && is_index_like(buf) {
        return buf
            .parse::<usize>()
            .map(Segment::Index)
            .map_err(|_| "index out of range");
    }
    Ok(Segment::Key(buf.to_string()))
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(ROOT)?;
        for seg in &self.0 {
            write!(f, ".{seg}")?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

impl<S: Into<Segment>> FromIterator<S> for Address {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Address(iter.into_iter().map(Into::into).collect())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Build an [`Address`] from a mix of keys and indices.
///
/// ```rust
/// use fieldtree::addr;
///
/// let a = addr!["gallery", 2, "caption"];
/// assert_eq!(a.to_string(), "root.gallery.2.caption");
/// ```
#[macro_export]
macro_rules! addr {
    () => { $crate::address::Address::root() };
    ($($seg:expr),+ $(,)?) => {
        $crate::address::Address::new(vec![$($crate::address::Segment::from($seg)),+])
    };
}
