use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where inside `file` an entry points
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    /// 1-based line number
    Line(u32),
    /// Literal line content between two boundary characters, e.g. `/^int main()$/`.
    /// `body` is kept escaped exactly as it was written.
    Anchor { boundary: char, body: String },
}

/// Unescaped form of an anchor, ready to be compared against file lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePattern {
    pub text: String,
    pub at_start: bool,
    pub at_end: bool,
}

impl LinePattern {
    pub fn matches(&self, line: &str) -> bool {
        match (self.at_start, self.at_end) {
            (true, true) => line == self.text,
            (true, false) => line.starts_with(&self.text),
            (false, true) => line.ends_with(&self.text),
            (false, false) => line.contains(&self.text),
        }
    }
}

fn is_boundary(c: char) -> bool {
    c.is_ascii_punctuation() && !matches!(c, '\\' | '^' | '$')
}

impl Location {
    /// Parse the raw location grammar: empty means "no location", all digits is a
    /// line number and anything delimited by the same boundary character is an anchor.
    pub fn parse(raw: &str) -> Result<Option<Location>> {
        if raw.is_empty() {
            return Ok(None);
        }

        let invalid = || Error::InvalidLocation(raw.to_string());

        if raw.bytes().all(|b| b.is_ascii_digit()) {
            return raw
                .parse::<u32>()
                .map(|line| Some(Location::Line(line)))
                .map_err(|_| invalid());
        }

        let mut chars = raw.chars();
        let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
            return Err(invalid());
        };
        if first != last || !is_boundary(first) {
            return Err(invalid());
        }

        let body = &raw[first.len_utf8()..raw.len() - last.len_utf8()];
        // an odd run of trailing backslashes escapes the closing boundary
        let trailing_escapes = body.chars().rev().take_while(|&c| c == '\\').count();
        if trailing_escapes % 2 == 1 {
            return Err(invalid());
        }

        Ok(Some(Location::Anchor {
            boundary: first,
            body: body.to_string(),
        }))
    }

    pub fn line(&self) -> Option<u32> {
        match self {
            Location::Line(line) => Some(*line),
            Location::Anchor { .. } => None,
        }
    }

    /// Only the boundary character, `^`, `$` and `\` may be escaped; any other
    /// backslash is kept literally. An unescaped leading `^` and trailing `$`
    /// anchor the match to the start and end of the line.
    pub fn line_pattern(&self) -> Option<LinePattern> {
        let Location::Anchor { boundary, body } = self else {
            return None;
        };

        let mut pattern = LinePattern {
            text: String::with_capacity(body.len()),
            at_start: false,
            at_end: false,
        };

        let mut chars = body.chars().peekable();
        let mut first = true;
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.peek() {
                    Some(&next) if next == *boundary || matches!(next, '^' | '$' | '\\') => {
                        pattern.text.push(next);
                        chars.next();
                    }
                    _ => pattern.text.push('\\'),
                },
                '^' if first => pattern.at_start = true,
                '$' if chars.peek().is_none() => pattern.at_end = true,
                _ => pattern.text.push(c),
            }
            first = false;
        }

        Some(pattern)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Line(line) => write!(f, "{line}"),
            Location::Anchor { boundary, body } => write!(f, "{boundary}{body}{boundary}"),
        }
    }
}

/// One indexed unit. Entries are immutable once they are part of a generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub kind: String,
    pub file: String,
    pub extra: Option<String>,
    pub location: Option<Location>,
    pub priority: i64,
    pub subpriority: i64,
}

impl Entry {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            file: file.into(),
            extra: None,
            location: None,
            priority: 0,
            subpriority: 0,
        }
    }

    /// Build an entry from the loosely typed tuple scanners and editor shells produce
    pub fn from_raw(
        name: impl Into<String>,
        kind: impl Into<String>,
        file: impl Into<String>,
        extra: Option<&str>,
        location: Option<&str>,
        priority: i64,
        subpriority: i64,
    ) -> Result<Self> {
        let location = match location {
            Some(raw) => Location::parse(raw)?,
            None => None,
        };

        Ok(Self {
            name: name.into(),
            kind: kind.into(),
            file: file.into(),
            extra: extra.filter(|e| !e.is_empty()).map(str::to_string),
            location,
            priority,
            subpriority,
        })
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        let extra = extra.into();
        self.extra = (!extra.is_empty()).then_some(extra);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn at_line(self, line: u32) -> Self {
        self.with_location(Location::Line(line))
    }

    pub fn with_priority(mut self, priority: i64, subpriority: i64) -> Self {
        self.priority = priority;
        self.subpriority = subpriority;
        self
    }

    /// Absent extra reads as the empty string
    #[inline]
    pub fn extra(&self) -> &str {
        self.extra.as_deref().unwrap_or_default()
    }

    #[inline]
    pub fn name_len(&self) -> usize {
        self.name.chars().count()
    }

    #[inline]
    pub fn file_len(&self) -> usize {
        self.file.chars().count()
    }

    pub fn location_string(&self) -> String {
        self.location
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    /// Name, kind and file are required, everything else is optional
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.name.is_empty() {
            return Err("empty name");
        }
        if self.kind.is_empty() {
            return Err("empty kind");
        }
        if self.file.is_empty() {
            return Err("empty file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location_forms() {
        assert_eq!(Location::parse("").unwrap(), None);
        assert_eq!(Location::parse("42").unwrap(), Some(Location::Line(42)));
        assert_eq!(
            Location::parse("/^CONST_A=/").unwrap(),
            Some(Location::Anchor {
                boundary: '/',
                body: "^CONST_A=".to_string()
            })
        );
        assert_eq!(
            Location::parse("?^main$?").unwrap(),
            Some(Location::Anchor {
                boundary: '?',
                body: "^main$".to_string()
            })
        );
    }

    #[test]
    fn test_parse_malformed_locations() {
        for raw in ["loc", "12a", "/", "/abc", "abc/", "/abc?", "/abc\\/", "99999999999"] {
            assert!(
                matches!(Location::parse(raw), Err(Error::InvalidLocation(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_location_render_round_trip() {
        for raw in ["7", "/^int main(void)$/", "/a\\/b/", "|x\\|y|"] {
            let parsed = Location::parse(raw).unwrap().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
    }

    #[test]
    fn test_line_pattern_unescape() {
        let location = Location::parse(r"/^a\/b \^ \$ \\ \t$/").unwrap().unwrap();
        let pattern = location.line_pattern().unwrap();

        assert!(pattern.at_start);
        assert!(pattern.at_end);
        assert_eq!(pattern.text, r"a/b ^ $ \ \t");
        assert!(pattern.matches(r"a/b ^ $ \ \t"));
        assert!(!pattern.matches(r" a/b ^ $ \ \t"));
    }

    #[test]
    fn test_line_pattern_anchors() {
        let open = Location::parse("/CONST_A=/").unwrap().unwrap();
        let pattern = open.line_pattern().unwrap();
        assert!(!pattern.at_start && !pattern.at_end);
        assert!(pattern.matches("#define CONST_A=1"));

        let start = Location::parse("/^CONST_A=/").unwrap().unwrap();
        let pattern = start.line_pattern().unwrap();
        assert!(pattern.matches("CONST_A=1"));
        assert!(!pattern.matches("#define CONST_A=1"));

        // '$' in the middle of the body is just a character
        let middle = Location::parse("/a$b$/").unwrap().unwrap();
        let pattern = middle.line_pattern().unwrap();
        assert_eq!(pattern.text, "a$b");
        assert!(pattern.matches("x a$b"));
        assert!(!pattern.matches("a$b x"));

        assert_eq!(Location::Line(3).line_pattern(), None);
    }

    #[test]
    fn test_entry_from_raw() {
        let entry = Entry::from_raw("CONST_C", "Define", "file.B", Some("int"), Some("10"), 20, 5)
            .unwrap();
        assert_eq!(entry.location, Some(Location::Line(10)));
        assert_eq!(entry.extra(), "int");

        let entry = Entry::from_raw("file.a", "File", "file.a", Some(""), None, 10, 5).unwrap();
        assert_eq!(entry.extra, None);
        assert_eq!(entry.extra(), "");
        assert_eq!(entry.location_string(), "");

        assert!(Entry::from_raw("a", "b", "c", None, Some("loc"), 0, 0).is_err());
    }

    #[test]
    fn test_entry_lengths_count_chars() {
        let entry = Entry::new("größe", "Word", "dir/ä.txt");
        assert_eq!(entry.name_len(), 5);
        assert_eq!(entry.file_len(), 9);
    }

    #[test]
    fn test_entry_validate() {
        assert!(Entry::new("a", "b", "c").validate().is_ok());
        assert_eq!(Entry::new("", "b", "c").validate(), Err("empty name"));
        assert_eq!(Entry::new("a", "", "c").validate(), Err("empty kind"));
        assert_eq!(Entry::new("a", "b", "").validate(), Err("empty file"));
    }
}
