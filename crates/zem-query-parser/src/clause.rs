use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::parser::TOKEN_RULES;

/// Entry field a clause is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Name,
    Kind,
    File,
    Extra,
    /// Not an entry field: consumed by the editor shell (e.g. `-tab`)
    Option,
}

impl Attribute {
    pub const ALL: [Attribute; 5] = [
        Attribute::Name,
        Attribute::Kind,
        Attribute::File,
        Attribute::Extra,
        Attribute::Option,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Attribute::Name => "name",
            Attribute::Kind => "kind",
            Attribute::File => "file",
            Attribute::Extra => "extra",
            Attribute::Option => "option",
        }
    }
}

/// How a clause value is compared with its target field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// Value characters appear in order, arbitrary gaps allowed
    Fuzzy,
    /// Field starts with the value
    Prefix,
    /// Field equals the value
    Exact,
    /// Contributes nothing to the predicate
    Ignore,
}

impl MatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::Fuzzy => "fuzzy",
            MatchMode::Prefix => "prefix",
            MatchMode::Exact => "exact",
            MatchMode::Ignore => "ignore",
        }
    }
}

/// How clauses of the same attribute combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grouping {
    /// Every clause is a separate required constraint
    And,
    /// Clauses of the attribute are alternatives, at least one must hold
    Or,
    /// Not part of the predicate at all
    Ungrouped,
}

impl Grouping {
    pub fn as_str(self) -> &'static str {
        match self {
            Grouping::And => "and",
            Grouping::Or => "or",
            Grouping::Ungrouped => "none",
        }
    }
}

/// Returned when a clause component name crosses a text boundary and is not known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownName {
    pub what: &'static str,
    pub name: String,
}

impl fmt::Display for UnknownName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.what, self.name)
    }
}

impl std::error::Error for UnknownName {}

impl FromStr for Attribute {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Attribute::Name),
            // "type" is what the index schema called the kind column
            "kind" | "type" => Ok(Attribute::Kind),
            "file" => Ok(Attribute::File),
            "extra" => Ok(Attribute::Extra),
            "option" => Ok(Attribute::Option),
            _ => Err(UnknownName {
                what: "attribute",
                name: s.to_string(),
            }),
        }
    }
}

impl FromStr for MatchMode {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fuzzy" => Ok(MatchMode::Fuzzy),
            "prefix" => Ok(MatchMode::Prefix),
            "exact" => Ok(MatchMode::Exact),
            "ignore" => Ok(MatchMode::Ignore),
            _ => Err(UnknownName {
                what: "match mode",
                name: s.to_string(),
            }),
        }
    }
}

impl FromStr for Grouping {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "and" => Ok(Grouping::And),
            "or" => Ok(Grouping::Or),
            "none" | "" => Ok(Grouping::Ungrouped),
            _ => Err(UnknownName {
                what: "grouping",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed unit of a query. The value borrows from the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Clause<'a> {
    pub attribute: Attribute,
    pub mode: MatchMode,
    pub grouping: Grouping,
    pub value: &'a str,
}

impl<'a> Clause<'a> {
    /// The query prefix that produces this kind of clause, if any rule does
    pub fn prefix(&self) -> Option<&'static str> {
        TOKEN_RULES
            .iter()
            .find(|rule| rule.attribute == self.attribute && rule.mode == self.mode)
            .map(|rule| rule.prefix)
    }
}

impl fmt::Display for Clause<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix().unwrap_or_default(), self.value)
    }
}

/// Stack-allocated for queries with up to 8 clauses
pub type ClauseVec<'a> = SmallVec<[Clause<'a>; 8]>;

/// Render clauses back into query text
pub fn clauses_to_string(clauses: &[Clause<'_>]) -> String {
    clauses
        .iter()
        .map(|clause| clause.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
