use crate::clause::{Attribute, Clause, ClauseVec, Grouping, MatchMode};
use crate::config::{ParserConfig, SearchConfig};

/// One row of the classification table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRule {
    pub prefix: &'static str,
    pub attribute: Attribute,
    pub mode: MatchMode,
    pub grouping: Grouping,
}

/// Classification rules in priority order. The first rule whose prefix matches wins,
/// so the prefix-less name rule has to stay last.
pub const TOKEN_RULES: [TokenRule; 6] = [
    TokenRule {
        prefix: "=",
        attribute: Attribute::Kind,
        mode: MatchMode::Prefix,
        grouping: Grouping::Or,
    },
    TokenRule {
        prefix: "/",
        attribute: Attribute::File,
        mode: MatchMode::Fuzzy,
        grouping: Grouping::And,
    },
    TokenRule {
        prefix: "-",
        attribute: Attribute::Option,
        mode: MatchMode::Ignore,
        grouping: Grouping::Ungrouped,
    },
    TokenRule {
        prefix: ":",
        attribute: Attribute::Extra,
        mode: MatchMode::Fuzzy,
        grouping: Grouping::And,
    },
    TokenRule {
        prefix: "!",
        attribute: Attribute::Name,
        mode: MatchMode::Exact,
        grouping: Grouping::And,
    },
    TokenRule {
        prefix: "",
        attribute: Attribute::Name,
        mode: MatchMode::Fuzzy,
        grouping: Grouping::And,
    },
];

/// Main query parser - zero-cost wrapper around configuration
#[derive(Debug)]
pub struct QueryParser<C: ParserConfig> {
    config: C,
}

impl<C: ParserConfig> QueryParser<C> {
    pub fn new(config: C) -> Self {
        Self { config }
    }

    /// Split on whitespace and classify every token. Pure: the same text always
    /// yields the same clauses, in token order.
    pub fn parse<'a>(&self, query: &'a str) -> ClauseVec<'a> {
        let mut clauses = ClauseVec::new();

        for token in query.split_whitespace() {
            if let Some(clause) = classify_token(token)
                && self.config.keep(clause.attribute)
            {
                clauses.push(clause);
            }
        }

        clauses
    }
}

impl Default for QueryParser<SearchConfig> {
    fn default() -> Self {
        Self::new(SearchConfig)
    }
}

/// Tokenize with an explicit attribute-exclusion set
pub fn tokenize<'a>(query: &'a str, exclude: &[Attribute]) -> ClauseVec<'a> {
    QueryParser::new(exclude).parse(query)
}

/// A bare prefix (e.g. `=` while the user is still typing) produces nothing and is
/// not retried against the later rules.
#[inline]
fn classify_token(token: &str) -> Option<Clause<'_>> {
    let rule = TOKEN_RULES
        .iter()
        .find(|rule| token.starts_with(rule.prefix))?;

    let value = &token[rule.prefix.len()..];
    if value.is_empty() {
        return None;
    }

    Some(Clause {
        attribute: rule.attribute,
        mode: rule.mode,
        grouping: rule.grouping,
        value,
    })
}

/// Values of the `-option` clauses, in query order
pub fn option_values<'a, 'b>(clauses: &'b [Clause<'a>]) -> impl Iterator<Item = &'a str> + 'b {
    clauses
        .iter()
        .filter(|clause| clause.attribute == Attribute::Option)
        .map(|clause| clause.value)
}
