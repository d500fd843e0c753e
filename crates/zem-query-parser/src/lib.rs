//! Query tokenizer for the zem search index
//!
//! Splits raw query text on whitespace and classifies every word by its first
//! character into a typed [`Clause`]:
//!
//! | prefix | attribute | mode   | grouping |
//! |--------|-----------|--------|----------|
//! | `=`    | kind      | prefix | or       |
//! | `/`    | file      | fuzzy  | and      |
//! | `-`    | option    | ignore | none     |
//! | `:`    | extra     | fuzzy  | and      |
//! | `!`    | name      | exact  | and      |
//! |        | name      | fuzzy  | and      |
//!
//! Clause values borrow from the input and up to 8 clauses live on the stack.
//!
//! # Examples
//!
//! ```
//! use zem_query_parser::{Attribute, FullConfig, MatchMode, QueryParser};
//!
//! let parser = QueryParser::default();
//! let clauses = parser.parse("con =Fi -tab");
//!
//! // options are dropped by the default search configuration
//! assert_eq!(clauses.len(), 2);
//! assert_eq!(clauses[0].attribute, Attribute::Name);
//! assert_eq!(clauses[1].attribute, Attribute::Kind);
//! assert_eq!(clauses[1].mode, MatchMode::Prefix);
//!
//! // the shell still sees them with the full configuration
//! let all = QueryParser::new(FullConfig).parse("con =Fi -tab");
//! assert_eq!(all[2].value, "tab");
//! ```

mod clause;
mod config;
mod parser;

pub use clause::{
    Attribute, Clause, ClauseVec, Grouping, MatchMode, UnknownName, clauses_to_string,
};
pub use config::{FullConfig, ParserConfig, SearchConfig};
pub use parser::{QueryParser, TOKEN_RULES, TokenRule, option_values, tokenize};

// Re-export SmallVec for convenience
pub use smallvec::SmallVec;
