//! Ranked query compiler
//!
//! A clause sequence compiles into a [`QueryPlan`]: every AND-grouped clause is a
//! separate required constraint and all kind clauses are OR-ed into a single
//! alternative. Matching follows SQL `LIKE` conventions: fuzzy and prefix matching
//! ignore ASCII case and treat every pattern character literally, exact matching is
//! case-sensitive.

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::serializer::InterruptToken;
use std::cmp::Ordering;
use zem_query_parser::{Attribute, Clause, Grouping, MatchMode, TOKEN_RULES};

/// Entries scanned between two interrupt checks
const INTERRUPT_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldTest {
    /// ASCII-lowercased characters that have to appear in order
    Fuzzy(Vec<char>),
    Exact(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Constraint {
    attribute: Attribute,
    test: FieldTest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPlan {
    constraints: Vec<Constraint>,
    kind_prefixes: Vec<String>,
}

fn field(entry: &Entry, attribute: Attribute) -> &str {
    match attribute {
        Attribute::Name => &entry.name,
        Attribute::Kind => &entry.kind,
        Attribute::File => &entry.file,
        Attribute::Extra => entry.extra(),
        Attribute::Option => "",
    }
}

#[inline]
fn fuzzy_match(pattern: &[char], haystack: &str) -> bool {
    let mut pattern = pattern.iter().peekable();
    for c in haystack.chars() {
        match pattern.peek() {
            None => return true,
            Some(&&p) if c.to_ascii_lowercase() == p => {
                pattern.next();
            }
            Some(_) => {}
        }
    }
    pattern.peek().is_none()
}

#[inline]
fn prefix_match(prefix: &str, haystack: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn invalid_clause(clause: &Clause<'_>) -> Error {
    Error::InvalidClause(format!(
        "{}/{}/{} '{}'",
        clause.attribute,
        clause.mode,
        clause.grouping.as_str(),
        clause.value
    ))
}

impl QueryPlan {
    /// Compile clauses into a predicate. Combinations the tokenizer can never
    /// produce (e.g. a prefix-matched name) are rejected.
    pub fn compile(clauses: &[Clause<'_>]) -> Result<Self> {
        let mut plan = QueryPlan::default();

        for clause in clauses {
            let known = TOKEN_RULES.iter().any(|rule| {
                rule.attribute == clause.attribute
                    && rule.mode == clause.mode
                    && rule.grouping == clause.grouping
            });
            if !known {
                return Err(invalid_clause(clause));
            }

            match (clause.grouping, clause.mode) {
                (_, MatchMode::Ignore) => {}
                (Grouping::Or, MatchMode::Prefix) => {
                    plan.kind_prefixes.push(clause.value.to_ascii_lowercase());
                }
                (Grouping::And, MatchMode::Fuzzy) => plan.constraints.push(Constraint {
                    attribute: clause.attribute,
                    test: FieldTest::Fuzzy(clause.value.to_ascii_lowercase().chars().collect()),
                }),
                (Grouping::And, MatchMode::Exact) => plan.constraints.push(Constraint {
                    attribute: clause.attribute,
                    test: FieldTest::Exact(clause.value.to_string()),
                }),
                _ => return Err(invalid_clause(clause)),
            }
        }

        Ok(plan)
    }

    /// An empty plan matches every entry
    pub fn matches_all(&self) -> bool {
        self.constraints.is_empty() && self.kind_prefixes.is_empty()
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        let constraints_hold = self.constraints.iter().all(|constraint| {
            let value = field(entry, constraint.attribute);
            match &constraint.test {
                FieldTest::Fuzzy(pattern) => fuzzy_match(pattern, value),
                FieldTest::Exact(expected) => value == expected,
            }
        });

        constraints_hold
            && (self.kind_prefixes.is_empty()
                || self
                    .kind_prefixes
                    .iter()
                    .any(|prefix| prefix_match(prefix, &entry.kind)))
    }
}

/// Result ordering: priority desc, name length asc, subpriority desc, name asc,
/// kind asc, file length asc.
pub fn compare(a: &Entry, b: &Entry) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.name_len().cmp(&b.name_len()))
        .then_with(|| b.subpriority.cmp(&a.subpriority))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.kind.cmp(&b.kind))
        .then_with(|| a.file_len().cmp(&b.file_len()))
}

/// Filter `entries` through `plan`, order the survivors and cut them to `limit`.
/// Entries must come in store order so that remaining ties stay stable.
/// A limit of zero means no limit.
pub fn execute<I>(
    plan: &QueryPlan,
    entries: I,
    limit: Option<usize>,
    token: &InterruptToken,
) -> Result<Vec<Entry>>
where
    I: IntoIterator<Item = Result<Entry>>,
{
    let mut matched = Vec::new();

    for (scanned, entry) in entries.into_iter().enumerate() {
        if scanned % INTERRUPT_CHECK_INTERVAL == 0 {
            token.check()?;
        }

        let entry = entry?;
        if plan.matches(&entry) {
            matched.push(entry);
        }
    }
    token.check()?;

    glidesort::sort_by(&mut matched, compare);

    if let Some(limit) = limit.filter(|&limit| limit > 0) {
        matched.truncate(limit);
    }

    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zem_query_parser::{QueryParser, tokenize};

    fn fixture() -> Vec<Entry> {
        vec![
            Entry::new("file.a", "File", "file.a").with_priority(10, 5),
            Entry::new("file.b", "File", "file.b").with_priority(10, 5),
            Entry::from_raw("CONST_A", "Define", "file.a", Some("str"), Some("/^CONST_A=/"), 20, 5)
                .unwrap(),
            Entry::from_raw("CONST_C", "Define", "file.B", Some("int"), Some("10"), 20, 5).unwrap(),
        ]
    }

    fn run(query: &str, entries: Vec<Entry>, limit: Option<usize>) -> Vec<Entry> {
        let clauses = QueryParser::default().parse(query);
        let plan = QueryPlan::compile(&clauses).unwrap();
        execute(
            &plan,
            entries.into_iter().map(Ok),
            limit,
            &InterruptToken::never(),
        )
        .unwrap()
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_fuzzy_match() {
        let pattern: Vec<char> = "fla".chars().collect();
        assert!(fuzzy_match(&pattern, "file.a"));
        assert!(fuzzy_match(&pattern, "FILE.A"));
        assert!(!fuzzy_match(&pattern, "file.b"));
        assert!(!fuzzy_match(&pattern, "alf"));
        assert!(fuzzy_match(&[], "anything"));
        assert!(fuzzy_match(&[], ""));
    }

    #[test]
    fn test_pattern_characters_are_literal() {
        // '%' and '_' are not wildcards
        let pattern: Vec<char> = "a_b".chars().collect();
        assert!(fuzzy_match(&pattern, "xa_yb"));
        assert!(!fuzzy_match(&pattern, "axb"));
        assert!(!prefix_match("d%", "Define"));
        assert!(prefix_match("de", "Define"));
    }

    #[test]
    fn test_prefix_match_non_ascii_case() {
        // only ASCII letters fold
        assert!(prefix_match("ä", "äpfel"));
        assert!(!prefix_match("ä", "Äpfel"));
        assert!(!prefix_match("long", "lo"));
    }

    #[test]
    fn test_fixture_fuzzy_name() {
        let result = run("fla", fixture(), None);
        assert_eq!(names(&result), vec!["file.a"]);
    }

    #[test]
    fn test_fixture_kind_prefix() {
        let result = run("=De", fixture(), None);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|e| e.kind == "Define"));
    }

    #[test]
    fn test_fixture_name_and_kind() {
        assert!(run("con =Fi", fixture(), None).is_empty());
    }

    #[test]
    fn test_kind_clauses_are_alternatives() {
        let result = run("=Fi =De", fixture(), None);
        assert_eq!(result.len(), 4);

        let result = run("=fi =xyz", fixture(), None);
        assert_eq!(names(&result), vec!["file.a", "file.b"]);
    }

    #[test]
    fn test_and_clauses_all_required() {
        assert_eq!(names(&run("con :int", fixture(), None)), vec!["CONST_C"]);
        assert_eq!(names(&run("con /B", fixture(), None)), vec!["CONST_C"]);
        assert!(run("con :xyz", fixture(), None).is_empty());
    }

    #[test]
    fn test_absent_extra_is_empty() {
        // a file entry has no extra, so any extra clause rejects it
        let result = run(":s =Fi", fixture(), None);
        assert!(result.is_empty());
    }

    #[test]
    fn test_exact_is_case_sensitive() {
        assert_eq!(names(&run("!CONST_A", fixture(), None)), vec!["CONST_A"]);
        assert!(run("!const_a", fixture(), None).is_empty());
        assert!(run("!CONST", fixture(), None).is_empty());
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let result = run("", fixture(), None);
        assert_eq!(
            names(&result),
            vec!["CONST_A", "CONST_C", "file.a", "file.b"]
        );
        assert!(QueryPlan::compile(&[]).unwrap().matches_all());
    }

    #[test]
    fn test_ordering() {
        let entries = vec![
            Entry::new("order_2", "typ", "file").with_priority(0, 2),
            Entry::new("order_1", "typ", "file").with_priority(0, 1),
            Entry::new("order_0", "typ", "file").with_priority(0, 1),
            Entry::new("order_0", "typ", "file").with_priority(1, 1),
            Entry::new("order_3", "typ", "file").with_priority(0, 3),
            Entry::new("order_4_", "typ", "file").with_priority(0, 4),
        ];

        let result = run("order", entries, None);
        assert_eq!(
            names(&result),
            vec!["order_0", "order_3", "order_2", "order_0", "order_1", "order_4_"]
        );
        assert_eq!(result[0].priority, 1);
    }

    #[test]
    fn test_ordering_kind_then_file_length_then_store_order() {
        let entries = vec![
            Entry::new("same", "Zeta", "a").with_extra("first"),
            Entry::new("same", "Alpha", "long/path"),
            Entry::new("same", "Alpha", "short"),
            Entry::new("same", "Alpha", "short").with_extra("later"),
        ];

        let result = run("same", entries, None);
        let shape: Vec<_> = result
            .iter()
            .map(|e| (e.kind.as_str(), e.file.as_str(), e.extra()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("Alpha", "short", ""),
                ("Alpha", "short", "later"),
                ("Alpha", "long/path", ""),
                ("Zeta", "a", "first"),
            ]
        );
    }

    #[test]
    fn test_limit() {
        assert_eq!(run("", fixture(), Some(2)).len(), 2);
        assert_eq!(run("", fixture(), Some(10)).len(), 4);
        assert_eq!(run("", fixture(), Some(0)).len(), 4);
    }

    #[test]
    fn test_deterministic() {
        let first = run("e", fixture(), None);
        let second = run("e", fixture(), None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_options_contribute_nothing() {
        let clauses = tokenize("fla -tab", &[]);
        assert_eq!(clauses.len(), 2);
        let plan = QueryPlan::compile(&clauses).unwrap();
        let only_name = QueryPlan::compile(&clauses[..1]).unwrap();
        assert_eq!(plan, only_name);
    }

    #[test]
    fn test_invalid_combination_is_rejected() {
        let clause = Clause {
            attribute: Attribute::Name,
            mode: MatchMode::Prefix,
            grouping: Grouping::And,
            value: "x",
        };
        assert!(matches!(
            QueryPlan::compile(&[clause]),
            Err(Error::InvalidClause(_))
        ));

        let clause = Clause {
            attribute: Attribute::Kind,
            mode: MatchMode::Prefix,
            grouping: Grouping::And,
            value: "x",
        };
        assert!(QueryPlan::compile(&[clause]).is_err());
    }

    #[test]
    fn test_storage_errors_propagate() {
        let plan = QueryPlan::default();
        let entries = vec![
            Ok(Entry::new("a", "b", "c")),
            Err(Error::InvalidLocation("x".to_string())),
        ];
        let result = execute(&plan, entries, None, &InterruptToken::never());
        assert!(matches!(result, Err(Error::InvalidLocation(_))));
    }
}
