use crate::clause::Attribute;

/// Parser configuration trait - lets call sites suppress clauses by attribute
pub trait ParserConfig {
    /// Should clauses targeting `attribute` be emitted
    fn keep(&self, _attribute: Attribute) -> bool {
        true
    }
}

/// Keeps every clause, including options the shell reacts to (e.g. `-tab`)
#[derive(Debug, Clone, Copy, Default)]
pub struct FullConfig;

impl ParserConfig for FullConfig {}

/// Configuration for building a search predicate - options are dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchConfig;

impl ParserConfig for SearchConfig {
    fn keep(&self, attribute: Attribute) -> bool {
        attribute != Attribute::Option
    }
}

/// An attribute slice acts as an exclusion set
impl ParserConfig for [Attribute] {
    fn keep(&self, attribute: Attribute) -> bool {
        !self.contains(&attribute)
    }
}

impl<const N: usize> ParserConfig for [Attribute; N] {
    fn keep(&self, attribute: Attribute) -> bool {
        !self.contains(&attribute)
    }
}

impl<T: ParserConfig + ?Sized> ParserConfig for &T {
    fn keep(&self, attribute: Attribute) -> bool {
        (**self).keep(attribute)
    }
}
