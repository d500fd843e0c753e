//! zem-core - ranked fuzzy search over a persisted index of symbols, files and tags
//!
//! An [`Index`] owns one LMDB-backed [`Store`] through an execution [`Serializer`]:
//! every query and every rebuild runs as a job on a single owner thread, queries
//! can be interrupted when the user keeps typing, and a rebuild replaces the whole
//! generation of entries in one write transaction.

pub mod config;
pub mod context;
pub mod entry;
mod error;
pub mod format;
pub mod index;
pub mod log;
pub mod matcher;
pub mod path_utils;
pub mod scanner;
pub mod serializer;
pub mod store;

pub use config::{IndexConfig, SourceConfig};
pub use entry::{Entry, Location};
pub use error::{Error, Result};
pub use format::MatchFormat;
pub use index::{Index, RebuildSummary, SourceFailure};
pub use matcher::QueryPlan;
pub use scanner::Scanner;
pub use serializer::{InterruptToken, JobKind, Serializer, SerializerStats};
pub use store::{GenerationInfo, Store, StoreHealth};

// Re-export the tokenizer so shells depend on a single crate for queries
pub use zem_query_parser::{
    Attribute, Clause, FullConfig, Grouping, MatchMode, QueryParser, SearchConfig,
    clauses_to_string, option_values,
};
