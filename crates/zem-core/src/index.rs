//! One project index: a [`Store`] owned by an execution [`Serializer`]
//!
//! Every store access, queries and rebuild replaces alike, is a serializer job.
//! Scanning for a rebuild happens on the calling thread so queries keep being
//! answered until the final replace.

use crate::config::IndexConfig;
use crate::context::{self, Completion};
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::format::MatchFormat;
use crate::matcher::QueryPlan;
use crate::path_utils::canonicalize;
use crate::scanner::Scanner;
use crate::serializer::{JobKind, Serializer, SerializerStats};
use crate::store::{GenerationInfo, Store, StoreHealth};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use zem_query_parser::{Clause, QueryParser, SearchConfig, clauses_to_string};

/// A source that contributed nothing to a rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct RebuildSummary {
    pub generation: u64,
    pub count: u64,
    pub elapsed: Duration,
    /// Entries per kind in the new generation, ordered by kind
    pub kind_counts: Vec<(String, u64)>,
    pub failures: Vec<SourceFailure>,
}

pub struct Index {
    root: PathBuf,
    config: IndexConfig,
    serializer: Serializer<Store>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("root", &self.root)
            .field("serializer", &self.serializer.name())
            .finish_non_exhaustive()
    }
}

impl Index {
    /// Open (or create) the store of the project at `root` and start its owner thread
    pub fn open(root: impl AsRef<Path>, config: IndexConfig) -> Result<Self> {
        let root = root.as_ref();
        let root = canonicalize(root).map_err(|_| Error::InvalidPath(root.to_path_buf()))?;

        let database = config.database_path(&root)?;
        let store = Store::open(&database, config.map_size)?;

        let serializer = Serializer::new("zem-index", store);
        serializer.start()?;

        info!(root = %root.display(), database = %database.display(), "Index opened");
        Ok(Self {
            root,
            config,
            serializer,
        })
    }

    /// Like [`Index::open`] with the settings from the project's `.zem.toml`
    pub fn open_project(root: impl AsRef<Path>) -> Result<Self> {
        let config = IndexConfig::load(root.as_ref())?;
        Self::open(root, config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn match_format(&self) -> MatchFormat {
        MatchFormat::from_name(&self.config.format)
    }

    /// Tokenize `text` (option clauses are left to the shell) and run the query
    pub fn search(&self, text: &str, limit: Option<usize>) -> Result<Vec<Entry>> {
        let clauses = QueryParser::new(SearchConfig).parse(text);
        self.query(&clauses, limit)
    }

    /// Blocking ranked query. An interrupted query yields no entries.
    pub fn query(&self, clauses: &[Clause<'_>], limit: Option<usize>) -> Result<Vec<Entry>> {
        let plan = QueryPlan::compile(clauses)?;
        let started = Instant::now();

        let result = self.serializer.call(
            JobKind::Cancellable,
            move |store: &Store, token| store.query(&plan, limit, token),
            None,
        );

        match result {
            Ok(entries) => {
                debug!(
                    query = %clauses_to_string(clauses),
                    results = entries.len(),
                    took = ?started.elapsed(),
                    "Query answered"
                );
                Ok(entries)
            }
            Err(Error::Interrupted | Error::Dropped) => {
                debug!(query = %clauses_to_string(clauses), "Query interrupted");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Queue a query and return immediately. `on_complete` runs on the owner
    /// thread, with no entries when the query was interrupted, and never runs
    /// when the query is dropped by [`Index::interrupt_pending`].
    pub fn query_async<C>(&self, text: &str, limit: Option<usize>, on_complete: C) -> Result<u64>
    where
        C: FnOnce(Result<Vec<Entry>>) + Send + 'static,
    {
        let clauses = QueryParser::new(SearchConfig).parse(text);
        let plan = QueryPlan::compile(&clauses)?;

        self.serializer
            .submit_with(
                JobKind::Cancellable,
                move |store: &Store, token| store.query(&plan, limit, token),
                move |result| match result {
                    Err(Error::Interrupted) => on_complete(Ok(Vec::new())),
                    other => on_complete(other),
                },
            )
            .ok_or(Error::NotStarted)
    }

    /// Interrupt the running query
    pub fn interrupt(&self) {
        self.serializer.interrupt();
    }

    /// Interrupt the running query and drop every query queued so far
    pub fn interrupt_pending(&self) {
        self.serializer.interrupt_pending();
    }

    /// Atomically swap the stored generation for `batches`
    pub fn replace(&self, batches: Vec<Vec<Entry>>) -> Result<GenerationInfo> {
        self.serializer.call(
            JobKind::Uninterruptible,
            move |store: &Store, _| store.replace(batches),
            None,
        )
    }

    /// Rebuild from the configured sources. A source that cannot be built or
    /// fails to scan is reported in the summary and contributes nothing.
    pub fn rebuild(&self) -> Result<RebuildSummary> {
        let mut failures = Vec::new();
        let mut scanners = Vec::with_capacity(self.config.sources.len());

        for source in &self.config.sources {
            match source.build() {
                Ok(scanner) => scanners.push(scanner),
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Invalid source settings");
                    failures.push(SourceFailure {
                        source: source.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut summary = self.rebuild_with(&scanners)?;
        failures.append(&mut summary.failures);
        summary.failures = failures;
        Ok(summary)
    }

    pub fn rebuild_with(&self, scanners: &[Box<dyn Scanner>]) -> Result<RebuildSummary> {
        let started = Instant::now();

        let scanned: Vec<(String, Result<Vec<Entry>>)> = scanners
            .par_iter()
            .map(|scanner| (scanner.name().to_string(), scanner.scan(&self.root)))
            .collect();

        let mut batches = Vec::with_capacity(scanned.len());
        let mut failures = Vec::new();
        let mut kind_counts: BTreeMap<String, u64> = BTreeMap::new();

        for (source, result) in scanned {
            match result {
                Ok(batch) => {
                    debug!(source = %source, entries = batch.len(), "Source scanned");
                    for entry in &batch {
                        *kind_counts.entry(entry.kind.clone()).or_default() += 1;
                    }
                    batches.push(batch);
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "Source failed, skipping it");
                    failures.push(SourceFailure {
                        source,
                        error: e.to_string(),
                    });
                }
            }
        }

        let info = self.replace(batches)?;
        let elapsed = started.elapsed();

        info!(
            generation = info.generation,
            entries = info.entry_count,
            failed_sources = failures.len(),
            took = ?elapsed,
            "Index rebuilt"
        );

        Ok(RebuildSummary {
            generation: info.generation,
            count: info.entry_count,
            elapsed,
            kind_counts: kind_counts.into_iter().collect(),
            failures,
        })
    }

    pub fn kinds(&self) -> Result<Vec<String>> {
        self.read(|store| store.kinds())
    }

    pub fn kind_counts(&self) -> Result<Vec<(String, u64)>> {
        self.read(|store| store.kind_counts())
    }

    pub fn len(&self) -> Result<u64> {
        self.read(|store| store.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn generation(&self) -> Result<Option<GenerationInfo>> {
        self.read(|store| store.generation())
    }

    pub fn health(&self) -> Result<StoreHealth> {
        self.read(|store| store.health())
    }

    pub fn serializer_stats(&self) -> SerializerStats {
        self.serializer.stats()
    }

    pub fn preview(&self, entry: &Entry) -> String {
        context::preview(entry, &self.root)
    }

    pub fn completions(&self, entries: &[Entry]) -> Vec<Completion> {
        context::completions(entries, &self.root)
    }

    /// Run everything queued so far, then stop the owner thread
    pub fn stop(&self) -> Result<()> {
        self.serializer.stop()
    }

    // reads are never dropped by interrupt_pending
    fn read<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
    {
        self.serializer
            .call(JobKind::Uninterruptible, move |store: &Store, _| work(store), None)
    }
}
