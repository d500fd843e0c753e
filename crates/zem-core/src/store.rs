use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::matcher::{self, QueryPlan};
use crate::serializer::InterruptToken;
use chrono::{DateTime, Utc};
use heed::types::{Bytes, SerdeBincode, Str};
use heed::{Database, Env, EnvOpenOptions};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Bumped whenever the persisted entry layout changes
pub const SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

const META_KEY: &str = "generation";

/// Bookkeeping of the generation currently held by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub schema_version: u32,
    pub generation: u64,
    pub entry_count: u64,
    pub built_at: DateTime<Utc>,
}

/// Health information about the store's database
#[derive(Debug, Clone)]
pub struct StoreHealth {
    pub path: PathBuf,
    /// Size on disk in bytes
    pub disk_size: u64,
    /// Entry counts by table name
    pub entry_counts: Vec<(&'static str, u64)>,
    pub generation: Option<GenerationInfo>,
}

/// Persisted table of entries. Keys are big-endian insertion sequence numbers so
/// iteration order is store order.
#[derive(Debug)]
pub struct Store {
    env: Env,
    path: PathBuf,
    entries_db: Database<Bytes, SerdeBincode<Entry>>,
    meta_db: Database<Str, SerdeBincode<GenerationInfo>>,
    cached_len: Mutex<Option<u64>>,
}

impl Store {
    pub fn open(db_path: impl AsRef<Path>, map_size: usize) -> Result<Self> {
        let db_path = db_path.as_ref();
        fs::create_dir_all(db_path).map_err(Error::CreateDir)?;

        let env = unsafe {
            let mut opts = EnvOpenOptions::new();
            opts.max_dbs(4);
            opts.map_size(map_size);
            opts.open(db_path).map_err(Error::EnvOpen)?
        };

        env.clear_stale_readers()
            .map_err(Error::DbClearStaleReaders)?;

        let mut wtxn = env.write_txn().map_err(Error::DbStartWriteTxn)?;
        let entries_db: Database<Bytes, SerdeBincode<Entry>> = env
            .create_database(&mut wtxn, Some("entries"))
            .map_err(Error::DbCreate)?;
        let meta_db: Database<Str, SerdeBincode<GenerationInfo>> = env
            .create_database(&mut wtxn, Some("meta"))
            .map_err(Error::DbCreate)?;

        // an unreadable or outdated meta record means the entry layout may differ
        let schema_matches = matches!(
            meta_db.get(&wtxn, META_KEY),
            Ok(Some(ref meta)) if meta.schema_version == SCHEMA_VERSION
        );
        let has_data = !entries_db.is_empty(&wtxn).map_err(Error::DbRead)?
            || !meta_db.is_empty(&wtxn).map_err(Error::DbRead)?;
        if !schema_matches && has_data {
            tracing::warn!(
                path = %db_path.display(),
                "Index schema changed, dropping the stored generation"
            );
            entries_db.clear(&mut wtxn).map_err(Error::DbWrite)?;
            meta_db.clear(&mut wtxn).map_err(Error::DbWrite)?;
        }

        wtxn.commit().map_err(Error::DbCommit)?;

        tracing::info!(path = %db_path.display(), "Index store opened");

        Ok(Store {
            env,
            path: db_path.to_path_buf(),
            entries_db,
            meta_db,
            cached_len: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wipe the table and insert every batch in one write transaction. A malformed
    /// entry aborts the transaction and the previous generation stays visible.
    pub fn replace(&self, batches: Vec<Vec<Entry>>) -> Result<GenerationInfo> {
        let started = std::time::Instant::now();
        let mut wtxn = self.env.write_txn().map_err(Error::DbStartWriteTxn)?;

        let previous = self
            .meta_db
            .get(&wtxn, META_KEY)
            .map_err(Error::DbRead)?
            .map(|meta| meta.generation)
            .unwrap_or_default();

        self.entries_db.clear(&mut wtxn).map_err(Error::DbWrite)?;

        let mut seq: u64 = 0;
        for (batch_index, batch) in batches.iter().enumerate() {
            for (index, entry) in batch.iter().enumerate() {
                entry.validate().map_err(|reason| Error::MalformedEntry {
                    batch: batch_index,
                    index,
                    reason: reason.to_string(),
                })?;

                self.entries_db
                    .put(&mut wtxn, &seq.to_be_bytes(), entry)
                    .map_err(Error::DbWrite)?;
                seq += 1;
            }
        }

        let info = GenerationInfo {
            schema_version: SCHEMA_VERSION,
            generation: previous + 1,
            entry_count: seq,
            built_at: Utc::now(),
        };
        self.meta_db
            .put(&mut wtxn, META_KEY, &info)
            .map_err(Error::DbWrite)?;

        wtxn.commit().map_err(Error::DbCommit)?;
        *self.cached_len.lock() = Some(seq);

        tracing::info!(
            generation = info.generation,
            entries = seq,
            batches = batches.len(),
            took = ?started.elapsed(),
            "Index generation replaced"
        );
        Ok(info)
    }

    pub fn query(
        &self,
        plan: &QueryPlan,
        limit: Option<usize>,
        token: &InterruptToken,
    ) -> Result<Vec<Entry>> {
        let rtxn = self.env.read_txn().map_err(Error::DbStartReadTxn)?;
        let iter = self.entries_db.iter(&rtxn).map_err(Error::DbRead)?;

        matcher::execute(
            plan,
            iter.map(|item| item.map(|(_, entry)| entry).map_err(Error::DbRead)),
            limit,
            token,
        )
    }

    /// Entry count of the current generation, memoized until the next replace
    pub fn len(&self) -> Result<u64> {
        let mut cached = self.cached_len.lock();
        if let Some(len) = *cached {
            return Ok(len);
        }

        let rtxn = self.env.read_txn().map_err(Error::DbStartReadTxn)?;
        let len = self.entries_db.len(&rtxn).map_err(Error::DbRead)?;
        *cached = Some(len);
        Ok(len)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn generation(&self) -> Result<Option<GenerationInfo>> {
        let rtxn = self.env.read_txn().map_err(Error::DbStartReadTxn)?;
        self.meta_db.get(&rtxn, META_KEY).map_err(Error::DbRead)
    }

    pub fn health(&self) -> Result<StoreHealth> {
        let disk_size = self.env.real_disk_size().map_err(Error::EnvOpen)?;

        let rtxn = self.env.read_txn().map_err(Error::DbStartReadTxn)?;
        let entries = self.entries_db.len(&rtxn).map_err(Error::DbRead)?;
        let meta = self.meta_db.len(&rtxn).map_err(Error::DbRead)?;
        let generation = self.meta_db.get(&rtxn, META_KEY).map_err(Error::DbRead)?;

        Ok(StoreHealth {
            path: self.env.path().to_path_buf(),
            disk_size,
            entry_counts: vec![("entries", entries), ("meta", meta)],
            generation,
        })
    }

    /// Number of entries per kind, ordered by kind
    pub fn kind_counts(&self) -> Result<Vec<(String, u64)>> {
        let rtxn = self.env.read_txn().map_err(Error::DbStartReadTxn)?;

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for item in self.entries_db.iter(&rtxn).map_err(Error::DbRead)? {
            let (_, entry) = item.map_err(Error::DbRead)?;
            *counts.entry(entry.kind).or_default() += 1;
        }

        Ok(counts.into_iter().collect())
    }

    /// Distinct kinds, ordered
    pub fn kinds(&self) -> Result<Vec<String>> {
        Ok(self
            .kind_counts()?
            .into_iter()
            .map(|(kind, _)| kind)
            .collect())
    }
}
