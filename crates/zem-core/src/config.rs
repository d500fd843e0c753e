//! Index settings, read from `.zem.toml` in the project root

use crate::error::{Error, Result};
use crate::path_utils::{project_key, resolve};
use crate::store::DEFAULT_MAP_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".zem.toml";
pub const DEFAULT_DATABASE_DIR: &str = ".zem";
pub const DEFAULT_RESULT_COUNT: usize = 20;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn default_exclude_files() -> Vec<String> {
    strings(&[".gitignore", ".p4ignore"])
}

/// Content scanners skip every hidden file, not just hidden directories
fn default_content_exclude() -> Vec<String> {
    strings(&["*~", ".*", "*.pyc", "*.o", "*._*", "*.class"])
}

/// Kind name and subpriority a ctags kind letter maps to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindRule(pub String, pub i64);

/// File extension (or `default`) -> ctags kind letter -> rule
pub type KindMap = BTreeMap<String, BTreeMap<String, KindRule>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesSource {
    pub kind: String,
    pub priority: i64,
    pub subpriority: i64,
    /// gitignore-style patterns, `!pattern` re-includes
    pub exclude: Vec<String>,
    /// ignore files honored in every directory
    pub exclude_files: Vec<String>,
}

impl Default for FilesSource {
    fn default() -> Self {
        Self {
            kind: "File".to_string(),
            priority: 99,
            subpriority: 50,
            exclude: strings(&["*~", ".*/", "*.pyc", "*.o", "*._*", "*.class", "!*.map"]),
            exclude_files: default_exclude_files(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinesSource {
    pub kind: String,
    pub priority: i64,
    pub subpriority: i64,
    pub exclude: Vec<String>,
    pub exclude_files: Vec<String>,
    /// files larger than this many bytes are skipped
    pub size_limit: u64,
    /// only lines matching this regex are indexed
    pub filter: String,
}

impl Default for LinesSource {
    fn default() -> Self {
        Self {
            kind: "UseLine".to_string(),
            priority: 49,
            subpriority: 50,
            exclude: default_content_exclude(),
            exclude_files: default_exclude_files(),
            size_limit: 1024 * 1024,
            filter: "[a-zA-Z_0-9]".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordsSource {
    pub kind: String,
    pub priority: i64,
    pub subpriority: i64,
    pub exclude: Vec<String>,
    pub exclude_files: Vec<String>,
    pub size_limit: u64,
    /// every match of this regex becomes an entry
    pub pattern: String,
}

impl Default for WordsSource {
    fn default() -> Self {
        Self {
            kind: "UseWord".to_string(),
            priority: 48,
            subpriority: 40,
            exclude: default_content_exclude(),
            exclude_files: default_exclude_files(),
            size_limit: 100 * 1024,
            pattern: "[a-zA-Z_][a-zA-Z_0-9]+".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagsSource {
    /// Tags file relative to the root, or `!command` whose output is parsed.
    /// Unset means `.tags`/`tags` in the root, else running ctags.
    pub file: Option<String>,
    /// Run before reading `file`, e.g. to regenerate it
    pub command: Option<String>,
    pub priority: i64,
    /// Consulted before the built-in kind maps
    pub kind_map: KindMap,
}

impl Default for TagsSource {
    fn default() -> Self {
        Self {
            file: None,
            command: None,
            priority: 99,
            kind_map: KindMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Files(FilesSource),
    Lines(LinesSource),
    Words(WordsSource),
    Tags(TagsSource),
}

impl SourceConfig {
    pub fn name(&self) -> &'static str {
        match self {
            SourceConfig::Files(_) => "files",
            SourceConfig::Lines(_) => "lines",
            SourceConfig::Words(_) => "words",
            SourceConfig::Tags(_) => "tags",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Database directory, relative paths resolve against the project root
    pub database: Option<PathBuf>,
    /// Keep the database under the user data directory instead of the project
    pub store_in_data_dir: bool,
    pub result_count: usize,
    /// Upper bound of the database size in bytes
    pub map_size: usize,
    /// Result line format used by the editor shell
    pub format: String,
    pub sources: Vec<SourceConfig>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            database: None,
            store_in_data_dir: false,
            result_count: DEFAULT_RESULT_COUNT,
            map_size: DEFAULT_MAP_SIZE,
            format: "columns".to_string(),
            sources: vec![
                SourceConfig::Files(FilesSource::default()),
                SourceConfig::Tags(TagsSource::default()),
            ],
        }
    }
}

impl IndexConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read `.zem.toml` from `root`, defaults when there is none
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            tracing::debug!(root = %root.display(), "No index config, using defaults");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path)?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), sources = config.sources.len(), "Loaded index config");
        Ok(config)
    }

    pub fn database_path(&self, root: &Path) -> Result<PathBuf> {
        if let Some(database) = &self.database {
            return Ok(resolve(root, &database.to_string_lossy()));
        }

        if self.store_in_data_dir {
            let data_dir = dirs::data_dir().ok_or_else(|| Error::InvalidPath(root.to_path_buf()))?;
            return Ok(data_dir.join("zem").join(project_key(root)?));
        }

        Ok(root.join(DEFAULT_DATABASE_DIR))
    }
}
