use super::{Scanner, read_text, walk_files};
use crate::config::LinesSource;
use crate::entry::Entry;
use crate::error::Result;
use crate::path_utils::entry_path;
use rayon::prelude::*;
use regex::Regex;
use std::path::Path;

/// Every non-trivial line of every project file, named by its trimmed content
#[derive(Debug, Clone)]
pub struct LinesScanner {
    config: LinesSource,
    filter: Regex,
}

impl LinesScanner {
    pub fn new(config: LinesSource) -> Result<Self> {
        let filter = Regex::new(&config.filter)?;
        Ok(Self { config, filter })
    }

    fn scan_file(&self, path: &Path, root: &Path) -> Vec<Entry> {
        let Some(text) = read_text(path, self.config.size_limit) else {
            return Vec::new();
        };
        let file = entry_path(path, root);

        text.lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line = line.trim();
                self.filter.is_match(line).then(|| {
                    Entry::new(line, self.config.kind.as_str(), file.as_str())
                        .at_line(index as u32 + 1)
                        .with_priority(self.config.priority, self.config.subpriority)
                })
            })
            .collect()
    }
}

impl Scanner for LinesScanner {
    fn name(&self) -> &str {
        "lines"
    }

    fn scan(&self, root: &Path) -> Result<Vec<Entry>> {
        let files = walk_files(root, &self.config.exclude, &self.config.exclude_files)?;

        Ok(files
            .par_iter()
            .flat_map_iter(|path| self.scan_file(path, root))
            .collect())
    }
}
