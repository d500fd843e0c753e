use super::{Scanner, read_text, walk_files};
use crate::config::WordsSource;
use crate::entry::Entry;
use crate::error::Result;
use crate::path_utils::entry_path;
use rayon::prelude::*;
use regex::Regex;
use std::path::Path;

/// Every identifier-like word of every project file. The line the word was found
/// on becomes the entry's extra text.
#[derive(Debug, Clone)]
pub struct WordsScanner {
    config: WordsSource,
    pattern: Regex,
}

impl WordsScanner {
    pub fn new(config: WordsSource) -> Result<Self> {
        let pattern = Regex::new(&config.pattern)?;
        Ok(Self { config, pattern })
    }

    fn scan_file(&self, path: &Path, root: &Path) -> Vec<Entry> {
        let Some(text) = read_text(path, self.config.size_limit) else {
            return Vec::new();
        };
        let file = entry_path(path, root);

        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            for word in self.pattern.find_iter(line) {
                entries.push(
                    Entry::new(word.as_str(), self.config.kind.as_str(), file.as_str())
                        .with_extra(line)
                        .at_line(index as u32 + 1)
                        .with_priority(self.config.priority, self.config.subpriority),
                );
            }
        }
        entries
    }
}

impl Scanner for WordsScanner {
    fn name(&self) -> &str {
        "words"
    }

    fn scan(&self, root: &Path) -> Result<Vec<Entry>> {
        let files = walk_files(root, &self.config.exclude, &self.config.exclude_files)?;

        Ok(files
            .par_iter()
            .flat_map_iter(|path| self.scan_file(path, root))
            .collect())
    }
}
