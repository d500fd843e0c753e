use super::{Scanner, walk_files};
use crate::config::FilesSource;
use crate::entry::Entry;
use crate::error::Result;
use crate::path_utils::entry_path;
use std::path::Path;

/// One entry per project file, named by its file name
#[derive(Debug, Clone)]
pub struct FilesScanner {
    config: FilesSource,
}

impl FilesScanner {
    pub fn new(config: FilesSource) -> Self {
        Self { config }
    }
}

impl Scanner for FilesScanner {
    fn name(&self) -> &str {
        "files"
    }

    fn scan(&self, root: &Path) -> Result<Vec<Entry>> {
        let files = walk_files(root, &self.config.exclude, &self.config.exclude_files)?;

        Ok(files
            .iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy();
                Some(
                    Entry::new(name, self.config.kind.as_str(), entry_path(path, root))
                        .with_priority(self.config.priority, self.config.subpriority),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/util.py"), "").unwrap();
        fs::write(dir.path().join("lib/util.pyc"), "").unwrap();
        fs::write(dir.path().join("README"), "").unwrap();

        let entries = FilesScanner::new(FilesSource::default())
            .scan(dir.path())
            .unwrap();

        assert_eq!(
            entries,
            vec![
                Entry::new("README", "File", "README").with_priority(99, 50),
                Entry::new("util.py", "File", "lib/util.py").with_priority(99, 50),
            ]
        );
    }
}
