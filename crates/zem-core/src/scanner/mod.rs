//! Sources that produce entries for a rebuild of the index

mod files;
mod lines;
mod tags;
mod words;

pub use files::FilesScanner;
pub use lines::LinesScanner;
pub use tags::{TagsScanner, parse_tags};
pub use words::WordsScanner;

use crate::config::SourceConfig;
use crate::entry::Entry;
use crate::error::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::{WalkBuilder, WalkState};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A scanner walks a project and returns one batch of entries.
///
/// Scanners run in parallel during a rebuild, one batch each, and a failing
/// scanner only loses its own batch.
pub trait Scanner: Send + Sync {
    fn name(&self) -> &str;

    fn scan(&self, root: &Path) -> Result<Vec<Entry>>;
}

impl SourceConfig {
    /// Validates the source settings (regexes, conflicting options) up front
    pub fn build(&self) -> Result<Box<dyn Scanner>> {
        Ok(match self {
            SourceConfig::Files(config) => Box::new(FilesScanner::new(config.clone())),
            SourceConfig::Lines(config) => Box::new(LinesScanner::new(config.clone())?),
            SourceConfig::Words(config) => Box::new(WordsScanner::new(config.clone())?),
            SourceConfig::Tags(config) => Box::new(TagsScanner::new(config.clone())?),
        })
    }
}

fn exclude_matcher(root: &Path, exclude: &[String]) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in exclude {
        builder.add_line(None, pattern)?;
    }
    Ok(builder.build()?)
}

/// Every file below `root`, sorted by path.
///
/// `exclude` holds gitignore-style patterns checked against each path relative
/// to `root`, excluded directories are not descended into. `exclude_files` names
/// ignore files that are honored in every directory of the walk.
pub fn walk_files(root: &Path, exclude: &[String], exclude_files: &[String]) -> Result<Vec<PathBuf>> {
    let walk_start = std::time::Instant::now();
    let matcher = Arc::new(exclude_matcher(root, exclude)?);

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .parents(false)
        .git_global(false)
        .git_exclude(false)
        .require_git(false)
        .follow_links(false)
        .git_ignore(exclude_files.iter().any(|f| f == ".gitignore"))
        .ignore(exclude_files.iter().any(|f| f == ".ignore"));

    for file_name in exclude_files {
        if file_name != ".gitignore" && file_name != ".ignore" {
            builder.add_custom_ignore_filename(file_name);
        }
    }

    builder.filter_entry(move |entry| {
        // the walk root itself is never matched, temp dirs are hidden too
        if entry.depth() == 0 {
            return true;
        }
        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
        !matcher.matched(entry.path(), is_dir).is_ignore()
    });

    let files = Mutex::new(Vec::new());
    builder.build_parallel().run(|| {
        let files = &files;
        Box::new(move |result| {
            match result {
                Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
                    if !is_git_file(entry.path()) {
                        files.lock().push(entry.into_path());
                    }
                }
                Ok(_) => {}
                Err(err) => debug!(?err, "Skipping unreadable path"),
            }
            WalkState::Continue
        })
    });

    let mut files = files.into_inner();
    glidesort::sort_by(&mut files, |a: &PathBuf, b: &PathBuf| a.cmp(b));

    info!(
        root = %root.display(),
        files = files.len(),
        took = ?walk_start.elapsed(),
        "Walked project files"
    );
    Ok(files)
}

#[inline]
fn is_git_file(path: &Path) -> bool {
    path.to_str().is_some_and(|path| {
        if cfg!(target_family = "windows") {
            path.contains("\\.git\\")
        } else {
            path.contains("/.git/")
        }
    })
}

/// Read a text file for the content scanners, `None` when it is above the size
/// limit or unreadable. Invalid UTF-8 is replaced.
pub(crate) fn read_text(path: &Path, size_limit: u64) -> Option<String> {
    let size = match std::fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(err) => {
            debug!(path = %path.display(), ?err, "Cannot stat file");
            return None;
        }
    };

    if size > size_limit {
        info!(path = %path.display(), size, "File too large, skipping");
        return None;
    }

    match std::fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) => {
            debug!(path = %path.display(), ?err, "Cannot read file");
            None
        }
    }
}
