//! Preview text for completion menus

use crate::entry::{Entry, Location};
use crate::path_utils::resolve;
use std::fs;
use std::path::Path;

pub const PREVIEW_LINES: usize = 5;

/// One completion candidate as editors expect it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub word: String,
    pub menu: String,
    pub info: String,
}

/// Preview of the lines an entry points at. Falls back to `kind`, `location` and
/// `extra` on separate lines when the file is unreadable or the location resolves
/// to nothing.
pub fn preview(entry: &Entry, root: &Path) -> String {
    read_preview(entry, root)
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| {
            format!(
                "{}\n{}\n{}",
                entry.kind,
                entry.location_string(),
                entry.extra()
            )
        })
}

fn read_preview(entry: &Entry, root: &Path) -> Option<String> {
    let bytes = fs::read(resolve(root, &entry.file)).ok()?;
    let text = String::from_utf8_lossy(&bytes);
    let mut lines = text.split_inclusive('\n');

    let preview: String = match &entry.location {
        None => lines.take(PREVIEW_LINES).collect(),
        Some(Location::Line(0)) => return None,
        Some(Location::Line(line)) => lines
            .skip(*line as usize - 1)
            .take(PREVIEW_LINES)
            .collect(),
        Some(anchor @ Location::Anchor { .. }) => {
            let pattern = anchor.line_pattern()?;
            let found = lines
                .by_ref()
                .find(|line| pattern.matches(line.trim_end_matches(['\n', '\r'])));

            match found {
                Some(line) => {
                    let mut preview = line.to_string();
                    preview.extend(lines.take(PREVIEW_LINES - 1));
                    preview
                }
                None => pattern.text,
            }
        }
    };

    Some(preview)
}

pub fn completions(entries: &[Entry], root: &Path) -> Vec<Completion> {
    entries
        .iter()
        .map(|entry| Completion {
            word: entry.name.clone(),
            menu: entry.file.clone(),
            info: preview(entry, root),
        })
        .collect()
}
