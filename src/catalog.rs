//! The fixed, ordered list of slides a show cycles through.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::Configuration;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Separator between the ordering prefix and the display name in scanned file names.
const NAME_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideItem {
    pub asset_ref: String,
    pub display_name: String,
    pub caption: String,
}

impl SlideItem {
    pub fn new(
        asset_ref: impl Into<String>,
        display_name: impl Into<String>,
        caption: impl Into<String>,
    ) -> Self {
        Self {
            asset_ref: asset_ref.into(),
            display_name: display_name.into(),
            caption: caption.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog is empty")]
    Empty,
    #[error("catalog directory {0} does not exist or is not a directory")]
    BadDir(PathBuf),
    #[error("failed to scan catalog directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Ordered slides plus the index of the designated winner, if any.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<SlideItem>,
    winner: Option<usize>,
}

impl Catalog {
    /// Builds a catalog, resolving the winner by exact display-name match.
    ///
    /// The first matching item wins; later duplicates are ordinary slides.
    pub fn new(items: Vec<SlideItem>, winner_name: Option<&str>) -> Result<Self, CatalogError> {
        if items.is_empty() {
            return Err(CatalogError::Empty);
        }
        let winner = winner_name.and_then(|name| {
            let mut matches = items
                .iter()
                .enumerate()
                .filter(|(_, item)| item.display_name == name)
                .map(|(idx, _)| idx);
            let first = matches.next();
            let extra = matches.count();
            if extra > 0 {
                warn!(name, extra, "winner name matches several slides; using the first");
            }
            if first.is_none() {
                warn!(name, "winner name matches no slide; winner reveal disabled");
            }
            first
        });
        Ok(Self { items, winner })
    }

    pub fn load(cfg: &Configuration) -> Result<Self, CatalogError> {
        let items = match &cfg.catalog_dir {
            Some(dir) => scan_dir(dir)?,
            None => cfg
                .catalog
                .iter()
                .map(|entry| SlideItem::new(&entry.asset, &entry.name, &entry.caption))
                .collect(),
        };
        let catalog = Self::new(items, cfg.winner_name.as_deref())?;
        info!(
            slides = catalog.len(),
            winner = ?catalog.winner_index(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; an empty catalog cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SlideItem> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[SlideItem] {
        &self.items
    }

    pub fn winner_index(&self) -> Option<usize> {
        self.winner
    }

    pub fn is_winner(&self, index: usize) -> bool {
        self.winner == Some(index)
    }
}

/// Collects every image below `dir`, ordered by file name.
///
/// Asset keys are paths relative to `dir`. Entries below `dir` that cannot be
/// read (including symlink loops) are skipped.
pub fn scan_dir(dir: &Path) -> Result<Vec<SlideItem>, CatalogError> {
    if !dir.is_dir() {
        return Err(CatalogError::BadDir(dir.to_path_buf()));
    }
    let mut items = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(err.into()),
            Err(err) => {
                warn!(error = %err, "skipping unreadable catalog entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let Some(stem) = entry.path().file_stem().and_then(OsStr::to_str) else {
            debug!(path = %entry.path().display(), "skipping non-utf8 file name");
            continue;
        };
        items.push(SlideItem::new(
            rel.to_string_lossy(),
            display_name_from_stem(stem),
            "",
        ));
    }
    Ok(items)
}

/// `"07 - Alice Smith"` becomes `"Alice Smith"`; names without a separator are kept.
pub fn display_name_from_stem(stem: &str) -> String {
    stem.rsplit_once(NAME_SEPARATOR)
        .map(|(_, name)| name)
        .unwrap_or(stem)
        .trim()
        .to_string()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> Vec<SlideItem> {
        names
            .iter()
            .map(|name| SlideItem::new(format!("{name}.jpg"), *name, ""))
            .collect()
    }

    #[test]
    fn empty_catalog_is_rejected() {
        assert!(matches!(Catalog::new(Vec::new(), None), Err(CatalogError::Empty)));
    }

    #[test]
    fn winner_resolves_to_first_match() {
        let catalog = Catalog::new(items(&["a", "b", "c", "b"]), Some("b")).unwrap();
        assert_eq!(catalog.winner_index(), Some(1));
        assert!(catalog.is_winner(1));
        assert!(!catalog.is_winner(3));
    }

    #[test]
    fn unknown_winner_leaves_catalog_without_winner() {
        let catalog = Catalog::new(items(&["a", "b"]), Some("z")).unwrap();
        assert_eq!(catalog.winner_index(), None);
    }

    #[test]
    fn display_names_strip_ordering_prefix() {
        assert_eq!(display_name_from_stem("07 - Alice Smith"), "Alice Smith");
        assert_eq!(display_name_from_stem("a - b - Carol"), "Carol");
        assert_eq!(display_name_from_stem("plain"), "plain");
    }
}
