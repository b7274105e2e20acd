//! Stimulus discovery and item grouping
//!
//! Scans the storage root once, keeps recognized image files, and groups them
//! into presentable items. Ordering is lexicographic on item id so identical
//! storage contents always produce the identical sequence.

use crate::config::{CatalogConfig, CatalogMode};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Recognized stimulus extensions (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// MIME type of a recognized stimulus file, from its extension
pub fn media_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// Single image or ground-truth/candidate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Single,
    Pair,
}

/// Files backing an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemAssets {
    Single(PathBuf),
    Pair {
        ground_truth: PathBuf,
        candidate: PathBuf,
    },
}

/// One unit shown to a participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Filename (single mode) or shared base name (pair mode)
    pub id: String,
    pub assets: ItemAssets,
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self.assets {
            ItemAssets::Single(_) => ItemKind::Single,
            ItemAssets::Pair { .. } => ItemKind::Pair,
        }
    }
}

/// Ordered, immutable item sequence for one storage root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    root: PathBuf,
    items: Vec<Item>,
}

impl Catalog {
    /// Build a catalog from an already ordered item list
    pub fn from_items(root: impl Into<PathBuf>, items: Vec<Item>) -> Self {
        Self {
            root: root.into(),
            items,
        }
    }

    /// Scan `config.image_dir` and group files per `config.mode`
    pub fn load(config: &CatalogConfig) -> Result<Self> {
        let root = &config.image_dir;
        let files = scan_image_files(root)?;

        let items = match config.mode {
            CatalogMode::Single => files
                .into_iter()
                .map(|(name, path)| Item {
                    id: name,
                    assets: ItemAssets::Single(path),
                })
                .collect(),
            CatalogMode::Pair => group_pairs(
                files,
                &config.ground_truth_marker,
                &config.candidate_marker,
            ),
        };

        info!(
            "Catalog loaded from {}: {} items ({:?} mode)",
            root.display(),
            items.len(),
            config.mode
        );

        Ok(Self {
            root: root.clone(),
            items,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// List recognized image files directly under `root`, sorted by filename
fn scan_image_files(root: &Path) -> Result<BTreeMap<String, PathBuf>> {
    if !root.exists() {
        return Err(Error::Catalog(format!(
            "Storage root not found: {}",
            root.display()
        )));
    }
    if !root.is_dir() {
        return Err(Error::Catalog(format!(
            "Storage root is not a directory: {}",
            root.display()
        )));
    }
    std::fs::read_dir(root).map_err(|e| {
        Error::Catalog(format!("Storage root unreadable {}: {}", root.display(), e))
    })?;

    let mut files = BTreeMap::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error accessing catalog entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if has_image_extension(&name) {
            files.insert(name, entry.path().to_path_buf());
        } else {
            debug!("Skipping non-image file {}", name);
        }
    }

    Ok(files)
}

fn has_image_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[derive(Default)]
struct PairHalves {
    ground_truth: Option<PathBuf>,
    candidate: Option<PathBuf>,
}

/// Pair `<base><gt_marker>.<ext>` with `<base><candidate_marker>.<ext>`
///
/// Files arrive sorted by name, so when a base has two files for the same
/// role the lexicographically first one wins.
fn group_pairs(
    files: BTreeMap<String, PathBuf>,
    gt_marker: &str,
    candidate_marker: &str,
) -> Vec<Item> {
    let mut groups: BTreeMap<String, PairHalves> = BTreeMap::new();

    let mut markers = [(gt_marker, true), (candidate_marker, false)];
    markers.sort_by_key(|&(marker, _)| std::cmp::Reverse(marker.len()));

    for (name, path) in files {
        let stem = match Path::new(&name).file_stem() {
            Some(stem) => stem.to_string_lossy().to_string(),
            None => continue,
        };

        // Longer marker first, so `_x_gt` is never claimed by `_gt`
        let (base, is_gt) = match markers
            .iter()
            .find_map(|&(marker, is_gt)| stem.strip_suffix(marker).map(|base| (base, is_gt)))
        {
            Some((base, is_gt)) => (base.to_string(), is_gt),
            None => {
                debug!("Skipping {}: no pair marker", name);
                continue;
            }
        };

        if base.is_empty() {
            warn!("Skipping {}: empty base name", name);
            continue;
        }

        let halves = groups.entry(base).or_default();
        let slot = if is_gt {
            &mut halves.ground_truth
        } else {
            &mut halves.candidate
        };
        if slot.is_none() {
            *slot = Some(path);
        } else {
            warn!("Duplicate pair half {} ignored", name);
        }
    }

    groups
        .into_iter()
        .filter_map(|(base, halves)| match (halves.ground_truth, halves.candidate) {
            (Some(ground_truth), Some(candidate))
                if media_type(&ground_truth) != media_type(&candidate) =>
            {
                // The image format would tell the sides apart
                warn!(
                    "Pair {} dropped: {} and {} differ in image format",
                    base,
                    ground_truth.display(),
                    candidate.display()
                );
                None
            }
            (Some(ground_truth), Some(candidate)) => Some(Item {
                id: base,
                assets: ItemAssets::Pair {
                    ground_truth,
                    candidate,
                },
            }),
            (Some(path), None) | (None, Some(path)) => {
                warn!("Unmatched pair half dropped: {}", path.display());
                None
            }
            (None, None) => None,
        })
        .collect()
}

type CacheKey = (PathBuf, CatalogMode, String, String);

/// Memoizes loaded catalogs per storage root
#[derive(Default)]
pub struct CatalogCache {
    entries: Mutex<HashMap<CacheKey, Arc<Catalog>>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached catalog or scan storage on first use
    ///
    /// Failed loads are not cached.
    pub fn load(&self, config: &CatalogConfig) -> Result<Arc<Catalog>> {
        let key = (
            config.image_dir.clone(),
            config.mode,
            config.ground_truth_marker.clone(),
            config.candidate_marker.clone(),
        );

        if let Some(catalog) = self.lock().get(&key) {
            return Ok(Arc::clone(catalog));
        }

        let catalog = Arc::new(Catalog::load(config)?);
        self.lock()
            .entry(key)
            .or_insert_with(|| Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Drop cached catalogs for `root` so the next load rescans storage
    pub fn invalidate(&self, root: &Path) {
        self.lock().retain(|(cached_root, ..), _| cached_root != root);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Arc<Catalog>>> {
        // A poisoned cache only holds fully built catalogs
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
