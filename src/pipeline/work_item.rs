//! Typed descriptors for the files moving through the pipeline.
//!
//! Every file name is classified into exactly one [`ProductKind`] by its
//! suffix, longest suffix first, so `A.lev1.cub` is a level-1 cube and never
//! a plain `.cub`:
//!
//! ```text
//! A.IMG → A.cub → A.lev1.cub → A.band0001.cub → A0001.lev2.cub → A0001.png
//! ```

use super::Stage;
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// What a file is, judged by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProductKind {
    /// Raw PDS image, `X.IMG`
    Raw,
    /// Ingested cube, `X.cub`
    Cube,
    /// Calibrated cube, `X.lev1.cub`
    Level1,
    /// Single exploded band, `X.bandNNNN.cub`
    Band,
    /// Map-projected band, `X.lev2.cub`
    Level2,
    /// Exported image, `X.png`
    Png,
}

impl ProductKind {
    pub const ALL: [ProductKind; 6] = [
        Self::Raw,
        Self::Cube,
        Self::Level1,
        Self::Band,
        Self::Level2,
        Self::Png,
    ];

    /// The stage whose tool creates files of this kind.
    pub fn produced_by(&self) -> Option<Stage> {
        match self {
            Self::Raw => None,
            Self::Cube => Some(Stage::Ingest),
            Self::Level1 => Some(Stage::Calibrate),
            Self::Band => Some(Stage::Explode),
            Self::Level2 => Some(Stage::Project),
            Self::Png => Some(Stage::Export),
        }
    }

    /// File name for a product of this kind.
    ///
    /// Only [`ProductKind::Band`] uses `band`.
    pub fn file_name(&self, stem: &str, band: Option<&str>) -> String {
        match self {
            Self::Raw => format!("{}.IMG", stem),
            Self::Cube => format!("{}.cub", stem),
            Self::Level1 => format!("{}.lev1.cub", stem),
            Self::Band => format!("{}.band{}.cub", stem, band.unwrap_or_default()),
            Self::Level2 => format!("{}.lev2.cub", stem),
            Self::Png => format!("{}.png", stem),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Raw => "raw images",
            Self::Cube => "cubes",
            Self::Level1 => "level-1 cubes",
            Self::Band => "band cubes",
            Self::Level2 => "level-2 cubes",
            Self::Png => "PNG exports",
        }
    }
}

/// A file at some point of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub path: PathBuf,
    /// File name without the kind suffix (and without the band number)
    pub stem: String,
    pub kind: ProductKind,
    /// Band number as written by `explode`, zero padding kept
    pub band: Option<String>,
}

impl WorkItem {
    /// Classify a file name. Returns `None` for files the pipeline ignores.
    pub fn classify(dir: &Path, file_name: &str) -> Option<WorkItem> {
        let (stem, kind, band) = if let Some(stem) = file_name.strip_suffix(".lev2.cub") {
            (stem, ProductKind::Level2, None)
        } else if let Some(stem) = file_name.strip_suffix(".lev1.cub") {
            (stem, ProductKind::Level1, None)
        } else if let Some(rest) = file_name.strip_suffix(".cub") {
            match split_band(rest) {
                Some((stem, band)) => (stem, ProductKind::Band, Some(band.to_string())),
                None => (rest, ProductKind::Cube, None),
            }
        } else if let Some(stem) = file_name.strip_suffix(".IMG") {
            (stem, ProductKind::Raw, None)
        } else if let Some(stem) = file_name.strip_suffix(".png") {
            (stem, ProductKind::Png, None)
        } else {
            return None;
        };

        if stem.is_empty() {
            return None;
        }

        Some(WorkItem {
            path: dir.join(file_name),
            stem: stem.to_string(),
            kind,
            band,
        })
    }

    /// The successor of this item as `kind`, in `dir`.
    ///
    /// Projection folds the band number into the stem, matching what
    /// `cam2map` is told to write (`A.band0001.cub` → `A0001.lev2.cub`).
    pub fn successor(&self, dir: &Path, kind: ProductKind) -> WorkItem {
        let stem = match (self.kind, &self.band) {
            (ProductKind::Band, Some(band)) => format!("{}{}", self.stem, band),
            _ => self.stem.clone(),
        };
        WorkItem {
            path: dir.join(kind.file_name(&stem, None)),
            stem,
            kind,
            band: None,
        }
    }

    pub fn file_name(&self) -> String {
        self.kind.file_name(&self.stem, self.band.as_deref())
    }

    /// Whether this item's successor as `kind` would be read back as `kind`.
    ///
    /// `A.lev1.IMG` would ingest to `A.lev1.cub`, which reads as a level-1
    /// cube and would silently skip spiceinit and marcical.
    pub fn successor_is_unambiguous(&self, kind: ProductKind) -> bool {
        let next = self.successor(Path::new(""), kind);
        WorkItem::classify(Path::new(""), &next.file_name()).map(|i| i.kind) == Some(kind)
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Split `X.bandNNNN` into (`X`, `NNNN`).
fn split_band(name: &str) -> Option<(&str, &str)> {
    let (stem, band) = name.rsplit_once(".band")?;
    if band.is_empty() || !band.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((stem, band))
}

/// All items of `kind` in `dir`, sorted by file name.
pub fn discover(dir: &Path, kind: ProductKind) -> Result<Vec<WorkItem>> {
    Ok(inventory(dir)?
        .into_iter()
        .filter(|item| item.kind == kind)
        .collect())
}

/// Every recognised item in `dir`, sorted by file name.
pub fn inventory(dir: &Path) -> Result<Vec<WorkItem>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut items = Vec::new();
    for entry in entries {
        let entry = entry?;
        // Symlinks to files count as files
        if !entry.path().is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            tracing::debug!("Skipping non UTF-8 file name {:?}", file_name);
            continue;
        };
        let Some(item) = WorkItem::classify(dir, file_name) else {
            continue;
        };
        if item.kind == ProductKind::Raw && !item.successor_is_unambiguous(ProductKind::Cube) {
            tracing::warn!(
                "Skipping {}: its cube name would be mistaken for a later product",
                item
            );
            continue;
        }
        items.push(item);
    }
    items.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(items)
}
