//! Map templates for `cam2map`.
//!
//! A template is either a user-supplied file or one of a few built-in Mars
//! projection presets rendered into the ISIS PVL layout:
//!
//! ```text
//! Group=Mapping
//!   TargetName=Mars
//!   ...
//! End_Group
//! End
//! ```

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Built-in projection presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProjectionPreset {
    /// Simple cylindrical, centered on (0, 0)
    Simplecyl,
    /// North polar stereographic down to 60°N
    Polar,
    /// Equirectangular, centered on (0, 0)
    Eqc,
}

impl ProjectionPreset {
    pub const ALL: [ProjectionPreset; 3] = [Self::Simplecyl, Self::Polar, Self::Eqc];

    /// Preset name as accepted on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simplecyl => "simplecyl",
            Self::Polar => "polar",
            Self::Eqc => "eqc",
        }
    }

    /// Mapping group for this preset.
    pub fn template(&self) -> MapTemplate {
        match self {
            Self::Simplecyl => MapTemplate::mars("SimpleCylindrical", 0.0),
            Self::Polar => MapTemplate {
                latitude_range: Some(LatitudeRange {
                    true_scale: 90.0,
                    minimum: 60.0,
                    maximum: 90.0,
                }),
                ..MapTemplate::mars("PolarStereographic", 90.0)
            },
            Self::Eqc => MapTemplate::mars("Equirectangular", 0.0),
        }
    }
}

impl fmt::Display for ProjectionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProjectionPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown projection preset: {}", s))
    }
}

/// Latitude bounds used by polar projections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatitudeRange {
    pub true_scale: f64,
    pub minimum: f64,
    pub maximum: f64,
}

/// An ISIS `Mapping` group.
#[derive(Debug, Clone, PartialEq)]
pub struct MapTemplate {
    pub target_name: String,
    pub longitude_domain: u32,
    pub projection_name: String,
    pub center_longitude: f64,
    pub center_latitude: f64,
    pub latitude_range: Option<LatitudeRange>,
}

impl MapTemplate {
    fn mars(projection_name: &str, center_latitude: f64) -> Self {
        Self {
            target_name: "Mars".to_string(),
            longitude_domain: 360,
            projection_name: projection_name.to_string(),
            center_longitude: 0.0,
            center_latitude,
            latitude_range: None,
        }
    }

    /// Write the rendered template to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_string())
            .with_context(|| format!("Failed to write map template {}", path.display()))?;
        tracing::info!("Projection map template written: {}", path.display());
        Ok(())
    }
}

impl fmt::Display for MapTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Group=Mapping")?;
        writeln!(f, "  TargetName={}", self.target_name)?;
        writeln!(f, "  LongitudeDomain={}", self.longitude_domain)?;
        writeln!(f, "  ProjectionName={}", self.projection_name)?;
        writeln!(f, "  CenterLongitude={:.1}", self.center_longitude)?;
        writeln!(f, "  CenterLatitude={:.1}", self.center_latitude)?;
        if let Some(range) = &self.latitude_range {
            writeln!(f, "  TrueScaleLatitude={:.1}", range.true_scale)?;
            writeln!(f, "  MinimumLatitude={:.1}", range.minimum)?;
            writeln!(f, "  MaximumLatitude={:.1}", range.maximum)?;
        }
        writeln!(f, "End_Group")?;
        writeln!(f, "End")
    }
}

/// Where the map template for a run comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MapSource {
    /// A user-supplied template file
    File(PathBuf),
    /// A built-in preset, written into the working directory
    Preset(ProjectionPreset),
}

impl MapSource {
    /// Resolve the source to a template file on disk.
    ///
    /// Custom files must exist. Presets are rendered to `<dir>/<name>.map`.
    pub fn resolve(&self, dir: &Path) -> Result<PathBuf> {
        match self {
            Self::File(path) => {
                if !path.is_file() {
                    anyhow::bail!("Map template not found: {}", path.display());
                }
                path.canonicalize()
                    .with_context(|| format!("Failed to resolve {}", path.display()))
            }
            Self::Preset(preset) => {
                let path = dir.join(format!("{}.map", preset.name()));
                preset.template().write_to(&path)?;
                Ok(path)
            }
        }
    }
}
