//! The six fixed processing stages.
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌──────────┐   ┌─────────┐   ┌─────────┐   ┌──────────┐
//! │ marci2isis │──▶│ spiceinit │──▶│ marcical │──▶│ explode │──▶│ cam2map │──▶│ isis2std │
//! └────────────┘   └───────────┘   └──────────┘   └─────────┘   └─────────┘   └──────────┘
//!     *.IMG           *.cub           *.cub        *.lev1.cub   *.bandN.cub   *.lev2.cub
//! ```
//!
//! Each stage maps one input [`WorkItem`] to a [`StagePlan`]: the command to
//! run, an optional fallback, and when the input may be deleted afterwards.

use super::{ProductKind, WorkItem};
use crate::config::ToolConfig;
use crate::exec::{Fallback, Invocation};
use std::fmt;
use std::path::{Path, PathBuf};

/// A processing stage, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// `marci2isis`: raw image to cube
    Ingest,
    /// `spiceinit`: attach SPICE kernels, in place
    SpiceInit,
    /// `marcical`: radiometric calibration
    Calibrate,
    /// `explode`: split the calibrated cube into bands
    Explode,
    /// `cam2map`: map-project each band
    Project,
    /// `isis2std`: export to PNG
    Export,
}

/// When a stage may delete its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deletion {
    /// Never delete
    Never,
    /// Delete once the command succeeded
    OnSuccess,
    /// Delete once the command succeeded and this file exists
    WhenExists(PathBuf),
    /// Delete once the command succeeded and at least one band cube with
    /// this stem exists
    WhenBandsExist(String),
}

/// What to do for one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub invocation: Invocation,
    pub fail_message: String,
    pub fallback: Option<Fallback>,
    pub deletion: Deletion,
}

/// Inputs every stage needs to build its commands.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub dir: PathBuf,
    pub map_template: PathBuf,
    pub tools: ToolConfig,
    pub spice_web_fallback: bool,
    pub verify_band_outputs: bool,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Self::Ingest,
        Self::SpiceInit,
        Self::Calibrate,
        Self::Explode,
        Self::Project,
        Self::Export,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::SpiceInit => "spiceinit",
            Self::Calibrate => "calibrate",
            Self::Explode => "explode",
            Self::Project => "project",
            Self::Export => "export",
        }
    }

    /// The kind of file this stage consumes.
    pub fn input(&self) -> ProductKind {
        match self {
            Self::Ingest => ProductKind::Raw,
            Self::SpiceInit | Self::Calibrate => ProductKind::Cube,
            Self::Explode => ProductKind::Level1,
            Self::Project => ProductKind::Band,
            Self::Export => ProductKind::Level2,
        }
    }

    /// Configured tool name for this stage.
    pub fn tool<'a>(&self, tools: &'a ToolConfig) -> &'a str {
        match self {
            Self::Ingest => &tools.marci2isis,
            Self::SpiceInit => &tools.spiceinit,
            Self::Calibrate => &tools.marcical,
            Self::Explode => &tools.explode,
            Self::Project => &tools.cam2map,
            Self::Export => &tools.isis2std,
        }
    }

    /// Build the plan for one input item.
    pub fn plan(&self, item: &WorkItem, ctx: &StageContext) -> StagePlan {
        let dir = ctx.dir.as_path();
        let command = Invocation::new(ctx.tools.program(self.tool(&ctx.tools)))
            .path_arg("from", &item.path);

        match self {
            Self::Ingest => {
                let cube = item.successor(dir, ProductKind::Cube);
                StagePlan {
                    invocation: command.path_arg("to", &cube.path),
                    fail_message: format!("marci2isis failed for {}", item),
                    fallback: None,
                    deletion: Deletion::WhenExists(cube.path),
                }
            }
            Self::SpiceInit => {
                let fallback = ctx.spice_web_fallback.then(|| Fallback {
                    invocation: command.clone().arg("web", "true"),
                    warning: format!("Falling back to SPICE Web Services for {}", item),
                    fail_message: format!("SPICE Web Services also failed for {}", item),
                });
                StagePlan {
                    invocation: command,
                    fail_message: format!("spiceinit failed for {}, trying web...", item),
                    fallback,
                    deletion: Deletion::Never,
                }
            }
            Self::Calibrate => {
                let lev1 = item.successor(dir, ProductKind::Level1);
                StagePlan {
                    invocation: command.path_arg("to", &lev1.path),
                    fail_message: format!("marcical failed for {}", item),
                    fallback: None,
                    deletion: Deletion::WhenExists(lev1.path),
                }
            }
            Self::Explode => {
                // explode appends .bandNNNN.cub to the target itself
                let deletion = if ctx.verify_band_outputs {
                    Deletion::WhenBandsExist(item.stem.clone())
                } else {
                    Deletion::OnSuccess
                };
                StagePlan {
                    invocation: command.path_arg("to", &dir.join(&item.stem)),
                    fail_message: format!("explode failed for {}", item),
                    fallback: None,
                    deletion,
                }
            }
            Self::Project => {
                let lev2 = item.successor(dir, ProductKind::Level2);
                StagePlan {
                    invocation: command
                        .path_arg("map", &ctx.map_template)
                        .path_arg("to", &lev2.path),
                    fail_message: format!("cam2map failed for {}", item),
                    fallback: None,
                    deletion: Deletion::WhenExists(lev2.path),
                }
            }
            Self::Export => StagePlan {
                // isis2std appends the .png extension itself
                invocation: command.path_arg("to", &dir.join(&item.stem)),
                fail_message: format!("isis2std failed for {}", item),
                fallback: None,
                deletion: Deletion::Never,
            },
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Deletion {
    /// Whether the input may be removed now that the command succeeded.
    pub fn permits(&self, dir: &Path) -> bool {
        match self {
            Self::Never => false,
            Self::OnSuccess => true,
            Self::WhenExists(path) => path.exists(),
            Self::WhenBandsExist(stem) => super::discover(dir, ProductKind::Band)
                .map(|bands| bands.iter().any(|b| b.stem == *stem))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> StageContext {
        StageContext {
            dir: PathBuf::from("/data"),
            map_template: PathBuf::from("/data/polar.map"),
            tools: ToolConfig::default(),
            spice_web_fallback: true,
            verify_band_outputs: false,
        }
    }

    fn item(name: &str) -> WorkItem {
        WorkItem::classify(Path::new("/data"), name).unwrap()
    }

    #[test]
    fn test_stage_inputs_chain() {
        // Every stage after ingest consumes what an earlier stage produced
        for stage in Stage::ALL.iter().skip(1) {
            let producer = stage.input().produced_by().unwrap();
            assert!(producer < *stage, "{} consumes output of {}", stage, producer);
        }
        assert_eq!(Stage::Ingest.input(), ProductKind::Raw);
    }

    #[test]
    fn test_ingest_plan() {
        let plan = Stage::Ingest.plan(&item("A.IMG"), &context());
        assert_eq!(
            plan.invocation.to_string(),
            "marci2isis from=/data/A.IMG to=/data/A.cub"
        );
        assert_eq!(plan.deletion, Deletion::WhenExists(PathBuf::from("/data/A.cub")));
        assert!(plan.fallback.is_none());
    }

    #[test]
    fn test_spiceinit_plan_has_web_fallback() {
        let plan = Stage::SpiceInit.plan(&item("A.cub"), &context());
        assert_eq!(plan.invocation.to_string(), "spiceinit from=/data/A.cub");
        assert_eq!(plan.deletion, Deletion::Never);

        let fallback = plan.fallback.unwrap();
        assert_eq!(
            fallback.invocation.to_string(),
            "spiceinit from=/data/A.cub web=true"
        );
        assert!(fallback.warning.contains("SPICE Web Services"));
    }

    #[test]
    fn test_spiceinit_fallback_can_be_disabled() {
        let mut ctx = context();
        ctx.spice_web_fallback = false;
        assert!(Stage::SpiceInit.plan(&item("A.cub"), &ctx).fallback.is_none());
    }

    #[test]
    fn test_calibrate_plan() {
        let plan = Stage::Calibrate.plan(&item("A.cub"), &context());
        assert_eq!(
            plan.invocation.to_string(),
            "marcical from=/data/A.cub to=/data/A.lev1.cub"
        );
        assert_eq!(
            plan.deletion,
            Deletion::WhenExists(PathBuf::from("/data/A.lev1.cub"))
        );
    }

    #[test]
    fn test_explode_plan_deletes_on_success_only() {
        let plan = Stage::Explode.plan(&item("A.lev1.cub"), &context());
        assert_eq!(
            plan.invocation.to_string(),
            "explode from=/data/A.lev1.cub to=/data/A"
        );
        assert_eq!(plan.deletion, Deletion::OnSuccess);

        let mut ctx = context();
        ctx.verify_band_outputs = true;
        let plan = Stage::Explode.plan(&item("A.lev1.cub"), &ctx);
        assert_eq!(plan.deletion, Deletion::WhenBandsExist("A".to_string()));
    }

    #[test]
    fn test_project_plan_uses_map() {
        let plan = Stage::Project.plan(&item("A.band0003.cub"), &context());
        assert_eq!(
            plan.invocation.to_string(),
            "cam2map from=/data/A.band0003.cub map=/data/polar.map to=/data/A0003.lev2.cub"
        );
        assert_eq!(
            plan.deletion,
            Deletion::WhenExists(PathBuf::from("/data/A0003.lev2.cub"))
        );
    }

    #[test]
    fn test_export_never_deletes() {
        let plan = Stage::Export.plan(&item("A0003.lev2.cub"), &context());
        assert_eq!(
            plan.invocation.to_string(),
            "isis2std from=/data/A0003.lev2.cub to=/data/A0003"
        );
        assert_eq!(plan.deletion, Deletion::Never);
        assert!(!plan.deletion.permits(Path::new("/data")));
    }

    #[test]
    fn test_isis_bin_prefixes_program() {
        let mut ctx = context();
        ctx.tools.isis_bin = Some(PathBuf::from("/opt/isis/bin"));
        let plan = Stage::Calibrate.plan(&item("A.cub"), &ctx);
        assert_eq!(plan.invocation.program, "/opt/isis/bin/marcical");
    }

    #[test]
    fn test_deletion_permits() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("A.cub");
        std::fs::write(&present, b"").unwrap();

        assert!(Deletion::OnSuccess.permits(dir.path()));
        assert!(Deletion::WhenExists(present).permits(dir.path()));
        assert!(!Deletion::WhenExists(dir.path().join("B.cub")).permits(dir.path()));

        assert!(!Deletion::WhenBandsExist("A".to_string()).permits(dir.path()));
        std::fs::write(dir.path().join("A.band0001.cub"), b"").unwrap();
        assert!(Deletion::WhenBandsExist("A".to_string()).permits(dir.path()));
        assert!(!Deletion::WhenBandsExist("B".to_string()).permits(dir.path()));
    }
}
