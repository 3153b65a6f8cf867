//! End-to-end pipeline tests against a fake ISIS toolchain.
//!
//! Tests cover:
//! 1. Full run with cleanup leaves only level-2 cubes and PNGs
//! 2. Full run without cleanup removes nothing
//! 3. spiceinit web fallback mid-run
//! 4. Pre-flight failures run no tools
//! 5. Re-running a finished directory

use crate::config::Config;
use crate::exec::{CommandRunner, Invocation};
use crate::pipeline::Stage;
use crate::projection::{MapSource, ProjectionPreset};
use crate::{prepare_run, run_pipeline, RunRequest};
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Pretends to be ISIS: writes the files each tool would produce.
#[derive(Default)]
struct FakeIsis {
    calls: Vec<Invocation>,
    /// Exact command lines that fail
    failing: Vec<String>,
    /// Bands written per explode call
    bands: usize,
}

impl FakeIsis {
    fn new(bands: usize) -> Self {
        Self {
            bands,
            ..Default::default()
        }
    }

    fn calls_to(&self, program: &str) -> Vec<&Invocation> {
        self.calls.iter().filter(|c| c.program == program).collect()
    }
}

impl CommandRunner for FakeIsis {
    async fn run(&mut self, invocation: &Invocation) -> Result<()> {
        self.calls.push(invocation.clone());
        if self.failing.contains(&invocation.to_string()) {
            anyhow::bail!("{} exited with exit status: 1", invocation.program);
        }

        let to = invocation.value_of("to").map(PathBuf::from);
        match (invocation.program.as_str(), to) {
            ("marci2isis" | "marcical" | "cam2map", Some(to)) => std::fs::write(to, b"cube")?,
            ("explode", Some(to)) => {
                for band in 1..=self.bands {
                    let name = format!("{}.band{:04}.cub", to.display(), band);
                    std::fs::write(name, b"band")?;
                }
            }
            ("isis2std", Some(to)) => std::fs::write(format!("{}.png", to.display()), b"png")?,
            _ => {}
        }
        Ok(())
    }
}

fn touch(dir: &Path, names: &[&str]) {
    for name in names {
        std::fs::write(dir.join(name), b"").unwrap();
    }
}

fn listing(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

fn request(dir: &Path, delete: bool) -> RunRequest {
    RunRequest {
        dir: dir.to_path_buf(),
        map: MapSource::Preset(ProjectionPreset::Simplecyl),
        delete_intermediate: Some(delete),
    }
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_full_run_with_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), &["A.IMG", "B.IMG"]);

    let options = prepare_run(&Config::default(), &request(dir.path(), true)).unwrap();
    let mut runner = FakeIsis::new(2);
    let summary = {
        let mut pipeline = crate::Pipeline::new(&mut runner, options);
        pipeline.run().await
    };

    assert_eq!(
        listing(dir.path()),
        set(&[
            "A0001.lev2.cub",
            "A0001.png",
            "A0002.lev2.cub",
            "A0002.png",
            "B0001.lev2.cub",
            "B0001.png",
            "B0002.lev2.cub",
            "B0002.png",
            "simplecyl.map",
        ])
    );

    assert_eq!(summary.total_failed(), 0);
    assert_eq!(summary.stage(Stage::Ingest).unwrap().deleted, 2);
    assert_eq!(summary.stage(Stage::SpiceInit).unwrap().deleted, 0);
    assert_eq!(summary.stage(Stage::Calibrate).unwrap().deleted, 2);
    assert_eq!(summary.stage(Stage::Explode).unwrap().deleted, 2);
    assert_eq!(summary.stage(Stage::Project).unwrap().deleted, 4);
    assert_eq!(summary.stage(Stage::Export).unwrap().deleted, 0);
    assert_eq!(summary.stage(Stage::Export).unwrap().succeeded, 4);

    // Map template passed to every projection
    let map = dir.path().canonicalize().unwrap().join("simplecyl.map");
    for call in runner.calls_to("cam2map") {
        assert_eq!(call.value_of("map"), Some(map.display().to_string().as_str()));
    }
}

#[tokio::test]
async fn test_full_run_without_cleanup_keeps_everything() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), &["A.IMG"]);

    let options = prepare_run(&Config::default(), &request(dir.path(), false)).unwrap();
    let summary = run_pipeline(FakeIsis::new(1), options).await;

    assert_eq!(summary.total_deleted(), 0);
    assert_eq!(
        listing(dir.path()),
        set(&[
            "A.IMG",
            "A.cub",
            "A.lev1.cub",
            "A.band0001.cub",
            "A0001.lev2.cub",
            "A0001.png",
            "simplecyl.map",
        ])
    );
}

#[tokio::test]
async fn test_spiceinit_web_fallback_then_continue() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), &["A.IMG", "B.IMG"]);

    let options = prepare_run(&Config::default(), &request(dir.path(), true)).unwrap();
    let root = options.context.dir.clone();
    let mut runner = FakeIsis::new(1);
    runner
        .failing
        .push(format!("spiceinit from={}", root.join("A.cub").display()));

    let summary = {
        let mut pipeline = crate::Pipeline::new(&mut runner, options);
        pipeline.run().await
    };

    let spice: Vec<String> = runner
        .calls_to("spiceinit")
        .iter()
        .map(|c| c.to_string())
        .collect();
    assert_eq!(
        spice,
        vec![
            format!("spiceinit from={}", root.join("A.cub").display()),
            format!("spiceinit from={} web=true", root.join("A.cub").display()),
            format!("spiceinit from={}", root.join("B.cub").display()),
        ]
    );

    let stats = summary.stage(Stage::SpiceInit).unwrap();
    assert_eq!(stats.fallbacks, 1);
    assert_eq!(stats.recovered, 1);
    assert_eq!(stats.failed, 0);

    // Both images still reach the end
    assert!(root.join("A0001.png").exists());
    assert!(root.join("B0001.png").exists());
}

#[tokio::test]
async fn test_failed_ingest_keeps_raw_image() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), &["A.IMG", "B.IMG"]);

    let options = prepare_run(&Config::default(), &request(dir.path(), true)).unwrap();
    let root = options.context.dir.clone();
    let mut runner = FakeIsis::new(1);
    runner.failing.push(format!(
        "marci2isis from={} to={}",
        root.join("A.IMG").display(),
        root.join("A.cub").display()
    ));

    let summary = {
        let mut pipeline = crate::Pipeline::new(&mut runner, options);
        pipeline.run().await
    };

    assert_eq!(summary.stage(Stage::Ingest).unwrap().failed, 1);
    assert!(root.join("A.IMG").exists());
    assert!(root.join("B0001.png").exists());
    assert!(!root.join("A0001.png").exists());
}

#[tokio::test]
async fn test_missing_custom_map_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), &["A.IMG"]);

    let request = RunRequest {
        dir: dir.path().to_path_buf(),
        map: MapSource::File(dir.path().join("missing.map")),
        delete_intermediate: Some(true),
    };

    let err = prepare_run(&Config::default(), &request).unwrap_err();
    assert!(err.to_string().contains("Map template not found"));
    assert_eq!(listing(dir.path()), set(&["A.IMG"]));
}

#[tokio::test]
async fn test_rerun_on_finished_directory_only_reexports() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), &["A.IMG"]);

    let options = prepare_run(&Config::default(), &request(dir.path(), true)).unwrap();
    run_pipeline(FakeIsis::new(1), options.clone()).await;

    let mut runner = FakeIsis::new(1);
    {
        let mut pipeline = crate::Pipeline::new(&mut runner, options);
        pipeline.run().await;
    }

    // Level-2 cubes are never mistaken for earlier products
    let programs: Vec<&str> = runner.calls.iter().map(|c| c.program.as_str()).collect();
    assert_eq!(programs, vec!["isis2std"]);
}
