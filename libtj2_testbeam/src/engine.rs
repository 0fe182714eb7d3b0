//! Execution of processing paths through the external Marlin framework.
//!
//! Each job (calibration or reconstruction) gets its own work directory under `tmp-runs/`,
//! populated with a copy of the steering files. Every scheduled path is rendered into a
//! steering file and handed to a [`MarlinRunner`], strictly one after the other.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::rc::Rc;
use std::sync::mpsc::Sender;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::config::file_stem;
use super::error::EngineError;
use super::path::ProcessingPath;
use super::stage_status::{RunKind, StageStatus};
use super::steering::write_steering_file;

const TMP_RUNS_DIR: &str = "tmp-runs";
const CAL_FILES_DIR: &str = "cal-files";
const ROOT_FILES_DIR: &str = "root-files";
const LOCAL_DB_DIR: &str = "localDB";
const MANIFEST_NAME: &str = "calibration.yml";

/// Something able to execute one Marlin steering file
pub trait MarlinRunner {
    /// Run the steering file with `workdir` as current directory, writing all output to `log`
    fn run(&self, steering: &Path, workdir: &Path, log: &Path) -> Result<(), EngineError>;
}

/// Runs the Marlin executable found at `program` (or on the PATH)
#[derive(Debug, Clone)]
pub struct MarlinExecutable {
    program: PathBuf,
}

impl MarlinExecutable {
    pub fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
        }
    }
}

impl MarlinRunner for MarlinExecutable {
    fn run(&self, steering: &Path, workdir: &Path, log: &Path) -> Result<(), EngineError> {
        let stdout = File::create(log)?;
        let stderr = stdout.try_clone()?;
        let status = Command::new(&self.program)
            .arg(steering)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|source| EngineError::LaunchError {
                program: self.program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::ProcessorFailure {
                path: file_stem(steering),
                steering: steering.to_path_buf(),
                log: log.to_path_buf(),
                code: status.code(),
            })
        }
    }
}

/// Recursively copy the contents of `src` into `dst`, returning the number of bytes copied
pub fn copy_dir_contents(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    std::fs::create_dir_all(dst)?;
    let mut total: u64 = 0;
    for item in src.read_dir()? {
        let item_path = item?.path();
        let Some(name) = item_path.file_name() else {
            continue;
        };
        let target = dst.join(name);
        if item_path.is_dir() {
            total += copy_dir_contents(&item_path, &target)?;
        } else {
            total += std::fs::copy(&item_path, &target)?;
        }
    }
    Ok(total)
}

/// Record of a finished calibration, stored next to the calibration data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationManifest {
    pub caltag: String,
    pub raw_file: PathBuf,
    pub started: String,
    pub finished: String,
    pub paths: Vec<String>,
}

impl CalibrationManifest {
    pub fn read(path: &Path) -> Result<Self, EngineError> {
        let yaml_str = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }
}

fn now_rfc3339() -> Result<String, EngineError> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}

/// The work area of one named job
#[derive(Debug, Clone)]
pub struct Environment {
    name: String,
    steerfiles: PathBuf,
    output_path: PathBuf,
}

impl Environment {
    pub fn new(name: &str, steerfiles: &Path, output_path: &Path) -> Self {
        Self {
            name: name.to_string(),
            steerfiles: steerfiles.to_path_buf(),
            output_path: output_path.to_path_buf(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn work_directory(&self) -> PathBuf {
        self.output_path.join(TMP_RUNS_DIR).join(&self.name)
    }

    pub fn calibration_directory(&self, caltag: &str) -> PathBuf {
        self.output_path.join(CAL_FILES_DIR).join(caltag)
    }

    pub fn root_files_directory(&self) -> PathBuf {
        self.output_path.join(ROOT_FILES_DIR)
    }

    /// Start from a clean work directory holding a copy of the steering files
    fn prepare(&self, input_file: &Path) -> Result<PathBuf, EngineError> {
        if !input_file.exists() {
            return Err(EngineError::InputNotFound(input_file.to_path_buf()));
        }
        if !self.steerfiles.is_dir() {
            return Err(EngineError::MissingSteerFiles(self.steerfiles.clone()));
        }
        let workdir = self.work_directory();
        if workdir.exists() {
            std::fs::remove_dir_all(&workdir)?;
        }
        copy_dir_contents(&self.steerfiles, &workdir)?;
        std::fs::create_dir_all(workdir.join(LOCAL_DB_DIR))?;
        spdlog::info!("Prepared work directory {}", workdir.to_string_lossy());
        Ok(workdir)
    }

    /// Execute the paths in order, stopping at the first failure
    fn run_paths<R: MarlinRunner>(
        &self,
        runner: &R,
        workdir: &Path,
        paths: &[Rc<ProcessingPath>],
        kind: RunKind,
        tx: &Sender<StageStatus>,
    ) -> Result<(), EngineError> {
        let total = paths.len();
        tx.send(StageStatus::new(kind, "", 0, total))?;
        for (idx, path) in paths.iter().enumerate() {
            let stem = format!("{:02}-{}", idx, path.name);
            let steering = workdir.join(format!("{stem}.xml"));
            let log = workdir.join(format!("{stem}.log"));
            write_steering_file(path, &steering)?;
            spdlog::info!("Running {} ({}/{})...", path.name, idx + 1, total);
            runner.run(&steering, workdir, &log).map_err(|e| {
                spdlog::error!("Path {} failed, see {}", path.name, log.to_string_lossy());
                match e {
                    EngineError::ProcessorFailure {
                        steering,
                        log,
                        code,
                        ..
                    } => EngineError::ProcessorFailure {
                        path: path.name.clone(),
                        steering,
                        log,
                        code,
                    },
                    other => other,
                }
            })?;
            tx.send(StageStatus::new(kind, &path.name, idx + 1, total))?;
        }
        Ok(())
    }
}

/// Calibration job: produces the calibration data for a caltag
#[derive(Debug, Clone)]
pub struct Calibration {
    env: Environment,
}

impl Calibration {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Run all calibration paths and store `localDB` under `cal-files/<caltag>`
    pub fn calibrate<R: MarlinRunner>(
        &self,
        runner: &R,
        paths: &[Rc<ProcessingPath>],
        ifile: &Path,
        caltag: &str,
        tx: &Sender<StageStatus>,
    ) -> Result<PathBuf, EngineError> {
        let started = now_rfc3339()?;
        spdlog::info!("Starting calibration {} with caltag {}", self.env.name(), caltag);
        let workdir = self.env.prepare(ifile)?;
        self.env
            .run_paths(runner, &workdir, paths, RunKind::Calibration, tx)?;

        let cal_dir = self.env.calibration_directory(caltag);
        if cal_dir.exists() {
            spdlog::warn!(
                "Overwriting existing calibration data in {}",
                cal_dir.to_string_lossy()
            );
            std::fs::remove_dir_all(&cal_dir)?;
        }
        let bytes = copy_dir_contents(&workdir.join(LOCAL_DB_DIR), &cal_dir)?;
        spdlog::info!(
            "Stored {} of calibration data in {}",
            human_bytes::human_bytes(bytes as f64),
            cal_dir.to_string_lossy()
        );

        let manifest = CalibrationManifest {
            caltag: caltag.to_string(),
            raw_file: ifile.to_path_buf(),
            started,
            finished: now_rfc3339()?,
            paths: paths.iter().map(|p| p.name.clone()).collect(),
        };
        std::fs::write(cal_dir.join(MANIFEST_NAME), serde_yaml::to_string(&manifest)?)?;
        Ok(cal_dir)
    }
}

/// Reconstruction job: runs with the calibration data of a caltag
#[derive(Debug, Clone)]
pub struct Reconstruction {
    env: Environment,
}

impl Reconstruction {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Run the reconstruction paths and collect the produced root files in `root-files/`.
    ///
    /// Each root file is renamed `<stem>-<job name>.root`. Returns the collected files.
    pub fn reconstruct<R: MarlinRunner>(
        &self,
        runner: &R,
        paths: &[Rc<ProcessingPath>],
        ifile: &Path,
        caltag: &str,
        tx: &Sender<StageStatus>,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let cal_dir = self.env.calibration_directory(caltag);
        if !cal_dir.is_dir() {
            return Err(EngineError::MissingCalibration(cal_dir));
        }
        spdlog::info!("Starting reconstruction {} with caltag {}", self.env.name(), caltag);
        let workdir = self.env.prepare(ifile)?;
        copy_dir_contents(&cal_dir, &workdir.join(LOCAL_DB_DIR))?;
        self.env
            .run_paths(runner, &workdir, paths, RunKind::Reconstruction, tx)?;

        let root_dir = self.env.root_files_directory();
        std::fs::create_dir_all(&root_dir)?;
        let mut collected: Vec<PathBuf> = Vec::new();
        for item in workdir.read_dir()? {
            let item_path = item?.path();
            let is_root = item_path
                .extension()
                .map(|ext| ext == "root")
                .unwrap_or(false);
            if !is_root || !item_path.is_file() {
                continue;
            }
            let target = root_dir.join(format!(
                "{}-{}.root",
                file_stem(&item_path),
                self.env.name()
            ));
            std::fs::copy(&item_path, &target)?;
            std::fs::remove_file(&item_path)?;
            spdlog::info!("Wrote {}", target.to_string_lossy());
            collected.push(target);
        }
        collected.sort();
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathGlobals;
    use crate::processor::{Processor, ProcessorConfig, TrackFitDqm};
    use std::cell::RefCell;
    use std::sync::mpsc;
    use tempfile::TempDir;

    /// Records every steering file and fakes the outputs Marlin would write
    #[derive(Default)]
    struct RecordingRunner {
        steering: RefCell<Vec<PathBuf>>,
        fail_on: Option<String>,
    }

    impl MarlinRunner for RecordingRunner {
        fn run(&self, steering: &Path, workdir: &Path, log: &Path) -> Result<(), EngineError> {
            self.steering.borrow_mut().push(steering.to_path_buf());
            let stem = file_stem(steering);
            if let Some(name) = &self.fail_on {
                if stem.ends_with(name.as_str()) {
                    return Err(EngineError::ProcessorFailure {
                        path: stem,
                        steering: steering.to_path_buf(),
                        log: log.to_path_buf(),
                        code: Some(1),
                    });
                }
            }
            std::fs::write(workdir.join("localDB").join("alignmentDB.root"), stem)?;
            std::fs::write(workdir.join("Histos-TJ2-run826.root"), "histos")?;
            Ok(())
        }
    }

    fn path(name: &str) -> Rc<ProcessingPath> {
        let mut path = ProcessingPath::new(name, PathGlobals::default());
        path.add_processor(Processor::new(
            "TelescopeDQM",
            ProcessorConfig::TrackFitDqm(TrackFitDqm {
                root_file: String::from("TelescopeDQM.root"),
            }),
        ));
        Rc::new(path)
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let steerfiles = dir.path().join("steering-files");
        std::fs::create_dir_all(steerfiles.join("localDB")).unwrap();
        std::fs::write(steerfiles.join("geoid1.xml"), "<gear/>").unwrap();
        let raw = dir.path().join("run826.txt");
        std::fs::write(&raw, "raw").unwrap();
        (dir, steerfiles, raw)
    }

    #[test]
    fn test_calibrate_then_reconstruct() {
        let (dir, steerfiles, raw) = setup();
        let runner = RecordingRunner::default();
        let (tx, rx) = mpsc::channel::<StageStatus>();
        let mask = path("mask_path");
        let paths = vec![Rc::clone(&mask), path("aligner_path"), Rc::clone(&mask)];

        let cal = Calibration::new(Environment::new(
            "run826-run826-cal",
            &steerfiles,
            dir.path(),
        ));
        let cal_dir = cal.calibrate(&runner, &paths, &raw, "run826", &tx).unwrap();
        assert_eq!(cal_dir, dir.path().join("cal-files").join("run826"));
        assert_eq!(runner.steering.borrow().len(), 3);
        assert_eq!(file_stem(&runner.steering.borrow()[2]), "02-mask_path");
        assert!(cal_dir.join("alignmentDB.root").exists());

        let manifest = CalibrationManifest::read(&cal_dir.join("calibration.yml")).unwrap();
        assert_eq!(manifest.paths, vec!["mask_path", "aligner_path", "mask_path"]);

        let statuses: Vec<StageStatus> = rx.try_iter().collect();
        assert_eq!(statuses.len(), 4);
        assert_eq!(statuses.last().unwrap().progress(), 1.0);

        let reco = Reconstruction::new(Environment::new("run826--reco", &steerfiles, dir.path()));
        let files = reco
            .reconstruct(&runner, &[path("reco_path")], &raw, "run826", &tx)
            .unwrap();
        assert_eq!(
            files,
            vec![dir
                .path()
                .join("root-files")
                .join("Histos-TJ2-run826-run826--reco.root")]
        );
    }

    #[test]
    fn test_reconstruct_requires_calibration() {
        let (dir, steerfiles, raw) = setup();
        let runner = RecordingRunner::default();
        let (tx, _rx) = mpsc::channel::<StageStatus>();
        let reco = Reconstruction::new(Environment::new("run826--reco", &steerfiles, dir.path()));
        let result = reco.reconstruct(&runner, &[path("reco_path")], &raw, "missing", &tx);
        assert!(matches!(result, Err(EngineError::MissingCalibration(_))));
        assert!(runner.steering.borrow().is_empty());
    }

    #[test]
    fn test_failure_stops_the_sequence() {
        let (dir, steerfiles, raw) = setup();
        let runner = RecordingRunner {
            fail_on: Some(String::from("aligner_path")),
            ..Default::default()
        };
        let (tx, _rx) = mpsc::channel::<StageStatus>();
        let paths = vec![path("mask_path"), path("aligner_path"), path("dqm_path")];
        let cal = Calibration::new(Environment::new("cal", &steerfiles, dir.path()));
        let result = cal.calibrate(&runner, &paths, &raw, "run826", &tx);
        match result {
            Err(EngineError::ProcessorFailure { path, steering, .. }) => {
                assert_eq!(path, "aligner_path");
                assert_eq!(file_stem(&steering), "01-aligner_path");
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(runner.steering.borrow().len(), 2);
        assert!(!dir.path().join("cal-files").join("run826").exists());
    }

    #[test]
    fn test_missing_input_file() {
        let (dir, steerfiles, _raw) = setup();
        let runner = RecordingRunner::default();
        let (tx, _rx) = mpsc::channel::<StageStatus>();
        let cal = Calibration::new(Environment::new("cal", &steerfiles, dir.path()));
        let result = cal.calibrate(
            &runner,
            &[path("mask_path")],
            &dir.path().join("run999.txt"),
            "run999",
            &tx,
        );
        assert!(matches!(result, Err(EngineError::InputNotFound(_))));
    }
}
