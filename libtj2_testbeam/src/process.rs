use std::path::PathBuf;
use std::sync::mpsc::Sender;

use super::calibration::create_calibration_paths;
use super::config::Config;
use super::engine::{Calibration, Environment, MarlinRunner, Reconstruction};
use super::error::{ConfigError, EngineError, ProcessorError};
use super::reconstruction::create_reco_path;
use super::run_table::RunTable;
use super::stage_status::StageStatus;
use super::stages::PipelineSettings;

/// What a finished run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub caltag: String,
    pub calibrated: bool,
    pub root_files: Vec<PathBuf>,
}

/// Log the DUT recorded in the run look-up table, if one is configured and present
fn report_device(config: &Config) -> Result<(), ProcessorError> {
    let Some(table_path) = &config.table else {
        return Ok(());
    };
    if !table_path.exists() {
        spdlog::warn!(
            "Run table {} does not exist, skipping device look-up",
            table_path.to_string_lossy()
        );
        return Ok(());
    }
    let table = RunTable::new(table_path)?;
    if table.is_empty() {
        spdlog::warn!("Run table {} lists no runs", table_path.to_string_lossy());
        return Ok(());
    }
    spdlog::info!(
        "Loaded run table {} with {} runs",
        table_path.to_string_lossy(),
        table.len()
    );
    match table.device_for_run(config.run_number) {
        Some(device) => spdlog::info!("Run {} was taken with device {}", config.run_number, device),
        None => spdlog::warn!("Run {} is not listed in the run table", config.run_number),
    }
    Ok(())
}

/// The main sequence of the pipeline runner.
///
/// Calibrates the run if no caltag was given, then always reconstructs it with the (possibly
/// fresh) caltag. Any failure stops the run.
pub fn process_run<R: MarlinRunner>(
    config: &Config,
    runner: &R,
    tx: &Sender<StageStatus>,
) -> Result<RunOutcome, ProcessorError> {
    if !config.is_run_number_valid() {
        return Err(ProcessorError::ConfigError(ConfigError::MissingRunNumber));
    }
    let raw_file = std::path::absolute(config.raw_file_path())?;
    if !raw_file.exists() {
        return Err(ProcessorError::EngineError(EngineError::InputNotFound(
            raw_file,
        )));
    }
    spdlog::info!(
        "Raw data file {} ({})",
        raw_file.to_string_lossy(),
        human_bytes::human_bytes(raw_file.metadata()?.len() as f64)
    );
    report_device(config)?;

    let settings = PipelineSettings::new(config, &raw_file)?;
    if settings.use_cluster_db {
        spdlog::info!("Using cluster shape hit reconstruction");
    } else {
        spdlog::info!("Using center of gravity hit reconstruction");
    }

    let caltag = config.calibration_tag(&raw_file);
    let calibrated = config.needs_calibration();
    if calibrated {
        spdlog::info!("Make new alignment {}", caltag);
        let env = Environment::new(
            &config.calibration_name(&raw_file, &caltag),
            &config.steerfiles,
            &config.output_path,
        );
        let calpaths = create_calibration_paths(&settings);
        Calibration::new(env).calibrate(runner, &calpaths, &raw_file, &caltag, tx)?;
    } else {
        spdlog::info!("Use old alignment {}", caltag);
    }

    let env = Environment::new(
        &config.reconstruction_name(&raw_file),
        &config.steerfiles,
        &config.output_path,
    );
    let recopaths = create_reco_path(&settings, &caltag);
    let root_files =
        Reconstruction::new(env).reconstruct(runner, &recopaths, &raw_file, &caltag, tx)?;

    Ok(RunOutcome {
        caltag,
        calibrated,
        root_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file_stem;
    use std::cell::RefCell;
    use std::path::Path;
    use std::sync::mpsc;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingRunner {
        runs: RefCell<Vec<String>>,
    }

    impl MarlinRunner for CountingRunner {
        fn run(&self, steering: &Path, workdir: &Path, _log: &Path) -> Result<(), EngineError> {
            let stem = file_stem(steering);
            if stem.ends_with("reco_path") {
                std::fs::write(workdir.join("Histos-TJ2-run826.root"), "histos")?;
            }
            self.runs.borrow_mut().push(stem);
            Ok(())
        }
    }

    fn config(dir: &Path) -> Config {
        let steerfiles = dir.join("steering-files");
        std::fs::create_dir_all(&steerfiles).unwrap();
        let datapath = dir.join("data");
        std::fs::create_dir_all(&datapath).unwrap();
        std::fs::write(datapath.join("run826.txt"), "raw").unwrap();
        std::fs::write(
            dir.join("table.csv"),
            "Type,Run no,Device\nRun,826,W14R12\n",
        )
        .unwrap();
        Config {
            steerfiles,
            datapath,
            run_number: 826,
            table: Some(dir.join("table.csv")),
            output_path: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_full_run_with_cluster_db() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let runner = CountingRunner::default();
        let (tx, _rx) = mpsc::channel::<StageStatus>();
        let outcome = process_run(&config, &runner, &tx).unwrap();

        assert!(outcome.calibrated);
        assert_eq!(outcome.caltag, "run826");
        // 11 base paths + 12 cluster DB paths + reconstruction
        assert_eq!(runner.runs.borrow().len(), 11 + 12 + 1);
        assert_eq!(
            outcome.root_files,
            vec![dir
                .path()
                .join("root-files")
                .join("Histos-TJ2-run826-run826--reco.root")]
        );
        assert!(dir.path().join("cal-files").join("run826").is_dir());
    }

    #[test]
    fn test_existing_caltag_skips_calibration() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.caltag = String::from("run800");
        config.cog = true;
        std::fs::create_dir_all(dir.path().join("cal-files").join("run800")).unwrap();
        let runner = CountingRunner::default();
        let (tx, _rx) = mpsc::channel::<StageStatus>();
        let outcome = process_run(&config, &runner, &tx).unwrap();
        assert!(!outcome.calibrated);
        assert_eq!(*runner.runs.borrow(), vec![String::from("00-reco_path")]);
    }

    #[test]
    fn test_missing_raw_file() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.run_number = 900;
        let runner = CountingRunner::default();
        let (tx, _rx) = mpsc::channel::<StageStatus>();
        assert!(matches!(
            process_run(&config, &runner, &tx),
            Err(ProcessorError::EngineError(EngineError::InputNotFound(_)))
        ));
    }
}
