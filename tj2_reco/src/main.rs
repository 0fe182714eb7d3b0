use clap::{Arg, ArgAction, ArgMatches, Command};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{mpsc, Arc};

use libtj2_testbeam::config::Config;
use libtj2_testbeam::engine::MarlinExecutable;
use libtj2_testbeam::error::ConfigError;
use libtj2_testbeam::process::process_run;
use libtj2_testbeam::stage_status::{RunKind, StageStatus};

const LOG_FILE: &str = "./tj2_reco.log";

fn init_logger() -> spdlog::Result<()> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from(LOG_FILE))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let stdout_sink = Arc::new(
        spdlog::sink::StdStreamSink::builder()
            .std_stream(spdlog::sink::StdStream::Stdout)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .sink(stdout_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn make_template_config(path: &Path) -> Result<(), ConfigError> {
    Config::default().write_config_file(path)
}

fn cli() -> Command {
    Command::new("tj2_reco")
        .about("Calibrate and reconstruct TJ2 testbeam runs with Marlin")
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to a configuration yaml file"),
        )
        .arg(
            Arg::new("steerfiles")
                .long("steerfiles")
                .help("Path to the steering file folder"),
        )
        .arg(
            Arg::new("gearfile")
                .long("gearfile")
                .help("Name of the gear file inside the steering file folder"),
        )
        .arg(
            Arg::new("datapath")
                .long("datapath")
                .help("Directory holding the raw run<N>.txt files"),
        )
        .arg(
            Arg::new("runno")
                .long("runno")
                .value_parser(clap::value_parser!(u32))
                .help("Run number to process"),
        )
        .arg(
            Arg::new("caltag")
                .long("caltag")
                .help("Existing calibration tag; a new calibration is made if empty"),
        )
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .help("Prefix appended to the tags of the output"),
        )
        .arg(
            Arg::new("table")
                .long("table")
                .help("Run look-up table (csv) listing the DUT of each run"),
        )
        .arg(
            Arg::new("pixel_cal")
                .long("pixel_cal")
                .action(ArgAction::SetTrue)
                .conflicts_with("no_pixel_cal")
                .help("Apply the pixel charge calibration to the TJ2 data"),
        )
        .arg(
            Arg::new("no_pixel_cal")
                .long("no_pixel_cal")
                .action(ArgAction::SetTrue)
                .help("Do not apply the pixel charge calibration"),
        )
        .arg(
            Arg::new("gain_db")
                .long("gain_db")
                .help("Gain calibration database used with --pixel_cal"),
        )
        .arg(
            Arg::new("clip")
                .long("clip")
                .action(ArgAction::SetTrue)
                .help("Clip TJ2 pixel signals below the threshold given by --cliptag"),
        )
        .arg(
            Arg::new("cliptag")
                .long("cliptag")
                .help("Zero suppression threshold used with --clip"),
        )
        .arg(
            Arg::new("CoG")
                .long("CoG")
                .action(ArgAction::SetTrue)
                .conflicts_with("no_CoG")
                .help("Use center of gravity hits instead of the cluster shape database"),
        )
        .arg(
            Arg::new("no_CoG")
                .long("no_CoG")
                .action(ArgAction::SetTrue)
                .help("Use the cluster shape database"),
        )
        .arg(
            Arg::new("marlin")
                .long("marlin")
                .help("Marlin executable"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Directory receiving tmp-runs, cal-files and root-files"),
        )
}

/// Flags given on the command line override the configuration (file or defaults)
fn apply_matches(config: &mut Config, matches: &ArgMatches) {
    if let Some(v) = matches.get_one::<String>("steerfiles") {
        config.steerfiles = PathBuf::from(v);
    }
    if let Some(v) = matches.get_one::<String>("gearfile") {
        config.gearfile = v.clone();
    }
    if let Some(v) = matches.get_one::<String>("datapath") {
        config.datapath = PathBuf::from(v);
    }
    if let Some(v) = matches.get_one::<u32>("runno") {
        config.run_number = *v;
    }
    if let Some(v) = matches.get_one::<String>("caltag") {
        config.caltag = v.clone();
    }
    if let Some(v) = matches.get_one::<String>("prefix") {
        config.prefix = v.clone();
    }
    if let Some(v) = matches.get_one::<String>("table") {
        config.table = Some(PathBuf::from(v));
    }
    if matches.get_flag("pixel_cal") {
        config.pixel_cal = true;
    }
    if matches.get_flag("no_pixel_cal") {
        config.pixel_cal = false;
    }
    if let Some(v) = matches.get_one::<String>("gain_db") {
        config.gain_db = Some(PathBuf::from(v));
    }
    if matches.get_flag("clip") {
        config.clip = true;
    }
    if let Some(v) = matches.get_one::<String>("cliptag") {
        config.cliptag = v.clone();
    }
    if matches.get_flag("CoG") {
        config.cog = true;
    }
    if matches.get_flag("no_CoG") {
        config.cog = false;
    }
    if let Some(v) = matches.get_one::<String>("marlin") {
        config.marlin = PathBuf::from(v);
    }
    if let Some(v) = matches.get_one::<String>("output") {
        config.output_path = PathBuf::from(v);
    }
}

fn stage_message(status: &StageStatus) -> String {
    let kind = match status.kind {
        RunKind::Calibration => "calibration",
        RunKind::Reconstruction => "reconstruction",
    };
    if status.path_name.is_empty() {
        format!("{kind}: starting")
    } else {
        format!("{kind}: finished {}", status.path_name)
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    if let Err(e) = init_logger() {
        eprintln!("Could not create logging: {e}");
        return ExitCode::FAILURE;
    }

    let config_path = matches.get_one::<String>("path").map(PathBuf::from);

    if let Some(("new", _)) = matches.subcommand() {
        let Some(path) = config_path else {
            spdlog::error!("The new subcommand requires --path");
            return ExitCode::FAILURE;
        };
        spdlog::info!("Making a template config at {}...", path.to_string_lossy());
        return match make_template_config(&path) {
            Ok(()) => {
                spdlog::info!("Done.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                spdlog::error!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    // Load our config
    let mut config = match &config_path {
        Some(path) => {
            spdlog::info!("Loading config from {}...", path.to_string_lossy());
            match Config::read_config_file(path) {
                Ok(c) => c,
                Err(e) => {
                    spdlog::error!("{e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        None => Config::default(),
    };
    apply_matches(&mut config, &matches);

    spdlog::info!("Steering files: {}", config.steerfiles.to_string_lossy());
    spdlog::info!("Gear file: {}", config.gearfile);
    spdlog::info!("Data path: {}", config.datapath.to_string_lossy());
    spdlog::info!("Run number: {}", config.run_number);
    spdlog::info!("Caltag: '{}' Prefix: '{}'", config.caltag, config.prefix);
    spdlog::info!(
        "Pixel calibration: {} Clipping: {} CoG: {}",
        config.pixel_cal,
        config.clip,
        config.cog
    );
    spdlog::info!("Output path: {}", config.output_path.to_string_lossy());

    // Setup the progress bar
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
        pb.set_style(style);
    }

    let (tx, rx) = mpsc::channel::<StageStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || {
        let runner = MarlinExecutable::new(&config.marlin);
        process_run(&config, &runner, &tx)
    });

    // The channel closes once the worker returns
    for status in rx {
        pb.set_length(status.total as u64);
        pb.set_position(status.index as u64);
        pb.set_message(stage_message(&status));
    }
    pb.finish();

    match handle.join() {
        Ok(Ok(outcome)) => {
            if outcome.calibrated {
                spdlog::info!("Created calibration {}", outcome.caltag);
            }
            for file in outcome.root_files.iter() {
                spdlog::info!("Reconstructed data: {}", file.to_string_lossy());
            }
            spdlog::info!("Done.");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            spdlog::error!("Processing failed with error: {e}");
            ExitCode::FAILURE
        }
        Err(_) => {
            spdlog::error!("Failed to join processing task!");
            ExitCode::FAILURE
        }
    }
}
