use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use libtj2_testbeam::dut_config::CalibrationUnit;
use libtj2_testbeam::error::ConfigError;
use libtj2_testbeam::plot_backend::PyRootBackend;
use libtj2_testbeam::plotter::run_plotter;
use libtj2_testbeam::run_config::{Roi, RunConfig};

const LOG_FILE: &str = "./tj2_plotter.log";

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

fn cli() -> Command {
    Command::new("tj2_plotter")
        .about("Make residual, efficiency and in-pixel plots of a reconstructed TJ2 run")
        .arg(
            Arg::new("runno")
                .long("runno")
                .required(true)
                .value_parser(clap::value_parser!(u32))
                .help("Run number to plot"),
        )
        .arg(
            Arg::new("colstart")
                .long("colstart")
                .default_value("110")
                .value_parser(clap::value_parser!(i32))
                .help("First column of the region of interest (exclusive)"),
        )
        .arg(
            Arg::new("colstop")
                .long("colstop")
                .default_value("200")
                .value_parser(clap::value_parser!(i32))
                .help("Last column of the region of interest (exclusive)"),
        )
        .arg(
            Arg::new("rowstart")
                .long("rowstart")
                .default_value("1")
                .value_parser(clap::value_parser!(i32))
                .help("First row of the region of interest (exclusive)"),
        )
        .arg(
            Arg::new("rowstop")
                .long("rowstop")
                .default_value("400")
                .value_parser(clap::value_parser!(i32))
                .help("Last row of the region of interest (exclusive)"),
        )
        .arg(
            Arg::new("calib")
                .long("calib")
                .default_value("ToT")
                .value_parser(["ToT", "electrons"])
                .help("Unit of the DUT charge"),
        )
        .arg(
            Arg::new("iEvt")
                .long("iEvt")
                .default_value("-1")
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(i64))
                .help("Drop this percentage of the events from the start of the run"),
        )
        .arg(
            Arg::new("CoG")
                .long("CoG")
                .action(ArgAction::SetTrue)
                .help("Input was reconstructed with center of gravity hits"),
        )
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .default_value("")
                .help("Prefix used when reconstructing the run"),
        )
        .arg(
            Arg::new("python")
                .long("python")
                .default_value("python3")
                .help("Python interpreter with ROOT and the tbsw helpers"),
        )
}

fn run_config_from(matches: &ArgMatches) -> Result<RunConfig, ConfigError> {
    let arg_i32 = |name: &str| matches.get_one::<i32>(name).copied().unwrap_or_default();
    let roi = Roi::new(
        arg_i32("colstart"),
        arg_i32("colstop"),
        arg_i32("rowstart"),
        arg_i32("rowstop"),
    )?;
    let calib = matches
        .get_one::<String>("calib")
        .map(|s| s.parse::<CalibrationUnit>())
        .transpose()?
        .unwrap_or_default();
    let run_number = matches
        .get_one::<u32>("runno")
        .copied()
        .ok_or(ConfigError::MissingRunNumber)?;

    let mut run = RunConfig::new(run_number, roi, calib);
    run.ievt = matches.get_one::<i64>("iEvt").copied().unwrap_or(-1);
    run.cog = matches.get_flag("CoG");
    if let Some(prefix) = matches.get_one::<String>("prefix") {
        run.prefix = prefix.clone();
    }
    Ok(run)
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    if let Err(e) = init_logger() {
        eprintln!("Could not create logging: {e}");
        return ExitCode::FAILURE;
    }

    let run = match run_config_from(&matches) {
        Ok(run) => run,
        Err(e) => {
            spdlog::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let python = matches
        .get_one::<String>("python")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("python3"));

    let mut backend = PyRootBackend::new(&python, &run.script_file_name());
    match run_plotter(&run, &mut backend) {
        Ok(summary) => {
            spdlog::info!(
                "Histograms written to {}",
                summary.histo_file.to_string_lossy()
            );
            spdlog::info!("Done.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            spdlog::error!("Plotting failed with error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let matches = cli().get_matches_from(["tj2_plotter", "--runno", "826"]);
        let run = run_config_from(&matches).unwrap();
        assert_eq!(run.run_number, 826);
        assert_eq!(run.roi, Roi::default());
        assert_eq!(run.calib, CalibrationUnit::ToT);
        assert_eq!(run.ievt, -1);
        assert!(!run.cog);
        assert_eq!(run.prefix, "");
    }

    #[test]
    fn test_custom_roi_and_unit() {
        let matches = cli().get_matches_from([
            "tj2_plotter",
            "--runno",
            "42",
            "--colstart",
            "320",
            "--colstop",
            "420",
            "--calib",
            "electrons",
            "--iEvt",
            "50",
        ]);
        let run = run_config_from(&matches).unwrap();
        assert_eq!(run.roi, Roi::new(320, 420, 1, 400).unwrap());
        assert_eq!(run.calib, CalibrationUnit::Electrons);
        assert_eq!(run.event_fraction(), Some(50));

        let matches = cli().get_matches_from([
            "tj2_plotter",
            "--runno",
            "42",
            "--colstart",
            "200",
            "--colstop",
            "201",
        ]);
        assert!(matches!(
            run_config_from(&matches),
            Err(ConfigError::BadRegionOfInterest { .. })
        ));
    }
}
