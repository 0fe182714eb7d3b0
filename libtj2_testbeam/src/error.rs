use std::path::PathBuf;
use thiserror::Error;

use super::stage_status::StageStatus;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Invalid calibration unit {0}; expected ToT or electrons")]
    BadCalibrationUnit(String),
    #[error("Invalid region of interest -- columns {colstart}..{colstop}, rows {rowstart}..{rowstop}")]
    BadRegionOfInterest {
        colstart: i32,
        colstop: i32,
        rowstart: i32,
        rowstop: i32,
    },
    #[error("Clipping was requested but the clip tag {0:?} is not an integer threshold")]
    BadClipTag(String),
    #[error("Config requires a run number")]
    MissingRunNumber,
}

#[derive(Debug, Error)]
pub enum RunTableError {
    #[error("RunTable failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("RunTable failed to read CSV: {0}")]
    CsvError(#[from] csv::Error),
    #[error("RunTable is missing the required column {0:?}")]
    MissingColumn(&'static str),
    #[error("RunTable was given a file with the incorrect format at line {0}; most likely the number of columns is incorrect")]
    BadFileFormat(usize),
}

#[derive(Debug, Error)]
pub enum SteeringError {
    #[error("Path {path} contains two different processors named {name}")]
    ConflictingProcessor { path: String, name: String },
    #[error("Path {0} contains no processors")]
    EmptyPath(String),
    #[error("Steering failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Steering failed to format XML: {0}")]
    FormatError(#[from] std::fmt::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine could not find the input file {0:?}")]
    InputNotFound(PathBuf),
    #[error("Engine could not find the steering files directory {0:?}")]
    MissingSteerFiles(PathBuf),
    #[error("Engine could not find calibration data {0:?}; run the calibration first")]
    MissingCalibration(PathBuf),
    #[error("Processor failure in path {path} (steering file {steering:?}, log {log:?}, exit code {code:?})")]
    ProcessorFailure {
        path: String,
        steering: PathBuf,
        log: PathBuf,
        code: Option<i32>,
    },
    #[error("Engine could not launch {program:?}: {source}")]
    LaunchError {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("Engine failed due to steering error: {0}")]
    SteeringError(#[from] SteeringError),
    #[error("Engine failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Engine failed to write YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Engine failed to format a timestamp: {0}")]
    TimeError(#[from] time::error::Format),
    #[error("Engine failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<StageStatus>),
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("Plotter could not find the input file {0:?}")]
    InputNotFound(PathBuf),
    #[error("Input file {file:?} does not contain the tree {tree}")]
    MissingTree { file: PathBuf, tree: String },
    #[error("Input file {file:?} is missing the required field {field}")]
    MissingField { file: PathBuf, field: String },
    #[error("Input file {0:?} contains an empty tree")]
    EmptyTree(PathBuf),
    #[error("Plotting backend failed during {stage} (script {script:?}, exit code {code:?}): {message}")]
    BackendFailure {
        stage: String,
        script: PathBuf,
        code: Option<i32>,
        message: String,
    },
    #[error("Plotting backend could not launch {program:?}: {source}")]
    LaunchError {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("Plotting backend returned unreadable output: {0}")]
    BadOutput(String),
    #[error("Plotter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to RunTable error: {0}")]
    RunTableError(#[from] RunTableError),
    #[error("Processor failed due to Engine error: {0}")]
    EngineError(#[from] EngineError),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PlotterError {
    #[error("Plotter failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Plotter failed due to Plot error: {0}")]
    PlotError(#[from] PlotError),
}
