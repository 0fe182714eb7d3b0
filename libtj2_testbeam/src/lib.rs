//! # tj2_testbeam
//!
//! tj2_testbeam drives the analysis of TJ2 (TowerJazz) pixel sensor testbeam data, written in
//! Rust. It contains two runners: a calibration/reconstruction runner which builds processing
//! paths for the Marlin framework and executes them on raw telescope data, and a plot runner
//! which turns the reconstructed DUT data into residual, efficiency and in-pixel plots plus a
//! PDF report.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, see the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installation instructions.
//!
//! The runners do not reimplement the heavy lifting themselves. The reconstruction runner
//! needs a working `Marlin` executable with the tbsw processors loaded, and the plot runner
//! needs a python interpreter which can import both `ROOT` and the `tbsw` python helpers.
//!
//! ### Building & Install
//!
//! To build and install the reconstruction runner use `cargo install --path ./tj2_reco` from
//! the top level repository. Use `cargo install --path ./tj2_plotter` for the plot runner.
//!
//! ## Configuration
//!
//! The reconstruction runner can be configured entirely from the command line, or from a YAML
//! file passed with `--path`. A template can be generated with `tj2_reco --path config.yml new`.
//! The YAML format is as follows:
//!
//! ```yml
//! steerfiles: steering-files/desy-tb/
//! gearfile: geoid1.xml
//! datapath: /home/bgnet/beam_data/text_files/
//! run_number: 0
//! caltag: ''
//! prefix: ''
//! table: null
//! pixel_cal: false
//! gain_db: null
//! clip: false
//! cliptag: ''
//! cog: false
//! marlin: Marlin
//! output_path: .
//! ```
//!
//! Command line flags given together with `--path` override the values of the file.
//!
//! If `caltag` is empty a full calibration (masking, alignment and, unless `cog` is set, the
//! cluster shape database) is produced first and stored under the tag `run<N><prefix>`. The
//! run is then always reconstructed using that calibration.
//!
//! ## Output
//!
//! Both runners write a log file (`tj2_reco.log`, `tj2_plotter.log`) in the current
//! directory. The reconstruction runner lays out its output as follows:
//!
//! ```text
//! <output_path>
//! |---- tmp-runs
//! |    |---- <stem>-<caltag>-cal - steering file copy, one .xml/.log pair per path, localDB
//! |    |---- <stem>-<prefix>-reco
//! |---- cal-files
//! |    |---- <caltag> - alignment/cluster DB files, calibration.yml
//! |---- root-files
//! |    |---- Histos-TJ2-<caltag>-<stem>-<prefix>-reco.root
//! ```
//!
//! The plot runner reads from `root-files/` and writes the histogram file, the PDF report
//! and the rendered python driver script to `Plotter/` (ToT) or `Plotter_cal/` (electrons).
pub mod calibration;
pub mod config;
pub mod dut_config;
pub mod engine;
pub mod error;
pub mod path;
pub mod plot_backend;
pub mod plot_plan;
pub mod plotter;
pub mod process;
pub mod processor;
pub mod reconstruction;
pub mod run_config;
pub mod run_table;
pub mod stage_status;
pub mod stages;
pub mod steering;
