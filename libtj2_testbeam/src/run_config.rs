use std::path::PathBuf;

use super::dut_config::CalibrationUnit;
use super::error::ConfigError;

const INPUT_DIR: &str = "root-files";
const PLOT_DIR: &str = "Plotter";
const PLOT_CAL_DIR: &str = "Plotter_cal";

/// Rectangular region of interest on the DUT, in pixel columns and rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub colstart: i32,
    pub colstop: i32,
    pub rowstart: i32,
    pub rowstop: i32,
}

impl Default for Roi {
    fn default() -> Self {
        Self {
            colstart: 110,
            colstop: 200,
            rowstart: 1,
            rowstop: 400,
        }
    }
}

impl Roi {
    /// Create a ROI; the column range must leave at least one bin for the extraction axis
    pub fn new(colstart: i32, colstop: i32, rowstart: i32, rowstop: i32) -> Result<Self, ConfigError> {
        // Any pair of i32 bounds fits in i64
        let column_bins = i64::from(colstop) - i64::from(colstart) - 1;
        if column_bins < 1 || rowstop <= rowstart {
            return Err(ConfigError::BadRegionOfInterest {
                colstart,
                colstop,
                rowstart,
                rowstop,
            });
        }
        Ok(Self {
            colstart,
            colstop,
            rowstart,
            rowstop,
        })
    }

    /// Track selection inside the ROI on the fitted cell position
    pub fn cut(&self) -> String {
        format!(
            "maskedPixel==0 && cellU_fit>{} && cellU_fit<{} && cellV_fit> {} && cellV_fit<{}",
            self.colstart, self.colstop, self.rowstart, self.rowstop
        )
    }

    fn file_tag(&self) -> String {
        format!(
            "roi-{}-{}-{}-{}",
            self.colstart, self.colstop, self.rowstart, self.rowstop
        )
    }
}

/// Configuration of one plotting run, built from the command line
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub run_number: u32,
    pub roi: Roi,
    pub calib: CalibrationUnit,
    pub ievt: i64,
    pub cog: bool,
    pub prefix: String,
}

impl RunConfig {
    pub fn new(run_number: u32, roi: Roi, calib: CalibrationUnit) -> Self {
        Self {
            run_number,
            roi,
            calib,
            ievt: -1,
            cog: false,
            prefix: String::from(""),
        }
    }

    /// Percentage of the event range to drop from the start of the run, if requested
    pub fn event_fraction(&self) -> Option<i64> {
        if self.ievt > 0 {
            Some(self.ievt)
        } else {
            None
        }
    }

    /// Reconstructed data file written by the reconstruction of this run
    pub fn input_file_name(&self) -> PathBuf {
        let run = self.run_number;
        let prefix = &self.prefix;
        let name = match self.calib {
            CalibrationUnit::ToT => {
                format!("Histos-TJ2-run{run}{prefix}-run{run}{prefix}--reco.root")
            }
            CalibrationUnit::Electrons => {
                format!("Histos-TJ2-run{run:06}_{prefix}-run{run:06}-run{run:06}_{prefix}-reco.root")
            }
        };
        PathBuf::from(INPUT_DIR).join(name)
    }

    fn output_stem(&self) -> PathBuf {
        let run = self.run_number;
        let prefix = &self.prefix;
        let roi = self.roi.file_tag();
        match self.calib {
            CalibrationUnit::ToT => PathBuf::from(PLOT_DIR).join(format!(
                "Plotter-run{run:06}_{prefix}-{roi}_{}",
                self.ievt
            )),
            CalibrationUnit::Electrons => {
                PathBuf::from(PLOT_CAL_DIR).join(format!("Plotter-run{run:06}_{prefix}_cal-{roi}"))
            }
        }
    }

    /// Histogram file collecting every plot of this run
    pub fn histo_file_name(&self) -> PathBuf {
        with_extension(self.output_stem(), "root")
    }

    /// PDF report of this run
    pub fn pdf_file_name(&self) -> PathBuf {
        with_extension(self.output_stem(), "pdf")
    }

    /// Driver script rendered for the plotting backend
    pub fn script_file_name(&self) -> PathBuf {
        with_extension(self.output_stem(), "py")
    }
}

// Prefixes may contain dots, so append the extension instead of replacing one
fn with_extension(stem: PathBuf, ext: &str) -> PathBuf {
    let mut name = stem.into_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
