//! The ordered list of plotting calls made for one run.
//!
//! Building the plan is pure: every cut string and axis is derived from the [`RunConfig`],
//! the [`DutConfig`] and the event cut. Executing it is left to a plotting backend.
use std::path::PathBuf;

use super::dut_config::{Axis, DutConfig};
use super::run_config::RunConfig;

const MATCH_CUT: &str = "hasHit==0";
const EFFICIENCY_AXIS: Axis = Axis::new(512, 0.0, 512.0);
const INPIX_BINS: i64 = 20;
const SUPERPIXEL_FOLD: i64 = 2;
const ROI_V_BINS: i64 = 128;

/// One call into the plotting helpers
#[derive(Debug, Clone, PartialEq)]
pub enum PlotStep {
    /// `residuals.plot`
    Residuals { basecut: String, config: DutConfig },
    /// `residuals.plot_roi`
    ResidualsRoi { basecut: String, config: DutConfig },
    /// `efficiency.plot`
    Efficiency {
        basecut: String,
        matchcut: String,
        uaxis: Axis,
        vaxis: Axis,
    },
    /// `inpixel.plot_superpixel`
    InpixelSuperpixel {
        pixeltype: i64,
        upitch: f64,
        vpitch: f64,
        ubins: i64,
        vbins: i64,
        ufold: i64,
        vfold: i64,
    },
    /// `efficiency.plot_super_inpix`
    SuperInpixEfficiency {
        basecut: String,
        matchcut: String,
        upitch: f64,
        vpitch: f64,
        ubins: i64,
        vbins: i64,
    },
    /// `efficiency.extract_roi`, yields the ROI efficiency and its error
    ExtractRoi {
        basecut: String,
        matchcut: String,
        uaxis: Axis,
        vaxis: Axis,
    },
    /// `residuals.make_pdf`
    MakePdf { pdf_file: PathBuf },
}

impl PlotStep {
    /// Short name of the helper called by this step
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Residuals { .. } => "residuals.plot",
            Self::ResidualsRoi { .. } => "residuals.plot_roi",
            Self::Efficiency { .. } => "efficiency.plot",
            Self::InpixelSuperpixel { .. } => "inpixel.plot_superpixel",
            Self::SuperInpixEfficiency { .. } => "efficiency.plot_super_inpix",
            Self::ExtractRoi { .. } => "efficiency.extract_roi",
            Self::MakePdf { .. } => "residuals.make_pdf",
        }
    }
}

/// First event index kept when only the tail of the run is analysed:
/// `floor(max_ievt / 100 * fraction)`
pub fn max_ievt_cut(max_ievt: f64, fraction: i64) -> i64 {
    (max_ievt / 100.0 * fraction as f64).floor() as i64
}

/// Append the event cut to a selection, if there is one
fn with_event_cut(cut: &str, event_cut: Option<i64>) -> String {
    match event_cut {
        Some(n) => format!("{cut} && iEvt >= {n}"),
        None => cut.to_string(),
    }
}

/// Build the plotting sequence for a run.
///
/// With an event cut the ROI residuals are skipped and every other selection is restricted
/// to `iEvt >= event_cut`. The ROI efficiency plot is kept in that case; the older python
/// plotter script dropped it together with the ROI residuals.
pub fn build_plot_plan(
    run: &RunConfig,
    dut: &DutConfig,
    event_cut: Option<i64>,
) -> Vec<PlotStep> {
    let roi = &run.roi;
    let roi_cut = with_event_cut(&roi.cut(), event_cut);
    let mut plan: Vec<PlotStep> = Vec::new();

    let residual_cut = match event_cut {
        Some(n) => format!("hasTrack==0 && iEvt >= {n}"),
        None => String::from("hasTrack==0 "),
    };
    plan.push(PlotStep::Residuals {
        basecut: residual_cut,
        config: dut.clone(),
    });

    if event_cut.is_none() {
        plan.push(PlotStep::ResidualsRoi {
            basecut: roi.cut(),
            config: dut.clone(),
        });
    }

    plan.push(PlotStep::Efficiency {
        basecut: with_event_cut("maskedPixel==0", event_cut),
        matchcut: String::from(MATCH_CUT),
        uaxis: EFFICIENCY_AXIS,
        vaxis: EFFICIENCY_AXIS,
    });
    plan.push(PlotStep::Efficiency {
        basecut: roi_cut.clone(),
        matchcut: String::from(MATCH_CUT),
        uaxis: EFFICIENCY_AXIS,
        vaxis: EFFICIENCY_AXIS,
    });

    plan.push(PlotStep::InpixelSuperpixel {
        pixeltype: 0,
        upitch: dut.pitch_u,
        vpitch: dut.pitch_v,
        ubins: INPIX_BINS,
        vbins: INPIX_BINS,
        ufold: SUPERPIXEL_FOLD,
        vfold: SUPERPIXEL_FOLD,
    });
    plan.push(PlotStep::SuperInpixEfficiency {
        basecut: roi_cut.clone(),
        matchcut: String::from(MATCH_CUT),
        upitch: dut.pitch_u,
        vpitch: dut.pitch_v,
        ubins: INPIX_BINS,
        vbins: INPIX_BINS,
    });

    plan.push(PlotStep::ExtractRoi {
        basecut: roi_cut,
        matchcut: String::from(MATCH_CUT),
        uaxis: Axis::new(
            i64::from(roi.colstop) - i64::from(roi.colstart) - 1,
            roi.colstart as f64,
            roi.colstop as f64,
        ),
        vaxis: Axis::new(ROI_V_BINS, roi.rowstart as f64, roi.rowstop as f64),
    });

    plan.push(PlotStep::MakePdf {
        pdf_file: run.pdf_file_name(),
    });
    plan
}
