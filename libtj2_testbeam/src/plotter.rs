use std::path::PathBuf;

use super::dut_config::DutConfig;
use super::error::{PlotError, PlotterError};
use super::plot_backend::{PlotBackend, RoiEfficiency, HIT_TREE};
use super::plot_plan::{build_plot_plan, max_ievt_cut};
use super::run_config::RunConfig;

/// What a finished plotting run produced
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSummary {
    pub histo_file: PathBuf,
    pub pdf_file: PathBuf,
    pub event_cut: Option<i64>,
    pub roi_efficiency: Option<RoiEfficiency>,
}

/// The main sequence of the plot runner.
///
/// Checks the reconstructed data, derives the event cut, then runs the whole plot plan through
/// the backend. Every plot of the run ends up in one histogram file plus a PDF report.
pub fn run_plotter<B: PlotBackend>(
    run: &RunConfig,
    backend: &mut B,
) -> Result<PlotSummary, PlotterError> {
    let input = run.input_file_name();
    if !input.exists() {
        return Err(PlotError::InputNotFound(input).into());
    }
    spdlog::info!(
        "Plotting run {} from {} ({} calibration)",
        run.run_number,
        input.to_string_lossy(),
        run.calib
    );
    if run.cog {
        spdlog::info!("Input was reconstructed with center of gravity hits");
    }

    let tree = backend.inspect_tree(&input)?;
    if !tree.has_tree {
        return Err(PlotError::MissingTree {
            file: input,
            tree: String::from(HIT_TREE),
        }
        .into());
    }
    if let Some(field) = tree.missing_fields.first() {
        return Err(PlotError::MissingField {
            file: input,
            field: field.clone(),
        }
        .into());
    }
    if tree.entries == 0 {
        return Err(PlotError::EmptyTree(input).into());
    }
    spdlog::info!("Found {} entries in the {} tree", tree.entries, HIT_TREE);

    let event_cut = run.event_fraction().map(|fraction| {
        let cut = max_ievt_cut(tree.max_ievt, fraction);
        spdlog::info!("Only using events with iEvt >= {} (max iEvt {})", cut, tree.max_ievt);
        cut
    });

    let histo_file = run.histo_file_name();
    if let Some(parent) = histo_file.parent() {
        std::fs::create_dir_all(parent).map_err(PlotError::from)?;
    }

    let dut = DutConfig::for_unit(run.calib);
    let plan = build_plot_plan(run, &dut, event_cut);
    spdlog::info!(
        "Running {} plot steps into {}",
        plan.len(),
        histo_file.to_string_lossy()
    );
    let roi_efficiency = backend.execute(&input, &histo_file, &plan)?;
    match &roi_efficiency {
        Some(roi) => spdlog::info!(
            "Efficiency in ROI {}: {:.4} +/- {:.4}",
            run.roi.cut(),
            roi.efficiency,
            roi.error
        ),
        None => spdlog::warn!("Plotting backend did not report an ROI efficiency"),
    }

    let pdf_file = run.pdf_file_name();
    spdlog::info!("Report written to {}", pdf_file.to_string_lossy());
    Ok(PlotSummary {
        histo_file,
        pdf_file,
        event_cut,
        roi_efficiency,
    })
}
