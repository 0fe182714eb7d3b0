//! Execution of a plot plan through the tbsw python helpers and ROOT.
//!
//! The [`PyRootBackend`] renders a driver script for the plan and runs it with an external
//! python interpreter. Results are reported back on stdout as tagged lines.
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::dut_config::{Axis, DutConfig};
use super::error::PlotError;
use super::plot_plan::PlotStep;

/// Tree holding one entry per track/DUT hit in the reconstructed data
pub const HIT_TREE: &str = "Hit";
/// Fields of the hit tree that the plot plan selects on
pub const REQUIRED_FIELDS: [&str; 6] = [
    "iEvt",
    "hasTrack",
    "maskedPixel",
    "hasHit",
    "cellU_fit",
    "cellV_fit",
];

const ENTRIES_TAG: &str = "ENTRIES";
const MAX_IEVT_TAG: &str = "MAX_IEVT";
const MISSING_TREE_TAG: &str = "MISSING_TREE";
const MISSING_FIELD_TAG: &str = "MISSING_FIELD";
const ROI_EFFICIENCY_TAG: &str = "ROI_EFFICIENCY";
const STAGE_TAG: &str = "STAGE";

/// What the hit tree of an input file contains
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TreeSummary {
    pub has_tree: bool,
    pub entries: u64,
    pub max_ievt: f64,
    pub missing_fields: Vec<String>,
}

/// Efficiency in the ROI with its statistical error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiEfficiency {
    pub efficiency: f64,
    pub error: f64,
}

/// Something able to inspect reconstructed data and execute a plot plan
pub trait PlotBackend {
    /// Report the content of the hit tree of `input`
    fn inspect_tree(&mut self, input: &Path) -> Result<TreeSummary, PlotError>;

    /// Run every step of `plan` on `input`, collecting the histograms in `histo_file`
    fn execute(
        &mut self,
        input: &Path,
        histo_file: &Path,
        plan: &[PlotStep],
    ) -> Result<Option<RoiEfficiency>, PlotError>;
}

fn py_str(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

fn py_float(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

fn py_axis(axis: &Axis) -> String {
    format!(
        "({},{},{})",
        axis.nbins,
        py_float(axis.min),
        py_float(axis.max)
    )
}

fn py_path(path: &Path) -> String {
    py_str(&path.to_string_lossy())
}

/// Render the DUT configuration as the python dictionary expected by the residual plots
pub fn py_dut_config(dut: &DutConfig) -> String {
    let entries = [
        ("pitch_u", py_float(dut.pitch_u)),
        ("pitch_v", py_float(dut.pitch_v)),
        ("residual_u_axis", py_axis(&dut.residual_u_axis)),
        ("residual_v_axis", py_axis(&dut.residual_v_axis)),
        ("charge_unit", py_str(dut.charge_unit)),
        ("seed_charge_axis", py_axis(&dut.seed_charge_axis)),
        ("clus_charge_axis", py_axis(&dut.clus_charge_axis)),
        ("ucell_axis", py_axis(&dut.ucell_axis)),
        ("vcell_axis", py_axis(&dut.vcell_axis)),
        ("sensor_u_axis", py_axis(&dut.sensor_u_axis)),
        ("sensor_v_axis", py_axis(&dut.sensor_v_axis)),
    ];
    let body: Vec<String> = entries
        .iter()
        .map(|(k, v)| format!("{}: {}", py_str(k), v))
        .collect();
    format!("{{{}}}", body.join(", "))
}

/// The python call for a single step
fn render_step(step: &PlotStep) -> String {
    match step {
        PlotStep::Residuals { basecut, config } => format!(
            "residuals.plot(inputfile, histofile, basecut={}, Config={})",
            py_str(basecut),
            py_dut_config(config)
        ),
        PlotStep::ResidualsRoi { basecut, config } => format!(
            "residuals.plot_roi(inputfile, histofile, basecut={}, Config={})",
            py_str(basecut),
            py_dut_config(config)
        ),
        PlotStep::Efficiency {
            basecut,
            matchcut,
            uaxis,
            vaxis,
        } => format!(
            "efficiency.plot(inputfile, histofile, basecut={}, matchcut={}, uaxis={}, vaxis={})",
            py_str(basecut),
            py_str(matchcut),
            py_axis(uaxis),
            py_axis(vaxis)
        ),
        PlotStep::InpixelSuperpixel {
            pixeltype,
            upitch,
            vpitch,
            ubins,
            vbins,
            ufold,
            vfold,
        } => format!(
            "inpixel.plot_superpixel(inputfile, histofile, pixeltype={pixeltype}, upitch={}, vpitch={}, ubins={ubins}, vbins={vbins}, ufold={ufold}, vfold={vfold})",
            py_float(*upitch),
            py_float(*vpitch)
        ),
        PlotStep::SuperInpixEfficiency {
            basecut,
            matchcut,
            upitch,
            vpitch,
            ubins,
            vbins,
        } => format!(
            "efficiency.plot_super_inpix(inputfile, histofile, basecut={}, matchcut={}, upitch={}, vpitch={}, ubins={ubins}, vbins={vbins})",
            py_str(basecut),
            py_str(matchcut),
            py_float(*upitch),
            py_float(*vpitch)
        ),
        PlotStep::ExtractRoi {
            basecut,
            matchcut,
            uaxis,
            vaxis,
        } => format!(
            "roi_result = efficiency.extract_roi(inputfile, basecut={}, matchcut={}, uaxis={}, vaxis={})\nprint({}, roi_result[0], roi_result[1])",
            py_str(basecut),
            py_str(matchcut),
            py_axis(uaxis),
            py_axis(vaxis),
            py_str(ROI_EFFICIENCY_TAG)
        ),
        PlotStep::MakePdf { pdf_file } => {
            format!("residuals.make_pdf(histofile, {})", py_path(pdf_file))
        }
    }
}

/// Render the driver script executing a plan
pub fn render_plot_script(
    input: &Path,
    histo_file: &Path,
    plan: &[PlotStep],
) -> Result<String, std::fmt::Error> {
    let mut script = String::new();
    writeln!(script, "import sys")?;
    writeln!(script, "import ROOT")?;
    writeln!(script, "import tbsw.residuals as residuals")?;
    writeln!(script, "import tbsw.efficiency as efficiency")?;
    writeln!(script, "import tbsw.inpixel as inpixel")?;
    writeln!(script)?;
    writeln!(script, "inputfile = ROOT.TFile({}, 'READ')", py_path(input))?;
    writeln!(
        script,
        "histofile = ROOT.TFile({}, 'RECREATE', {})",
        py_path(histo_file),
        py_str(&format!(
            "Histos created from file {}",
            input.to_string_lossy()
        ))
    )?;
    writeln!(script, "try:")?;
    for step in plan {
        writeln!(script, "    print({}, {}, flush=True)", py_str(STAGE_TAG), py_str(step.stage()))?;
        for line in render_step(step).lines() {
            writeln!(script, "    {line}")?;
        }
    }
    writeln!(script, "finally:")?;
    writeln!(script, "    histofile.Write()")?;
    writeln!(script, "    histofile.Close()")?;
    writeln!(script, "    inputfile.Close()")?;
    Ok(script)
}

/// Render the script inspecting the hit tree of an input file
pub fn render_inspect_script(input: &Path) -> String {
    let fields: Vec<String> = REQUIRED_FIELDS.iter().map(|f| py_str(f)).collect();
    format!(
        "import ROOT\n\
         inputfile = ROOT.TFile({input}, 'READ')\n\
         tree = inputfile.Get({tree})\n\
         if not tree:\n\
         \x20   print({missing_tree}, {tree})\n\
         else:\n\
         \x20   for field in [{fields}]:\n\
         \x20       if not tree.GetBranch(field):\n\
         \x20           print({missing_field}, field)\n\
         \x20   print({entries}, tree.GetEntries())\n\
         \x20   if tree.GetBranch('iEvt'):\n\
         \x20       print({max_ievt}, tree.GetMaximum('iEvt'))\n\
         inputfile.Close()\n",
        input = py_path(input),
        tree = py_str(HIT_TREE),
        missing_tree = py_str(MISSING_TREE_TAG),
        fields = fields.join(", "),
        missing_field = py_str(MISSING_FIELD_TAG),
        entries = py_str(ENTRIES_TAG),
        max_ievt = py_str(MAX_IEVT_TAG),
    )
}

fn parse_number<T: std::str::FromStr>(line: &str, value: Option<&str>) -> Result<T, PlotError> {
    value
        .and_then(|v| v.parse::<T>().ok())
        .ok_or_else(|| PlotError::BadOutput(line.to_string()))
}

/// Read the tagged lines printed by the inspection script
pub fn parse_tree_summary(stdout: &str) -> Result<TreeSummary, PlotError> {
    let mut summary = TreeSummary {
        has_tree: true,
        ..Default::default()
    };
    for line in stdout.lines() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some(MISSING_TREE_TAG) => summary.has_tree = false,
            Some(MISSING_FIELD_TAG) => {
                let field = tokens
                    .next()
                    .ok_or_else(|| PlotError::BadOutput(line.to_string()))?;
                summary.missing_fields.push(field.to_string());
            }
            Some(ENTRIES_TAG) => {
                // ROOT prints entry counts as integers, but be lenient with floats
                let entries: f64 = parse_number(line, tokens.next())?;
                summary.entries = entries as u64;
            }
            Some(MAX_IEVT_TAG) => summary.max_ievt = parse_number(line, tokens.next())?,
            _ => (),
        }
    }
    Ok(summary)
}

/// Read the ROI efficiency printed by the driver script, if any
pub fn parse_roi_efficiency(stdout: &str) -> Result<Option<RoiEfficiency>, PlotError> {
    let mut result = None;
    for line in stdout.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.next() == Some(ROI_EFFICIENCY_TAG) {
            result = Some(RoiEfficiency {
                efficiency: parse_number(line, tokens.next())?,
                error: parse_number(line, tokens.next())?,
            });
        }
    }
    Ok(result)
}

/// The last stage the driver script announced before stopping
fn last_stage(stdout: &str) -> String {
    stdout
        .lines()
        .filter_map(|line| line.strip_prefix(STAGE_TAG))
        .last()
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| String::from("setup"))
}

/// Runs the tbsw python helpers with an external interpreter
#[derive(Debug, Clone)]
pub struct PyRootBackend {
    python: PathBuf,
    script_path: PathBuf,
}

impl PyRootBackend {
    /// `script_path` is where the rendered driver script is kept for inspection and reruns
    pub fn new(python: &Path, script_path: &Path) -> Self {
        Self {
            python: python.to_path_buf(),
            script_path: script_path.to_path_buf(),
        }
    }

    fn run_python(&self, args: &[&str]) -> Result<Output, PlotError> {
        Command::new(&self.python)
            .args(args)
            .output()
            .map_err(|source| PlotError::LaunchError {
                program: self.python.clone(),
                source,
            })
    }
}

impl PlotBackend for PyRootBackend {
    fn inspect_tree(&mut self, input: &Path) -> Result<TreeSummary, PlotError> {
        let script = render_inspect_script(input);
        let output = self.run_python(&["-c", script.as_str()])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(PlotError::BackendFailure {
                stage: String::from("inspect"),
                script: PathBuf::from("-c"),
                code: output.status.code(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_tree_summary(&stdout)
    }

    fn execute(
        &mut self,
        input: &Path,
        histo_file: &Path,
        plan: &[PlotStep],
    ) -> Result<Option<RoiEfficiency>, PlotError> {
        let script = render_plot_script(input, histo_file, plan)
            .map_err(|e| PlotError::BadOutput(e.to_string()))?;
        std::fs::write(&self.script_path, script)?;
        spdlog::info!("Wrote plot script {}", self.script_path.to_string_lossy());

        let script_arg = self.script_path.to_string_lossy().to_string();
        let output = self.run_python(&[script_arg.as_str()])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(PlotError::BackendFailure {
                stage: last_stage(&stdout),
                script: self.script_path.clone(),
                code: output.status.code(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_roi_efficiency(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dut_config::CalibrationUnit;
    use crate::plot_plan::build_plot_plan;
    use crate::run_config::{Roi, RunConfig};

    #[test]
    fn test_python_literals() {
        assert_eq!(py_str("it's"), "'it\\'s'");
        assert_eq!(py_axis(&Axis::new(151, -0.1, 0.1)), "(151,-0.1,0.1)");
        assert_eq!(py_axis(&Axis::new(512, 0.0, 512.0)), "(512,0.0,512.0)");
        let dict = py_dut_config(&DutConfig::for_unit(CalibrationUnit::Electrons));
        assert!(dict.starts_with("{'pitch_u': 0.03304, "));
        assert!(dict.contains("'charge_unit': 'electrons'"));
        assert!(dict.contains("'seed_charge_axis': (20,0.0,2000.0)"));
    }

    #[test]
    fn test_script_follows_plan_order() {
        let run = RunConfig::new(826, Roi::default(), CalibrationUnit::ToT);
        let dut = DutConfig::for_unit(run.calib);
        let plan = build_plot_plan(&run, &dut, None);
        let script = render_plot_script(
            &run.input_file_name(),
            &run.histo_file_name(),
            &plan,
        )
        .unwrap();

        let residuals = script.find("residuals.plot(inputfile").unwrap();
        let roi = script.find("residuals.plot_roi(").unwrap();
        let extract = script.find("efficiency.extract_roi(").unwrap();
        let pdf = script.find("residuals.make_pdf(").unwrap();
        assert!(residuals < roi && roi < extract && extract < pdf);
        assert!(script.contains("basecut='hasTrack==0 '"));
        assert!(script.contains(
            "'Histos created from file root-files/Histos-TJ2-run826-run826--reco.root'"
        ));
        assert!(script.contains("    print('ROI_EFFICIENCY', roi_result[0], roi_result[1])"));
    }

    #[test]
    fn test_parse_tree_summary() {
        let summary = parse_tree_summary(
            "Info in <TFile>: something\nMISSING_FIELD cellV_fit\nENTRIES 1234\nMAX_IEVT 99999.0\n",
        )
        .unwrap();
        assert!(summary.has_tree);
        assert_eq!(summary.entries, 1234);
        assert_eq!(summary.max_ievt, 99999.0);
        assert_eq!(summary.missing_fields, vec![String::from("cellV_fit")]);

        let summary = parse_tree_summary("MISSING_TREE Hit\n").unwrap();
        assert!(!summary.has_tree);
        assert!(matches!(
            parse_tree_summary("ENTRIES many\n"),
            Err(PlotError::BadOutput(_))
        ));
    }

    #[test]
    fn test_parse_roi_efficiency_and_stage() {
        let stdout = "STAGE efficiency.plot\nSTAGE efficiency.extract_roi\nROI_EFFICIENCY 0.9871 0.0012\n";
        assert_eq!(
            parse_roi_efficiency(stdout).unwrap(),
            Some(RoiEfficiency {
                efficiency: 0.9871,
                error: 0.0012
            })
        );
        assert_eq!(parse_roi_efficiency("STAGE x\n").unwrap(), None);
        assert_eq!(last_stage(stdout), "efficiency.extract_roi");
        assert_eq!(last_stage(""), "setup");
    }
}
