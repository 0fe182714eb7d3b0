//! Typed configuration records for the external Marlin processors.
//!
//! Every processor kind used by the TJ2 pipelines has its own record with named fields. The
//! records only become a list of string-keyed parameters at the steering boundary, through
//! [`ProcessorConfig::parameters`]. Parameters are emitted in a fixed order per kind.
use std::fmt::Display;
use std::path::PathBuf;

/// The value of a single Marlin parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    TextList(Vec<String>),
}

fn join<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<String>>()
        .join(" ")
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::IntList(l) => write!(f, "{}", join(l)),
            Self::FloatList(l) => write!(f, "{}", join(l)),
            Self::TextList(l) => write!(f, "{}", join(l)),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A named Marlin parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: &'static str,
    pub value: ParamValue,
}

impl Parameter {
    pub fn new(name: &'static str, value: impl Into<ParamValue>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Charge, mass (GeV) and momentum (GeV) of the beam particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub charge: i64,
    pub mass: f64,
    pub momentum: f64,
}

impl Particle {
    fn parameters(&self) -> [Parameter; 3] {
        [
            Parameter::new("ParticleCharge", self.charge),
            Parameter::new("ParticleMass", self.mass),
            Parameter::new("ParticleMomentum", self.momentum),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorryInput {
    pub file_names: PathBuf,
    pub sensor_ids: Vec<i64>,
    pub sensor_names: Vec<String>,
    pub raw_hit_collection: String,
    pub run_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub alignment_db: String,
    pub apply_alignment: bool,
    pub override_alignment: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HitsFilter {
    pub input_collection: String,
    pub output_collection: String,
    pub filter_ids: Vec<i64>,
}

/// Occupancy window used to flag hot and dead pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OccupancyCut {
    /// Raw hit rate per event
    Absolute { max: f64, min: f64 },
    /// Occupancy relative to the sensor mean
    Normalized { max: f64, min: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotPixelKiller {
    pub input_collection: String,
    pub occupancy: OccupancyCut,
    pub noise_db: String,
    pub offline_zs_threshold: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PixelChargeCalibrator {
    pub sparse_data_collection: String,
    pub calibrated_collection: String,
    pub gain_db: PathBuf,
    pub calib_func_name: String,
    pub calib_para_base_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PixelClusterizer {
    pub noise_db: String,
    pub sparse_data_collection: String,
    pub cluster_collection: String,
    pub sparse_cluster_cut: i64,
    pub sparse_seed_cut: i64,
    pub sparse_zs_cut: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CogHitMaker {
    pub cluster_collection: String,
    pub hit_collection: String,
    pub sigma_u: Vec<f64>,
    pub sigma_v: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoeHitMaker {
    pub cluster_collection: String,
    pub hit_collection: String,
    pub cluster_db: String,
    pub cog_fallback: Option<bool>,
    pub sigma_u: Vec<f64>,
    pub sigma_v: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoeClusterCalibrator {
    pub cluster_db: String,
    pub min_clusters: i64,
    pub max_eta_bins: Option<i64>,
    pub select_planes: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LcioOutput {
    pub output_file: String,
    pub write_mode: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawHitDqm {
    pub input_hit_collections: Vec<String>,
    pub root_file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Correlator {
    pub input_hit_collections: Vec<String>,
    pub output_root_file: String,
    pub reference_plane: i64,
    pub particle: Particle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FastTracker {
    pub input_hit_collections: Vec<String>,
    pub exclude_detectors: Vec<i64>,
    pub max_track_chi2: f64,
    pub maximum_gap: i64,
    pub minimum_hits: i64,
    pub outlier_chi2_cut: f64,
    pub particle: Particle,
    pub single_hit_seeding: Vec<i64>,
    pub max_residual_u: f64,
    pub max_residual_v: f64,
}

/// Per-plane alignment parameter errors; a zero fixes the parameter
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanAligner {
    pub errors_shift_x: Vec<f64>,
    pub errors_shift_y: Vec<f64>,
    pub errors_shift_z: Vec<f64>,
    pub errors_alpha: Vec<f64>,
    pub errors_beta: Vec<f64>,
    pub errors_gamma: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriplettCorrelator {
    pub output_root_file: String,
    pub track_collection: String,
    pub input_hit_collections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackFitDqm {
    pub root_file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PixelDutAnalyzer {
    pub noise_db: String,
    pub hit_collection: String,
    pub digit_collection: String,
    pub dut_plane: i64,
    pub max_residual_u: f64,
    pub max_residual_v: f64,
    pub root_file: String,
}

/// The configuration of one processor. The variant selects the external implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorConfig {
    CorryInput(CorryInput),
    Geometry(Geometry),
    HitsFilter(HitsFilter),
    HotPixelKiller(HotPixelKiller),
    PixelChargeCalibrator(PixelChargeCalibrator),
    PixelClusterizer(PixelClusterizer),
    CogHitMaker(CogHitMaker),
    GoeHitMaker(GoeHitMaker),
    GoeClusterCalibrator(GoeClusterCalibrator),
    LcioOutput(LcioOutput),
    RawHitDqm(RawHitDqm),
    Correlator(Correlator),
    FastTracker(FastTracker),
    KalmanAligner(KalmanAligner),
    TriplettCorrelator(TriplettCorrelator),
    TrackFitDqm(TrackFitDqm),
    PixelDutAnalyzer(PixelDutAnalyzer),
}

impl ProcessorConfig {
    /// The Marlin processor type tag
    pub fn proc_type(&self) -> &'static str {
        match self {
            Self::CorryInput(_) => "CorryInputProcessor",
            Self::Geometry(_) => "Geometry",
            Self::HitsFilter(_) => "HitsFilterProcessor",
            Self::HotPixelKiller(_) => "HotPixelKiller",
            Self::PixelChargeCalibrator(_) => "PixelChargeCalibrator",
            Self::PixelClusterizer(_) => "PixelClusterizer",
            Self::CogHitMaker(_) => "CogHitMaker",
            Self::GoeHitMaker(_) => "GoeHitMaker",
            Self::GoeClusterCalibrator(_) => "GoeClusterCalibrator",
            Self::LcioOutput(_) => "LCIOOutputProcessor",
            Self::RawHitDqm(_) => "RawHitDQM",
            Self::Correlator(_) => "Correlator",
            Self::FastTracker(_) => "FastTracker",
            Self::KalmanAligner(_) => "KalmanAligner",
            Self::TriplettCorrelator(_) => "TriplettCorrelator",
            Self::TrackFitDqm(_) => "TrackFitDQM",
            Self::PixelDutAnalyzer(_) => "PixelDUTAnalyzer",
        }
    }

    /// Flatten the record into Marlin parameters
    pub fn parameters(&self) -> Vec<Parameter> {
        match self {
            Self::CorryInput(p) => vec![
                Parameter::new("FileNames", p.file_names.to_string_lossy().to_string()),
                Parameter::new("SensorIDs", ParamValue::IntList(p.sensor_ids.clone())),
                Parameter::new("SensorNames", ParamValue::TextList(p.sensor_names.clone())),
                Parameter::new("RawHitCollectionName", p.raw_hit_collection.as_str()),
                Parameter::new("RunNumber", p.run_number as i64),
            ],
            Self::Geometry(p) => vec![
                Parameter::new("AlignmentDBFilePath", p.alignment_db.as_str()),
                Parameter::new("ApplyAlignment", p.apply_alignment),
                Parameter::new("OverrideAlignment", p.override_alignment),
            ],
            Self::HitsFilter(p) => vec![
                Parameter::new("InputCollectionName", p.input_collection.as_str()),
                Parameter::new("OutputCollectionName", p.output_collection.as_str()),
                Parameter::new("FilterIDs", ParamValue::IntList(p.filter_ids.clone())),
            ],
            Self::HotPixelKiller(p) => {
                let mut params = vec![Parameter::new(
                    "InputCollectionName",
                    p.input_collection.as_str(),
                )];
                match p.occupancy {
                    OccupancyCut::Absolute { max, min } => {
                        params.push(Parameter::new("MaskNormalized", false));
                        params.push(Parameter::new("MaxOccupancy", max));
                        params.push(Parameter::new("MinOccupancy", min));
                    }
                    OccupancyCut::Normalized { max, min } => {
                        params.push(Parameter::new("MaxNormedOccupancy", max));
                        params.push(Parameter::new("MinNormedOccupancy", min));
                    }
                }
                params.push(Parameter::new("NoiseDBFileName", p.noise_db.as_str()));
                params.push(Parameter::new("OfflineZSThreshold", p.offline_zs_threshold));
                params
            }
            Self::PixelChargeCalibrator(p) => vec![
                Parameter::new("SparseDataCollectionName", p.sparse_data_collection.as_str()),
                Parameter::new("CalibratedCollectionName", p.calibrated_collection.as_str()),
                Parameter::new(
                    "GainCalibrationDBFileName",
                    p.gain_db.to_string_lossy().to_string(),
                ),
                Parameter::new("CalibFuncName", p.calib_func_name.as_str()),
                Parameter::new("CalibParaBaseName", p.calib_para_base_name.as_str()),
            ],
            Self::PixelClusterizer(p) => vec![
                Parameter::new("NoiseDBFileName", p.noise_db.as_str()),
                Parameter::new("SparseDataCollectionName", p.sparse_data_collection.as_str()),
                Parameter::new("ClusterCollectionName", p.cluster_collection.as_str()),
                Parameter::new("SparseClusterCut", p.sparse_cluster_cut),
                Parameter::new("SparseSeedCut", p.sparse_seed_cut),
                Parameter::new("SparseZSCut", p.sparse_zs_cut),
            ],
            Self::CogHitMaker(p) => vec![
                Parameter::new("ClusterCollection", p.cluster_collection.as_str()),
                Parameter::new("HitCollectionName", p.hit_collection.as_str()),
                Parameter::new("SigmaUCorrections", ParamValue::FloatList(p.sigma_u.clone())),
                Parameter::new("SigmaVCorrections", ParamValue::FloatList(p.sigma_v.clone())),
            ],
            Self::GoeHitMaker(p) => {
                let mut params = vec![
                    Parameter::new("ClusterCollection", p.cluster_collection.as_str()),
                    Parameter::new("HitCollectionName", p.hit_collection.as_str()),
                    Parameter::new("ClusterDBFileName", p.cluster_db.as_str()),
                ];
                if let Some(fallback) = p.cog_fallback {
                    params.push(Parameter::new("UseCenterOfGravityFallback", fallback));
                }
                params.push(Parameter::new(
                    "SigmaUCorrections",
                    ParamValue::FloatList(p.sigma_u.clone()),
                ));
                params.push(Parameter::new(
                    "SigmaVCorrections",
                    ParamValue::FloatList(p.sigma_v.clone()),
                ));
                params
            }
            Self::GoeClusterCalibrator(p) => {
                let mut params = vec![
                    Parameter::new("ClusterDBFileName", p.cluster_db.as_str()),
                    Parameter::new("MinClusters", p.min_clusters),
                ];
                if let Some(bins) = p.max_eta_bins {
                    params.push(Parameter::new("MaxEtaBins", bins));
                }
                params.push(Parameter::new(
                    "SelectPlanes",
                    ParamValue::IntList(p.select_planes.clone()),
                ));
                params
            }
            Self::LcioOutput(p) => vec![
                Parameter::new("LCIOOutputFile", p.output_file.as_str()),
                Parameter::new("LCIOWriteMode", p.write_mode.as_str()),
            ],
            Self::RawHitDqm(p) => vec![
                Parameter::new(
                    "InputHitCollectionNameVec",
                    ParamValue::TextList(p.input_hit_collections.clone()),
                ),
                Parameter::new("RootFileName", p.root_file.as_str()),
            ],
            Self::Correlator(p) => {
                let mut params = vec![
                    Parameter::new(
                        "InputHitCollectionNameVec",
                        ParamValue::TextList(p.input_hit_collections.clone()),
                    ),
                    Parameter::new("OutputRootFileName", p.output_root_file.as_str()),
                    Parameter::new("ReferencePlane", p.reference_plane),
                ];
                params.extend(p.particle.parameters());
                params
            }
            Self::FastTracker(p) => {
                let mut params = vec![
                    Parameter::new(
                        "InputHitCollectionNameVec",
                        ParamValue::TextList(p.input_hit_collections.clone()),
                    ),
                    Parameter::new(
                        "ExcludeDetector",
                        ParamValue::IntList(p.exclude_detectors.clone()),
                    ),
                    Parameter::new("MaxTrackChi2", p.max_track_chi2),
                    Parameter::new("MaximumGap", p.maximum_gap),
                    Parameter::new("MinimumHits", p.minimum_hits),
                    Parameter::new("OutlierChi2Cut", p.outlier_chi2_cut),
                ];
                params.extend(p.particle.parameters());
                params.push(Parameter::new(
                    "SingleHitSeeding",
                    ParamValue::IntList(p.single_hit_seeding.clone()),
                ));
                params.push(Parameter::new("MaxResidualU", p.max_residual_u));
                params.push(Parameter::new("MaxResidualV", p.max_residual_v));
                params
            }
            Self::KalmanAligner(p) => vec![
                Parameter::new("ErrorsShiftX", ParamValue::FloatList(p.errors_shift_x.clone())),
                Parameter::new("ErrorsShiftY", ParamValue::FloatList(p.errors_shift_y.clone())),
                Parameter::new("ErrorsShiftZ", ParamValue::FloatList(p.errors_shift_z.clone())),
                Parameter::new("ErrorsAlpha", ParamValue::FloatList(p.errors_alpha.clone())),
                Parameter::new("ErrorsBeta", ParamValue::FloatList(p.errors_beta.clone())),
                Parameter::new("ErrorsGamma", ParamValue::FloatList(p.errors_gamma.clone())),
            ],
            Self::TriplettCorrelator(p) => vec![
                Parameter::new("OutputRootFileName", p.output_root_file.as_str()),
                Parameter::new("TrackCollectionName", p.track_collection.as_str()),
                Parameter::new(
                    "InputHitCollectionNameVec",
                    ParamValue::TextList(p.input_hit_collections.clone()),
                ),
            ],
            Self::TrackFitDqm(p) => vec![Parameter::new("RootFileName", p.root_file.as_str())],
            Self::PixelDutAnalyzer(p) => vec![
                Parameter::new("NoiseDBFileName", p.noise_db.as_str()),
                Parameter::new("HitCollection", p.hit_collection.as_str()),
                Parameter::new("DigitCollection", p.digit_collection.as_str()),
                Parameter::new("DUTPlane", p.dut_plane),
                Parameter::new("MaxResidualU", p.max_residual_u),
                Parameter::new("MaxResidualV", p.max_residual_v),
                Parameter::new("RootFileName", p.root_file.as_str()),
            ],
        }
    }
}

/// A named processor instance inside a path
#[derive(Debug, Clone, PartialEq)]
pub struct Processor {
    pub name: String,
    pub config: ProcessorConfig,
}

impl Processor {
    pub fn new(name: &str, config: ProcessorConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
        }
    }

    pub fn proc_type(&self) -> &'static str {
        self.config.proc_type()
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        self.config.parameters()
    }
}
