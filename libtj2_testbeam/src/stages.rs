//! Building blocks shared by the calibration and reconstruction paths.
//!
//! The telescope is six MIMOSA26 planes (sensor ids 0-5) with the TJ2 Monopix2 DUT
//! (sensor id 22) in the middle of the beam line at plane position 3.
use std::path::{Path, PathBuf};

use super::config::Config;
use super::error::ConfigError;
use super::path::{PathGlobals, ProcessingPath};
use super::processor::{
    CogHitMaker, CorryInput, FastTracker, Geometry, GoeClusterCalibrator, GoeHitMaker,
    HitsFilter, HotPixelKiller, KalmanAligner, OccupancyCut, Particle, PixelChargeCalibrator,
    PixelClusterizer, Processor, ProcessorConfig,
};

pub const MAX_RECORD_NR_LONG: u64 = 1_000_000;
pub const MAX_RECORD_NR_SHORT: u64 = 200_000;
pub const VERBOSITY_LEVEL: &str = "MESSAGE1";

/// Beam energy in GeV
pub const BEAM_ENERGY: f64 = 4.2;
/// Electron mass in GeV
pub const PARTICLE_MASS: f64 = 0.000511;

pub const TMP_LCIO_FILE: &str = "tmp.slcio";

const M26_SENSOR_IDS: [i64; 6] = [0, 1, 2, 3, 4, 5];
const TJ2_SENSOR_ID: i64 = 22;
const M26_SIGMA_CORRECTIONS: [f64; 3] = [0.698, 0.31, 0.315];
const TJ2_SIGMA_CORRECTIONS: [f64; 3] = [0.8, 0.3, 0.3];

/// Explicit per-run settings passed into every path builder
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub raw_file: PathBuf,
    pub run_number: u32,
    pub gear_file: PathBuf,
    pub energy: f64,
    pub mass: f64,
    pub use_cluster_db: bool,
    pub pixel_calibration: Option<PathBuf>,
    pub tj2_zs_threshold: Option<i64>,
}

impl PipelineSettings {
    pub fn new(config: &Config, raw_file: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            raw_file: raw_file.to_path_buf(),
            run_number: config.run_number,
            gear_file: PathBuf::from(&config.gearfile),
            energy: BEAM_ENERGY,
            mass: PARTICLE_MASS,
            use_cluster_db: config.use_cluster_db(),
            pixel_calibration: if config.pixel_cal {
                Some(config.gain_db_path())
            } else {
                None
            },
            tj2_zs_threshold: config.clip_threshold()?,
        })
    }

    pub fn particle(&self) -> Particle {
        Particle {
            charge: -1,
            mass: self.mass,
            momentum: self.energy,
        }
    }

    /// Globals for a path reading raw data
    pub fn raw_globals(&self) -> PathGlobals {
        PathGlobals {
            gear_file: self.gear_file.clone(),
            max_record_number: MAX_RECORD_NR_LONG,
            verbosity: Some(String::from(VERBOSITY_LEVEL)),
            lcio_input_files: Vec::new(),
        }
    }

    /// Globals for a path reading the clusters stored by the clusterizer path
    pub fn lcio_globals(&self, max_record_number: u64) -> PathGlobals {
        PathGlobals {
            gear_file: self.gear_file.clone(),
            max_record_number,
            verbosity: None,
            lcio_input_files: vec![String::from(TMP_LCIO_FILE)],
        }
    }

    /// Collection written by the TJ2 unpacker; raw charges go through the calibrator first
    fn tj2_unpacked_collection(&self) -> &'static str {
        if self.pixel_calibration.is_some() {
            "zsdata_tj2_raw"
        } else {
            "zsdata_tj2"
        }
    }
}

fn hit_collections() -> Vec<String> {
    vec![String::from("hit_m26"), String::from("hit_tj2")]
}

pub fn add_rawinput(path: &mut ProcessingPath, settings: &PipelineSettings) {
    path.add_processor(Processor::new(
        "CorryInputProcessor",
        ProcessorConfig::CorryInput(CorryInput {
            file_names: settings.raw_file.clone(),
            sensor_ids: M26_SENSOR_IDS
                .iter()
                .copied()
                .chain([TJ2_SENSOR_ID])
                .collect(),
            sensor_names: [
                "MIMOSA26_0",
                "MIMOSA26_1",
                "MIMOSA26_2",
                "MIMOSA26_3",
                "MIMOSA26_4",
                "MIMOSA26_5",
                "Monopix2_0",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            raw_hit_collection: String::from("rawdata"),
            run_number: settings.run_number,
        }),
    ));
}

pub fn geometry() -> Processor {
    Processor::new(
        "Geo",
        ProcessorConfig::Geometry(Geometry {
            alignment_db: String::from("localDB/alignmentDB.root"),
            apply_alignment: true,
            override_alignment: true,
        }),
    )
}

/// Splits the raw hits into telescope and DUT collections
pub fn add_unpackers(path: &mut ProcessingPath, settings: &PipelineSettings) {
    path.add_processor(Processor::new(
        "TelUnpacker",
        ProcessorConfig::HitsFilter(HitsFilter {
            input_collection: String::from("rawdata"),
            output_collection: String::from("zsdata_m26"),
            filter_ids: M26_SENSOR_IDS.to_vec(),
        }),
    ));
    path.add_processor(Processor::new(
        "TJ2Unpacker",
        ProcessorConfig::HitsFilter(HitsFilter {
            input_collection: String::from("rawdata"),
            output_collection: String::from(settings.tj2_unpacked_collection()),
            filter_ids: vec![TJ2_SENSOR_ID],
        }),
    ));
}

/// Hot/dead pixel masking
pub fn add_pixelmaskers(path: &mut ProcessingPath) {
    path.add_processor(Processor::new(
        "M26HotPixelKiller",
        ProcessorConfig::HotPixelKiller(HotPixelKiller {
            input_collection: String::from("zsdata_m26"),
            occupancy: OccupancyCut::Absolute {
                max: 0.00004,
                min: -1.0,
            },
            noise_db: String::from("localDB/NoiseDB-M26.root"),
            offline_zs_threshold: 0,
        }),
    ));
    path.add_processor(Processor::new(
        "TJ2HotPixelKiller",
        ProcessorConfig::HotPixelKiller(HotPixelKiller {
            input_collection: String::from("zsdata_tj2"),
            occupancy: OccupancyCut::Normalized {
                max: 5.0,
                min: -1.0,
            },
            noise_db: String::from("localDB/NoiseDB-TJ2.root"),
            offline_zs_threshold: 0,
        }),
    ));
}

/// Converts raw TJ2 charges with the gain database; no-op unless requested
pub fn add_pixel_calibration(path: &mut ProcessingPath, settings: &PipelineSettings) {
    if let Some(gain_db) = &settings.pixel_calibration {
        path.add_processor(Processor::new(
            "PixelChargeCalibrator",
            ProcessorConfig::PixelChargeCalibrator(PixelChargeCalibrator {
                sparse_data_collection: String::from("zsdata_tj2_raw"),
                calibrated_collection: String::from("zsdata_tj2"),
                gain_db: gain_db.clone(),
                calib_func_name: String::from("calibFunc"),
                calib_para_base_name: String::from("para"),
            }),
        ));
    }
}

pub fn add_clusterizers(path: &mut ProcessingPath, settings: &PipelineSettings) {
    path.add_processor(Processor::new(
        "M26Clusterizer",
        ProcessorConfig::PixelClusterizer(PixelClusterizer {
            noise_db: String::from("localDB/NoiseDB-M26.root"),
            sparse_data_collection: String::from("zsdata_m26"),
            cluster_collection: String::from("zscluster_m26"),
            sparse_cluster_cut: 0,
            sparse_seed_cut: 0,
            sparse_zs_cut: 0,
        }),
    ));
    path.add_processor(Processor::new(
        "TJ2Clusterizer",
        ProcessorConfig::PixelClusterizer(PixelClusterizer {
            noise_db: String::from("localDB/NoiseDB-TJ2.root"),
            sparse_data_collection: String::from("zsdata_tj2"),
            cluster_collection: String::from("zscluster_tj2"),
            sparse_cluster_cut: 0,
            sparse_seed_cut: 0,
            sparse_zs_cut: settings.tj2_zs_threshold.unwrap_or(0),
        }),
    ));
}

/// Center of gravity hit makers
pub fn add_hitmakers(path: &mut ProcessingPath) {
    path.add_processor(Processor::new(
        "M26CogHitMaker",
        ProcessorConfig::CogHitMaker(CogHitMaker {
            cluster_collection: String::from("zscluster_m26"),
            hit_collection: String::from("hit_m26"),
            sigma_u: M26_SIGMA_CORRECTIONS.to_vec(),
            sigma_v: M26_SIGMA_CORRECTIONS.to_vec(),
        }),
    ));
    path.add_processor(Processor::new(
        "TJ2CogHitMaker",
        ProcessorConfig::CogHitMaker(CogHitMaker {
            cluster_collection: String::from("zscluster_tj2"),
            hit_collection: String::from("hit_tj2"),
            sigma_u: TJ2_SIGMA_CORRECTIONS.to_vec(),
            sigma_v: TJ2_SIGMA_CORRECTIONS.to_vec(),
        }),
    ));
}

/// Cluster shape hit makers, requiring the clusterDBs in localDB
pub fn add_hitmakers_db(path: &mut ProcessingPath) {
    path.add_processor(Processor::new(
        "M26GoeHitMaker",
        ProcessorConfig::GoeHitMaker(GoeHitMaker {
            cluster_collection: String::from("zscluster_m26"),
            hit_collection: String::from("hit_m26"),
            cluster_db: String::from("localDB/clusterDB-M26.root"),
            cog_fallback: None,
            sigma_u: M26_SIGMA_CORRECTIONS.to_vec(),
            sigma_v: M26_SIGMA_CORRECTIONS.to_vec(),
        }),
    ));
    path.add_processor(Processor::new(
        "TJ2GoeHitMaker",
        ProcessorConfig::GoeHitMaker(GoeHitMaker {
            cluster_collection: String::from("zscluster_tj2"),
            hit_collection: String::from("hit_tj2"),
            cluster_db: String::from("localDB/clusterDB-TJ2.root"),
            cog_fallback: Some(true),
            sigma_u: TJ2_SIGMA_CORRECTIONS.to_vec(),
            sigma_v: TJ2_SIGMA_CORRECTIONS.to_vec(),
        }),
    ));
}

/// Cluster calibrators producing the clusterDBs
pub fn add_clustercalibrators(path: &mut ProcessingPath) {
    path.add_processor(Processor::new(
        "M26ClusterCalibrator",
        ProcessorConfig::GoeClusterCalibrator(GoeClusterCalibrator {
            cluster_db: String::from("localDB/clusterDB-M26.root"),
            min_clusters: 100,
            max_eta_bins: None,
            select_planes: vec![1, 2, 4, 5],
        }),
    ));
    path.add_processor(Processor::new(
        "TJ2ClusterCalibrator",
        ProcessorConfig::GoeClusterCalibrator(GoeClusterCalibrator {
            cluster_db: String::from("localDB/clusterDB-TJ2.root"),
            min_clusters: 100,
            max_eta_bins: Some(7),
            select_planes: vec![3],
        }),
    ));
}

/// Track finder with loose cuts used while the telescope is still misaligned
pub fn trackfinder_loosecut(settings: &PipelineSettings) -> Processor {
    Processor::new(
        "AlignTF_LC",
        ProcessorConfig::FastTracker(FastTracker {
            input_hit_collections: hit_collections(),
            exclude_detectors: vec![0, 1, 2],
            max_track_chi2: 10_000_000.0,
            maximum_gap: 1,
            minimum_hits: 3,
            outlier_chi2_cut: 100_000_000.0,
            particle: settings.particle(),
            single_hit_seeding: vec![6],
            max_residual_u: 0.5,
            max_residual_v: 0.5,
        }),
    )
}

/// Track finder with tight cuts for the final alignment
pub fn trackfinder_tightcut(settings: &PipelineSettings) -> Processor {
    Processor::new(
        "AlignTF_TC",
        ProcessorConfig::FastTracker(FastTracker {
            input_hit_collections: hit_collections(),
            exclude_detectors: vec![0, 1, 2],
            max_track_chi2: 100.0,
            maximum_gap: 1,
            minimum_hits: 3,
            outlier_chi2_cut: 20.0,
            particle: settings.particle(),
            single_hit_seeding: vec![6],
            max_residual_u: 0.4,
            max_residual_v: 0.4,
        }),
    )
}

pub fn prealigner() -> Processor {
    Processor::new(
        "PreAligner",
        ProcessorConfig::KalmanAligner(KalmanAligner {
            errors_shift_x: vec![0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 0.0],
            errors_shift_y: vec![0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 0.0],
            errors_shift_z: vec![0.0; 7],
            errors_alpha: vec![0.0; 7],
            errors_beta: vec![0.0; 7],
            errors_gamma: vec![0.0, 0.01, 0.0, 0.01, 0.0, 0.01, 0.0],
        }),
    )
}

/// Same as the pre-aligner but also frees the z position of planes 1 and 5
pub fn aligner() -> Processor {
    Processor::new(
        "Aligner",
        ProcessorConfig::KalmanAligner(KalmanAligner {
            errors_shift_x: vec![0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 0.0],
            errors_shift_y: vec![0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 0.0],
            errors_shift_z: vec![0.0, 10.0, 0.0, 0.0, 0.0, 10.0, 0.0],
            errors_alpha: vec![0.0; 7],
            errors_beta: vec![0.0; 7],
            errors_gamma: vec![0.0, 0.01, 0.0, 0.01, 0.0, 0.01, 0.0],
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ParamValue;

    fn settings(pixel_cal: bool, clip: Option<&str>) -> PipelineSettings {
        let mut config = Config {
            run_number: 826,
            pixel_cal,
            ..Default::default()
        };
        if let Some(tag) = clip {
            config.clip = true;
            config.cliptag = tag.to_string();
        }
        PipelineSettings::new(&config, Path::new("/data/run826.txt")).unwrap()
    }

    #[test]
    fn test_rawinput_sensors() {
        let mut path = ProcessingPath::new("test", PathGlobals::default());
        add_rawinput(&mut path, &settings(false, None));
        let params = path.processors()[0].parameters();
        assert_eq!(params[0].value.to_string(), "/data/run826.txt");
        assert_eq!(params[1].value.to_string(), "0 1 2 3 4 5 22");
        assert_eq!(params[4].value, ParamValue::Int(826));
    }

    #[test]
    fn test_pixel_calibration_reroutes_tj2_unpacker() {
        let mut path = ProcessingPath::new("test", PathGlobals::default());
        let s = settings(true, None);
        add_unpackers(&mut path, &s);
        add_pixel_calibration(&mut path, &s);
        assert_eq!(
            path.processor_names(),
            vec!["TelUnpacker", "TJ2Unpacker", "PixelChargeCalibrator"]
        );
        assert_eq!(path.processors()[1].parameters()[1].value.to_string(), "zsdata_tj2_raw");

        let mut plain = ProcessingPath::new("plain", PathGlobals::default());
        let s = settings(false, None);
        add_unpackers(&mut plain, &s);
        add_pixel_calibration(&mut plain, &s);
        assert_eq!(plain.processors().len(), 2);
        assert_eq!(plain.processors()[1].parameters()[1].value.to_string(), "zsdata_tj2");
    }

    #[test]
    fn test_clip_sets_tj2_zero_suppression() {
        let mut path = ProcessingPath::new("test", PathGlobals::default());
        add_clusterizers(&mut path, &settings(false, Some("7")));
        let m26 = path.processors()[0].parameters();
        let tj2 = path.processors()[1].parameters();
        assert_eq!(m26[5].value, ParamValue::Int(0));
        assert_eq!(tj2[5].name, "SparseZSCut");
        assert_eq!(tj2[5].value, ParamValue::Int(7));
    }

    #[test]
    fn test_trackfinder_particle_parameters() {
        let tf = trackfinder_tightcut(&settings(false, None));
        let params = tf.parameters();
        let mass = params.iter().find(|p| p.name == "ParticleMass").unwrap();
        let momentum = params.iter().find(|p| p.name == "ParticleMomentum").unwrap();
        assert_eq!(mass.value.to_string(), "0.000511");
        assert_eq!(momentum.value.to_string(), "4.2");
    }
}
