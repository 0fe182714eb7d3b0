use std::rc::Rc;

use super::path::ProcessingPath;
use super::processor::{FastTracker, PixelDutAnalyzer, Processor, ProcessorConfig};
use super::stages::{
    add_clusterizers, add_hitmakers, add_hitmakers_db, add_pixel_calibration, add_rawinput,
    add_unpackers, geometry, PipelineSettings,
};

/// Plane position of the TJ2 in the telescope
pub const DUT_PLANE: i64 = 3;

/// Name of the DUT histogram file written by the analyzer for a calibration tag
pub fn dut_histogram_file(caltag: &str) -> String {
    format!("Histos-TJ2-{caltag}.root")
}

/// Returns the paths for the reconstruction of a test beam run: a single path from raw data
/// to DUT analysis
pub fn create_reco_path(settings: &PipelineSettings, caltag: &str) -> Vec<Rc<ProcessingPath>> {
    let mut reco_path = ProcessingPath::new("reco_path", settings.raw_globals());
    add_rawinput(&mut reco_path, settings);
    reco_path.add_processor(geometry());

    add_unpackers(&mut reco_path, settings);
    add_pixel_calibration(&mut reco_path, settings);
    add_clusterizers(&mut reco_path, settings);

    if settings.use_cluster_db {
        add_hitmakers_db(&mut reco_path);
    } else {
        add_hitmakers(&mut reco_path);
    }

    // Tracks are found from telescope hits only, the DUT stays unbiased
    reco_path.add_processor(Processor::new(
        "TrackFinder",
        ProcessorConfig::FastTracker(FastTracker {
            input_hit_collections: vec![String::from("hit_m26")],
            exclude_detectors: vec![DUT_PLANE],
            max_track_chi2: 100.0,
            maximum_gap: 1,
            minimum_hits: 6,
            outlier_chi2_cut: 20.0,
            particle: settings.particle(),
            single_hit_seeding: vec![0],
            max_residual_u: 0.4,
            max_residual_v: 0.4,
        }),
    ));

    reco_path.add_processor(Processor::new(
        "TJ2Analyzer",
        ProcessorConfig::PixelDutAnalyzer(PixelDutAnalyzer {
            noise_db: String::from("localDB/NoiseDB-TJ2.root"),
            hit_collection: String::from("hit_tj2"),
            digit_collection: String::from("zsdata_tj2"),
            dut_plane: DUT_PLANE,
            max_residual_u: 0.2,
            max_residual_v: 0.2,
            root_file: dut_histogram_file(caltag),
        }),
    ));

    vec![Rc::new(reco_path)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::processor::ParamValue;
    use std::path::Path;

    fn settings(cog: bool, pixel_cal: bool) -> PipelineSettings {
        let config = Config {
            run_number: 826,
            cog,
            pixel_cal,
            ..Default::default()
        };
        PipelineSettings::new(&config, Path::new("/data/run826.txt")).unwrap()
    }

    #[test]
    fn test_reco_path_with_cluster_db() {
        let paths = create_reco_path(&settings(false, false), "run826");
        assert_eq!(paths.len(), 1);
        assert_eq!(
            paths[0].processor_names(),
            vec![
                "CorryInputProcessor",
                "Geo",
                "TelUnpacker",
                "TJ2Unpacker",
                "M26Clusterizer",
                "TJ2Clusterizer",
                "M26GoeHitMaker",
                "TJ2GoeHitMaker",
                "TrackFinder",
                "TJ2Analyzer"
            ]
        );
        let analyzer = paths[0].processors().last().unwrap().parameters();
        assert_eq!(
            analyzer.last().unwrap().value,
            ParamValue::Text(String::from("Histos-TJ2-run826.root"))
        );
    }

    #[test]
    fn test_reco_path_with_cog_and_pixel_cal() {
        let paths = create_reco_path(&settings(true, true), "run826_cog");
        let path = &paths[0];
        assert!(path.contains("M26CogHitMaker"));
        assert!(!path.contains("M26GoeHitMaker"));
        assert!(path.contains("PixelChargeCalibrator"));

        let tracker = path
            .processors()
            .iter()
            .find(|p| p.name == "TrackFinder")
            .unwrap()
            .parameters();
        assert_eq!(tracker[1].value.to_string(), "3");
        assert_eq!(tracker[0].value.to_string(), "hit_m26");
    }
}
