use std::rc::Rc;

use super::path::ProcessingPath;
use super::processor::{
    Correlator, LcioOutput, Processor, ProcessorConfig, RawHitDqm, TrackFitDqm,
    TriplettCorrelator,
};
use super::stages::{
    add_clustercalibrators, add_clusterizers, add_hitmakers, add_hitmakers_db,
    add_pixel_calibration, add_pixelmaskers, add_rawinput, add_unpackers, aligner, geometry,
    prealigner, trackfinder_loosecut, trackfinder_tightcut, PipelineSettings,
    MAX_RECORD_NR_LONG, MAX_RECORD_NR_SHORT, TMP_LCIO_FILE,
};

/// Number of times each scheduled path runs. These are fixed; changing them changes the
/// alignment and clusterDB results.
pub const PREALIGNER_REPEATS: usize = 2;
pub const ALIGNER_REPEATS: usize = 3;
pub const PRECLUSTERCAL_REPEATS: usize = 1;
pub const ALIGNER_DB_REPEATS: usize = 2;
pub const CLUSTERCAL_REPEATS: usize = 6;
pub const FINAL_ALIGNER_DB_REPEATS: usize = 2;

fn schedule(calpaths: &mut Vec<Rc<ProcessingPath>>, path: &Rc<ProcessingPath>, times: usize) {
    for _ in 0..times {
        calpaths.push(Rc::clone(path));
    }
}

/// Returns the ordered list of paths needed to calibrate the telescope and the DUT.
///
/// Paths are shared when scheduled more than once, so the list may contain the same path
/// several times in a row.
pub fn create_calibration_paths(settings: &PipelineSettings) -> Vec<Rc<ProcessingPath>> {
    let mut calpaths: Vec<Rc<ProcessingPath>> = Vec::new();
    let geo = geometry();

    // Detector level masking of hot channels
    let mut mask_path = ProcessingPath::new("mask_path", settings.raw_globals());
    add_rawinput(&mut mask_path, settings);
    mask_path.add_processor(geo.clone());
    add_unpackers(&mut mask_path, settings);
    add_pixel_calibration(&mut mask_path, settings);
    add_pixelmaskers(&mut mask_path);
    calpaths.push(Rc::new(mask_path));

    // Clusters are written once to LCIO and reused by every later path
    let mut clusterizer_path = ProcessingPath::new("clusterizer_path", settings.raw_globals());
    add_rawinput(&mut clusterizer_path, settings);
    clusterizer_path.add_processor(geo.clone());
    add_unpackers(&mut clusterizer_path, settings);
    add_pixel_calibration(&mut clusterizer_path, settings);
    add_clusterizers(&mut clusterizer_path, settings);
    clusterizer_path.add_processor(Processor::new(
        "LCIOOutput",
        ProcessorConfig::LcioOutput(LcioOutput {
            output_file: String::from(TMP_LCIO_FILE),
            write_mode: String::from("WRITE_NEW"),
        }),
    ));
    calpaths.push(Rc::new(clusterizer_path));

    // Hit based pre alignment and dqm
    let mut correlator_path = ProcessingPath::new(
        "correlator_path",
        settings.lcio_globals(MAX_RECORD_NR_SHORT),
    );
    correlator_path.add_processor(geo.clone());
    add_hitmakers(&mut correlator_path);
    correlator_path.add_processor(Processor::new(
        "RawDQM",
        ProcessorConfig::RawHitDqm(RawHitDqm {
            input_hit_collections: vec![String::from("hit_m26"), String::from("hit_tj2")],
            root_file: String::from("RawDQM.root"),
        }),
    ));
    correlator_path.add_processor(Processor::new(
        "TelCorrelator",
        ProcessorConfig::Correlator(Correlator {
            input_hit_collections: vec![String::from("hit_m26"), String::from("hit_tj2")],
            output_root_file: String::from("XCorrelator.root"),
            reference_plane: 0,
            particle: settings.particle(),
        }),
    ));
    calpaths.push(Rc::new(correlator_path));

    // Pre alignment with loose cut track sample
    let tf_loose = trackfinder_loosecut(settings);
    let mut prealigner_path = ProcessingPath::new(
        "prealigner_path",
        settings.lcio_globals(MAX_RECORD_NR_SHORT),
    );
    prealigner_path.add_processor(geo.clone());
    add_hitmakers(&mut prealigner_path);
    prealigner_path.add_processor(tf_loose.clone());
    prealigner_path.add_processor(prealigner());
    let prealigner_path = Rc::new(prealigner_path);
    calpaths.push(Rc::clone(&prealigner_path));

    // Triplet correlations on the loose cut track sample
    let mut alignert_path = ProcessingPath::new(
        "alignert_path",
        settings.lcio_globals(MAX_RECORD_NR_SHORT),
    );
    alignert_path.add_processor(geo.clone());
    add_hitmakers(&mut alignert_path);
    alignert_path.add_processor(tf_loose);
    alignert_path.add_processor(Processor::new(
        "MyTriplettCorrelator",
        ProcessorConfig::TriplettCorrelator(TriplettCorrelator {
            output_root_file: String::from("TXCorrelator.root"),
            track_collection: String::from("tracks"),
            input_hit_collections: vec![String::from("hit_m26"), String::from("hit_tj2")],
        }),
    ));
    calpaths.push(Rc::new(alignert_path));
    schedule(&mut calpaths, &prealigner_path, PREALIGNER_REPEATS);

    // Alignment with tight cut track sample
    let tf_tight = trackfinder_tightcut(settings);
    let mut aligner_path = ProcessingPath::new(
        "aligner_path",
        settings.lcio_globals(MAX_RECORD_NR_SHORT),
    );
    aligner_path.add_processor(geo.clone());
    add_hitmakers(&mut aligner_path);
    aligner_path.add_processor(tf_tight.clone());
    aligner_path.add_processor(aligner());
    schedule(&mut calpaths, &Rc::new(aligner_path), ALIGNER_REPEATS);

    // Track based dqm using the current calibration
    let mut dqm_path = ProcessingPath::new("dqm_path", settings.lcio_globals(MAX_RECORD_NR_SHORT));
    dqm_path.add_processor(geo.clone());
    add_hitmakers(&mut dqm_path);
    dqm_path.add_processor(tf_tight.clone());
    dqm_path.add_processor(Processor::new(
        "TelescopeDQM",
        ProcessorConfig::TrackFitDqm(TrackFitDqm {
            root_file: String::from("TelescopeDQM.root"),
        }),
    ));
    calpaths.push(Rc::new(dqm_path));

    if !settings.use_cluster_db {
        return calpaths;
    }

    // First iteration of the clusterDBs, from CoG hits
    let mut preclustercal_path = ProcessingPath::new(
        "preclustercal_path",
        settings.lcio_globals(MAX_RECORD_NR_LONG),
    );
    preclustercal_path.add_processor(geo.clone());
    add_hitmakers(&mut preclustercal_path);
    preclustercal_path.add_processor(tf_tight.clone());
    add_clustercalibrators(&mut preclustercal_path);
    schedule(
        &mut calpaths,
        &Rc::new(preclustercal_path),
        PRECLUSTERCAL_REPEATS,
    );

    // Alignment with hits from the current clusterDB
    let mut aligner_db_path = ProcessingPath::new(
        "aligner_db_path",
        settings.lcio_globals(MAX_RECORD_NR_SHORT),
    );
    aligner_db_path.add_processor(geo.clone());
    add_hitmakers_db(&mut aligner_db_path);
    aligner_db_path.add_processor(tf_tight.clone());
    aligner_db_path.add_processor(aligner());
    let aligner_db_path = Rc::new(aligner_db_path);
    schedule(&mut calpaths, &aligner_db_path, ALIGNER_DB_REPEATS);

    // Refinement of the clusterDBs from cluster shape hits
    let mut clustercal_path = ProcessingPath::new(
        "clustercal_path",
        settings.lcio_globals(MAX_RECORD_NR_LONG),
    );
    clustercal_path.add_processor(geo.clone());
    add_hitmakers_db(&mut clustercal_path);
    clustercal_path.add_processor(tf_tight.clone());
    add_clustercalibrators(&mut clustercal_path);
    schedule(&mut calpaths, &Rc::new(clustercal_path), CLUSTERCAL_REPEATS);

    schedule(&mut calpaths, &aligner_db_path, FINAL_ALIGNER_DB_REPEATS);

    // Dqm with the final cluster calibration
    let mut dqm_db_path = ProcessingPath::new(
        "dqm_db_path",
        settings.lcio_globals(MAX_RECORD_NR_SHORT),
    );
    dqm_db_path.add_processor(geo);
    add_hitmakers_db(&mut dqm_db_path);
    dqm_db_path.add_processor(tf_tight);
    dqm_db_path.add_processor(Processor::new(
        "TelescopeDQM_DB",
        ProcessorConfig::TrackFitDqm(TrackFitDqm {
            root_file: String::from("TelescopeDQM_DB.root"),
        }),
    ));
    calpaths.push(Rc::new(dqm_db_path));

    calpaths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::path::Path;

    fn settings(cog: bool) -> PipelineSettings {
        let config = Config {
            run_number: 826,
            cog,
            ..Default::default()
        };
        PipelineSettings::new(&config, Path::new("/data/run826.txt")).unwrap()
    }

    fn names(paths: &[Rc<ProcessingPath>]) -> Vec<&str> {
        paths.iter().map(|p| p.name.as_str()).collect()
    }

    const BASE_SEQUENCE: [&str; 11] = [
        "mask_path",
        "clusterizer_path",
        "correlator_path",
        "prealigner_path",
        "alignert_path",
        "prealigner_path",
        "prealigner_path",
        "aligner_path",
        "aligner_path",
        "aligner_path",
        "dqm_path",
    ];

    #[test]
    fn test_cog_sequence() {
        let paths = create_calibration_paths(&settings(true));
        assert_eq!(names(&paths), BASE_SEQUENCE.to_vec());
    }

    #[test]
    fn test_cluster_db_sequence() {
        let paths = create_calibration_paths(&settings(false));
        let names = names(&paths);
        assert_eq!(&names[..BASE_SEQUENCE.len()], &BASE_SEQUENCE[..]);

        let extra = &names[BASE_SEQUENCE.len()..];
        let mut expected = vec!["preclustercal_path"];
        expected.extend(["aligner_db_path"; 2]);
        expected.extend(["clustercal_path"; 6]);
        expected.extend(["aligner_db_path"; 2]);
        expected.push("dqm_db_path");
        assert_eq!(extra.len(), 1 + 2 + 6 + 2 + 1);
        assert_eq!(extra, &expected[..]);
    }

    #[test]
    fn test_distinct_paths_appear_once() {
        let paths = create_calibration_paths(&settings(false));
        for name in [
            "mask_path",
            "clusterizer_path",
            "correlator_path",
            "alignert_path",
            "dqm_path",
            "dqm_db_path",
        ] {
            assert_eq!(paths.iter().filter(|p| p.name == name).count(), 1);
        }
        // Repeats share a single path object
        let prealigners: Vec<&Rc<ProcessingPath>> =
            paths.iter().filter(|p| p.name == "prealigner_path").collect();
        assert_eq!(prealigners.len(), 3);
        assert!(prealigners.iter().all(|p| Rc::ptr_eq(p, prealigners[0])));
    }

    #[test]
    fn test_path_contents() {
        let paths = create_calibration_paths(&settings(false));
        assert_eq!(
            paths[0].processor_names(),
            vec![
                "CorryInputProcessor",
                "Geo",
                "TelUnpacker",
                "TJ2Unpacker",
                "M26HotPixelKiller",
                "TJ2HotPixelKiller"
            ]
        );
        assert_eq!(
            paths[1].processors().last().unwrap().name,
            String::from("LCIOOutput")
        );
        assert_eq!(paths[0].globals.max_record_number, MAX_RECORD_NR_LONG);
        assert_eq!(paths[0].globals.verbosity.as_deref(), Some("MESSAGE1"));
        assert_eq!(paths[2].globals.max_record_number, MAX_RECORD_NR_SHORT);
        assert_eq!(paths[2].globals.lcio_input_files, vec![String::from("tmp.slcio")]);

        let clustercal = paths.iter().find(|p| p.name == "clustercal_path").unwrap();
        assert!(clustercal.contains("M26GoeHitMaker"));
        assert!(clustercal.contains("TJ2ClusterCalibrator"));
        assert_eq!(clustercal.globals.max_record_number, MAX_RECORD_NR_LONG);
        let precal = paths.iter().find(|p| p.name == "preclustercal_path").unwrap();
        assert!(precal.contains("M26CogHitMaker"));
    }

    #[test]
    fn test_pixel_calibration_precedes_masking() {
        let config = Config {
            run_number: 826,
            pixel_cal: true,
            ..Default::default()
        };
        let settings = PipelineSettings::new(&config, Path::new("/data/run826.txt")).unwrap();
        let paths = create_calibration_paths(&settings);
        assert_eq!(
            paths[0].processor_names(),
            vec![
                "CorryInputProcessor",
                "Geo",
                "TelUnpacker",
                "TJ2Unpacker",
                "PixelChargeCalibrator",
                "M26HotPixelKiller",
                "TJ2HotPixelKiller"
            ]
        );
        assert!(paths[1].contains("PixelChargeCalibrator"));
        assert!(!paths[2].contains("PixelChargeCalibrator"));
    }
}
