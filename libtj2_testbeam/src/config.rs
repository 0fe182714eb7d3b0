use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// Structure representing the pipeline runner configuration. Contains pathing and run information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub steerfiles: PathBuf,
    pub gearfile: String,
    pub datapath: PathBuf,
    pub run_number: u32,
    pub caltag: String,
    pub prefix: String,
    pub table: Option<PathBuf>,
    pub pixel_cal: bool,
    pub gain_db: Option<PathBuf>,
    pub clip: bool,
    pub cliptag: String,
    pub cog: bool,
    pub marlin: PathBuf,
    pub output_path: PathBuf,
}

impl Default for Config {
    /// Generate a new Config object with the standard DESY testbeam layout
    fn default() -> Self {
        Self {
            steerfiles: PathBuf::from("steering-files/desy-tb/"),
            gearfile: String::from("geoid1.xml"),
            datapath: PathBuf::from("/home/bgnet/beam_data/text_files/"),
            run_number: 0,
            caltag: String::from(""),
            prefix: String::from(""),
            table: None,
            pixel_cal: false,
            gain_db: None,
            clip: false,
            cliptag: String::from(""),
            cog: false,
            marlin: PathBuf::from("Marlin"),
            output_path: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Path to the raw text data of the run
    pub fn raw_file_path(&self) -> PathBuf {
        self.datapath.join(format!("run{}.txt", self.run_number))
    }

    /// Cluster shape hit reconstruction is used unless CoG was requested
    pub fn use_cluster_db(&self) -> bool {
        !self.cog
    }

    /// A calibration is produced only when no existing tag was given
    pub fn needs_calibration(&self) -> bool {
        self.caltag.is_empty()
    }

    /// The calibration tag for a raw file: the given tag, or the raw file stem plus prefix
    pub fn calibration_tag(&self, raw_file: &Path) -> String {
        if self.needs_calibration() {
            format!("{}{}", file_stem(raw_file), self.prefix)
        } else {
            self.caltag.clone()
        }
    }

    /// Engine name of the calibration job
    pub fn calibration_name(&self, raw_file: &Path, caltag: &str) -> String {
        format!("{}-{}-cal", file_stem(raw_file), caltag)
    }

    /// Engine name of the reconstruction job
    pub fn reconstruction_name(&self, raw_file: &Path) -> String {
        format!("{}-{}-reco", file_stem(raw_file), self.prefix)
    }

    /// Zero suppression threshold for the TJ2 clusterizer when clipping is enabled
    pub fn clip_threshold(&self) -> Result<Option<i64>, ConfigError> {
        if !self.clip {
            return Ok(None);
        }
        match self.cliptag.trim().parse::<i64>() {
            Ok(threshold) => Ok(Some(threshold)),
            Err(_) => Err(ConfigError::BadClipTag(self.cliptag.clone())),
        }
    }

    /// Gain calibration database used by the pixel charge calibrator
    pub fn gain_db_path(&self) -> PathBuf {
        match &self.gain_db {
            Some(path) => path.clone(),
            None => self.steerfiles.join("Identity_file.root"),
        }
    }

    pub fn is_run_number_valid(&self) -> bool {
        self.run_number > 0
    }
}

/// File name without directory or extension
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for_run(run_number: u32) -> Config {
        Config {
            datapath: PathBuf::from("/data/text_files/"),
            run_number,
            ..Default::default()
        }
    }

    #[test]
    fn test_names_without_caltag() {
        let mut config = config_for_run(826);
        config.prefix = String::from("_clustdb");
        let raw = config.raw_file_path();
        assert_eq!(raw, PathBuf::from("/data/text_files/run826.txt"));
        assert!(config.needs_calibration());
        let caltag = config.calibration_tag(&raw);
        assert_eq!(caltag, "run826_clustdb");
        assert_eq!(
            config.calibration_name(&raw, &caltag),
            "run826-run826_clustdb-cal"
        );
        assert_eq!(config.reconstruction_name(&raw), "run826-_clustdb-reco");
    }

    #[test]
    fn test_existing_caltag_is_reused() {
        let mut config = config_for_run(830);
        config.caltag = String::from("run826");
        let raw = config.raw_file_path();
        assert!(!config.needs_calibration());
        assert_eq!(config.calibration_tag(&raw), "run826");
        assert_eq!(config.reconstruction_name(&raw), "run830--reco");
    }

    #[test]
    fn test_clip_threshold() {
        let mut config = config_for_run(1);
        assert_eq!(config.clip_threshold().unwrap(), None);
        config.clip = true;
        config.cliptag = String::from("12");
        assert_eq!(config.clip_threshold().unwrap(), Some(12));
        config.cliptag = String::from("high");
        assert!(matches!(
            config.clip_threshold(),
            Err(ConfigError::BadClipTag(_))
        ));
    }

    #[test]
    fn test_yaml_template_reads_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reco.yml");
        let config = config_for_run(42);
        config.write_config_file(&path).unwrap();
        let loaded = Config::read_config_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(matches!(
            Config::read_config_file(&dir.path().join("missing.yml")),
            Err(ConfigError::BadFilePath(_))
        ));
    }
}
