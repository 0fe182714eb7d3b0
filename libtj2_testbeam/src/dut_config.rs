use std::fmt::Display;
use std::str::FromStr;

use super::error::ConfigError;

/// TJ2 pixel pitch in mm, identical in u and v
pub const TJ2_PITCH: f64 = 0.03304;
/// Number of TJ2 pixel columns (and rows)
pub const TJ2_CELLS: u32 = 512;

/// Unit in which the DUT charge is calibrated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CalibrationUnit {
    #[default]
    ToT,
    Electrons,
}

impl FromStr for CalibrationUnit {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "ToT" {
            Ok(Self::ToT)
        } else if s == "electrons" {
            Ok(Self::Electrons)
        } else {
            Err(ConfigError::BadCalibrationUnit(s.to_string()))
        }
    }
}

impl Display for CalibrationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToT => write!(f, "ToT"),
            Self::Electrons => write!(f, "electrons"),
        }
    }
}

/// A histogram axis given as (nbins, min, max)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub nbins: i64,
    pub min: f64,
    pub max: f64,
}

impl Axis {
    pub const fn new(nbins: i64, min: f64, max: f64) -> Self {
        Self { nbins, min, max }
    }
}

/// Fixed DUT geometry and histogram ranges used by the plotting helpers
#[derive(Debug, Clone, PartialEq)]
pub struct DutConfig {
    pub pitch_u: f64,
    pub pitch_v: f64,
    pub residual_u_axis: Axis,
    pub residual_v_axis: Axis,
    pub charge_unit: &'static str,
    pub seed_charge_axis: Axis,
    pub clus_charge_axis: Axis,
    pub ucell_axis: Axis,
    pub vcell_axis: Axis,
    pub sensor_u_axis: Axis,
    pub sensor_v_axis: Axis,
}

impl DutConfig {
    /// The TJ2 configuration for a calibration unit. Only the charge axes and label depend
    /// on the unit.
    pub fn for_unit(unit: CalibrationUnit) -> Self {
        let half_width = 0.5 * TJ2_CELLS as f64 * TJ2_PITCH;
        let cells = TJ2_CELLS as i64;
        let (charge_unit, seed_charge_axis, clus_charge_axis) = match unit {
            CalibrationUnit::ToT => (
                "ToT / LSB",
                Axis::new(128, 0.0, 128.0),
                Axis::new(256, 0.0, 256.0),
            ),
            CalibrationUnit::Electrons => (
                "electrons",
                Axis::new(20, 0.0, 2000.0),
                Axis::new(20, 0.0, 2000.0),
            ),
        };
        Self {
            pitch_u: TJ2_PITCH,
            pitch_v: TJ2_PITCH,
            residual_u_axis: Axis::new(151, -0.1, 0.1),
            residual_v_axis: Axis::new(151, -0.1, 0.1),
            charge_unit,
            seed_charge_axis,
            clus_charge_axis,
            ucell_axis: Axis::new(cells, 0.0, cells as f64),
            vcell_axis: Axis::new(cells, 0.0, cells as f64),
            sensor_u_axis: Axis::new(cells, -half_width, half_width),
            sensor_v_axis: Axis::new(cells, -half_width, half_width),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_electrons_only_change_charge() {
        let tot = DutConfig::for_unit(CalibrationUnit::ToT);
        let el = DutConfig::for_unit(CalibrationUnit::Electrons);

        assert_eq!(tot.charge_unit, "ToT / LSB");
        assert_eq!(el.charge_unit, "electrons");
        assert_eq!(tot.seed_charge_axis, Axis::new(128, 0.0, 128.0));
        assert_eq!(el.seed_charge_axis, Axis::new(20, 0.0, 2000.0));
        assert_ne!(tot.clus_charge_axis, el.clus_charge_axis);

        let geometric = |c: &DutConfig| {
            (
                c.pitch_u,
                c.pitch_v,
                c.residual_u_axis,
                c.residual_v_axis,
                c.ucell_axis,
                c.vcell_axis,
                c.sensor_u_axis,
                c.sensor_v_axis,
            )
        };
        assert_eq!(geometric(&tot), geometric(&el));
        assert!((tot.sensor_u_axis.max - 8.45824).abs() < 1e-9);
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("ToT".parse::<CalibrationUnit>().unwrap(), CalibrationUnit::ToT);
        assert_eq!(
            "electrons".parse::<CalibrationUnit>().unwrap(),
            CalibrationUnit::Electrons
        );
        assert!(matches!(
            "tot".parse::<CalibrationUnit>(),
            Err(ConfigError::BadCalibrationUnit(_))
        ));
    }
}
