//! Conversion of sensor voltages to physical units.
//!
//! Each analog sensor carries a calibration equation id and up to three
//! coefficient pages in its descriptor record. The equation id is bound
//! to a closed [`CalEquation`] when the channel is configured, so an
//! unrecognized id fails configuration instead of surfacing mid-run.

use tracing::warn;

use crate::transport::SensorRecord;

/// Thermistor divider: fixed 15k reference against a 5V rail.
const THERMISTOR_REFERENCE_OHMS: f64 = 15_000.0;
const THERMISTOR_RAIL_VOLTS: f64 = 5.0;

/// Calibration equation families stored on sensors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalEquation {
    /// k0 + k1 * v
    Linear = 1,
    /// k0 + k1 * v + k2 * v^2
    Quadratic = 2,
    /// k0 * v^k1
    Power = 3,
    /// k0 * k1^v
    ModifiedPower = 4,
    /// k0 + k1 * ln(v)
    Logarithmic = 5,
    /// Steinhart-Hart thermistor model
    SteinhartHart = 12,
}

impl TryFrom<u8> for CalEquation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Linear),
            2 => Ok(Self::Quadratic),
            3 => Ok(Self::Power),
            4 => Ok(Self::ModifiedPower),
            5 => Ok(Self::Logarithmic),
            12 => Ok(Self::SteinhartHart),
            other => Err(format!("unrecognized calibration equation id {other}")),
        }
    }
}

/// A bound calibration: equation family plus the coefficients and units
/// of the sensor's active page.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    pub equation: CalEquation,
    pub k0: f64,
    pub k1: f64,
    pub k2: f64,
    pub units: String,
    /// Active page index, which selects the output scale for the
    /// thermistor equation.
    pub page: u8,
}

impl Calibration {
    /// Bind the active page of a sensor descriptor. Fails if the record
    /// carries an equation id this driver does not implement.
    pub fn from_record(record: &SensorRecord) -> Result<Self, String> {
        let equation = CalEquation::try_from(record.calibration_equation)?;
        let page = record.active_page();
        Ok(Self {
            equation,
            k0: page.k0,
            k1: page.k1,
            k2: page.k2,
            units: page.units.clone(),
            page: record.active_cal_page,
        })
    }

    /// Convert one measured voltage to the sensor's physical units.
    pub fn apply(&self, v: f64) -> f64 {
        match self.equation {
            CalEquation::Linear => self.k0 + self.k1 * v,
            CalEquation::Quadratic => self.k0 + self.k1 * v + self.k2 * v * v,
            CalEquation::Power => self.k0 * v.powf(self.k1),
            CalEquation::ModifiedPower => self.k0 * self.k1.powf(v),
            CalEquation::Logarithmic => self.k0 + self.k1 * v.ln(),
            CalEquation::SteinhartHart => self.steinhart_hart(v),
        }
    }

    /// Steinhart-Hart thermistor conversion. The sensed voltage comes off
    /// a divider against a 15k reference, so zero volts has no finite
    /// resistance solution.
    fn steinhart_hart(&self, v: f64) -> f64 {
        if v == 0.0 {
            warn!("thermistor reads zero volts, no resistance solution");
            return f64::NAN;
        }
        let resistance = THERMISTOR_REFERENCE_OHMS / (THERMISTOR_RAIL_VOLTS / v - 1.0);
        let ln_r = resistance.ln();
        let kelvin = 1.0 / (self.k0 + self.k1 * ln_r + self.k2 * ln_r * ln_r * ln_r);
        let celsius = kelvin - 273.15;
        match self.page {
            0 => celsius,
            1 => celsius * 1.8 + 32.0,
            // Kelvin page offsets from Celsius by a whole 273
            _ => celsius + 273.0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::CalPage;

    fn record(equation: u8, k0: f64, k1: f64, k2: f64) -> SensorRecord {
        SensorRecord {
            calibration_equation: equation,
            pages: [
                CalPage {
                    k0,
                    k1,
                    k2,
                    units: "(u)".to_owned(),
                },
                CalPage::default(),
                CalPage::default(),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_linear() {
        let cal = Calibration::from_record(&record(1, 1.5, 2.0, 0.0)).unwrap();
        assert_eq!(cal.apply(2.0), 5.5);
        assert_eq!(cal.units, "(u)");
    }

    #[test]
    fn test_quadratic() {
        let cal = Calibration::from_record(&record(2, 1.0, 0.0, 2.0)).unwrap();
        assert_eq!(cal.apply(3.0), 19.0);
    }

    #[test]
    fn test_power_families() {
        let power = Calibration::from_record(&record(3, 2.0, 2.0, 0.0)).unwrap();
        assert!((power.apply(3.0) - 18.0).abs() < 1e-12);

        let modified = Calibration::from_record(&record(4, 2.0, 3.0, 0.0)).unwrap();
        assert!((modified.apply(2.0) - 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_logarithmic() {
        let cal = Calibration::from_record(&record(5, 1.0, 2.0, 0.0)).unwrap();
        assert!((cal.apply(1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_steinhart_hart_zero_volts_is_nan() {
        let cal = Calibration::from_record(&record(12, 1e-3, 2e-4, 9e-8)).unwrap();
        assert!(cal.apply(0.0).is_nan());
    }

    #[test]
    fn test_steinhart_hart_pages_agree() {
        // Same voltage through the three output pages: F and K are fixed
        // transforms of the C result
        let mut rec = record(12, 1.02119e-3, 2.22468e-4, 1.33342e-7);
        rec.pages[1] = rec.pages[0].clone();
        rec.pages[2] = rec.pages[0].clone();
        rec.highest_cal_page = 2;

        rec.active_cal_page = 0;
        let celsius = Calibration::from_record(&rec).unwrap().apply(2.5);

        rec.active_cal_page = 1;
        let fahrenheit = Calibration::from_record(&rec).unwrap().apply(2.5);
        assert!((fahrenheit - (celsius * 1.8 + 32.0)).abs() < 1e-9);

        rec.active_cal_page = 2;
        let kelvin = Calibration::from_record(&rec).unwrap().apply(2.5);
        assert!((kelvin - (celsius + 273.0)).abs() < 1e-9);

        // Mid-scale thermistor voltage lands at a plausible temperature
        assert!(celsius > 0.0 && celsius < 50.0);
    }

    #[test]
    fn test_unknown_equation_rejected() {
        let err = Calibration::from_record(&record(7, 0.0, 1.0, 0.0));
        assert!(err.is_err());
    }
}
