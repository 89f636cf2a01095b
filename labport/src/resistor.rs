//! Descriptor lookup for resistor-coded sensors.
//!
//! Older sensors have no onboard descriptor memory; the device reports
//! an id in 1..=19 derived from an identification resistor, and the host
//! supplies the descriptor from a bundled table. One tab-delimited row
//! per id: product code, pretty name, long name, short name, operation
//! type, typical rate, equation id, highest page, active page, then
//! three (k0, k1, k2, units) calibration pages.

use once_cell::sync::Lazy;
use tracing::error;

use crate::transport::{CalPage, SensorRecord};

const TABLE_SRC: &str = include_str!("../data/resistor_sensors.txt");

/// Ids at or above this value identify auto-ID sensors with their own
/// descriptor memory; below it (and above zero) the bundled table applies.
pub const AUTO_ID_THRESHOLD: i32 = 20;

const COLUMNS: usize = 21;

static TABLE: Lazy<Vec<SensorRecord>> = Lazy::new(|| {
    TABLE_SRC
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_row(line) {
            Ok(record) => Some(record),
            Err(e) => {
                error!("bad row in bundled sensor table: {e}");
                None
            }
        })
        .collect()
});

fn parse_row(line: &str) -> Result<SensorRecord, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != COLUMNS {
        return Err(format!("expected {COLUMNS} fields, found {}", fields.len()));
    }

    let int = |i: usize| -> Result<u8, String> {
        fields[i]
            .trim()
            .parse::<u8>()
            .map_err(|e| format!("field {i}: {e}"))
    };
    let num = |i: usize| -> Result<f64, String> {
        fields[i]
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("field {i}: {e}"))
    };

    let mut pages: [CalPage; 3] = Default::default();
    for (page_index, page) in pages.iter_mut().enumerate() {
        let base = 9 + 4 * page_index;
        *page = CalPage {
            k0: num(base)?,
            k1: num(base + 1)?,
            k2: num(base + 2)?,
            units: fields[base + 3].trim().to_owned(),
        };
    }

    Ok(SensorRecord {
        long_name: fields[2].to_owned(),
        short_name: fields[3].to_owned(),
        operation_type: int(4)?,
        calibration_equation: int(6)?,
        highest_cal_page: int(7)?,
        active_cal_page: int(8)?,
        pages,
    })
}

/// Look up the bundled descriptor for a resistor-coded sensor id.
/// Returns `None` for zero (nothing plugged in), auto-ID ids, and ids
/// with no table row.
pub fn record_for_id(sensor_id: i32) -> Option<SensorRecord> {
    if sensor_id <= 0 || sensor_id >= AUTO_ID_THRESHOLD {
        return None;
    }
    TABLE.get(sensor_id as usize - 1).cloned()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::calibration::Calibration;
    use labport_shared::VoltageProbe;

    #[test]
    fn test_table_covers_all_resistor_ids() {
        for id in 1..AUTO_ID_THRESHOLD {
            assert!(record_for_id(id).is_some(), "no row for sensor id {id}");
        }
    }

    #[test]
    fn test_out_of_range_ids() {
        assert!(record_for_id(0).is_none());
        assert!(record_for_id(-1).is_none());
        assert!(record_for_id(AUTO_ID_THRESHOLD).is_none());
    }

    #[test]
    fn test_stainless_temperature_row() {
        let rec = record_for_id(10).unwrap();
        assert_eq!(rec.long_name, "Temperature");
        assert_eq!(rec.calibration_equation, 12);
        assert_eq!(rec.highest_cal_page, 2);
        assert_eq!(rec.pages[0].units, "(C)");
        assert_eq!(rec.pages[2].units, "(K)");
        // Coefficients must bind as a valid thermistor calibration
        Calibration::from_record(&rec).unwrap();
    }

    #[test]
    fn test_ten_volt_sensor_selects_wide_probe() {
        let rec = record_for_id(2).unwrap();
        assert_eq!(rec.operation_type, SensorRecord::OP_TYPE_10V);
        assert_eq!(rec.voltage_probe(), VoltageProbe::Probe10V);
    }

    #[test]
    fn test_every_row_binds_a_calibration() {
        for id in 1..AUTO_ID_THRESHOLD {
            let rec = record_for_id(id).unwrap();
            Calibration::from_record(&rec).unwrap();
        }
    }
}
