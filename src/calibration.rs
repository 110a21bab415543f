use crate::backend::Value;
use crate::errors::AlsError;
use crate::registry::ILLUMINANCE_SATURATED;

/// One point of the illuminance to display adjustment curve.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CalibrationPoint {
    pub illuminance: i32,
    pub adjustment: i32,
}

/// Calibration curve of a sensor, ordered by ascending illuminance.
///
/// Tables are never edited in place: a refreshed curve is built from
/// scratch and swapped in wholesale.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint>,
}

impl CalibrationTable {
    pub fn empty() -> CalibrationTable {
        CalibrationTable { points: Vec::new() }
    }

    /// Decodes a raw firmware package into a calibration table.
    ///
    /// Each element must be a two-element package of integers within
    /// `i32` range, giving one *(illuminance, adjustment)* point.
    /// Malformed elements are skipped, so a partially damaged package
    /// still yields the points that survive; a table with zero points is
    /// valid. Only a top level that isn't a package at all is an error.
    pub fn from_raw(raw: &Value) -> Result<CalibrationTable, AlsError> {
        let elements = match raw {
            Value::Package(elements) => elements,
            _ => return Err(AlsError::InvalidData),
        };

        let mut points = Vec::with_capacity(elements.len());

        for element in elements {
            let pair = match element {
                Value::Package(pair) if pair.len() == 2 => pair,
                _ => continue,
            };
            if let (Some(illuminance), Some(adjustment)) = (pair[0].as_i32(), pair[1].as_i32()) {
                points.push(CalibrationPoint { illuminance, adjustment });
            }
        }

        Ok(CalibrationTable::from_points(points))
    }

    /// Builds a table from already decoded points.
    ///
    /// Points are sorted by ascending illuminance, the first of two
    /// points sharing an illuminance wins.
    pub fn from_points(mut points: Vec<CalibrationPoint>) -> CalibrationTable {
        points.sort_by_key(|p| p.illuminance);
        points.dedup_by_key(|p| p.illuminance);
        CalibrationTable { points }
    }

    /// Display adjustment for the given illuminance, by clamped piecewise
    /// linear interpolation between the two nearest calibration points.
    ///
    /// A reading outside the calibrated range maps to the nearest
    /// boundary point instead of extrapolating, and the saturation
    /// reading `-1` maps to the brightest one. The division truncates.
    pub fn adjustment(&self, illuminance: i32) -> Result<i32, AlsError> {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(AlsError::NoMapping),
        };

        let illuminance = if illuminance == ILLUMINANCE_SATURATED || illuminance > last.illuminance {
            last.illuminance
        } else if illuminance < first.illuminance {
            first.illuminance
        } else {
            illuminance
        };

        for (i, point) in self.points.iter().enumerate() {
            if illuminance == point.illuminance {
                return Ok(point.adjustment);
            }

            if illuminance > point.illuminance {
                continue;
            }

            let low = match i.checked_sub(1) {
                Some(j) => self.points[j],
                None => return Err(AlsError::NoMapping),
            };

            let (lux_low, adj_low) = (low.illuminance as i64, low.adjustment as i64);
            let (lux_high, adj_high) = (point.illuminance as i64, point.adjustment as i64);
            let adjustment = (adj_high - adj_low) * (illuminance as i64 - lux_low)
                             / (lux_high - lux_low) + adj_low;
            return Ok(adjustment as i32);
        }

        Err(AlsError::NoMapping)
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
