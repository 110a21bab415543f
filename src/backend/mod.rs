mod fake;
mod kobo;

use anyhow::Error;

pub use self::fake::FakeBackend;
pub use self::kobo::{KoboBackend, VISIBLE_PHOTODIODE};

/// A raw datum obtained from a firmware query.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Value {
    Integer(i64),
    Package(Vec<Value>),
    String(String),
}

impl Value {
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::Integer(n) => i32::try_from(n).ok(),
            _ => None,
        }
    }

    /// Packages a point list the way firmware calibration tables are shaped.
    pub fn table(points: &[(i32, i32)]) -> Value {
        Value::Package(points.iter()
                             .map(|&(illuminance, adjustment)| {
                                 Value::Package(vec![Value::Integer(illuminance as i64),
                                                     Value::Integer(adjustment as i64)])
                             })
                             .collect())
    }
}

/// Supplier of raw ambient light data, one per physical sensor.
///
/// Only the illuminance query is mandatory. The other queries mirror
/// optional firmware capabilities: a backend that doesn't know how to
/// answer returns `None`, and the sensor carries on without the datum.
pub trait Backend {
    /// Current ambient light illuminance, in device specific units.
    ///
    /// `0` means total darkness and `-1` that the sensor is saturated;
    /// both are valid readings.
    fn illuminance(&mut self) -> Result<i32, Error>;

    /// Raw illuminance to display adjustment mappings.
    ///
    /// `None` if the sensor carries no calibration data at all, as
    /// opposed to `Some(Err(..))` when it does but the query failed.
    fn calibration(&mut self) -> Option<Result<Value, Error>> {
        None
    }

    /// Color temperature of the ambient light, in kelvins.
    fn color_temperature(&mut self) -> Option<i32> {
        None
    }

    /// Coordinates of the ambient light's chromaticity.
    fn chromaticity(&mut self) -> Option<i32> {
        None
    }

    /// Recommended polling interval, in milliseconds.
    fn polling_interval(&mut self) -> Option<i32> {
        None
    }
}

impl Backend for i32 {
    fn illuminance(&mut self) -> Result<i32, Error> {
        Ok(*self)
    }
}
