use std::io::{Read, Seek, SeekFrom};
use std::fs::File;
use std::path::{Path, PathBuf};
use anyhow::{Context, Error};
use serde_json::Value as JsonValue;
use crate::settings::Settings;
use super::{Backend, Value};

// The Aura ONE uses a Silicon Labs light sensor,
// the model code is si114x (where x is 5, 6, or 7).
pub const VISIBLE_PHOTODIODE: &str = "/sys/devices/virtual/input/input3/als_vis_data";

/// Backend reading the visible photodiode of a Kobo's light sensor.
///
/// The sensor chip carries no calibration data of its own: the curve
/// comes from an optional sidecar file holding a JSON point list.
pub struct KoboBackend {
    photodiode: File,
    calibration_path: Option<PathBuf>,
    polling_interval: Option<i32>,
}

impl KoboBackend {
    pub fn new() -> Result<KoboBackend, Error> {
        KoboBackend::from_settings(&Settings::default())
    }

    pub fn from_settings(settings: &Settings) -> Result<KoboBackend, Error> {
        let photodiode = File::open(&settings.illuminance_path)
                              .with_context(|| format!("can't open light sensor attribute {}",
                                                       settings.illuminance_path.display()))?;
        Ok(KoboBackend {
            photodiode,
            calibration_path: settings.calibration_path.clone(),
            polling_interval: settings.polling_interval,
        })
    }
}

impl Backend for KoboBackend {
    fn illuminance(&mut self) -> Result<i32, Error> {
        let mut buf = String::new();
        self.photodiode.seek(SeekFrom::Start(0))?;
        self.photodiode.read_to_string(&mut buf)?;
        let value = buf.trim_end().parse()?;
        Ok(value)
    }

    fn calibration(&mut self) -> Option<Result<Value, Error>> {
        let path = self.calibration_path.as_ref()?;
        Some(load_calibration(path))
    }

    fn polling_interval(&mut self) -> Option<i32> {
        self.polling_interval
    }
}

fn load_calibration(path: &Path) -> Result<Value, Error> {
    let file = File::open(path)
                    .with_context(|| format!("can't open calibration file {}", path.display()))?;
    let data = serde_json::from_reader(file)
                          .with_context(|| format!("can't parse calibration data from {}",
                                                   path.display()))?;
    Ok(decode(&data))
}

// Arrays become packages and anything that isn't an integer is carried
// as text, to be dropped during table ingestion.
fn decode(data: &JsonValue) -> Value {
    match data {
        JsonValue::Array(elements) => Value::Package(elements.iter().map(decode).collect()),
        JsonValue::Number(number) => match number.as_i64() {
            Some(n) => Value::Integer(n),
            None => Value::String(number.to_string()),
        },
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationTable;

    #[test]
    fn test_decode() {
        let data: JsonValue = serde_json::from_str(r#"[[10, 0], [100, 50], ["bad", 70], [1000, 100]]"#).unwrap();
        let table = CalibrationTable::from_raw(&decode(&data)).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.adjustment(50).unwrap(), 22);
    }

    #[test]
    fn test_decode_invalid_shape() {
        let data: JsonValue = serde_json::from_str("{\"mappings\": []}").unwrap();
        assert!(CalibrationTable::from_raw(&decode(&data)).is_err());
    }
}
