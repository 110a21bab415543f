use std::fs;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use anyhow::{Context, Error};
use crate::backend::VISIBLE_PHOTODIODE;

pub const SETTINGS_PATH: &str = "Settings.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    pub illuminance_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_path: Option<PathBuf>,
    // Overrides the backend's recommended polling interval, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<i32>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            illuminance_path: PathBuf::from(VISIBLE_PHOTODIODE),
            calibration_path: None,
            polling_interval: None,
        }
    }
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings, Error> {
        let text = fs::read_to_string(path.as_ref())
                      .with_context(|| format!("can't read settings from {}",
                                               path.as_ref().display()))?;
        toml::from_str(&text)
             .with_context(|| format!("can't parse settings from {}", path.as_ref().display()))
             .map_err(Into::into)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let text = toml::to_string(self)
                        .context("can't serialize settings")?;
        fs::write(path.as_ref(), text)
           .with_context(|| format!("can't write settings to {}", path.as_ref().display()))
           .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.illuminance_path, PathBuf::from(VISIBLE_PHOTODIODE));
        assert_eq!(settings.calibration_path, None);
        assert_eq!(settings.polling_interval, None);
    }

    #[test]
    fn test_kebab_case_keys() {
        let settings: Settings = toml::from_str(
            "illuminance-path = '/sys/bus/acpi/devices/ACPI0008:00/ali'\n\
             calibration-path = 'calibration.json'\n\
             polling-interval = 500\n").unwrap();
        assert_eq!(settings.illuminance_path,
                   PathBuf::from("/sys/bus/acpi/devices/ACPI0008:00/ali"));
        assert_eq!(settings.calibration_path, Some(PathBuf::from("calibration.json")));
        assert_eq!(settings.polling_interval, Some(500));
    }
}
