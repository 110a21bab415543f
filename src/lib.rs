pub mod backend;
pub mod calibration;
pub mod errors;
pub mod registry;
pub mod settings;

pub use crate::backend::{Backend, FakeBackend, KoboBackend, Value};
pub use crate::calibration::{CalibrationPoint, CalibrationTable};
pub use crate::errors::AlsError;
pub use crate::registry::{EventSink, NotifyEvent, SensorHandle, SensorRegistry,
                          SensorStatus, SensorUpdate};
pub use crate::registry::{ILLUMINANCE_INVALID, ILLUMINANCE_SATURATED, MAX_SENSORS};
pub use crate::settings::Settings;
