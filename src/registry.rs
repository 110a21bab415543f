use std::sync::{Arc, Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::Sender;
use anyhow::{anyhow, Error};
use fxhash::FxHashMap;
use crate::backend::Backend;
use crate::calibration::CalibrationTable;
use crate::errors::AlsError;

/// Maximum number of concurrently registered sensors.
pub const MAX_SENSORS: usize = 10;

/// Reading of a sensor driven beyond its range, maps to the brightest
/// calibration point.
pub const ILLUMINANCE_SATURATED: i32 = -1;
/// Cached after a failed read, so that stale queries fail instead of
/// serving the last valid reading.
pub const ILLUMINANCE_INVALID: i32 = -2;

const NOTIFY_ILLUMINANCE: u32 = 0x80;
const NOTIFY_COLOR_TEMPERATURE: u32 = 0x81;
const NOTIFY_CALIBRATION: u32 = 0x82;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NotifyEvent {
    Illuminance,
    ColorTemperature,
    Calibration,
    Unknown(u32),
}

impl NotifyEvent {
    pub fn from_raw(event: u32) -> NotifyEvent {
        match event {
            NOTIFY_ILLUMINANCE => NotifyEvent::Illuminance,
            NOTIFY_COLOR_TEMPERATURE => NotifyEvent::ColorTemperature,
            NOTIFY_CALIBRATION => NotifyEvent::Calibration,
            _ => NotifyEvent::Unknown(event),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SensorHandle(u32);

/// Record broadcast to the registered sinks after each handled event.
///
/// The illuminance is the cached value, possibly stale or invalid.
#[derive(Debug, Clone)]
pub struct SensorUpdate {
    pub handle: SensorHandle,
    pub name: String,
    pub event: NotifyEvent,
    pub illuminance: i32,
}

/// Fire and forget observer of sensor events. Delivery failures are
/// reported and dropped, never surfaced to the notifier.
pub trait EventSink {
    fn deliver(&self, update: SensorUpdate) -> Result<(), Error>;
}

impl EventSink for Sender<SensorUpdate> {
    fn deliver(&self, update: SensorUpdate) -> Result<(), Error> {
        self.send(update).map_err(|e| anyhow!("disconnected channel: {}", e))
    }
}

/// Cached snapshot of a sensor's state.
#[derive(Debug, Clone)]
pub struct SensorStatus {
    pub name: String,
    pub illuminance: i32,
    pub color_temperature: Option<i32>,
    pub chromaticity: Option<i32>,
    pub polling_interval: Option<i32>,
    pub calibration_points: usize,
}

struct Sensor {
    name: String,
    backend: Box<dyn Backend + Send>,
    illuminance: i32,
    color_temperature: Option<i32>,
    chromaticity: Option<i32>,
    polling_interval: Option<i32>,
    calibration: Arc<CalibrationTable>,
}

impl Sensor {
    fn read_illuminance(&mut self) -> Result<i32, AlsError> {
        match self.backend.illuminance() {
            Ok(value) => {
                self.illuminance = value;
                Ok(value)
            },
            Err(e) => {
                self.illuminance = ILLUMINANCE_INVALID;
                Err(AlsError::Backend(e))
            },
        }
    }

    fn refresh_calibration(&mut self) -> Result<(), AlsError> {
        let raw = match self.backend.calibration() {
            Some(result) => result.map_err(AlsError::Backend)?,
            None => return Ok(()),
        };
        let table = CalibrationTable::from_raw(&raw)?;
        self.calibration = Arc::new(table);
        Ok(())
    }

    fn refresh_color(&mut self) {
        self.color_temperature = self.backend.color_temperature();
        self.chromaticity = self.backend.chromaticity();
    }
}

/// Owns every registered sensor, keyed by handle.
///
/// Registrations serialize on the map's write lock while per-sensor
/// operations share its read lock, so sensors never contend with each
/// other. Within one sensor, queries and refreshes serialize on the
/// sensor's own lock and the calibration table is swapped wholesale
/// under it: a reader interpolates against either the old curve or the
/// new one, never a mixture.
pub struct SensorRegistry {
    sensors: RwLock<FxHashMap<u32, Arc<Mutex<Sensor>>>>,
    next_id: AtomicU32,
    sinks: Mutex<Vec<Box<dyn EventSink + Send>>>,
}

impl SensorRegistry {
    pub fn new() -> SensorRegistry {
        SensorRegistry {
            sensors: RwLock::new(FxHashMap::default()),
            next_id: AtomicU32::new(0),
            sinks: Mutex::new(Vec::new()),
        }
    }

    pub fn add_sink(&self, sink: Box<dyn EventSink + Send>) {
        self.sinks.lock().unwrap().push(sink);
    }

    /// Registers a sensor backed by the given supplier.
    ///
    /// The initial illuminance read must succeed, and so must the
    /// initial calibration fetch when the backend offers one: otherwise
    /// the registration fails and leaves no trace. Color temperature,
    /// chromaticity and polling interval are probed non-fatally.
    pub fn register(&self, backend: Box<dyn Backend + Send>, name: &str) -> Result<SensorHandle, AlsError> {
        if name.is_empty() {
            return Err(AlsError::InvalidArgument("empty sensor name"));
        }

        let mut sensors = self.sensors.write().unwrap();

        if sensors.len() >= MAX_SENSORS {
            return Err(AlsError::OutOfCapacity);
        }

        let mut sensor = Sensor {
            name: name.to_string(),
            backend,
            illuminance: ILLUMINANCE_INVALID,
            color_temperature: None,
            chromaticity: None,
            polling_interval: None,
            calibration: Arc::new(CalibrationTable::empty()),
        };

        sensor.read_illuminance()?;
        sensor.refresh_calibration()?;
        sensor.refresh_color();
        sensor.polling_interval = sensor.backend.polling_interval();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        sensors.insert(id, Arc::new(Mutex::new(sensor)));
        Ok(SensorHandle(id))
    }

    /// Removes a sensor along with its calibration table.
    ///
    /// Unknown handles are ignored, so unregistering twice is harmless.
    pub fn unregister(&self, handle: SensorHandle) {
        self.sensors.write().unwrap().remove(&handle.0);
    }

    fn sensor(&self, handle: SensorHandle) -> Result<Arc<Mutex<Sensor>>, AlsError> {
        self.sensors.read().unwrap()
            .get(&handle.0)
            .cloned()
            .ok_or(AlsError::NotFound)
    }

    /// Fresh illuminance reading.
    ///
    /// A failed read caches [`ILLUMINANCE_INVALID`] and degrades the
    /// sensor to stale; it never unregisters it.
    pub fn read_illuminance(&self, handle: SensorHandle) -> Result<i32, AlsError> {
        let sensor = self.sensor(handle)?;
        let mut sensor = sensor.lock().unwrap();
        sensor.read_illuminance()
    }

    /// Last cached illuminance, without touching the backend.
    pub fn cached_illuminance(&self, handle: SensorHandle) -> Result<i32, AlsError> {
        let sensor = self.sensor(handle)?;
        let sensor = sensor.lock().unwrap();
        if sensor.illuminance < 0 && sensor.illuminance != ILLUMINANCE_SATURATED {
            return Err(AlsError::InvalidReading);
        }
        Ok(sensor.illuminance)
    }

    /// Display adjustment calibrated for a fresh illuminance reading.
    pub fn read_adjustment(&self, handle: SensorHandle) -> Result<i32, AlsError> {
        let sensor = self.sensor(handle)?;
        let (illuminance, calibration) = {
            let mut sensor = sensor.lock().unwrap();
            let illuminance = sensor.read_illuminance()?;
            (illuminance, Arc::clone(&sensor.calibration))
        };

        if illuminance < 0 && illuminance != ILLUMINANCE_SATURATED {
            return Err(AlsError::InvalidReading);
        }

        calibration.adjustment(illuminance)
    }

    /// Re-fetches the calibration mappings and swaps the table in.
    ///
    /// On failure the previous table stays in place. A backend without
    /// calibration support is a no-op.
    pub fn refresh_calibration(&self, handle: SensorHandle) -> Result<(), AlsError> {
        let sensor = self.sensor(handle)?;
        let mut sensor = sensor.lock().unwrap();
        sensor.refresh_calibration()
    }

    /// Absorbs an asynchronous event from the backend's notifier.
    ///
    /// Events for one sensor are handled in arrival order. Unknown
    /// events are reported and ignored. Refresh failures degrade the
    /// affected datum but are not surfaced: whatever the outcome, the
    /// sinks then receive an update carrying the cached illuminance.
    pub fn notify(&self, handle: SensorHandle, event: NotifyEvent) -> Result<(), AlsError> {
        let sensor = self.sensor(handle)?;
        let update = {
            let mut sensor = sensor.lock().unwrap();
            match event {
                NotifyEvent::Illuminance => {
                    if let Err(e) = sensor.read_illuminance() {
                        eprintln!("Can't read illuminance of {}: {:#}.", sensor.name, e);
                    }
                },
                NotifyEvent::ColorTemperature => sensor.refresh_color(),
                NotifyEvent::Calibration => {
                    if let Err(e) = sensor.refresh_calibration() {
                        eprintln!("Can't refresh calibration of {}: {:#}.", sensor.name, e);
                    }
                },
                NotifyEvent::Unknown(code) => {
                    eprintln!("Unsupported event {:#x} for {}.", code, sensor.name);
                },
            }
            SensorUpdate {
                handle,
                name: sensor.name.clone(),
                event,
                illuminance: sensor.illuminance,
            }
        };
        self.emit(update);
        Ok(())
    }

    pub fn status(&self, handle: SensorHandle) -> Result<SensorStatus, AlsError> {
        let sensor = self.sensor(handle)?;
        let sensor = sensor.lock().unwrap();
        Ok(SensorStatus {
            name: sensor.name.clone(),
            illuminance: sensor.illuminance,
            color_temperature: sensor.color_temperature,
            chromaticity: sensor.chromaticity,
            polling_interval: sensor.polling_interval,
            calibration_points: sensor.calibration.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.sensors.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn emit(&self, update: SensorUpdate) {
        for sink in self.sinks.lock().unwrap().iter() {
            if let Err(e) = sink.deliver(update.clone()) {
                eprintln!("Can't deliver update for {}: {:#}.", update.name, e);
            }
        }
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        SensorRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use super::*;
    use crate::backend::{FakeBackend, Value};

    const CURVE: [(i32, i32); 3] = [(10, 0), (100, 50), (1000, 100)];

    #[test]
    fn test_register_and_query() {
        let registry = SensorRegistry::new();
        let fake = FakeBackend::new(200).with_calibration(&CURVE)
                                        .with_color(2700, 31271)
                                        .with_polling_interval(500);
        let handle = registry.register(Box::new(fake), "acpi_als0").unwrap();

        assert_eq!(registry.read_illuminance(handle).unwrap(), 200);
        assert_eq!(registry.cached_illuminance(handle).unwrap(), 200);
        // (100 - 50) * (200 - 100) / (1000 - 100) + 50
        assert_eq!(registry.read_adjustment(handle).unwrap(), 55);

        let status = registry.status(handle).unwrap();
        assert_eq!(status.name, "acpi_als0");
        assert_eq!(status.color_temperature, Some(2700));
        assert_eq!(status.chromaticity, Some(31271));
        assert_eq!(status.polling_interval, Some(500));
        assert_eq!(status.calibration_points, 3);
    }

    #[test]
    fn test_saturated_reading() {
        let registry = SensorRegistry::new();
        let fake = FakeBackend::new(-1).with_calibration(&CURVE);
        let handle = registry.register(Box::new(fake), "acpi_als0").unwrap();
        assert_eq!(registry.read_adjustment(handle).unwrap(), 100);
        assert_eq!(registry.cached_illuminance(handle).unwrap(), -1);
    }

    #[test]
    fn test_failed_read_degrades() {
        let registry = SensorRegistry::new();
        let mut fake = FakeBackend::new(200).with_calibration(&CURVE);
        fake.queue_reading(200);
        fake.queue_reading(200);
        fake.queue_failure();
        let handle = registry.register(Box::new(fake), "acpi_als0").unwrap();

        assert_eq!(registry.read_illuminance(handle).unwrap(), 200);
        assert!(matches!(registry.read_adjustment(handle), Err(AlsError::Backend(..))));

        // The sensor is stale, not gone.
        assert!(matches!(registry.cached_illuminance(handle), Err(AlsError::InvalidReading)));
        assert_eq!(registry.status(handle).unwrap().illuminance, ILLUMINANCE_INVALID);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.read_illuminance(handle).unwrap(), 200);
        assert_eq!(registry.cached_illuminance(handle).unwrap(), 200);
    }

    #[test]
    fn test_capacity() {
        let registry = SensorRegistry::new();
        let handles = (0..MAX_SENSORS).map(|i| {
            registry.register(Box::new(120), &format!("acpi_als{}", i)).unwrap()
        }).collect::<Vec<_>>();

        assert!(matches!(registry.register(Box::new(120), "one_too_many"),
                         Err(AlsError::OutOfCapacity)));
        assert_eq!(registry.len(), MAX_SENSORS);
        for handle in handles {
            assert_eq!(registry.read_illuminance(handle).unwrap(), 120);
        }
    }

    #[test]
    fn test_unregister() {
        let registry = SensorRegistry::new();
        let handle = registry.register(Box::new(42), "acpi_als0").unwrap();
        assert!(!registry.is_empty());
        registry.unregister(handle);
        registry.unregister(handle);
        assert!(registry.is_empty());
        assert!(matches!(registry.read_illuminance(handle), Err(AlsError::NotFound)));
        assert!(matches!(registry.status(handle), Err(AlsError::NotFound)));
    }

    #[test]
    fn test_invalid_name() {
        let registry = SensorRegistry::new();
        assert!(matches!(registry.register(Box::new(42), ""),
                         Err(AlsError::InvalidArgument(..))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_backend_without_calibration() {
        let registry = SensorRegistry::new();
        let handle = registry.register(Box::new(42), "acpi_als0").unwrap();
        assert_eq!(registry.read_illuminance(handle).unwrap(), 42);
        assert!(matches!(registry.read_adjustment(handle), Err(AlsError::NoMapping)));
        assert!(registry.refresh_calibration(handle).is_ok());
        assert_eq!(registry.status(handle).unwrap().calibration_points, 0);
    }

    #[test]
    fn test_registration_rollback() {
        let registry = SensorRegistry::new();
        let mut fake = FakeBackend::new(100);
        fake.queue_failure();
        assert!(matches!(registry.register(Box::new(fake), "acpi_als0"),
                         Err(AlsError::Backend(..))));
        assert!(registry.is_empty());

        let fake = FakeBackend::new(100).with_broken_calibration();
        assert!(matches!(registry.register(Box::new(fake), "acpi_als0"),
                         Err(AlsError::Backend(..))));
        assert!(registry.is_empty());

        let fake = FakeBackend::new(100).with_raw_calibration(Value::Integer(3));
        assert!(matches!(registry.register(Box::new(fake), "acpi_als0"),
                         Err(AlsError::InvalidData)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_notify_calibration() {
        let registry = SensorRegistry::new();
        let fake = FakeBackend::new(50).with_calibration(&[(0, 0), (100, 100)])
                                       .with_calibration(&[(0, 100), (100, 200)]);
        let handle = registry.register(Box::new(fake), "acpi_als0").unwrap();

        assert_eq!(registry.read_adjustment(handle).unwrap(), 50);
        registry.notify(handle, NotifyEvent::Calibration).unwrap();
        assert_eq!(registry.read_adjustment(handle).unwrap(), 150);
    }

    #[test]
    fn test_notify_events_and_sinks() {
        let registry = SensorRegistry::new();
        let (tx, rx) = mpsc::channel();
        registry.add_sink(Box::new(tx));

        let mut fake = FakeBackend::new(200).with_calibration(&CURVE)
                                            .with_color(2700, 31271);
        fake.queue_reading(200);
        fake.queue_reading(300);
        fake.queue_failure();
        let handle = registry.register(Box::new(fake), "acpi_als0").unwrap();

        registry.notify(handle, NotifyEvent::Illuminance).unwrap();
        let update = rx.try_recv().unwrap();
        assert_eq!(update.event, NotifyEvent::Illuminance);
        assert_eq!(update.illuminance, 300);

        // A failed refresh still emits, with the invalid sentinel.
        registry.notify(handle, NotifyEvent::Illuminance).unwrap();
        let update = rx.try_recv().unwrap();
        assert_eq!(update.illuminance, ILLUMINANCE_INVALID);

        registry.notify(handle, NotifyEvent::ColorTemperature).unwrap();
        let update = rx.try_recv().unwrap();
        assert_eq!(update.event, NotifyEvent::ColorTemperature);
        assert_eq!(registry.status(handle).unwrap().color_temperature, Some(2700));

        // Unknown events are ignored but still observable.
        registry.notify(handle, NotifyEvent::from_raw(0x83)).unwrap();
        let update = rx.try_recv().unwrap();
        assert_eq!(update.event, NotifyEvent::Unknown(0x83));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_atomic_table_swap() {
        let registry = SensorRegistry::new();
        let fake = FakeBackend::new(50).with_calibration(&[(0, 0), (100, 100)])
                                       .with_calibration(&[(0, 100), (100, 200)]);
        let handle = registry.register(Box::new(fake), "acpi_als0").unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..500 {
                    registry.notify(handle, NotifyEvent::Calibration).unwrap();
                }
            });
            for _ in 0..500 {
                let adjustment = registry.read_adjustment(handle).unwrap();
                assert!(adjustment == 50 || adjustment == 150);
            }
        });
    }
}
