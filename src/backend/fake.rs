use std::collections::VecDeque;
use anyhow::{anyhow, Error};
use super::{Backend, Value};

/// Scriptable backend, used by hosts without a light sensor and by the
/// test suite.
pub struct FakeBackend {
    readings: VecDeque<Option<i32>>,
    fallback: i32,
    calibrations: Vec<Value>,
    next_calibration: usize,
    fail_calibration: bool,
    color_temperature: Option<i32>,
    chromaticity: Option<i32>,
    polling_interval: Option<i32>,
}

impl FakeBackend {
    pub fn new(illuminance: i32) -> FakeBackend {
        FakeBackend {
            readings: VecDeque::new(),
            fallback: illuminance,
            calibrations: Vec::new(),
            next_calibration: 0,
            fail_calibration: false,
            color_temperature: None,
            chromaticity: None,
            polling_interval: None,
        }
    }

    /// Adds a calibration table, served round robin on each fetch.
    pub fn with_calibration(mut self, points: &[(i32, i32)]) -> FakeBackend {
        self.calibrations.push(Value::table(points));
        self
    }

    pub fn with_raw_calibration(mut self, raw: Value) -> FakeBackend {
        self.calibrations.push(raw);
        self
    }

    /// Makes every calibration fetch fail.
    pub fn with_broken_calibration(mut self) -> FakeBackend {
        self.fail_calibration = true;
        self
    }

    pub fn with_color(mut self, temperature: i32, chromaticity: i32) -> FakeBackend {
        self.color_temperature = Some(temperature);
        self.chromaticity = Some(chromaticity);
        self
    }

    pub fn with_polling_interval(mut self, interval: i32) -> FakeBackend {
        self.polling_interval = Some(interval);
        self
    }

    /// Queues a reading served before the standing value.
    pub fn queue_reading(&mut self, illuminance: i32) {
        self.readings.push_back(Some(illuminance));
    }

    /// Queues a failed read.
    pub fn queue_failure(&mut self) {
        self.readings.push_back(None);
    }
}

impl Backend for FakeBackend {
    fn illuminance(&mut self) -> Result<i32, Error> {
        match self.readings.pop_front() {
            Some(Some(value)) => {
                self.fallback = value;
                Ok(value)
            },
            Some(None) => Err(anyhow!("sensor unreachable")),
            None => Ok(self.fallback),
        }
    }

    fn calibration(&mut self) -> Option<Result<Value, Error>> {
        if self.fail_calibration {
            return Some(Err(anyhow!("can't read calibration mappings")));
        }
        if self.calibrations.is_empty() {
            return None;
        }
        let raw = self.calibrations[self.next_calibration % self.calibrations.len()].clone();
        self.next_calibration += 1;
        Some(Ok(raw))
    }

    fn color_temperature(&mut self) -> Option<i32> {
        self.color_temperature
    }

    fn chromaticity(&mut self) -> Option<i32> {
        self.chromaticity
    }

    fn polling_interval(&mut self) -> Option<i32> {
        self.polling_interval
    }
}
