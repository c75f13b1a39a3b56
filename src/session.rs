//! Device session.
//!
//! [`DeviceSession`] owns the one instrument handle, the calibration table
//! and the per-channel sensor configuration. It turns vendor status codes
//! into [`Ob1Error`]s and never issues an SDK call once the handle is gone:
//! a session whose open failed, or that has been closed, answers every
//! request with [`Ob1Error::DeviceNotFound`].
//!
//! The session is not synchronized. [`crate::driver::Ob1Driver`] keeps it
//! behind its device lock.

use tracing::{debug, info, warn};

use crate::calibration::CalibrationTable;
use crate::channel::{PhysicalChannel, MAX_CHANNELS};
use crate::error::{Ob1Error, Result};
use crate::sdk::{InstrumentHandle, Ob1Sdk, SensorConfig, OB1_REGULATORS};

/// Status reported for a session that was never opened.
const NOT_OPENED: i32 = -1;

/// Handle lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    NotOpened,
    Open(InstrumentHandle),
    /// Open failed with this status (or returned an invalid id).
    Failed(i32),
    Closed,
}

/// Exclusive owner of one OB1 instrument.
#[derive(Debug)]
pub struct DeviceSession<S> {
    sdk: S,
    device: String,
    handle: HandleState,
    calibration: CalibrationTable,
    sensors: [Option<SensorConfig>; MAX_CHANNELS],
}

impl<S: Ob1Sdk> DeviceSession<S> {
    /// Unopened session for `device` (vendor identifier such as `01C8453E`).
    pub fn new(sdk: S, device: impl Into<String>) -> Self {
        Self {
            sdk,
            device: device.into(),
            handle: HandleState::NotOpened,
            calibration: CalibrationTable::new(),
            sensors: [None; MAX_CHANNELS],
        }
    }

    /// Connect to the instrument with the OB1 regulator layout.
    ///
    /// A failed open is terminal; calling again returns the same error
    /// without retrying.
    pub fn open(&mut self) -> Result<InstrumentHandle> {
        match self.handle {
            HandleState::Open(handle) => return Ok(handle),
            HandleState::NotOpened => {}
            HandleState::Failed(_) | HandleState::Closed => return Err(self.not_found()),
        }

        match self.sdk.initialize(&self.device, OB1_REGULATORS) {
            Ok(handle) if handle.is_valid() => {
                info!(device = %self.device, id = handle.raw(), "OB1 opened");
                self.handle = HandleState::Open(handle);
                Ok(handle)
            }
            Ok(handle) => {
                warn!(device = %self.device, id = handle.raw(), "OB1 init returned invalid id");
                self.fail_open(handle.raw());
                Err(self.not_found())
            }
            Err(status) => {
                warn!(device = %self.device, status = status.code(), "OB1 init failed");
                self.fail_open(status.code());
                Err(self.not_found())
            }
        }
    }

    fn fail_open(&mut self, status: i32) {
        self.handle = HandleState::Failed(status);
        self.calibration
            .mark_unavailable(format!("device '{}' not opened", self.device));
    }

    fn not_found(&self) -> Ob1Error {
        let status = match self.handle {
            HandleState::Failed(status) => status,
            _ => NOT_OPENED,
        };
        Ob1Error::DeviceNotFound {
            device: self.device.clone(),
            status,
        }
    }

    fn handle(&self) -> Result<InstrumentHandle> {
        match self.handle {
            HandleState::Open(handle) => Ok(handle),
            _ => Err(self.not_found()),
        }
    }

    /// Load the SDK default calibration. Requires an open handle.
    pub fn load_calibration(&mut self) -> Result<()> {
        self.handle()?;
        self.calibration.load_default(&mut self.sdk)
    }

    /// Fail unless pressure conversions are possible right now.
    pub fn require_calibration(&self) -> Result<()> {
        self.handle()?;
        self.calibration.coefficients().map(|_| ())
    }

    /// Attach or replace the sensor on a channel. Type `0` detaches.
    pub fn attach_sensor(&mut self, channel: PhysicalChannel, sensor: &SensorConfig) -> Result<()> {
        let handle = self.handle()?;
        self.sdk
            .add_sensor(handle, channel, sensor)
            .map_err(|status| Ob1Error::SensorNotRecognized {
                channel,
                sensor_type: i32::from(sensor.sensor_type.code()),
                status: status.code(),
            })?;
        self.sensors[channel.index()] = (!sensor.sensor_type.is_none()).then_some(*sensor);
        debug!(%channel, sensor_type = sensor.sensor_type.code(), "sensor attached");
        Ok(())
    }

    /// Command a channel pressure in mbar.
    pub fn set_pressure(&mut self, channel: PhysicalChannel, mbar: f64) -> Result<()> {
        let handle = self.handle()?;
        let calibration = self.calibration.coefficients()?;
        self.sdk
            .set_pressure(handle, channel, mbar, calibration)
            .map_err(|status| Ob1Error::CommunicationError {
                operation: "OB1_Set_Press",
                status: status.code(),
            })
    }

    /// Acquire a channel pressure in mbar.
    pub fn get_pressure(&mut self, channel: PhysicalChannel) -> Result<f64> {
        let handle = self.handle()?;
        let calibration = self.calibration.coefficients()?;
        self.sdk
            .get_pressure(handle, channel, calibration)
            .map_err(|status| Ob1Error::CommunicationError {
                operation: "OB1_Get_Press",
                status: status.code(),
            })
    }

    /// Acquire the reading of the sensor attached to a channel.
    pub fn get_sensor_reading(&mut self, channel: PhysicalChannel) -> Result<f64> {
        let handle = self.handle()?;
        if self.sensors[channel.index()].is_none() {
            return Err(Ob1Error::SensorNotConfigured { channel });
        }
        self.sdk
            .get_sensor_data(handle, channel)
            .map_err(|status| Ob1Error::CommunicationError {
                operation: "OB1_Get_Sens_Data",
                status: status.code(),
            })
    }

    /// Command the same pressure on every physical channel.
    pub fn set_all_pressures(&mut self, mbar: f64) -> Result<()> {
        let handle = self.handle()?;
        let calibration = self.calibration.coefficients()?;
        self.sdk
            .set_all_pressures(handle, &[mbar; MAX_CHANNELS], calibration)
            .map_err(|status| Ob1Error::CommunicationError {
                operation: "OB1_Set_All_Press",
                status: status.code(),
            })
    }

    /// Release the handle. Runs the vendor destructor at most once; a
    /// session without a live handle returns `Ok` without an SDK call.
    pub fn close(&mut self) -> Result<()> {
        let handle = match self.handle {
            HandleState::Open(handle) => handle,
            HandleState::NotOpened => {
                self.handle = HandleState::Closed;
                return Ok(());
            }
            HandleState::Failed(_) | HandleState::Closed => return Ok(()),
        };
        self.handle = HandleState::Closed;
        self.sensors = [None; MAX_CHANNELS];
        let result = self.sdk.destroy(handle);
        info!(device = %self.device, "OB1 closed");
        result.map_err(|status| Ob1Error::CommunicationError {
            operation: "OB1_Destructor",
            status: status.code(),
        })
    }

    /// Whether a live handle is held.
    pub fn is_open(&self) -> bool {
        matches!(self.handle, HandleState::Open(_))
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.handle == HandleState::Closed
    }

    /// Vendor device identifier.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Sensor currently attached to a channel.
    pub fn sensor(&self, channel: PhysicalChannel) -> Option<&SensorConfig> {
        self.sensors[channel.index()].as_ref()
    }

    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    /// Backend, e.g. to inspect a [`crate::sdk::MockSdk`].
    pub fn sdk(&self) -> &S {
        &self.sdk
    }
}
