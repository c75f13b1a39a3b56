//! Startup and shutdown of an [`Ob1Driver`].
//!
//! Startup opens the instrument, loads the default calibration, registers
//! the parameters, attaches configured sensors and seeds the cache from the
//! pressures the controller currently holds, so a restarted driver does not
//! command a jump.
//!
//! Shutdown zeroes every channel and then releases the handle. It runs at
//! most once, either explicitly or when the driver is dropped.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::channel::{ChannelResolver, MAX_CHANNELS};
use crate::config::PortConfig;
use crate::driver::Ob1Driver;
use crate::error::{Ob1Error, Result};
use crate::observable::{UpdateStatus, ValueCache};
use crate::parameter::{Ob1Param, ParamValue, ParameterRegistry};
use crate::sdk::{Ob1Sdk, SensorConfig};
use crate::session::DeviceSession;

impl<S: Ob1Sdk> Ob1Driver<S> {
    /// Bring up a driver for one port.
    ///
    /// Only an invalid configuration is an error here. Device failures are
    /// kept in [`startup_error`](Self::startup_error) and the driver stays
    /// usable as far as the failure allows: without a handle every
    /// operation reports [`Ob1Error::DeviceNotFound`].
    pub fn start(sdk: S, config: &PortConfig) -> Result<Self> {
        config.validate()?;
        let resolver = ChannelResolver::new(config.channels)?;

        let mut sensor_templates = [SensorConfig::default(); MAX_CHANNELS];
        let mut sensors = Vec::with_capacity(config.sensors.len());
        for assignment in &config.sensors {
            let physical = resolver.resolve(assignment.channel)?;
            let sensor = assignment.sensor_config()?;
            sensor_templates[physical.index()] = sensor;
            sensors.push((assignment.channel, sensor));
        }

        let mut driver = Self {
            port: config.name.clone(),
            session: Mutex::new(DeviceSession::new(sdk, config.device.clone())),
            registry: ParameterRegistry::with_all(),
            resolver,
            cache: ValueCache::new(config.channels),
            sensor_templates,
            lock_timeout: config.lock_timeout(),
            startup_error: None,
            shut_down: AtomicBool::new(false),
        };

        driver.startup_error = driver.bring_up(&sensors).err();
        match &driver.startup_error {
            None => info!(port = %driver.port, device = %config.device, channels = config.channels, "OB1 driver started"),
            Some(err) => warn!(port = %driver.port, device = %config.device, error = %err, "OB1 driver started degraded"),
        }
        Ok(driver)
    }

    /// Open, calibrate, attach sensors, then read back current pressures.
    ///
    /// Returns the first failure; steps that do not depend on the failed
    /// one still run.
    fn bring_up(&self, sensors: &[(usize, SensorConfig)]) -> Result<()> {
        let mut session = self.session.lock();
        session.open()?;
        let mut first_error = session.load_calibration().err();

        for &(channel, sensor) in sensors {
            let physical = self.resolver.resolve(channel)?;
            let code = ParamValue::Int32(i32::from(sensor.sensor_type.code()));
            match session.attach_sensor(physical, &sensor) {
                Ok(()) => self
                    .cache
                    .publish(Ob1Param::SensorType, channel, code, UpdateStatus::Ok),
                Err(err) => {
                    warn!(port = %self.port, channel, error = %err, "startup sensor attach failed");
                    self.cache
                        .publish(Ob1Param::SensorType, channel, code, UpdateStatus::Alarm);
                    first_error.get_or_insert(err);
                }
            }
        }

        if session.calibration().is_loaded() {
            for channel in self.resolver.logical_channels() {
                let physical = self.resolver.resolve(channel)?;
                match session.get_pressure(physical) {
                    Ok(mbar) => {
                        let value = ParamValue::Float64(mbar);
                        self.cache
                            .publish(Ob1Param::SetPressure, channel, value, UpdateStatus::Ok);
                        self.cache
                            .publish(Ob1Param::ReadPressure, channel, value, UpdateStatus::Ok);
                        info!(port = %self.port, channel, mbar, "bumpless restore");
                    }
                    Err(err) => {
                        warn!(port = %self.port, channel, error = %err, "bumpless read-back failed");
                        self.cache.mark_alarm(Ob1Param::SetPressure, channel);
                        self.cache.mark_alarm(Ob1Param::ReadPressure, channel);
                        first_error.get_or_insert(err);
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Failure recorded while starting, if any.
    pub fn startup_error(&self) -> Option<&Ob1Error> {
        self.startup_error.as_ref()
    }

    /// Zero all channels, then release the instrument.
    ///
    /// The handle is released even when depressurization fails; that
    /// failure is returned as [`Ob1Error::ShutdownFailed`]. Later calls are
    /// no-ops; a call racing the first one returns once the handle is gone.
    pub fn shutdown(&self) -> Result<()> {
        let mut session = self.session.lock();
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if !session.is_open() {
            session.close()?;
            info!(port = %self.port, "OB1 driver shut down (no device)");
            return Ok(());
        }

        let depressurized = session.set_all_pressures(0.0);
        let closed = session.close();

        match &depressurized {
            Ok(()) => {
                for channel in self.resolver.logical_channels() {
                    self.cache.publish(
                        Ob1Param::SetPressure,
                        channel,
                        ParamValue::Float64(0.0),
                        UpdateStatus::Ok,
                    );
                }
            }
            Err(err) => {
                error!(port = %self.port, error = %err, "depressurization at shutdown failed");
            }
        }
        if let Err(err) = &closed {
            error!(port = %self.port, error = %err, "releasing OB1 handle failed");
        }

        match (depressurized, closed) {
            (Err(err), _) => Err(Ob1Error::ShutdownFailed {
                reason: err.to_string(),
            }),
            (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => {
                info!(port = %self.port, "OB1 driver shut down");
                Ok(())
            }
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl<S: Ob1Sdk> Drop for Ob1Driver<S> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(port = %self.port, error = %err, "shutdown on drop reported an error");
        }
    }
}
