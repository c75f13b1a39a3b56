//! Dispatch engine.
//!
//! [`Ob1Driver`] is what the host talks to: it resolves a parameter key and
//! a logical channel into a device-session call, runs that call under the
//! device lock, and republishes the outcome through the [`ValueCache`].
//!
//! Hardware failures never escape as panics. Each one is traced, published
//! to observers as an [`UpdateStatus::Alarm`] update and returned as an
//! [`Ob1Error`].
//!
//! Construction and teardown live in [`crate::lifecycle`].

use std::fmt::Write as _;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::channel::{ChannelResolver, PhysicalChannel, MAX_CHANNELS};
use crate::error::{Ob1Error, Result};
use crate::observable::{ParamUpdate, UpdateStatus, ValueCache};
use crate::parameter::{Ob1Param, ParamInfo, ParamKey, ParamValue, ParameterRegistry, ValueKind};
use crate::sdk::{Ob1Sdk, SdkStatus, SensorConfig, SensorType, OB1_REGULATORS};
use crate::session::DeviceSession;

/// Driver for one OB1 port.
pub struct Ob1Driver<S: Ob1Sdk> {
    pub(crate) port: String,
    pub(crate) session: Mutex<DeviceSession<S>>,
    pub(crate) registry: ParameterRegistry,
    pub(crate) resolver: ChannelResolver,
    pub(crate) cache: ValueCache,
    /// Options used when the host writes a sensor type, by physical channel.
    pub(crate) sensor_templates: [SensorConfig; MAX_CHANNELS],
    pub(crate) lock_timeout: Option<Duration>,
    pub(crate) startup_error: Option<Ob1Error>,
    pub(crate) shut_down: AtomicBool,
}

impl<S: Ob1Sdk> Ob1Driver<S> {
    /// Acquire the device lock, bounded by the configured timeout.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, DeviceSession<S>>> {
        match self.lock_timeout {
            Some(timeout) => self
                .session
                .try_lock_for(timeout)
                .ok_or(Ob1Error::LockTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            None => Ok(self.session.lock()),
        }
    }

    fn target(&self, key: ParamKey, channel: usize) -> Result<(ParamInfo, PhysicalChannel)> {
        let info = *self.registry.lookup(key)?;
        let physical = self.resolver.resolve(channel)?;
        Ok((info, physical))
    }

    /// Write a value to a parameter on a logical channel.
    ///
    /// Set-pressure and sensor-type writes reach the hardware; the attempted
    /// value is cached and published whether or not the call succeeded.
    /// Rejected writes (wrong kind, read-only) leave the value in place and
    /// republish it flagged as an alarm.
    pub fn write(&self, key: ParamKey, channel: usize, value: ParamValue) -> Result<()> {
        let (info, physical) = self.target(key, channel)?;
        let rejected = if value.kind() != info.kind {
            Some(Ob1Error::WrongValueKind {
                param: info.name,
                expected: info.kind,
            })
        } else if !info.param.is_writable() {
            Some(Ob1Error::ReadOnlyParameter { param: info.name })
        } else {
            None
        };
        if let Some(err) = rejected {
            self.cache.mark_alarm(info.param, channel);
            warn!(port = %self.port, channel, param = info.name, %value, status = "alarm", error = %err, "write rejected");
            return Err(err);
        }

        let result = match (info.param, value) {
            (Ob1Param::SetPressure, ParamValue::Float64(mbar)) => self.apply_pressure(physical, mbar),
            (Ob1Param::SensorType, ParamValue::Int32(code)) => self.apply_sensor(physical, code),
            _ => Err(Ob1Error::ReadOnlyParameter { param: info.name }),
        };

        match &result {
            Ok(()) => {
                self.cache.publish(info.param, channel, value, UpdateStatus::Ok);
                debug!(port = %self.port, channel, param = info.name, %value, status = "ok", "write");
            }
            Err(err) => {
                self.cache
                    .publish(info.param, channel, value, UpdateStatus::Alarm);
                warn!(port = %self.port, channel, param = info.name, %value, status = "alarm", error = %err, "write failed");
            }
        }
        result
    }

    fn apply_pressure(&self, physical: PhysicalChannel, mbar: f64) -> Result<()> {
        let mut session = self.lock()?;
        session.require_calibration()?;
        session.set_pressure(physical, mbar)
    }

    fn apply_sensor(&self, physical: PhysicalChannel, code: i32) -> Result<()> {
        let sensor_type = SensorType::from_code(code).ok_or(Ob1Error::SensorNotRecognized {
            channel: physical,
            sensor_type: code,
            status: SdkStatus::INVALID_ARGUMENT.code(),
        })?;
        let sensor = self.sensor_templates[physical.index()].with_type(sensor_type);
        self.lock()?.attach_sensor(physical, &sensor)
    }

    /// Read a parameter on a logical channel.
    ///
    /// Read-pressure and read-flow acquire from the hardware; the other
    /// parameters answer from the cache.
    pub fn read(&self, key: ParamKey, channel: usize) -> Result<ParamValue> {
        let (info, physical) = self.target(key, channel)?;

        let acquired = match info.param {
            Ob1Param::ReadPressure => self.lock().and_then(|mut session| {
                session.require_calibration()?;
                session.get_pressure(physical)
            }),
            Ob1Param::ReadFlow => self
                .lock()
                .and_then(|mut session| session.get_sensor_reading(physical)),
            Ob1Param::SetPressure | Ob1Param::SensorType => {
                let update = self.cache.republish(info.param, channel).ok_or(
                    Ob1Error::ChannelOutOfRange {
                        channel,
                        configured: self.resolver.configured(),
                    },
                )?;
                debug!(port = %self.port, channel, param = info.name, value = %update.value, "read cached");
                return Ok(update.value);
            }
        };

        match acquired {
            Ok(reading) => {
                let value = ParamValue::Float64(reading);
                self.cache.publish(info.param, channel, value, UpdateStatus::Ok);
                debug!(port = %self.port, channel, param = info.name, %value, status = "ok", "read");
                Ok(value)
            }
            Err(err) => {
                self.cache.mark_alarm(info.param, channel);
                warn!(port = %self.port, channel, param = info.name, status = "alarm", error = %err, "read failed");
                Err(err)
            }
        }
    }

    /// Write a float parameter.
    pub fn write_float64(&self, key: ParamKey, channel: usize, value: f64) -> Result<()> {
        self.write(key, channel, ParamValue::Float64(value))
    }

    /// Write an integer parameter.
    pub fn write_int32(&self, key: ParamKey, channel: usize, value: i32) -> Result<()> {
        self.write(key, channel, ParamValue::Int32(value))
    }

    /// Read a float parameter.
    pub fn read_float64(&self, key: ParamKey, channel: usize) -> Result<f64> {
        self.expect_kind(key, ValueKind::Float64)?;
        let value = self.read(key, channel)?;
        value.as_f64().ok_or_else(|| self.kind_error(key))
    }

    /// Read an integer parameter.
    pub fn read_int32(&self, key: ParamKey, channel: usize) -> Result<i32> {
        self.expect_kind(key, ValueKind::Int32)?;
        let value = self.read(key, channel)?;
        value.as_i32().ok_or_else(|| self.kind_error(key))
    }

    fn expect_kind(&self, key: ParamKey, kind: ValueKind) -> Result<()> {
        let info = self.registry.lookup(key)?;
        if info.kind == kind {
            Ok(())
        } else {
            Err(Ob1Error::WrongValueKind {
                param: info.name,
                expected: info.kind,
            })
        }
    }

    fn kind_error(&self, key: ParamKey) -> Ob1Error {
        match self.registry.lookup(key) {
            Ok(info) => Ob1Error::WrongValueKind {
                param: info.name,
                expected: info.kind,
            },
            Err(err) => err,
        }
    }

    /// Key bound to a host parameter name.
    pub fn key_for(&self, name: &str) -> Result<ParamKey> {
        self.registry.key_for(name)
    }

    /// Parameter registry of this driver.
    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    /// Subscribe to updates of a parameter on a logical channel.
    pub fn subscribe(&self, key: ParamKey, channel: usize) -> Result<watch::Receiver<ParamUpdate>> {
        let info = self.registry.lookup(key)?;
        self.resolver.resolve(channel)?;
        self.cache
            .subscribe(info.param, channel)
            .ok_or(Ob1Error::ChannelOutOfRange {
                channel,
                configured: self.resolver.configured(),
            })
    }

    /// Last published update, without touching the hardware.
    pub fn cached(&self, key: ParamKey, channel: usize) -> Result<ParamUpdate> {
        let info = self.registry.lookup(key)?;
        self.resolver.resolve(channel)?;
        self.cache
            .get(info.param, channel)
            .ok_or(Ob1Error::ChannelOutOfRange {
                channel,
                configured: self.resolver.configured(),
            })
    }

    /// Settable range of a parameter on a logical channel, in mbar.
    ///
    /// Only set-pressure has one: the regulator range of the channel.
    /// Writes are not clamped to it.
    pub fn bounds(&self, key: ParamKey, channel: usize) -> Result<(f64, f64)> {
        let (info, physical) = self.target(key, channel)?;
        match info.param {
            Ob1Param::SetPressure => OB1_REGULATORS[physical.index()]
                .range_mbar()
                .ok_or(Ob1Error::NoBounds { param: info.name }),
            Ob1Param::ReadPressure | Ob1Param::ReadFlow | Ob1Param::SensorType => {
                Err(Ob1Error::NoBounds { param: info.name })
            }
        }
    }

    /// Host port name.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Number of logical channels in use.
    pub fn channel_count(&self) -> usize {
        self.resolver.configured()
    }

    /// Whether the instrument handle is live. A lock timeout reads as not
    /// connected.
    pub fn is_connected(&self) -> bool {
        self.lock().map(|session| session.is_open()).unwrap_or(false)
    }

    /// Human-readable status. `details > 0` adds one line per channel.
    pub fn report(&self, details: u32) -> String {
        let mut out = String::new();
        match self.lock() {
            Ok(session) => {
                let state = if session.is_open() {
                    "connected"
                } else if session.is_closed() {
                    "closed"
                } else {
                    "not connected"
                };
                let _ = writeln!(
                    out,
                    "OB1 port '{}' device {}: {}, calibration {}",
                    self.port,
                    session.device(),
                    state,
                    session.calibration().describe()
                );
            }
            Err(err) => {
                let _ = writeln!(out, "OB1 port '{}': {}", self.port, err);
            }
        }
        if let Some(err) = &self.startup_error {
            let _ = writeln!(out, "  startup error: {}", err);
        }
        if details == 0 {
            return out;
        }

        for channel in self.resolver.logical_channels() {
            let value = |param| {
                self.cache
                    .get(param, channel)
                    .map(|u| format!("{}{}", u.value, if u.is_alarm() { " (alarm)" } else { "" }))
                    .unwrap_or_default()
            };
            let range = self
                .resolver
                .resolve(channel)
                .ok()
                .and_then(|p| OB1_REGULATORS[p.index()].range_mbar())
                .map(|(lo, hi)| format!("{}..{} mbar", lo, hi))
                .unwrap_or_else(|| "no regulator".to_string());
            let _ = writeln!(
                out,
                "  channel {}: set {} mbar, read {} mbar, flow {}, sensor {} [{}]",
                channel,
                value(Ob1Param::SetPressure),
                value(Ob1Param::ReadPressure),
                value(Ob1Param::ReadFlow),
                value(Ob1Param::SensorType),
                range
            );
        }
        out
    }
}

impl<S: Ob1Sdk> std::fmt::Debug for Ob1Driver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ob1Driver")
            .field("port", &self.port)
            .field("channels", &self.resolver.configured())
            .field("startup_error", &self.startup_error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortConfig;
    use crate::sdk::MockSdk;

    #[test]
    fn test_lock_timeout_bounds_the_wait() {
        let probe = MockSdk::new();
        let config = PortConfig::new("dev").with_lock_timeout(Duration::from_millis(20));
        let driver = Ob1Driver::start(probe.clone(), &config).unwrap();
        let key = driver.key_for("EF_SET_PRESSURE").unwrap();
        probe.clear_calls();

        {
            let _held = driver.session.lock();
            let err = driver.write_float64(key, 0, 10.0).unwrap_err();
            assert_eq!(err, Ob1Error::LockTimeout { timeout_ms: 20 });
            assert!(driver.cached(key, 0).unwrap().is_alarm());
            assert!(driver.report(0).contains("Timed out"));
            assert!(!driver.is_connected());
        }
        assert!(driver.is_connected());
        assert!(probe.calls().is_empty());
        driver.write_float64(key, 0, 10.0).unwrap();
    }

    #[test]
    fn test_debug_output() {
        let driver = Ob1Driver::start(MockSdk::new(), &PortConfig::new("dev")).unwrap();
        let debug = format!("{:?}", driver);
        assert!(debug.contains("Ob1Driver"));
        assert!(debug.contains("OB1"));
    }
}
