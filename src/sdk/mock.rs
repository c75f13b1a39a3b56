//! In-process OB1 simulator.
//!
//! [`MockSdk`] keeps a simulated chassis (current pressure per channel,
//! attached sensors, sensor readings), records every vendor call, and can
//! be told to fail specific operations with a given status. Clones share
//! state, so a test keeps one clone for inspection while the driver owns
//! the other.
//!
//! ```rust
//! use elveflow_ob1::sdk::{MockSdk, SdkOp};
//!
//! let sdk = MockSdk::new()
//!     .with_pressures([120.0, 0.0, 0.0, 0.0])
//!     .with_failure(SdkOp::SetAllPressures, -5);
//! let probe = sdk.clone();
//! assert!(probe.calls().is_empty());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{InstrumentHandle, Ob1Sdk, Regulator, SdkResult, SdkStatus, SensorConfig};
use crate::channel::{PhysicalChannel, MAX_CHANNELS};

/// Status returned for calls against a handle the simulator did not issue.
pub const MOCK_INVALID_HANDLE: i32 = -1;
/// Status returned when reading a channel with no sensor attached.
pub const MOCK_NO_SENSOR: i32 = -2;
/// Status returned for sensor type codes the simulator does not know.
pub const MOCK_UNKNOWN_SENSOR: i32 = -3;

/// Highest sensor type code the simulator accepts.
const MAX_KNOWN_SENSOR_CODE: u16 = 12;

/// Vendor operation, used to target fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkOp {
    Initialize,
    AddSensor,
    SetPressure,
    GetPressure,
    GetSensorData,
    SetAllPressures,
    Destroy,
    DefaultCalibration,
}

/// One recorded vendor call.
#[derive(Debug, Clone, PartialEq)]
pub enum SdkCall {
    Initialize { device: String, regulators: [u16; MAX_CHANNELS] },
    AddSensor { channel: u8, sensor_type: u16 },
    SetPressure { channel: u8, mbar: f64, calibration_len: usize },
    GetPressure { channel: u8 },
    GetSensorData { channel: u8 },
    SetAllPressures { mbar: [f64; MAX_CHANNELS] },
    Destroy { handle: i32 },
    DefaultCalibration { len: usize },
}

impl SdkCall {
    /// Operation this call belongs to.
    pub fn op(&self) -> SdkOp {
        match self {
            SdkCall::Initialize { .. } => SdkOp::Initialize,
            SdkCall::AddSensor { .. } => SdkOp::AddSensor,
            SdkCall::SetPressure { .. } => SdkOp::SetPressure,
            SdkCall::GetPressure { .. } => SdkOp::GetPressure,
            SdkCall::GetSensorData { .. } => SdkOp::GetSensorData,
            SdkCall::SetAllPressures { .. } => SdkOp::SetAllPressures,
            SdkCall::Destroy { .. } => SdkOp::Destroy,
            SdkCall::DefaultCalibration { .. } => SdkOp::DefaultCalibration,
        }
    }
}

#[derive(Debug)]
struct MockState {
    calls: Vec<SdkCall>,
    failures: HashMap<SdkOp, i32>,
    latency: Option<Duration>,
    sentinel_handle: bool,
    live_handle: Option<i32>,
    next_handle: i32,
    pressures: [f64; MAX_CHANNELS],
    sensor_readings: [f64; MAX_CHANNELS],
    sensors: [Option<SensorConfig>; MAX_CHANNELS],
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            failures: HashMap::new(),
            latency: None,
            sentinel_handle: false,
            live_handle: None,
            next_handle: 0,
            pressures: [0.0; MAX_CHANNELS],
            sensor_readings: [0.0; MAX_CHANNELS],
            sensors: [None; MAX_CHANNELS],
        }
    }
}

impl MockState {
    fn injected(&self, op: SdkOp) -> SdkResult<()> {
        match self.failures.get(&op) {
            Some(&status) => Err(SdkStatus(status)),
            None => Ok(()),
        }
    }

    fn check_handle(&self, handle: InstrumentHandle) -> SdkResult<()> {
        if self.live_handle == Some(handle.raw()) {
            Ok(())
        } else {
            Err(SdkStatus(MOCK_INVALID_HANDLE))
        }
    }
}

/// Vendor calls in flight, tracked outside the state lock.
#[derive(Debug, Default)]
struct Activity {
    active: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'a>(&'a Activity);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Simulated OB1 chassis implementing [`Ob1Sdk`].
#[derive(Debug, Clone, Default)]
pub struct MockSdk {
    state: Arc<Mutex<MockState>>,
    activity: Arc<Activity>,
}

impl MockSdk {
    /// Simulator with all channels at 0 mbar and no sensors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pressure each physical channel currently holds.
    pub fn with_pressures(self, mbar: [f64; MAX_CHANNELS]) -> Self {
        self.state.lock().pressures = mbar;
        self
    }

    /// Set what the sensor on a physical channel reports.
    pub fn with_sensor_reading(self, channel: PhysicalChannel, value: f64) -> Self {
        self.set_sensor_reading(channel, value);
        self
    }

    /// Make every call of `op` fail with `status`.
    pub fn with_failure(self, op: SdkOp, status: i32) -> Self {
        self.fail(op, status);
        self
    }

    /// Make every vendor call take at least `latency`.
    pub fn with_call_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = Some(latency);
        self
    }

    /// Make initialization report success but hand back the sentinel id.
    pub fn with_sentinel_handle(self) -> Self {
        self.state.lock().sentinel_handle = true;
        self
    }

    /// Inject a failure for `op` from now on.
    pub fn fail(&self, op: SdkOp, status: i32) {
        self.state.lock().failures.insert(op, status);
    }

    /// Stop failing `op`.
    pub fn heal(&self, op: SdkOp) {
        self.state.lock().failures.remove(&op);
    }

    /// Change the sensor reading of a physical channel.
    pub fn set_sensor_reading(&self, channel: PhysicalChannel, value: f64) {
        self.state.lock().sensor_readings[channel.index()] = value;
    }

    /// Simulate the process drifting on a physical channel.
    pub fn set_current_pressure(&self, channel: PhysicalChannel, mbar: f64) {
        self.state.lock().pressures[channel.index()] = mbar;
    }

    /// Pressure the simulator currently holds on a physical channel.
    pub fn current_pressure(&self, channel: PhysicalChannel) -> f64 {
        self.state.lock().pressures[channel.index()]
    }

    /// Sensor attached to a physical channel, if any.
    pub fn sensor(&self, channel: PhysicalChannel) -> Option<SensorConfig> {
        self.state.lock().sensors[channel.index()]
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<SdkCall> {
        self.state.lock().calls.clone()
    }

    /// Calls of one operation.
    pub fn calls_of(&self, op: SdkOp) -> Vec<SdkCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.op() == op)
            .cloned()
            .collect()
    }

    /// Forget recorded calls (state is kept).
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Whether an instrument handle is currently live.
    pub fn is_connected(&self) -> bool {
        self.state.lock().live_handle.is_some()
    }

    /// Most vendor calls ever observed in flight at once.
    pub fn peak_concurrent_calls(&self) -> usize {
        self.activity.peak.load(Ordering::SeqCst)
    }

    /// Count a call as in flight and apply the configured latency.
    fn enter(&self) -> InFlight<'_> {
        let active = self.activity.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.activity.peak.fetch_max(active, Ordering::SeqCst);
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        InFlight(&self.activity)
    }
}

impl Ob1Sdk for MockSdk {
    fn initialize(
        &mut self,
        device: &str,
        regulators: [Regulator; MAX_CHANNELS],
    ) -> SdkResult<InstrumentHandle> {
        let _call = self.enter();
        let mut state = self.state.lock();
        state.calls.push(SdkCall::Initialize {
            device: device.to_string(),
            regulators: regulators.map(Regulator::code),
        });
        state.injected(SdkOp::Initialize)?;
        if state.sentinel_handle {
            return Ok(InstrumentHandle::from_raw(-1));
        }
        let id = state.next_handle;
        state.next_handle += 1;
        state.live_handle = Some(id);
        Ok(InstrumentHandle::from_raw(id))
    }

    fn add_sensor(
        &mut self,
        handle: InstrumentHandle,
        channel: PhysicalChannel,
        sensor: &SensorConfig,
    ) -> SdkResult<()> {
        let _call = self.enter();
        let mut state = self.state.lock();
        state.calls.push(SdkCall::AddSensor {
            channel: channel.number(),
            sensor_type: sensor.sensor_type.code(),
        });
        state.check_handle(handle)?;
        state.injected(SdkOp::AddSensor)?;
        if sensor.sensor_type.code() > MAX_KNOWN_SENSOR_CODE {
            return Err(SdkStatus(MOCK_UNKNOWN_SENSOR));
        }
        state.sensors[channel.index()] = (!sensor.sensor_type.is_none()).then_some(*sensor);
        Ok(())
    }

    fn set_pressure(
        &mut self,
        handle: InstrumentHandle,
        channel: PhysicalChannel,
        mbar: f64,
        calibration: &[f64],
    ) -> SdkResult<()> {
        let _call = self.enter();
        let mut state = self.state.lock();
        state.calls.push(SdkCall::SetPressure {
            channel: channel.number(),
            mbar,
            calibration_len: calibration.len(),
        });
        state.check_handle(handle)?;
        state.injected(SdkOp::SetPressure)?;
        state.pressures[channel.index()] = mbar;
        Ok(())
    }

    fn get_pressure(
        &mut self,
        handle: InstrumentHandle,
        channel: PhysicalChannel,
        _calibration: &[f64],
    ) -> SdkResult<f64> {
        let _call = self.enter();
        let mut state = self.state.lock();
        state.calls.push(SdkCall::GetPressure {
            channel: channel.number(),
        });
        state.check_handle(handle)?;
        state.injected(SdkOp::GetPressure)?;
        Ok(state.pressures[channel.index()])
    }

    fn get_sensor_data(
        &mut self,
        handle: InstrumentHandle,
        channel: PhysicalChannel,
    ) -> SdkResult<f64> {
        let _call = self.enter();
        let mut state = self.state.lock();
        state.calls.push(SdkCall::GetSensorData {
            channel: channel.number(),
        });
        state.check_handle(handle)?;
        state.injected(SdkOp::GetSensorData)?;
        if state.sensors[channel.index()].is_none() {
            return Err(SdkStatus(MOCK_NO_SENSOR));
        }
        Ok(state.sensor_readings[channel.index()])
    }

    fn set_all_pressures(
        &mut self,
        handle: InstrumentHandle,
        mbar: &[f64; MAX_CHANNELS],
        _calibration: &[f64],
    ) -> SdkResult<()> {
        let _call = self.enter();
        let mut state = self.state.lock();
        state.calls.push(SdkCall::SetAllPressures { mbar: *mbar });
        state.check_handle(handle)?;
        state.injected(SdkOp::SetAllPressures)?;
        state.pressures = *mbar;
        Ok(())
    }

    fn destroy(&mut self, handle: InstrumentHandle) -> SdkResult<()> {
        let _call = self.enter();
        let mut state = self.state.lock();
        state.calls.push(SdkCall::Destroy {
            handle: handle.raw(),
        });
        state.check_handle(handle)?;
        state.injected(SdkOp::Destroy)?;
        state.live_handle = None;
        state.sensors = [None; MAX_CHANNELS];
        Ok(())
    }

    fn default_calibration(&mut self, table: &mut [f64]) -> SdkResult<()> {
        let _call = self.enter();
        let mut state = self.state.lock();
        state
            .calls
            .push(SdkCall::DefaultCalibration { len: table.len() });
        state.injected(SdkOp::DefaultCalibration)?;
        for (i, coefficient) in table.iter_mut().enumerate() {
            *coefficient = 1.0 + i as f64 * 1e-3;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::{SensorType, OB1_REGULATORS};

    fn ch(n: u8) -> PhysicalChannel {
        PhysicalChannel::new(n).unwrap()
    }

    #[test]
    fn test_pressure_round_trip_and_recording() {
        let mut sdk = MockSdk::new();
        let handle = sdk.initialize("01C8453E", OB1_REGULATORS).unwrap();
        sdk.set_pressure(handle, ch(2), 250.0, &[1.0; 4]).unwrap();
        assert_eq!(sdk.get_pressure(handle, ch(2), &[1.0; 4]), Ok(250.0));
        assert_eq!(sdk.calls().len(), 3);
        assert_eq!(
            sdk.calls()[0],
            SdkCall::Initialize {
                device: "01C8453E".into(),
                regulators: [2, 2, 3, 3]
            }
        );
    }

    #[test]
    fn test_injected_failure_and_heal() {
        let mut sdk = MockSdk::new().with_failure(SdkOp::GetPressure, -7);
        let handle = sdk.initialize("dev", OB1_REGULATORS).unwrap();
        assert_eq!(sdk.get_pressure(handle, ch(1), &[]), Err(SdkStatus(-7)));
        sdk.heal(SdkOp::GetPressure);
        assert_eq!(sdk.get_pressure(handle, ch(1), &[]), Ok(0.0));
    }

    #[test]
    fn test_sensor_read_requires_attach() {
        let mut sdk = MockSdk::new().with_sensor_reading(ch(1), 3.5);
        let handle = sdk.initialize("dev", OB1_REGULATORS).unwrap();
        assert_eq!(
            sdk.get_sensor_data(handle, ch(1)),
            Err(SdkStatus(MOCK_NO_SENSOR))
        );
        sdk.add_sensor(handle, ch(1), &SensorConfig::new(SensorType::FLOW_7_UL_MIN))
            .unwrap();
        assert_eq!(sdk.get_sensor_data(handle, ch(1)), Ok(3.5));
    }

    #[test]
    fn test_overlapping_calls_raise_peak() {
        let sdk = MockSdk::new().with_call_latency(Duration::from_millis(200));
        std::thread::scope(|s| {
            for _ in 0..2 {
                let mut sdk = sdk.clone();
                s.spawn(move || {
                    let mut table = [0.0; 4];
                    sdk.default_calibration(&mut table).unwrap();
                });
            }
        });
        assert_eq!(sdk.calls_of(SdkOp::DefaultCalibration).len(), 2);
        assert_eq!(sdk.peak_concurrent_calls(), 2);
    }

    #[test]
    fn test_destroyed_handle_is_rejected() {
        let mut sdk = MockSdk::new();
        let handle = sdk.initialize("dev", OB1_REGULATORS).unwrap();
        sdk.destroy(handle).unwrap();
        assert!(!sdk.is_connected());
        assert_eq!(
            sdk.set_pressure(handle, ch(1), 1.0, &[]),
            Err(SdkStatus(MOCK_INVALID_HANDLE))
        );
    }
}
