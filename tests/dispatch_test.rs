//! Dispatch engine integration tests.
//!
//! Drive [`Ob1Driver`] through its public API against the [`MockSdk`]
//! simulator and check which vendor calls reach the instrument.

use std::thread;
use std::time::Duration;

use elveflow_ob1::channel::{ChannelResolver, PhysicalChannel, MAX_CHANNELS};
use elveflow_ob1::config::PortConfig;
use elveflow_ob1::observable::UpdateStatus;
use elveflow_ob1::sdk::{MockSdk, SdkCall, SdkOp, SensorType};
use elveflow_ob1::{Ob1Driver, Ob1Error, Ob1Param, ParamKey, ParamValue};

fn physical(n: u8) -> PhysicalChannel {
    PhysicalChannel::new(n).unwrap()
}

fn key(driver: &Ob1Driver<MockSdk>, param: Ob1Param) -> ParamKey {
    driver.key_for(param.name()).unwrap()
}

/// Started driver plus a probe sharing the simulator state, with the
/// startup calls already cleared.
fn started(config: &PortConfig, sdk: MockSdk) -> (Ob1Driver<MockSdk>, MockSdk) {
    let probe = sdk.clone();
    let driver = Ob1Driver::start(sdk, config).unwrap();
    probe.clear_calls();
    (driver, probe)
}

// =============================================================================
// Channel addressing
// =============================================================================

#[test]
fn test_resolve_maps_to_one_based() {
    let resolver = ChannelResolver::new(MAX_CHANNELS).unwrap();
    for logical in 0..MAX_CHANNELS {
        assert_eq!(
            usize::from(resolver.resolve(logical).unwrap().number()),
            logical + 1
        );
    }
}

#[test]
fn test_out_of_range_write_makes_no_hardware_call() {
    let (driver, probe) = started(&PortConfig::new("01C8453E"), MockSdk::new());
    let set_pressure = key(&driver, Ob1Param::SetPressure);

    let err = driver.write_float64(set_pressure, 5, 100.0).unwrap_err();
    assert_eq!(
        err,
        Ob1Error::ChannelOutOfRange {
            channel: 5,
            configured: 4
        }
    );
    assert!(driver.read(key(&driver, Ob1Param::ReadPressure), 4).is_err());
    assert!(probe.calls().is_empty());
}

#[test]
fn test_configured_count_limits_channels() {
    let (driver, probe) = started(&PortConfig::new("dev").with_channels(2), MockSdk::new());
    let err = driver
        .write_float64(key(&driver, Ob1Param::SetPressure), 2, 10.0)
        .unwrap_err();
    assert!(matches!(
        err,
        Ob1Error::ChannelOutOfRange {
            channel: 2,
            configured: 2
        }
    ));
    assert!(probe.calls().is_empty());
}

// =============================================================================
// End to end
// =============================================================================

#[test]
fn test_two_channel_pressure_and_flow() {
    let sdk = MockSdk::new().with_sensor_reading(physical(2), 12.75);
    let (driver, probe) = started(&PortConfig::new("01C8453E").with_channels(2), sdk);
    assert!(driver.startup_error().is_none());

    let sensor_type = key(&driver, Ob1Param::SensorType);
    let set_pressure = key(&driver, Ob1Param::SetPressure);
    let read_flow = key(&driver, Ob1Param::ReadFlow);

    driver.write_int32(sensor_type, 1, 7).unwrap();
    assert_eq!(
        probe.calls(),
        vec![SdkCall::AddSensor {
            channel: 2,
            sensor_type: 7
        }]
    );

    driver.write_float64(set_pressure, 1, 500.0).unwrap();
    assert_eq!(
        probe.calls_of(SdkOp::SetPressure),
        vec![SdkCall::SetPressure {
            channel: 2,
            mbar: 500.0,
            calibration_len: 1000
        }]
    );
    assert_eq!(driver.read_float64(set_pressure, 1).unwrap(), 500.0);

    assert_eq!(driver.read_float64(read_flow, 1).unwrap(), 12.75);
    assert_eq!(
        probe.calls_of(SdkOp::GetSensorData),
        vec![SdkCall::GetSensorData { channel: 2 }]
    );
    let cached = driver.cached(read_flow, 1).unwrap();
    assert_eq!(cached.value, ParamValue::Float64(12.75));
    assert_eq!(cached.status, UpdateStatus::Ok);
}

#[test]
fn test_read_pressure_acquires_from_hardware() {
    let (driver, probe) = started(&PortConfig::new("dev"), MockSdk::new());
    probe.set_current_pressure(physical(3), 1450.0);
    let read_pressure = key(&driver, Ob1Param::ReadPressure);

    assert_eq!(driver.read_float64(read_pressure, 2).unwrap(), 1450.0);
    assert_eq!(
        probe.calls(),
        vec![SdkCall::GetPressure { channel: 3 }]
    );
}

#[test]
fn test_cached_parameters_do_not_touch_hardware() {
    let (driver, probe) = started(&PortConfig::new("dev"), MockSdk::new());
    assert_eq!(driver.read_int32(key(&driver, Ob1Param::SensorType), 0).unwrap(), 0);
    assert_eq!(driver.read_float64(key(&driver, Ob1Param::SetPressure), 3).unwrap(), 0.0);
    assert!(probe.calls().is_empty());
}

// =============================================================================
// Sensors
// =============================================================================

#[test]
fn test_sensor_attach_is_idempotent() {
    let (driver, probe) = started(&PortConfig::new("dev"), MockSdk::new());
    let sensor_type = key(&driver, Ob1Param::SensorType);

    driver.write_int32(sensor_type, 0, 3).unwrap();
    driver.write_int32(sensor_type, 0, 3).unwrap();

    assert_eq!(probe.calls_of(SdkOp::AddSensor).len(), 2);
    assert_eq!(
        probe.sensor(physical(1)).map(|s| s.sensor_type),
        Some(SensorType::FLOW_50_UL_MIN)
    );
    assert_eq!(driver.read_int32(sensor_type, 0).unwrap(), 3);
}

#[test]
fn test_flow_read_without_sensor() {
    let (driver, probe) = started(&PortConfig::new("dev"), MockSdk::new());
    let err = driver
        .read_float64(key(&driver, Ob1Param::ReadFlow), 0)
        .unwrap_err();
    assert_eq!(
        err,
        Ob1Error::SensorNotConfigured {
            channel: physical(1)
        }
    );
    assert!(probe.calls().is_empty());
    assert!(driver.cached(key(&driver, Ob1Param::ReadFlow), 0).unwrap().is_alarm());
}

#[test]
fn test_rejected_sensor_type() {
    let (driver, probe) = started(&PortConfig::new("dev"), MockSdk::new());
    let sensor_type = key(&driver, Ob1Param::SensorType);

    let err = driver.write_int32(sensor_type, 1, -4).unwrap_err();
    assert!(matches!(
        err,
        Ob1Error::SensorNotRecognized { sensor_type: -4, .. }
    ));
    assert!(probe.calls().is_empty());

    let err = driver.write_int32(sensor_type, 1, 40).unwrap_err();
    assert!(matches!(
        err,
        Ob1Error::SensorNotRecognized { sensor_type: 40, .. }
    ));
    let cached = driver.cached(sensor_type, 1).unwrap();
    assert_eq!(cached.value, ParamValue::Int32(40));
    assert!(cached.is_alarm());
}

// =============================================================================
// Error policy
// =============================================================================

#[test]
fn test_write_to_read_only_parameter() {
    let (driver, probe) = started(&PortConfig::new("dev"), MockSdk::new());
    for param in [Ob1Param::ReadPressure, Ob1Param::ReadFlow] {
        let mut rx = driver.subscribe(key(&driver, param), 0).unwrap();
        rx.borrow_and_update();

        let err = driver.write_float64(key(&driver, param), 0, 1.0).unwrap_err();
        assert_eq!(err, Ob1Error::ReadOnlyParameter { param: param.name() });
        assert!(rx.has_changed().unwrap());
        let update = *rx.borrow_and_update();
        assert_eq!(update.value, ParamValue::Float64(0.0));
        assert_eq!(update.status, UpdateStatus::Alarm);
    }
    assert!(probe.calls().is_empty());
}

#[test]
fn test_wrong_value_kind() {
    let (driver, probe) = started(&PortConfig::new("dev"), MockSdk::new());
    let set_pressure = key(&driver, Ob1Param::SetPressure);
    let mut rx = driver.subscribe(set_pressure, 0).unwrap();
    rx.borrow_and_update();

    let err = driver.write(set_pressure, 0, ParamValue::Int32(5)).unwrap_err();
    assert!(matches!(err, Ob1Error::WrongValueKind { .. }));
    assert!(rx.has_changed().unwrap());
    let update = *rx.borrow_and_update();
    assert_eq!(update.value, ParamValue::Float64(0.0));
    assert!(update.is_alarm());
    assert!(driver.read_int32(key(&driver, Ob1Param::ReadPressure), 0).is_err());
    assert!(probe.calls().is_empty());
}

#[test]
fn test_unknown_key_and_name() {
    let (driver, _probe) = started(&PortConfig::new("dev"), MockSdk::new());
    assert!(matches!(
        driver.read(ParamKey::from_raw(42), 0),
        Err(Ob1Error::UnknownParameter(_))
    ));
    assert!(matches!(
        driver.key_for("EF_TEMPERATURE"),
        Err(Ob1Error::UnknownParameter(_))
    ));
}

#[test]
fn test_failed_write_publishes_alarm() {
    let (driver, probe) = started(&PortConfig::new("dev"), MockSdk::new());
    let set_pressure = key(&driver, Ob1Param::SetPressure);
    let rx = driver.subscribe(set_pressure, 0).unwrap();

    probe.fail(SdkOp::SetPressure, -9);
    let err = driver.write_float64(set_pressure, 0, 750.0).unwrap_err();
    assert_eq!(
        err,
        Ob1Error::CommunicationError {
            operation: "OB1_Set_Press",
            status: -9
        }
    );

    let update = *rx.borrow();
    assert_eq!(update.value, ParamValue::Float64(750.0));
    assert_eq!(update.status, UpdateStatus::Alarm);

    probe.heal(SdkOp::SetPressure);
    driver.write_float64(set_pressure, 0, 760.0).unwrap();
    assert_eq!(rx.borrow().status, UpdateStatus::Ok);
}

#[test]
fn test_failed_read_keeps_previous_value() {
    let (driver, probe) = started(&PortConfig::new("dev"), MockSdk::new());
    let read_pressure = key(&driver, Ob1Param::ReadPressure);
    probe.set_current_pressure(physical(1), 42.0);
    driver.read_float64(read_pressure, 0).unwrap();

    probe.fail(SdkOp::GetPressure, -2);
    assert!(driver.read_float64(read_pressure, 0).is_err());
    let cached = driver.cached(read_pressure, 0).unwrap();
    assert_eq!(cached.value, ParamValue::Float64(42.0));
    assert!(cached.is_alarm());
}

#[test]
fn test_no_pressure_conversion_without_calibration() {
    let sdk = MockSdk::new().with_failure(SdkOp::DefaultCalibration, -1);
    let (driver, probe) = started(&PortConfig::new("dev"), sdk);

    let set = driver.write_float64(key(&driver, Ob1Param::SetPressure), 0, 100.0);
    let read = driver.read_float64(key(&driver, Ob1Param::ReadPressure), 0);
    assert!(matches!(set, Err(Ob1Error::CalibrationUnavailable { .. })));
    assert!(matches!(read, Err(Ob1Error::CalibrationUnavailable { .. })));
    assert!(probe.calls().is_empty());
}

// =============================================================================
// Bounds and report
// =============================================================================

#[test]
fn test_bounds_follow_regulators() {
    let (driver, _probe) = started(&PortConfig::new("dev"), MockSdk::new());
    let set_pressure = key(&driver, Ob1Param::SetPressure);
    assert_eq!(driver.bounds(set_pressure, 0).unwrap(), (0.0, 2000.0));
    assert_eq!(driver.bounds(set_pressure, 1).unwrap(), (0.0, 2000.0));
    assert_eq!(driver.bounds(set_pressure, 2).unwrap(), (0.0, 8000.0));
    assert_eq!(driver.bounds(set_pressure, 3).unwrap(), (0.0, 8000.0));
    assert!(matches!(
        driver.bounds(key(&driver, Ob1Param::ReadFlow), 0),
        Err(Ob1Error::NoBounds { .. })
    ));
}

#[test]
fn test_report_lists_channels() {
    let (driver, _probe) = started(&PortConfig::new("01C8453E").with_channels(2), MockSdk::new());
    let summary = driver.report(0);
    assert!(summary.contains("01C8453E"));
    assert!(summary.contains("connected"));
    assert_eq!(summary.lines().count(), 1);

    let detailed = driver.report(1);
    assert!(detailed.contains("channel 0"));
    assert!(detailed.contains("channel 1"));
    assert!(!detailed.contains("channel 2"));
}

#[test]
fn test_cached_read_notifies_observers() {
    let (driver, probe) = started(&PortConfig::new("dev"), MockSdk::new());
    let set_pressure = key(&driver, Ob1Param::SetPressure);
    let sensor_type = key(&driver, Ob1Param::SensorType);
    driver.write_float64(set_pressure, 2, 300.0).unwrap();
    probe.clear_calls();

    let mut pressure_rx = driver.subscribe(set_pressure, 2).unwrap();
    let mut sensor_rx = driver.subscribe(sensor_type, 2).unwrap();
    pressure_rx.borrow_and_update();
    sensor_rx.borrow_and_update();

    assert_eq!(driver.read_float64(set_pressure, 2).unwrap(), 300.0);
    assert!(pressure_rx.has_changed().unwrap());
    let update = *pressure_rx.borrow_and_update();
    assert_eq!(update.value, ParamValue::Float64(300.0));
    assert_eq!(update.status, UpdateStatus::Ok);

    assert_eq!(driver.read_int32(sensor_type, 2).unwrap(), 0);
    assert!(sensor_rx.has_changed().unwrap());
    assert!(probe.calls().is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_callers_are_serialized() {
    const ROUNDS: usize = 20;
    let sdk = MockSdk::new().with_call_latency(Duration::from_millis(2));
    let (driver, probe) = started(&PortConfig::new("dev"), sdk);
    let set_pressure = key(&driver, Ob1Param::SetPressure);
    let read_pressure = key(&driver, Ob1Param::ReadPressure);

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..ROUNDS {
                driver.write_float64(set_pressure, 0, i as f64 * 10.0).unwrap();
            }
        });
        s.spawn(|| {
            for _ in 0..ROUNDS {
                let mbar = driver.read_float64(read_pressure, 0).unwrap();
                assert!((0.0..=190.0).contains(&mbar));
                assert_eq!(mbar % 10.0, 0.0);
            }
        });
    });

    assert_eq!(probe.calls_of(SdkOp::SetPressure).len(), ROUNDS);
    assert_eq!(probe.calls_of(SdkOp::GetPressure).len(), ROUNDS);
    assert_eq!(probe.calls().len(), 2 * ROUNDS);
    assert_eq!(probe.peak_concurrent_calls(), 1);
}
