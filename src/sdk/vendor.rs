//! [`Ob1Sdk`] over the vendor library via `elveflow-sys`.

#![allow(unsafe_code)]

use std::ffi::CString;

use tracing::debug;

use super::{
    InstrumentHandle, Ob1Sdk, Regulator, SdkResult, SdkStatus, SensorConfig,
};
use crate::channel::{PhysicalChannel, MAX_CHANNELS};

/// Acquire a fresh sample instead of returning the SDK's last value.
const ACQUIRE: i32 = 1;

/// Vendor library backend.
///
/// The library itself is not reentrant; the driver serializes every call
/// through its device lock.
#[derive(Debug, Default)]
pub struct VendorSdk {
    _private: (),
}

impl VendorSdk {
    /// Create a backend bound to the linked vendor library.
    pub fn new() -> Self {
        Self::default()
    }
}

fn len_i32(slice: &[f64]) -> SdkResult<i32> {
    i32::try_from(slice.len()).map_err(|_| SdkStatus::INVALID_ARGUMENT)
}

impl Ob1Sdk for VendorSdk {
    fn initialize(
        &mut self,
        device: &str,
        regulators: [Regulator; MAX_CHANNELS],
    ) -> SdkResult<InstrumentHandle> {
        let c_device = CString::new(device).map_err(|_| SdkStatus::INVALID_ARGUMENT)?;
        let mut id: i32 = -1;

        // SAFETY: c_device is a valid NUL-terminated string that outlives the
        // call; id is a valid out pointer.
        let status = unsafe {
            elveflow_sys::OB1_Initialization(
                c_device.as_ptr().cast_mut(),
                regulators[0].code(),
                regulators[1].code(),
                regulators[2].code(),
                regulators[3].code(),
                &mut id,
            )
        };
        debug!(device, status, id, "OB1_Initialization");
        SdkStatus::check(status)?;
        Ok(InstrumentHandle::from_raw(id))
    }

    fn add_sensor(
        &mut self,
        handle: InstrumentHandle,
        channel: PhysicalChannel,
        sensor: &SensorConfig,
    ) -> SdkResult<()> {
        // SAFETY: plain value arguments
        let status = unsafe {
            elveflow_sys::OB1_Add_Sens(
                handle.raw(),
                i32::from(channel.number()),
                sensor.sensor_type.code(),
                sensor.signal.code(),
                sensor.calibration.code(),
                sensor.resolution.code(),
            )
        };
        SdkStatus::check(status)
    }

    fn set_pressure(
        &mut self,
        handle: InstrumentHandle,
        channel: PhysicalChannel,
        mbar: f64,
        calibration: &[f64],
    ) -> SdkResult<()> {
        let len = len_i32(calibration)?;
        // SAFETY: the SDK only reads `len` coefficients from the table.
        let status = unsafe {
            elveflow_sys::OB1_Set_Press(
                handle.raw(),
                i32::from(channel.number()),
                mbar,
                calibration.as_ptr().cast_mut(),
                len,
            )
        };
        SdkStatus::check(status)
    }

    fn get_pressure(
        &mut self,
        handle: InstrumentHandle,
        channel: PhysicalChannel,
        calibration: &[f64],
    ) -> SdkResult<f64> {
        let len = len_i32(calibration)?;
        let mut mbar = 0.0_f64;
        // SAFETY: the SDK only reads the table and writes one f64 to `mbar`.
        let status = unsafe {
            elveflow_sys::OB1_Get_Press(
                handle.raw(),
                i32::from(channel.number()),
                ACQUIRE,
                calibration.as_ptr().cast_mut(),
                &mut mbar,
                len,
            )
        };
        SdkStatus::check(status)?;
        Ok(mbar)
    }

    fn get_sensor_data(
        &mut self,
        handle: InstrumentHandle,
        channel: PhysicalChannel,
    ) -> SdkResult<f64> {
        let mut value = 0.0_f64;
        // SAFETY: `value` is a valid out pointer for one f64.
        let status = unsafe {
            elveflow_sys::OB1_Get_Sens_Data(
                handle.raw(),
                i32::from(channel.number()),
                ACQUIRE,
                &mut value,
            )
        };
        SdkStatus::check(status)?;
        Ok(value)
    }

    fn set_all_pressures(
        &mut self,
        handle: InstrumentHandle,
        mbar: &[f64; MAX_CHANNELS],
        calibration: &[f64],
    ) -> SdkResult<()> {
        let len = len_i32(calibration)?;
        let mut pressures = *mbar;
        // SAFETY: both arrays are valid for the lengths passed.
        let status = unsafe {
            elveflow_sys::OB1_Set_All_Press(
                handle.raw(),
                pressures.as_mut_ptr(),
                calibration.as_ptr().cast_mut(),
                MAX_CHANNELS as i32,
                len,
            )
        };
        SdkStatus::check(status)
    }

    fn destroy(&mut self, handle: InstrumentHandle) -> SdkResult<()> {
        // SAFETY: handle came from OB1_Initialization and is released once
        let status = unsafe { elveflow_sys::OB1_Destructor(handle.raw()) };
        SdkStatus::check(status)
    }

    fn default_calibration(&mut self, table: &mut [f64]) -> SdkResult<()> {
        let len = len_i32(table)?;
        // SAFETY: the SDK writes at most `len` coefficients into `table`.
        let status =
            unsafe { elveflow_sys::Elveflow_Calibration_Default(table.as_mut_ptr(), len) };
        SdkStatus::check(status)
    }
}
