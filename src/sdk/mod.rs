//! Vendor SDK seam.
//!
//! [`Ob1Sdk`] has one method per vendor primitive the driver uses. The
//! device session only talks to the instrument through this trait, so the
//! same dispatch logic runs against the real library ([`VendorSdk`], behind
//! the `hardware` feature) or the in-process [`MockSdk`].
//!
//! Every method is a blocking round trip. Implementations are not required
//! to be reentrant: callers serialize access (see [`crate::driver`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::{PhysicalChannel, MAX_CHANNELS};

pub mod mock;
#[cfg(feature = "hardware")]
pub mod vendor;

pub use mock::{MockSdk, SdkCall, SdkOp};
#[cfg(feature = "hardware")]
pub use vendor::VendorSdk;

/// Non-zero status returned by a vendor call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkStatus(pub i32);

impl SdkStatus {
    /// Status used when an argument cannot be handed to the SDK at all.
    pub const INVALID_ARGUMENT: SdkStatus = SdkStatus(-1);

    /// Convert a raw vendor status into a result (0 = success).
    pub fn check(status: i32) -> SdkResult<()> {
        if status == 0 {
            Ok(())
        } else {
            Err(SdkStatus(status))
        }
    }

    /// Raw status code.
    pub fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Display for SdkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.0)
    }
}

/// Result of a vendor call.
pub type SdkResult<T> = std::result::Result<T, SdkStatus>;

/// Instrument identifier handed out by vendor initialization.
///
/// Negative values are the SDK's "not connected" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentHandle(i32);

impl InstrumentHandle {
    /// Wrap a raw identifier.
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Raw identifier passed back to the SDK.
    pub fn raw(self) -> i32 {
        self.0
    }

    /// Whether the identifier denotes a connected instrument.
    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

/// Pressure regulator fitted to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regulator {
    None,
    Mbar0To200,
    Mbar0To2000,
    Mbar0To8000,
    MbarMinus1000To1000,
    MbarMinus1000To6000,
}

impl Regulator {
    /// Vendor `Z_regulator_type` code.
    pub fn code(self) -> u16 {
        match self {
            Regulator::None => 0,
            Regulator::Mbar0To200 => 1,
            Regulator::Mbar0To2000 => 2,
            Regulator::Mbar0To8000 => 3,
            Regulator::MbarMinus1000To1000 => 4,
            Regulator::MbarMinus1000To6000 => 5,
        }
    }

    /// Settable range in mbar, `None` when no regulator is fitted.
    pub fn range_mbar(self) -> Option<(f64, f64)> {
        match self {
            Regulator::None => None,
            Regulator::Mbar0To200 => Some((0.0, 200.0)),
            Regulator::Mbar0To2000 => Some((0.0, 2000.0)),
            Regulator::Mbar0To8000 => Some((0.0, 8000.0)),
            Regulator::MbarMinus1000To1000 => Some((-1000.0, 1000.0)),
            Regulator::MbarMinus1000To6000 => Some((-1000.0, 6000.0)),
        }
    }
}

/// Regulator layout of the supported chassis. Fixed by the hardware.
pub const OB1_REGULATORS: [Regulator; MAX_CHANNELS] = [
    Regulator::Mbar0To2000,
    Regulator::Mbar0To2000,
    Regulator::Mbar0To8000,
    Regulator::Mbar0To8000,
];

/// Vendor sensor type code (`Z_sensor_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorType(u16);

impl SensorType {
    pub const NONE: SensorType = SensorType(0);
    pub const FLOW_1_5_UL_MIN: SensorType = SensorType(1);
    pub const FLOW_7_UL_MIN: SensorType = SensorType(2);
    pub const FLOW_50_UL_MIN: SensorType = SensorType(3);
    pub const FLOW_80_UL_MIN: SensorType = SensorType(4);
    pub const FLOW_1000_UL_MIN: SensorType = SensorType(5);
    pub const FLOW_5000_UL_MIN: SensorType = SensorType(6);

    /// Build from the integer written by the host; `None` if it cannot be a vendor code.
    pub fn from_code(code: i32) -> Option<Self> {
        u16::try_from(code).ok().map(SensorType)
    }

    /// Vendor code.
    pub fn code(self) -> u16 {
        self.0
    }

    /// Whether this code detaches the sensor.
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Sensor signal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSignal {
    #[default]
    Analog,
    Digital,
}

impl SensorSignal {
    /// Vendor `Z_Sensor_digit_analog` code.
    pub fn code(self) -> u16 {
        match self {
            SensorSignal::Analog => 0,
            SensorSignal::Digital => 1,
        }
    }
}

/// Calibration fluid for digital flow sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowCalibration {
    #[default]
    H2o,
    Ipa,
}

impl FlowCalibration {
    /// Vendor `Z_Sensor_FSD_Calib` code.
    pub fn code(self) -> u16 {
        match self {
            FlowCalibration::H2o => 0,
            FlowCalibration::Ipa => 1,
        }
    }
}

/// Digital sensor resolution, 9 to 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorResolution(u8);

impl SensorResolution {
    pub const BITS_16: SensorResolution = SensorResolution(16);

    /// Build from a bit count in `9..=16`.
    pub fn from_bits(bits: u8) -> Option<Self> {
        (9..=16).contains(&bits).then_some(Self(bits))
    }

    /// Resolution in bits.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Vendor `Z_D_F_S_Resolution` code (9 bit = 0 ... 16 bit = 7).
    pub fn code(self) -> u16 {
        u16::from(self.0 - 9)
    }
}

impl Default for SensorResolution {
    fn default() -> Self {
        Self::BITS_16
    }
}

/// Full sensor description passed to `OB1_Add_Sens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorConfig {
    pub sensor_type: SensorType,
    pub signal: SensorSignal,
    pub calibration: FlowCalibration,
    pub resolution: SensorResolution,
}

impl Default for SensorType {
    fn default() -> Self {
        Self::NONE
    }
}

impl SensorConfig {
    /// Sensor of the given type with default signal options.
    pub fn new(sensor_type: SensorType) -> Self {
        Self {
            sensor_type,
            ..Default::default()
        }
    }

    /// Same options, different sensor type.
    pub fn with_type(self, sensor_type: SensorType) -> Self {
        Self {
            sensor_type,
            ..self
        }
    }
}

/// Blocking access to the vendor primitives.
///
/// Channel arguments are already validated physical channels; calibration
/// slices are the loaded calibration table.
pub trait Ob1Sdk: Send {
    /// `OB1_Initialization`: connect to `device` with the given regulator layout.
    fn initialize(
        &mut self,
        device: &str,
        regulators: [Regulator; MAX_CHANNELS],
    ) -> SdkResult<InstrumentHandle>;

    /// `OB1_Add_Sens`: attach (or replace) the sensor on a channel.
    fn add_sensor(
        &mut self,
        handle: InstrumentHandle,
        channel: PhysicalChannel,
        sensor: &SensorConfig,
    ) -> SdkResult<()>;

    /// `OB1_Set_Press`: command a channel pressure in mbar.
    fn set_pressure(
        &mut self,
        handle: InstrumentHandle,
        channel: PhysicalChannel,
        mbar: f64,
        calibration: &[f64],
    ) -> SdkResult<()>;

    /// `OB1_Get_Press`: acquire and return a channel pressure in mbar.
    fn get_pressure(
        &mut self,
        handle: InstrumentHandle,
        channel: PhysicalChannel,
        calibration: &[f64],
    ) -> SdkResult<f64>;

    /// `OB1_Get_Sens_Data`: acquire and return the attached sensor's reading.
    fn get_sensor_data(&mut self, handle: InstrumentHandle, channel: PhysicalChannel)
        -> SdkResult<f64>;

    /// `OB1_Set_All_Press`: command every physical channel at once.
    fn set_all_pressures(
        &mut self,
        handle: InstrumentHandle,
        mbar: &[f64; MAX_CHANNELS],
        calibration: &[f64],
    ) -> SdkResult<()>;

    /// `OB1_Destructor`: release the instrument.
    fn destroy(&mut self, handle: InstrumentHandle) -> SdkResult<()>;

    /// `Elveflow_Calibration_Default`: fill `table` with default coefficients.
    fn default_calibration(&mut self, table: &mut [f64]) -> SdkResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_check() {
        assert_eq!(SdkStatus::check(0), Ok(()));
        assert_eq!(SdkStatus::check(-8), Err(SdkStatus(-8)));
    }

    #[test]
    fn test_handle_sentinel() {
        assert!(InstrumentHandle::from_raw(0).is_valid());
        assert!(!InstrumentHandle::from_raw(-1).is_valid());
    }

    #[test]
    fn test_ob1_regulator_layout() {
        assert_eq!(OB1_REGULATORS[0].range_mbar(), Some((0.0, 2000.0)));
        assert_eq!(OB1_REGULATORS[3].range_mbar(), Some((0.0, 8000.0)));
        assert_eq!(Regulator::Mbar0To8000.code(), 3);
    }

    #[test]
    fn test_sensor_codes() {
        assert_eq!(SensorType::from_code(7), Some(SensorType(7)));
        assert_eq!(SensorType::from_code(-1), None);
        assert_eq!(SensorType::from_code(70_000), None);
        assert_eq!(SensorResolution::from_bits(16).map(|r| r.code()), Some(7));
        assert_eq!(SensorResolution::from_bits(9).map(|r| r.code()), Some(0));
        assert!(SensorResolution::from_bits(8).is_none());
        assert_eq!(FlowCalibration::Ipa.code(), 1);
    }
}
