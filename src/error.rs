//! Error types for OB1 driver operations.
//!
//! Every hardware-facing call returns [`Result`]. The dispatch layer never
//! lets a hardware failure escape as a panic; it traces the failure and
//! hands an [`Ob1Error`] back to the host, which decides what the user sees
//! (typically by marking the monitored value as stale). [`Ob1Error::kind`]
//! collapses the variants into the coarse categories the host acts on.

use thiserror::Error;

use crate::channel::PhysicalChannel;
use crate::parameter::ValueKind;

/// Result type alias for OB1 operations.
pub type Result<T> = std::result::Result<T, Ob1Error>;

/// Coarse failure category reported at the host boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Initialization,
    Configuration,
    Communication,
    Shutdown,
    Hardware,
    Timeout,
    InvalidParameter,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Shutdown => "shutdown",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
        };
        write!(f, "{}", label)
    }
}

/// Errors that can occur when driving an OB1 controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Ob1Error {
    /// Vendor initialization failed, or the session was never opened or is
    /// already closed. Terminal for the session.
    #[error("OB1 device '{device}' not available (status {status})")]
    DeviceNotFound { device: String, status: i32 },

    /// Default calibration could not be loaded; pressure conversions are blocked.
    #[error("Calibration table unavailable: {reason}")]
    CalibrationUnavailable { reason: String },

    /// Logical channel outside the configured channel count
    #[error("Channel {channel} out of range: {configured} channel(s) configured")]
    ChannelOutOfRange { channel: usize, configured: usize },

    /// Sensor attach was rejected by the instrument
    #[error("Sensor type {sensor_type} not recognized on {channel} (status {status})")]
    SensorNotRecognized {
        channel: PhysicalChannel,
        sensor_type: i32,
        status: i32,
    },

    /// Sensor read attempted before a sensor was attached
    #[error("No sensor configured on {channel}")]
    SensorNotConfigured { channel: PhysicalChannel },

    /// Write attempted on a read-only parameter
    #[error("Parameter {param} is read-only")]
    ReadOnlyParameter { param: &'static str },

    /// Value kind does not match the parameter's declared kind
    #[error("Parameter {param} holds {expected} values")]
    WrongValueKind {
        param: &'static str,
        expected: ValueKind,
    },

    /// Parameter has no settable range
    #[error("Parameter {param} has no bounds")]
    NoBounds { param: &'static str },

    /// Dispatch key or name not in the registry (caller/registry mismatch)
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Vendor call returned a non-zero status not otherwise classified
    #[error("Communication error during {operation} (status {status})")]
    CommunicationError {
        operation: &'static str,
        status: i32,
    },

    /// Waiting for the device lock exceeded the configured timeout
    #[error("Timed out after {timeout_ms} ms waiting for the device lock")]
    LockTimeout { timeout_ms: u64 },

    /// Depressurization at shutdown failed; the handle was still released
    #[error("Shutdown depressurization failed: {reason}")]
    ShutdownFailed { reason: String },

    /// Configuration file or value rejected
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Ob1Error {
    /// Category used by the host to decide alarm semantics.
    pub fn kind(&self) -> DriverErrorKind {
        match self {
            Ob1Error::DeviceNotFound { .. } | Ob1Error::CalibrationUnavailable { .. } => {
                DriverErrorKind::Initialization
            }
            Ob1Error::ChannelOutOfRange { .. }
            | Ob1Error::ReadOnlyParameter { .. }
            | Ob1Error::WrongValueKind { .. }
            | Ob1Error::NoBounds { .. }
            | Ob1Error::UnknownParameter(_) => DriverErrorKind::InvalidParameter,
            Ob1Error::SensorNotRecognized { .. } | Ob1Error::SensorNotConfigured { .. } => {
                DriverErrorKind::Hardware
            }
            Ob1Error::CommunicationError { .. } => DriverErrorKind::Communication,
            Ob1Error::LockTimeout { .. } => DriverErrorKind::Timeout,
            Ob1Error::ShutdownFailed { .. } => DriverErrorKind::Shutdown,
            Ob1Error::Config(_) => DriverErrorKind::Configuration,
        }
    }

    /// Check if the session is unusable (open failed or already closed).
    pub fn is_device_not_found(&self) -> bool {
        matches!(self, Self::DeviceNotFound { .. })
    }
}

impl From<figment::Error> for Ob1Error {
    fn from(err: figment::Error) -> Self {
        Ob1Error::Config(err.to_string())
    }
}
