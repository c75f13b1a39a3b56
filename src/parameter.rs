//! Parameter registry.
//!
//! The OB1 exposes a closed set of four per-channel quantities. The host
//! binds each one by name once at startup and afterwards addresses it by
//! the numeric [`ParamKey`] handed back. Keys are assigned in registration
//! order and never reused.
//!
//! # Example
//!
//! ```rust
//! use elveflow_ob1::parameter::{Ob1Param, ParameterRegistry, ValueKind};
//!
//! let mut registry = ParameterRegistry::new();
//! let key = registry.register("EF_SET_PRESSURE", ValueKind::Float64).unwrap();
//! assert_eq!(registry.lookup(key).unwrap().param, Ob1Param::SetPressure);
//! assert_eq!(registry.key_for("set-pressure").unwrap(), key);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Ob1Error, Result};

/// Value type a parameter carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int32,
    Float64,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Int32 => write!(f, "int32"),
            ValueKind::Float64 => write!(f, "float64"),
        }
    }
}

/// A value read from or written to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int32(i32),
    Float64(f64),
}

impl ParamValue {
    /// Kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            ParamValue::Int32(_) => ValueKind::Int32,
            ParamValue::Float64(_) => ValueKind::Float64,
        }
    }

    /// Zero of the given kind; the cache starts from this.
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int32 => ParamValue::Int32(0),
            ValueKind::Float64 => ParamValue::Float64(0.0),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float64(v) => Some(*v),
            ParamValue::Int32(_) => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ParamValue::Int32(v) => Some(*v),
            ParamValue::Float64(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int32(v) => write!(f, "{}", v),
            ParamValue::Float64(v) => write!(f, "{:.3}", v),
        }
    }
}

/// The closed set of OB1 parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ob1Param {
    /// Commanded pressure (mbar), writable.
    SetPressure,
    /// Measured pressure (mbar), read-only.
    ReadPressure,
    /// Attached flow sensor reading, read-only.
    ReadFlow,
    /// Attached sensor type code, writable.
    SensorType,
}

impl Ob1Param {
    /// All parameters in registration order.
    pub const ALL: [Ob1Param; 4] = [
        Ob1Param::SetPressure,
        Ob1Param::ReadPressure,
        Ob1Param::ReadFlow,
        Ob1Param::SensorType,
    ];

    /// Name the host binds to.
    pub fn name(self) -> &'static str {
        match self {
            Ob1Param::SetPressure => "EF_SET_PRESSURE",
            Ob1Param::ReadPressure => "EF_GET_PRESSURE",
            Ob1Param::ReadFlow => "EF_GET_FLOW",
            Ob1Param::SensorType => "EF_SENSOR_TYPE",
        }
    }

    /// Lowercase alias accepted in place of [`name`](Self::name).
    pub fn alias(self) -> &'static str {
        match self {
            Ob1Param::SetPressure => "set-pressure",
            Ob1Param::ReadPressure => "read-pressure",
            Ob1Param::ReadFlow => "read-flow",
            Ob1Param::SensorType => "sensor-type",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            Ob1Param::SensorType => ValueKind::Int32,
            Ob1Param::SetPressure | Ob1Param::ReadPressure | Ob1Param::ReadFlow => {
                ValueKind::Float64
            }
        }
    }

    /// Whether writes reach the hardware.
    pub fn is_writable(self) -> bool {
        matches!(self, Ob1Param::SetPressure | Ob1Param::SensorType)
    }

    /// Resolve a host name or alias.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == name || p.alias() == name)
    }
}

impl fmt::Display for Ob1Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric key bound to a registered parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamKey(u32);

impl ParamKey {
    /// Raw key value.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Wrap a raw key, e.g. one received from the host.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamInfo {
    pub key: ParamKey,
    pub param: Ob1Param,
    pub name: &'static str,
    pub kind: ValueKind,
}

/// Name/key table for the OB1 parameters.
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    entries: Vec<ParamInfo>,
}

impl ParameterRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every OB1 parameter registered in [`Ob1Param::ALL`] order.
    pub fn with_all() -> Self {
        let mut registry = Self::new();
        for param in Ob1Param::ALL {
            registry.register_param(param);
        }
        registry
    }

    /// Register a parameter by host name and declared kind.
    ///
    /// Registering the same parameter again returns its existing key.
    pub fn register(&mut self, name: &str, kind: ValueKind) -> Result<ParamKey> {
        let param =
            Ob1Param::from_name(name).ok_or_else(|| Ob1Error::UnknownParameter(name.to_string()))?;
        if param.kind() != kind {
            return Err(Ob1Error::WrongValueKind {
                param: param.name(),
                expected: param.kind(),
            });
        }
        Ok(self.register_param(param))
    }

    /// Register a parameter directly.
    pub fn register_param(&mut self, param: Ob1Param) -> ParamKey {
        if let Some(info) = self.entries.iter().find(|e| e.param == param) {
            return info.key;
        }
        // at most four entries, so the index always fits
        let key = ParamKey(self.entries.len() as u32);
        self.entries.push(ParamInfo {
            key,
            param,
            name: param.name(),
            kind: param.kind(),
        });
        key
    }

    /// Entry for a key.
    pub fn lookup(&self, key: ParamKey) -> Result<&ParamInfo> {
        self.entries
            .get(key.0 as usize)
            .ok_or_else(|| Ob1Error::UnknownParameter(key.to_string()))
    }

    /// Key bound to a host name or alias.
    pub fn key_for(&self, name: &str) -> Result<ParamKey> {
        Ob1Param::from_name(name)
            .and_then(|param| self.key_of(param))
            .ok_or_else(|| Ob1Error::UnknownParameter(name.to_string()))
    }

    /// Key of an already registered parameter.
    pub fn key_of(&self, param: Ob1Param) -> Option<ParamKey> {
        self.entries
            .iter()
            .find(|e| e.param == param)
            .map(|e| e.key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
