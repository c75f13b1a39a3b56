//! # Elveflow OB1 Driver Core
//!
//! Control core for Elveflow OB1 multi-channel pressure/flow controllers.
//! A host control system names four per-channel quantities (commanded
//! pressure, measured pressure, flow sensor reading, sensor type); this
//! crate turns reads and writes of those quantities into vendor SDK calls,
//! keeps the calibration table every pressure conversion needs, and makes
//! sure the instrument is depressurized before it is released.
//!
//! ## Crate Structure
//!
//! - **`sdk`**: the [`sdk::Ob1Sdk`] trait over the vendor primitives, with
//!   the FFI backend (`hardware` feature) and the [`sdk::MockSdk`] simulator.
//! - **`calibration`**: the owned calibration table.
//! - **`channel`**: logical to physical channel addressing.
//! - **`session`**: the single instrument handle and per-channel sensors.
//! - **`parameter`**: the closed parameter set and its name/key registry.
//! - **`observable`**: last-known values with `watch`-based notification.
//! - **`driver`**: [`Ob1Driver`], the read/write dispatch entry points.
//! - **`lifecycle`**: startup with bumpless restore, shutdown on drop.
//! - **`config`** / **`logging`**: Figment configuration and tracing setup.
//!
//! ## Example
//!
//! ```rust
//! use elveflow_ob1::config::PortConfig;
//! use elveflow_ob1::sdk::MockSdk;
//! use elveflow_ob1::Ob1Driver;
//!
//! # fn main() -> elveflow_ob1::Result<()> {
//! let driver = Ob1Driver::start(MockSdk::new(), &PortConfig::new("01C8453E"))?;
//! let set_pressure = driver.key_for("EF_SET_PRESSURE")?;
//! driver.write_float64(set_pressure, 0, 250.0)?;
//! driver.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod observable;
pub mod parameter;
pub mod sdk;
pub mod session;

pub use driver::Ob1Driver;
pub use error::{DriverErrorKind, Ob1Error, Result};
pub use parameter::{Ob1Param, ParamKey, ParamValue, ValueKind};
