//! Low-level FFI bindings for the Elveflow OB1 SDK.
//!
//! The vendor library (`Elveflow64`) drives OB1 pressure controllers over
//! USB. Every entry point returns an integer status where `0` means success.
//! Pressure calls additionally take the calibration array produced by
//! [`Elveflow_Calibration_Default`] together with its length.
//!
//! # Safety
//!
//! All functions in this crate are `unsafe` direct FFI bindings.
//! For a safe wrapper, use the `elveflow-ob1` crate instead.
//!
//! # Features
//!
//! - `elveflow-sdk`: Generate bindings from the SDK header found under
//!   `ELVEFLOW_SDK_DIR` and link the vendor library. Without this feature,
//!   link-only stubs are used and every call panics.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]
#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
